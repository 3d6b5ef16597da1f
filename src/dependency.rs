//! Staging of per-task dependency bundles for cluster-native deployments.
//!
//! The platform packs a task's jars and python files into a zip archive:
//!
//! ```text
//! dep.zip
//! ├── jar/   moved into <engine-home>/usrlib
//! └── py/    shipped as auxiliary files
//! ```

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::classpath::{path_to_url, ScopeBuilder};
use crate::config::{SubmitterConfig, SystemConfig};
use crate::db::DeployMode;
use crate::engine::configuration::PYTHON_FILES;
use crate::engine::Engine;
use crate::error::{SubmitError, SubmitResult};
use crate::types::TaskId;

const JAR_DIR: &str = "jar";
const PY_DIR: &str = "py";

/// Jars and auxiliary files staged for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyBundle {
    pub jars: Vec<Url>,
    pub files: Vec<Url>,
}

impl DependencyBundle {
    pub fn is_empty(&self) -> bool {
        self.jars.is_empty() && self.files.is_empty()
    }

    /// Put the bundle in scope and on the engine's runtime registries.
    pub fn register(&self, scope: &mut ScopeBuilder, engine: &mut dyn Engine) {
        for jar in &self.jars {
            scope.register_jar(jar.clone());
        }
        if !self.jars.is_empty() {
            engine.add_jars(&self.jars);
        }

        if !self.files.is_empty() {
            for file in &self.files {
                scope.register_file(file.clone());
            }
            let joined = self
                .files
                .iter()
                .map(Url::as_str)
                .collect::<Vec<_>>()
                .join(",");
            engine.set_configuration(PYTHON_FILES, joined);
        }
    }
}

pub struct DependencyLoader {
    address: Option<String>,
    usrlib: PathBuf,
    archive: PathBuf,
    dep_dir: PathBuf,
    client: Client,
}

impl DependencyLoader {
    pub fn new(system: &SystemConfig, paths: &SubmitterConfig) -> SubmitResult<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = system.dependency_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            SubmitError::Configuration(format!("cannot build download client: {}", e))
        })?;

        Ok(Self {
            address: system.service_address().map(str::to_string),
            usrlib: paths.usrlib_dir(),
            archive: paths.dependency_archive(),
            dep_dir: paths.dependency_dir(),
            client,
        })
    }

    pub fn download_url(&self, task_id: TaskId) -> Option<String> {
        self.address
            .as_ref()
            .map(|addr| format!("{}/download/downloadDepJar/{}", addr, task_id))
    }

    /// Fetch and unpack the task's bundle. Only cluster-native deployments
    /// with a configured service address do any work; otherwise the bundle
    /// is empty and nothing is touched.
    pub async fn stage(&self, task_id: TaskId, deploy_mode: DeployMode) -> SubmitResult<DependencyBundle> {
        let Some(url) = self.download_url(task_id) else {
            debug!("No dependency service address, skipping staging");
            return Ok(DependencyBundle::default());
        };
        if !deploy_mode.is_cluster_native() {
            debug!("Deploy mode {} stages no dependencies", deploy_mode);
            return Ok(DependencyBundle::default());
        }

        fs::create_dir_all(&self.usrlib).map_err(|e| SubmitError::dependency_fetch(&url, e))?;

        info!("Downloading dependencies for task {} from {}", task_id, url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SubmitError::dependency_fetch(&url, e))?;
        if !response.status().is_success() {
            return Err(SubmitError::dependency_fetch(
                &url,
                format!("server answered {}", response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SubmitError::dependency_fetch(&url, e))?;
        tokio::fs::write(&self.archive, &bytes)
            .await
            .map_err(|e| SubmitError::dependency_fetch(&url, e))?;

        let (archive, dep_dir, usrlib) = (
            self.archive.clone(),
            self.dep_dir.clone(),
            self.usrlib.clone(),
        );
        let bundle = tokio::task::spawn_blocking(move || unpack(&archive, &dep_dir, &usrlib))
            .await
            .map_err(|e| SubmitError::dependency_fetch(&url, e))?
            .map_err(|e| SubmitError::dependency_fetch(&url, e))?;

        info!(
            "Staged {} jars and {} files for task {}",
            bundle.jars.len(),
            bundle.files.len(),
            task_id
        );
        Ok(bundle)
    }
}

/// Extract `archive` into a fresh `dep_dir`, move its jars into `usrlib`
/// and describe the result.
fn unpack(archive: &Path, dep_dir: &Path, usrlib: &Path) -> anyhow::Result<DependencyBundle> {
    if dep_dir.exists() {
        fs::remove_dir_all(dep_dir)?;
    }
    fs::create_dir_all(dep_dir)?;
    fs::create_dir_all(usrlib)?;

    let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
    zip.extract(dep_dir)?;

    let jar_dir = dep_dir.join(JAR_DIR);
    if jar_dir.is_dir() {
        for source in list_files(&jar_dir)? {
            let Some(name) = source.file_name() else {
                continue;
            };
            move_file(&source, &usrlib.join(name))?;
        }
    }

    let jars = list_files(usrlib)?
        .iter()
        .map(|p| path_to_url(p))
        .collect::<SubmitResult<Vec<_>>>()?;
    let files = {
        let py_dir = dep_dir.join(PY_DIR);
        if py_dir.is_dir() {
            list_files(&py_dir)?
                .iter()
                .map(|p| path_to_url(p))
                .collect::<SubmitResult<Vec<_>>>()?
        } else {
            Vec::new()
        }
    };

    Ok(DependencyBundle { jars, files })
}

/// Regular files directly under `dir`, sorted by path.
fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(fs::canonicalize(&path)?);
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn move_file(source: &Path, target: &Path) -> std::io::Result<()> {
    if fs::rename(source, target).is_ok() {
        return Ok(());
    }
    warn!(
        "Rename of {} failed, copying to {}",
        source.display(),
        target.display()
    );
    fs::copy(source, target)?;
    fs::remove_file(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SysConfigRecord;
    use crate::engine::recording::{EngineLog, RecordingEngine};
    use crate::engine::EngineConfiguration;
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn system(address: &str) -> SystemConfig {
        SystemConfig::from_records(vec![SysConfigRecord {
            name: crate::config::SERVICE_ADDRESS.to_string(),
            value: address.to_string(),
        }])
        .unwrap()
    }

    fn paths(home: &Path) -> SubmitterConfig {
        SubmitterConfig {
            engine_home: home.to_path_buf(),
            conf_dir: home.join("conf"),
            sql_file: PathBuf::from("job.sql"),
        }
    }

    fn write_archive(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    fn archive_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Answer every request on a local port with `body`; returns the base address.
    async fn serve(body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let body = body.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        address
    }

    #[tokio::test]
    async fn test_stage_downloads_and_unpacks_bundle() {
        let address =
            serve(archive_bytes(&[("jar/udf.jar", "jar"), ("py/a.py", "print(1)")])).await;
        let home = tempfile::tempdir().unwrap();
        let paths = paths(home.path());
        let loader = DependencyLoader::new(&system(&address), &paths).unwrap();

        let first = loader.stage(9, DeployMode::KubernetesApplication).await.unwrap();
        let second = loader.stage(9, DeployMode::KubernetesApplication).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.jars.len(), 1);
        assert!(first.jars[0].as_str().ends_with("/usrlib/udf.jar"));
        assert_eq!(first.files.len(), 1);
        assert!(first.files[0].as_str().ends_with("/py/a.py"));
        assert!(paths.dependency_archive().is_file());
        assert_eq!(fs::read_dir(paths.usrlib_dir()).unwrap().count(), 1);
        assert_eq!(
            fs::read_to_string(paths.usrlib_dir().join("udf.jar")).unwrap(),
            "jar"
        );
    }

    #[tokio::test]
    async fn test_blank_address_has_no_side_effects() {
        let home = tempfile::tempdir().unwrap();
        let loader = DependencyLoader::new(&system("  "), &paths(home.path())).unwrap();

        let bundle = loader.stage(7, DeployMode::KubernetesApplication).await.unwrap();

        assert!(bundle.is_empty());
        assert_eq!(fs::read_dir(home.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_non_cluster_mode_has_no_side_effects() {
        let home = tempfile::tempdir().unwrap();
        // Unreachable address: any network attempt would fail the call.
        let loader =
            DependencyLoader::new(&system("http://127.0.0.1:1"), &paths(home.path())).unwrap();

        for mode in [DeployMode::Local, DeployMode::YarnApplication, DeployMode::KubernetesSession] {
            let bundle = loader.stage(7, mode).await.unwrap();
            assert!(bundle.is_empty());
        }
        assert_eq!(fs::read_dir(home.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_fatal() {
        let home = tempfile::tempdir().unwrap();
        let loader =
            DependencyLoader::new(&system("http://127.0.0.1:1/"), &paths(home.path())).unwrap();

        let err = loader
            .stage(7, DeployMode::KubernetesApplication)
            .await
            .unwrap_err();

        match &err {
            SubmitError::DependencyFetch { url, .. } => {
                assert_eq!(url, "http://127.0.0.1:1/download/downloadDepJar/7")
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.is_fatal());
        assert!(!home.path().join("dep.zip").exists());
    }

    #[test]
    fn test_unpack_moves_jars_and_lists_files() {
        let home = tempfile::tempdir().unwrap();
        let paths = paths(home.path());
        write_archive(
            &paths.dependency_archive(),
            &[("jar/udf.jar", "jar"), ("jar/conn.jar", "jar"), ("py/udf.py", "py")],
        );

        let bundle = unpack(
            &paths.dependency_archive(),
            &paths.dependency_dir(),
            &paths.usrlib_dir(),
        )
        .unwrap();

        let names: Vec<_> = bundle
            .jars
            .iter()
            .map(|u| u.path_segments().unwrap().next_back().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["conn.jar", "udf.jar"]);
        assert!(paths.usrlib_dir().join("udf.jar").is_file());
        assert!(!paths.dependency_dir().join("jar/udf.jar").exists());
        assert_eq!(bundle.files.len(), 1);
        assert!(bundle.files[0].as_str().ends_with("/py/udf.py"));
    }

    #[test]
    fn test_double_staging_keeps_single_copies() {
        let home = tempfile::tempdir().unwrap();
        let paths = paths(home.path());
        write_archive(&paths.dependency_archive(), &[("jar/udf.jar", "v1")]);

        let first = unpack(
            &paths.dependency_archive(),
            &paths.dependency_dir(),
            &paths.usrlib_dir(),
        )
        .unwrap();
        write_archive(&paths.dependency_archive(), &[("jar/udf.jar", "v2")]);
        let second = unpack(
            &paths.dependency_archive(),
            &paths.dependency_dir(),
            &paths.usrlib_dir(),
        )
        .unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read_dir(paths.usrlib_dir()).unwrap().count(), 1);
        assert_eq!(
            fs::read_to_string(paths.usrlib_dir().join("udf.jar")).unwrap(),
            "v2"
        );

        let log = Arc::new(Mutex::new(EngineLog::default()));
        let mut engine = RecordingEngine::new(EngineConfiguration::default(), log);
        let mut scope = ScopeBuilder::new();
        first.register(&mut scope, &mut engine);
        second.register(&mut scope, &mut engine);

        assert_eq!(engine.configuration().pipeline_jars().len(), 1);
        assert_eq!(scope.scope().jars().len(), 1);
    }

    #[test]
    fn test_register_sets_python_files() {
        let bundle = DependencyBundle {
            jars: vec![],
            files: vec![
                Url::parse("file:///opt/dep/py/a.py").unwrap(),
                Url::parse("file:///opt/dep/py/b.py").unwrap(),
            ],
        };
        let log = Arc::new(Mutex::new(EngineLog::default()));
        let mut engine = RecordingEngine::new(EngineConfiguration::default(), log);
        let mut scope = ScopeBuilder::new();

        bundle.register(&mut scope, &mut engine);

        assert_eq!(
            engine.configuration().get(PYTHON_FILES),
            Some("file:///opt/dep/py/a.py,file:///opt/dep/py/b.py")
        );
        assert_eq!(scope.scope().files().len(), 2);
        assert!(engine.configuration().pipeline_jars().is_empty());
    }
}
