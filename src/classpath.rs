//! Dependency scope for user code.
//!
//! A [`DependencyScope`] is an immutable snapshot of the jars and auxiliary
//! files registered so far. [`ScopeBuilder`] owns the registration lists and
//! produces a fresh snapshot after every change; snapshots handed out earlier
//! never change underneath their holders.

use std::env;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::error::{SubmitError, SubmitResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyScope {
    jars: Vec<Url>,
    files: Vec<Url>,
    generation: u64,
}

impl DependencyScope {
    pub fn jars(&self) -> &[Url] {
        &self.jars
    }

    pub fn files(&self) -> &[Url] {
        &self.files
    }

    /// Number of rebuilds that produced this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
pub struct ScopeBuilder {
    jars: Vec<Url>,
    files: Vec<Url>,
    current: Arc<DependencyScope>,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a jar. Returns `false` if it was already in scope.
    pub fn register_jar(&mut self, url: Url) -> bool {
        if self.jars.contains(&url) {
            return false;
        }
        debug!("Registering jar {} into scope", url);
        self.jars.push(url);
        self.rebuild();
        true
    }

    /// Register an auxiliary file. Returns `false` if it was already in scope.
    pub fn register_file(&mut self, url: Url) -> bool {
        if self.files.contains(&url) {
            return false;
        }
        debug!("Registering file {} into scope", url);
        self.files.push(url);
        self.rebuild();
        true
    }

    pub fn scope(&self) -> Arc<DependencyScope> {
        Arc::clone(&self.current)
    }

    fn rebuild(&mut self) {
        self.current = Arc::new(DependencyScope {
            jars: self.jars.clone(),
            files: self.files.clone(),
            generation: self.current.generation + 1,
        });
    }
}

/// Turn a dependency reference (URL or local path) into a URL.
pub fn to_url(reference: &str) -> SubmitResult<Url> {
    let reference = reference.trim();
    if reference.contains("://") || reference.starts_with("file:") {
        return Url::parse(reference).map_err(|e| SubmitError::registration(reference, e));
    }

    let path = Path::new(reference);
    if path.is_absolute() {
        path_to_url(path)
    } else {
        let cwd = env::current_dir().map_err(|e| SubmitError::registration(reference, e))?;
        path_to_url(&cwd.join(path))
    }
}

pub fn path_to_url(path: &Path) -> SubmitResult<Url> {
    Url::from_file_path(path).map_err(|()| {
        SubmitError::registration(path.display().to_string(), "not an absolute file path")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_rebuilds_snapshot() {
        let mut builder = ScopeBuilder::new();
        let before = builder.scope();

        assert!(builder.register_jar(to_url("/opt/udf.jar").unwrap()));
        let after = builder.scope();

        assert!(before.jars().is_empty());
        assert_eq!(before.generation(), 0);
        assert_eq!(after.jars().len(), 1);
        assert_eq!(after.generation(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let mut builder = ScopeBuilder::new();
        let url = to_url("/opt/udf.jar").unwrap();
        assert!(builder.register_jar(url.clone()));
        assert!(!builder.register_jar(url));
        assert_eq!(builder.scope().jars().len(), 1);
        assert_eq!(builder.scope().generation(), 1);
    }

    #[test]
    fn test_files_and_jars_are_separate() {
        let mut builder = ScopeBuilder::new();
        builder.register_file(to_url("/opt/a.py").unwrap());
        let scope = builder.scope();
        assert!(scope.jars().is_empty());
        assert_eq!(scope.files()[0].as_str(), "file:///opt/a.py");
    }

    #[test]
    fn test_to_url_forms() {
        assert_eq!(to_url("/opt/a.jar").unwrap().as_str(), "file:///opt/a.jar");
        assert_eq!(
            to_url("hdfs://nn:8020/jars/a.jar").unwrap().as_str(),
            "hdfs://nn:8020/jars/a.jar"
        );

        let relative = to_url("lib/a.jar").unwrap();
        assert_eq!(relative.scheme(), "file");
        assert!(relative.path().ends_with("/lib/a.jar"));
    }

    #[test]
    fn test_malformed_url_is_registration_error() {
        let err = to_url("http://[::1").unwrap_err();
        assert!(matches!(err, SubmitError::ClassLoaderRegistration { .. }));
        assert!(err.is_fatal());
    }
}
