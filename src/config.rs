//! Configuration values threaded through a submission.
//!
//! - [`SystemConfig`]: process-wide settings persisted in the `sys_config`
//!   table, loaded once at start and passed by reference.
//! - [`SubmitterConfig`]: local paths supplied by the launcher (CLI / env).
//! - [`ExecutorConfig`]: engine settings derived from the task's own fields.

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use base64::Engine as _;
use serde::Deserialize;

use crate::db::{DatabaseConfig, DeployMode, SysConfigRecord, TaskRecord};
use crate::engine::configuration::{self as keys, EngineConfiguration};
use crate::error::{SubmitError, SubmitResult};
use crate::types::{JobName, TaskId};

/// Base address of the platform service that serves dependency bundles.
pub const SERVICE_ADDRESS: &str = "service.address";
/// Optional download timeout for dependency bundles, in seconds.
pub const DEPENDENCY_TIMEOUT_SECS: &str = "service.dependency.timeout-secs";
/// Storage backend for server-managed resources (`local` or `http`).
pub const RESOURCE_STORAGE: &str = "resource.storage";
/// Root of the resource store: a directory or a base URL.
pub const RESOURCE_BASE: &str = "resource.base";
/// Settings with this prefix become global SQL fragment variables.
pub const VARIABLE_PREFIX: &str = "var.";

/// Process-wide system configuration.
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    settings: BTreeMap<String, String>,
}

impl SystemConfig {
    /// Build from persisted rows, expanding `${ENV}` references in values.
    pub fn from_records(records: Vec<SysConfigRecord>) -> SubmitResult<Self> {
        let settings = records
            .into_iter()
            .map(|r| (r.name, expand_env_vars(&r.value)))
            .collect();
        let config = Self { settings };

        if let Some(raw) = config.get(DEPENDENCY_TIMEOUT_SECS) {
            raw.trim().parse::<u64>().map_err(|_| {
                SubmitError::Configuration(format!(
                    "`{}` must be a number of seconds, got `{}`",
                    DEPENDENCY_TIMEOUT_SECS, raw
                ))
            })?;
        }

        Ok(config)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.settings.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    /// The dependency service address, or `None` when unset or blank.
    pub fn service_address(&self) -> Option<&str> {
        self.get(SERVICE_ADDRESS)
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| addr.trim_end_matches('/'))
    }

    /// Download timeout for dependency bundles. `None` leaves the HTTP
    /// client's defaults in place, which do not bound the transfer.
    pub fn dependency_timeout(&self) -> Option<Duration> {
        self.get(DEPENDENCY_TIMEOUT_SECS)
            .and_then(|raw| raw.trim().parse().ok())
            .map(Duration::from_secs)
    }

    /// Global fragment variables (`var.<name>` settings, prefix stripped).
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.settings
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(VARIABLE_PREFIX)
                    .map(|name| (name.to_string(), v.clone()))
            })
            .collect()
    }
}

/// Local working paths of the submitter process.
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Engine installation root; holds `usrlib/`, `dep.zip` and `dep/`.
    pub engine_home: PathBuf,
    /// Directory with `flink-conf.yaml` and, usually, the program source.
    pub conf_dir: PathBuf,
    /// Program source file name, resolved against `conf_dir` as a fallback.
    pub sql_file: PathBuf,
}

impl SubmitterConfig {
    pub fn usrlib_dir(&self) -> PathBuf {
        self.engine_home.join("usrlib")
    }

    pub fn dependency_archive(&self) -> PathBuf {
        self.engine_home.join("dep.zip")
    }

    pub fn dependency_dir(&self) -> PathBuf {
        self.engine_home.join("dep")
    }

    pub fn cluster_config_file(&self) -> PathBuf {
        self.conf_dir.join("flink-conf.yaml")
    }
}

/// Engine settings derived from the task.
///
/// There is deliberately no field for the task's free-form `config_json`:
/// those options are merged into the cluster configuration when the platform
/// deploys the job, and that layer must keep precedence over them. See
/// [`ExecutorConfig::apply_to`] for the full order.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    pub deploy_mode: DeployMode,
    /// Checkpoint interval in milliseconds.
    pub checkpoint: Option<i64>,
    pub parallelism: Option<i32>,
    pub use_sql_fragment: bool,
    pub use_statement_set: bool,
    pub use_batch_model: bool,
    pub savepoint_path: Option<String>,
    pub job_name: JobName,
}

impl ExecutorConfig {
    pub fn from_task(task: &TaskRecord) -> Self {
        Self {
            deploy_mode: task.deploy_mode,
            checkpoint: task.checkpoint,
            parallelism: task.parallelism,
            use_sql_fragment: task.fragment,
            use_statement_set: task.statement_set,
            use_batch_model: task.batch_model,
            savepoint_path: task
                .savepoint_path
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            job_name: JobName::new(task.name.clone()),
        }
    }

    /// Overlay the task-derived settings onto a configuration that already
    /// holds the cluster file layer.
    ///
    /// Precedence, lowest to highest: engine defaults, `flink-conf.yaml`
    /// (which already carries the task's free-form options), then the fields
    /// set here. Unset fields leave the lower layers untouched.
    pub fn apply_to(&self, conf: &mut EngineConfiguration) {
        if let Some(parallelism) = self.parallelism {
            conf.set(keys::PARALLELISM, parallelism.to_string());
        }
        if let Some(interval) = self.checkpoint.filter(|ms| *ms > 0) {
            conf.set(keys::CHECKPOINT_INTERVAL, format!("{}ms", interval));
        }
        if self.use_batch_model {
            conf.set(keys::RUNTIME_MODE, "BATCH");
        }
        if let Some(path) = &self.savepoint_path {
            conf.set(keys::SAVEPOINT_PATH, path.clone());
        }
        conf.set(keys::PIPELINE_NAME, self.job_name.as_str());
    }
}

/// Launch parameters handed over by the platform as base64-encoded JSON,
/// e.g. `{"taskId": 12, "url": "ws://store:8000", "username": "root", "password": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppParams {
    pub task_id: TaskId,
    /// Store URL; falls back to `SURREALDB_URL` when absent.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl AppParams {
    pub fn decode(encoded: &str) -> anyhow::Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("app config is not valid base64")?;
        serde_json::from_slice(&raw).context("app config is not valid JSON")
    }

    /// Override the store connection with the parameters that are present.
    pub fn apply_to(&self, db: &mut DatabaseConfig) {
        if let Some(url) = &self.url {
            db.url = url.clone();
        }
        if self.username.is_some() {
            db.username = self.username.clone();
        }
        if self.password.is_some() {
            db.password = self.password.clone();
        }
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
