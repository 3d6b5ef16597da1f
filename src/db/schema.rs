use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::TaskId;

/// One persisted system setting (`sys_config` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SysConfigRecord {
    pub name: String,
    pub value: String,
}

/// Program dialect of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// An ordered multi-statement SQL program.
    #[serde(rename = "FlinkSql")]
    FlinkSql,
    /// A single external program launched through `EXECUTE JAR`.
    #[serde(rename = "FlinkJar")]
    FlinkJar,
}

/// Target environment a task is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployMode {
    Local,
    Standalone,
    YarnSession,
    YarnPerJob,
    YarnApplication,
    KubernetesSession,
    KubernetesApplication,
}

impl DeployMode {
    /// Cluster-native modes run the job inside a cluster image, so user
    /// dependencies must be staged next to the engine before submission.
    pub fn is_cluster_native(&self) -> bool {
        matches!(self, Self::KubernetesApplication)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Standalone => "standalone",
            Self::YarnSession => "yarn-session",
            Self::YarnPerJob => "yarn-per-job",
            Self::YarnApplication => "yarn-application",
            Self::KubernetesSession => "kubernetes-session",
            Self::KubernetesApplication => "kubernetes-application",
        }
    }
}

impl std::fmt::Display for DeployMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted representation of a submittable task (`task` table).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Stable numeric identifier used by the platform and the launcher.
    pub task_id: TaskId,
    /// Task name, used as the job name.
    pub name: String,
    pub dialect: Dialect,
    pub deploy_mode: DeployMode,
    /// Checkpoint interval in milliseconds.
    pub checkpoint: Option<i64>,
    pub parallelism: Option<i32>,
    /// Expand `name := value` fragments and `${name}` references.
    #[serde(default)]
    pub fragment: bool,
    /// Group INSERT statements into a single statement set job.
    #[serde(default)]
    pub statement_set: bool,
    /// Run in batch runtime mode instead of streaming.
    #[serde(default)]
    pub batch_model: bool,
    /// Savepoint to restore from, if any.
    pub savepoint_path: Option<String>,
    /// Free-form engine options edited in the platform UI. They are applied at
    /// deploy time by the platform and are intentionally not re-applied here.
    #[serde(default)]
    pub config_json: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_kubernetes_application_is_cluster_native() {
        assert!(DeployMode::KubernetesApplication.is_cluster_native());
        assert!(!DeployMode::KubernetesSession.is_cluster_native());
        assert!(!DeployMode::YarnApplication.is_cluster_native());
        assert!(!DeployMode::Local.is_cluster_native());
    }

    #[test]
    fn test_deploy_mode_serde_matches_display() {
        let json = serde_json::to_string(&DeployMode::YarnPerJob).unwrap();
        assert_eq!(json, "\"yarn-per-job\"");
        assert_eq!(DeployMode::YarnPerJob.to_string(), "yarn-per-job");
    }

    #[test]
    fn test_task_record_flags_default_to_false() {
        let json = r#"{
            "task_id": 3,
            "name": "orders",
            "dialect": "FlinkSql",
            "deploy_mode": "local"
        }"#;
        let task: TaskRecord = serde_json::from_str(json).unwrap();
        assert_eq!(task.dialect, Dialect::FlinkSql);
        assert!(!task.fragment);
        assert!(!task.statement_set);
        assert!(!task.batch_model);
        assert!(task.checkpoint.is_none());
        assert!(task.config_json.is_none());
    }
}
