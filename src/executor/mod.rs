//! Program executors.
//!
//! A task's program runs either as a jar launcher ([`jar::JarJobExecutor`])
//! or as an ordered SQL statement pipeline
//! ([`pipeline::StatementPipelineExecutor`]). Both dispatch individual
//! statements through the runners in [`runner`].

use crate::classpath::ScopeBuilder;
use crate::config::ExecutorConfig;
use crate::engine::{Engine, JobHandle};
use crate::error::SubmitError;
use crate::resource::ResourceResolver;

pub mod jar;
pub mod mode;
pub mod pipeline;
pub mod runner;

pub use jar::JarJobExecutor;
pub use mode::ExecutionMode;
pub use pipeline::StatementPipelineExecutor;
pub use runner::{RunnerTable, StatementRunner};

/// How a program run ended.
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// A job was started.
    Submitted(JobHandle),
    /// The program ran to completion without starting a job.
    NoJob,
    /// A statement failed; nothing after it ran.
    Aborted {
        statement: String,
        error: SubmitError,
    },
}

impl ExecutionOutcome {
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            Self::Submitted(handle) => Some(handle),
            Self::NoJob | Self::Aborted { .. } => None,
        }
    }
}

/// Everything a statement may touch while it runs.
pub struct RunContext<'a> {
    pub engine: &'a mut dyn Engine,
    pub scope: &'a mut ScopeBuilder,
    pub executor_config: &'a ExecutorConfig,
    pub resources: &'a ResourceResolver,
}

#[cfg(test)]
pub(crate) mod harness {
    use super::*;
    use crate::db::{DeployMode, Dialect, TaskRecord};
    use crate::engine::recording::{EngineLog, RecordingEngine, SharedLog};
    use crate::engine::EngineConfiguration;
    use crate::resource::ResourceManager;
    use std::sync::{Arc, Mutex};

    pub fn task(dialect: Dialect, deploy_mode: DeployMode) -> TaskRecord {
        TaskRecord {
            task_id: 1,
            name: "orders".to_string(),
            dialect,
            deploy_mode,
            checkpoint: None,
            parallelism: None,
            fragment: false,
            statement_set: false,
            batch_model: false,
            savepoint_path: None,
            config_json: None,
        }
    }

    pub struct Harness {
        pub engine: RecordingEngine,
        pub scope: ScopeBuilder,
        pub config: ExecutorConfig,
        pub resources: ResourceResolver,
        pub log: SharedLog,
    }

    impl Harness {
        pub fn new(task: &TaskRecord) -> Self {
            let log = Arc::new(Mutex::new(EngineLog::default()));
            Self {
                engine: RecordingEngine::new(EngineConfiguration::default(), Arc::clone(&log)),
                scope: ScopeBuilder::new(),
                config: ExecutorConfig::from_task(task),
                resources: ResourceResolver::new(ResourceManager::Local {
                    root: "/data/resources".into(),
                }),
                log,
            }
        }

        pub fn ctx(&mut self) -> RunContext<'_> {
            RunContext {
                engine: &mut self.engine,
                scope: &mut self.scope,
                executor_config: &self.config,
                resources: &self.resources,
            }
        }

        pub fn executed(&self) -> Vec<String> {
            self.log.lock().unwrap().statements.clone()
        }
    }
}
