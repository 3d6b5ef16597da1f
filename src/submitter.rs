//! End-to-end submission of one task.
//!
//! [`Submitter::submit`] walks a fixed sequence of steps:
//!
//! 1. load system configuration from the store
//! 2. build the resource manager
//! 3. build the resource resolver
//! 4. load the task
//! 5. derive the executor configuration
//! 6. layer the engine configuration and build the engine
//! 7. stage and register dependencies
//! 8. resolve and read the program source
//! 9. run the program in the mode its dialect selects
//! 10. hand the job handle to the monitor
//!
//! Step 10 runs whatever step 9 returned; the result of step 9 is reported
//! afterwards.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::classpath::ScopeBuilder;
use crate::config::{ExecutorConfig, SubmitterConfig, SystemConfig};
use crate::db::{Db, Dialect, QueryBuilder};
use crate::dependency::DependencyLoader;
use crate::engine::{Engine, EngineConfiguration, EngineFactory, JobHandle};
use crate::error::{SubmitError, SubmitResult};
use crate::executor::{
    ExecutionMode, ExecutionOutcome, JarJobExecutor, RunContext, StatementPipelineExecutor,
};
use crate::monitor::JobMonitor;
use crate::resource::{ResourceManager, ResourceResolver};
use crate::source::read_program_source;
use crate::statement::split_statements;
use crate::types::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Init,
    ConfigLoaded,
    ExecutorBuilt,
    DependenciesStaged,
    Executing,
    Monitored,
    MonitorSkipped,
    Aborted,
}

#[derive(Debug)]
pub struct SubmissionReport {
    pub submission_id: Uuid,
    pub task_id: TaskId,
    pub state: SubmissionState,
    pub outcome: ExecutionOutcome,
}

/// Everything steps 1-8 produce for the run.
struct Prepared {
    system: SystemConfig,
    dialect: Dialect,
    executor_config: ExecutorConfig,
    engine: Box<dyn Engine>,
    scope: ScopeBuilder,
    resources: ResourceResolver,
    source: String,
}

pub struct Submitter {
    db: Db,
    paths: SubmitterConfig,
    engines: Arc<dyn EngineFactory>,
    monitor: Arc<dyn JobMonitor>,
    state: SubmissionState,
}

impl Submitter {
    pub fn new(
        db: Db,
        paths: SubmitterConfig,
        engines: Arc<dyn EngineFactory>,
        monitor: Arc<dyn JobMonitor>,
    ) -> Self {
        Self {
            db,
            paths,
            engines,
            monitor,
            state: SubmissionState::Init,
        }
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    fn transition(&mut self, next: SubmissionState) {
        debug!("Submission state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub async fn submit(&mut self, task_id: TaskId) -> SubmitResult<SubmissionReport> {
        let submission_id = Uuid::new_v4();
        info!(
            %submission_id,
            task_id,
            started_at = %Utc::now().to_rfc3339(),
            "Starting task submission"
        );
        self.state = SubmissionState::Init;

        let mut prepared = match self.prepare(task_id).await {
            Ok(prepared) => prepared,
            Err(e) => {
                self.transition(SubmissionState::Aborted);
                error!("Submission of task {} aborted: {}", task_id, e);
                return Err(e);
            }
        };

        self.transition(SubmissionState::Executing);
        let outcome = {
            let mut ctx = RunContext {
                engine: prepared.engine.as_mut(),
                scope: &mut prepared.scope,
                executor_config: &prepared.executor_config,
                resources: &prepared.resources,
            };
            match ExecutionMode::select(prepared.dialect) {
                ExecutionMode::Jar => {
                    let statements = split_statements(&prepared.source);
                    JarJobExecutor::new().run(&statements, &mut ctx).await
                }
                ExecutionMode::Pipeline => {
                    StatementPipelineExecutor::new(prepared.system.variables())
                        .run(&prepared.source, &mut ctx)
                        .await
                }
            }
        };

        let monitored = self
            .hand_off(outcome.as_ref().ok().and_then(ExecutionOutcome::handle), task_id)
            .await;
        let outcome = outcome?;
        monitored?;

        info!(
            %submission_id,
            task_id,
            finished_at = %Utc::now().to_rfc3339(),
            "Task submission finished in state {:?}",
            self.state
        );
        Ok(SubmissionReport {
            submission_id,
            task_id,
            state: self.state,
            outcome,
        })
    }

    async fn prepare(&mut self, task_id: TaskId) -> SubmitResult<Prepared> {
        let records = QueryBuilder::sys_config_list(&self.db)
            .await
            .map_err(|e| SubmitError::Configuration(format!("cannot load system settings: {}", e)))?;
        let system = SystemConfig::from_records(records)?;
        debug!("Loaded {} system settings", system.len());
        self.transition(SubmissionState::ConfigLoaded);

        let resources = ResourceResolver::new(ResourceManager::from_system_config(&system)?);

        let task = QueryBuilder::find_task(&self.db, task_id)
            .await
            .map_err(|e| SubmitError::Configuration(format!("cannot load task {}: {}", task_id, e)))?
            .ok_or(SubmitError::TaskNotFound(task_id))?;
        info!(
            "Submitting task {} `{}` ({:?}, {})",
            task.task_id, task.name, task.dialect, task.deploy_mode
        );

        let executor_config = ExecutorConfig::from_task(&task);
        let mut configuration =
            EngineConfiguration::load_cluster_file(&self.paths.cluster_config_file())?;
        executor_config.apply_to(&mut configuration);
        let mut engine = self
            .engines
            .build(&executor_config, configuration)
            .map_err(|e| SubmitError::Configuration(format!("cannot build engine: {}", e)))?;
        let mut scope = ScopeBuilder::new();
        self.transition(SubmissionState::ExecutorBuilt);

        let bundle = DependencyLoader::new(&system, &self.paths)?
            .stage(task_id, executor_config.deploy_mode)
            .await?;
        bundle.register(&mut scope, engine.as_mut());
        self.transition(SubmissionState::DependenciesStaged);

        let source = read_program_source(&self.paths.sql_file, &self.paths.conf_dir)?;

        Ok(Prepared {
            system,
            dialect: task.dialect,
            executor_config,
            engine,
            scope,
            resources,
            source,
        })
    }

    /// Pass the job to the monitor, or record that there is none.
    async fn hand_off(&mut self, handle: Option<&JobHandle>, task_id: TaskId) -> SubmitResult<()> {
        match handle {
            Some(handle) => {
                self.transition(SubmissionState::Monitored);
                self.monitor
                    .monitor(handle, task_id)
                    .await
                    .map_err(|e| SubmitError::Monitoring(e.to_string()))
            }
            None => {
                error!("Task {} produced no job, skipping monitoring", task_id);
                self.transition(SubmissionState::MonitorSkipped);
                Ok(())
            }
        }
    }
}
