pub mod classpath;
pub mod config;
pub mod db;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod executor;
pub mod monitor;
pub mod resource;
pub mod source;
pub mod statement;
pub mod submitter;
pub mod types;

// Re-export key types and functions
pub use config::{AppParams, ExecutorConfig, SubmitterConfig, SystemConfig};
pub use db::{create_connection, ensure_schema, DatabaseConfig, Fixture};
pub use engine::{Engine, EngineFactory, JobHandle, RestEngineFactory};
pub use error::{SubmitError, SubmitResult};
pub use executor::ExecutionOutcome;
pub use monitor::{JobMonitor, LogMonitor};
pub use submitter::{SubmissionReport, SubmissionState, Submitter};
pub use types::{JobId, JobName, TaskId};

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

/// Connect to the store, optionally seed it, and submit one task.
pub async fn submit_task(
    db_config: DatabaseConfig,
    fixture: Option<&Path>,
    paths: SubmitterConfig,
    engines: Arc<dyn EngineFactory>,
    monitor: Arc<dyn JobMonitor>,
    task_id: TaskId,
) -> Result<SubmissionReport> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;
    if let Some(path) = fixture {
        Fixture::load(path)?.apply(&db).await?;
    }

    let mut submitter = Submitter::new(db, paths, engines, monitor);
    Ok(submitter.submit(task_id).await?)
}
