use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::engine::JobHandle;
use crate::types::TaskId;

/// Receives the handle of a submitted job. Called at most once per
/// submission, and only when a job was actually started.
#[async_trait]
pub trait JobMonitor: Send + Sync {
    async fn monitor(&self, handle: &JobHandle, task_id: TaskId) -> Result<()>;
}

/// Records the hand-off in the log; the platform picks jobs up from there.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMonitor;

#[async_trait]
impl JobMonitor for LogMonitor {
    async fn monitor(&self, handle: &JobHandle, task_id: TaskId) -> Result<()> {
        info!(
            task_id,
            job_id = %handle.job_id,
            job_name = handle.job_name.as_ref().map(|n| n.as_str()).unwrap_or(""),
            "Job handed off for monitoring"
        );
        Ok(())
    }
}

#[cfg(test)]
pub use recording::RecordingMonitor;
