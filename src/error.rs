//! Error taxonomy for a single task submission.
//!
//! Every variant except [`SubmitError::StatementExecution`] is fatal: it
//! aborts the submission and propagates to the process boundary. Statement
//! failures are absorbed by the pipeline executor and reported through
//! [`crate::executor::ExecutionOutcome::Aborted`] instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskId;

/// Errors that can occur while submitting a task.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// System configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No task with the requested id exists in the store.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// The program source could not be found at either candidate path.
    #[error(
        "sql file not found, tried {} and {}",
        .direct.display(),
        .in_conf_dir.display()
    )]
    SqlFileNotFound {
        direct: PathBuf,
        in_conf_dir: PathBuf,
    },

    /// Downloading or unpacking the task's dependency bundle failed.
    #[error("failed to stage dependencies from {url}: {reason}")]
    DependencyFetch { url: String, reason: String },

    /// A single statement failed to execute.
    #[error("statement execution failed: {0}")]
    StatementExecution(String),

    /// A dependency reference could not be turned into a scope entry.
    #[error("cannot register `{reference}` into the dependency scope: {reason}")]
    ClassLoaderRegistration { reference: String, reason: String },

    /// The monitoring collaborator rejected the job handle.
    #[error("job monitoring failed: {0}")]
    Monitoring(String),
}

/// Result type for submission operations.
pub type SubmitResult<T> = Result<T, SubmitError>;

impl SubmitError {
    /// Returns `true` if the error must abort the whole submission.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::StatementExecution(_))
    }

    /// Wrap any displayable failure as a statement execution error.
    pub fn statement(err: impl std::fmt::Display) -> Self {
        Self::StatementExecution(err.to_string())
    }

    pub fn registration(reference: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ClassLoaderRegistration {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }

    pub fn dependency_fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::DependencyFetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
