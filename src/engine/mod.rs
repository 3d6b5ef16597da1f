//! The compute engine seam.
//!
//! The submitter never talks to a cluster directly. It drives an [`Engine`]
//! built by an [`EngineFactory`] from the layered configuration; the REST
//! implementation lives in [`rest`].

use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use crate::config::ExecutorConfig;
use crate::statement::JarProgram;
use crate::types::{JobId, JobName};

pub mod configuration;
#[cfg(test)]
pub mod recording;
pub mod rest;

pub use configuration::EngineConfiguration;
pub use rest::{RestEngine, RestEngineFactory};

/// Identifies a submitted job for the monitoring hand-off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub job_name: Option<JobName>,
}

impl JobHandle {
    pub fn new(job_id: impl Into<JobId>) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: None,
        }
    }

    pub fn with_name(mut self, name: JobName) -> Self {
        self.job_name = Some(name);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Streaming,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavepointRestore {
    pub path: String,
    pub allow_non_restored_state: bool,
}

/// A compiled external program, ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub kind: PipelineKind,
    pub program: JarProgram,
    pub classpath: Vec<Url>,
    /// Engine-side artifact id (e.g. an uploaded jar), if compilation produced one.
    pub artifact: Option<String>,
    pub job_name: Option<JobName>,
    pub parallelism: Option<i32>,
    /// Checkpoint interval in milliseconds.
    pub checkpoint_interval: Option<i64>,
    pub savepoint: Option<SavepointRestore>,
}

impl Pipeline {
    pub fn new(kind: PipelineKind, program: JarProgram, classpath: Vec<Url>) -> Self {
        Self {
            kind,
            program,
            classpath,
            artifact: None,
            job_name: None,
            parallelism: None,
            checkpoint_interval: None,
            savepoint: None,
        }
    }
}

#[async_trait]
pub trait Engine: Send {
    fn configuration(&self) -> &EngineConfiguration;

    fn configuration_mut(&mut self) -> &mut EngineConfiguration;

    fn set_configuration(&mut self, key: &str, value: String) {
        self.configuration_mut().set(key, value);
    }

    /// Add jars to the runtime jar registry shipped with every job.
    fn add_jars(&mut self, jars: &[Url]) {
        self.configuration_mut()
            .add_pipeline_jars(jars.iter().map(Url::to_string));
    }

    /// Run one statement. Returns a handle if it started a job.
    async fn execute_statement(&mut self, statement: &str) -> Result<Option<JobHandle>>;

    /// Run INSERT statements as a single job.
    async fn execute_statement_set(&mut self, inserts: &[String]) -> Result<Option<JobHandle>>;

    async fn compile_program(&mut self, program: &JarProgram, classpath: &[Url]) -> Result<Pipeline>;

    async fn submit_pipeline(&mut self, pipeline: Pipeline) -> Result<JobHandle>;
}

pub trait EngineFactory: Send + Sync {
    fn build(
        &self,
        executor_config: &ExecutorConfig,
        configuration: EngineConfiguration,
    ) -> Result<Box<dyn Engine>>;
}
