//! In-process engine that records every call, for tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use url::Url;

use super::configuration::RUNTIME_MODE;
use super::{Engine, EngineConfiguration, EngineFactory, JobHandle, Pipeline, PipelineKind};
use crate::config::ExecutorConfig;
use crate::statement::JarProgram;

#[derive(Debug, Default)]
pub struct EngineLog {
    pub built: Option<EngineConfiguration>,
    pub statements: Vec<String>,
    pub statement_sets: Vec<Vec<String>>,
    pub compiled: Vec<(JarProgram, Vec<Url>)>,
    pub submitted: Vec<Pipeline>,
}

pub type SharedLog = Arc<Mutex<EngineLog>>;

/// Statements starting with INSERT or SELECT start a job; any statement
/// containing `FAIL` is rejected.
pub struct RecordingEngine {
    configuration: EngineConfiguration,
    log: SharedLog,
}

impl RecordingEngine {
    pub fn new(configuration: EngineConfiguration, log: SharedLog) -> Self {
        Self { configuration, log }
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    fn configuration(&self) -> &EngineConfiguration {
        &self.configuration
    }

    fn configuration_mut(&mut self) -> &mut EngineConfiguration {
        &mut self.configuration
    }

    async fn execute_statement(&mut self, statement: &str) -> Result<Option<JobHandle>> {
        self.log.lock().unwrap().statements.push(statement.to_string());
        if statement.contains("FAIL") {
            bail!("rejected: {}", statement);
        }

        let upper = statement.trim_start().to_ascii_uppercase();
        if upper.starts_with("INSERT") || upper.starts_with("SELECT") {
            let n = self.log.lock().unwrap().statements.len();
            return Ok(Some(JobHandle::new(format!("job-{}", n))));
        }
        Ok(None)
    }

    async fn execute_statement_set(&mut self, inserts: &[String]) -> Result<Option<JobHandle>> {
        self.log.lock().unwrap().statement_sets.push(inserts.to_vec());
        Ok(Some(JobHandle::new("set-job")))
    }

    async fn compile_program(&mut self, program: &JarProgram, classpath: &[Url]) -> Result<Pipeline> {
        self.log
            .lock()
            .unwrap()
            .compiled
            .push((program.clone(), classpath.to_vec()));
        if program.main_class.as_deref() == Some("FAIL") {
            bail!("cannot compile {:?}", program.main_class);
        }

        let kind = match self.configuration.get(RUNTIME_MODE) {
            Some(mode) if mode.eq_ignore_ascii_case("batch") => PipelineKind::Batch,
            _ => PipelineKind::Streaming,
        };
        Ok(Pipeline::new(kind, program.clone(), classpath.to_vec()))
    }

    async fn submit_pipeline(&mut self, pipeline: Pipeline) -> Result<JobHandle> {
        let name = pipeline.job_name.clone();
        self.log.lock().unwrap().submitted.push(pipeline);
        let handle = JobHandle::new("jar-job");
        Ok(match name {
            Some(name) => handle.with_name(name),
            None => handle,
        })
    }
}

#[derive(Default)]
pub struct RecordingFactory {
    pub log: SharedLog,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> SharedLog {
        Arc::clone(&self.log)
    }
}

impl EngineFactory for RecordingFactory {
    fn build(
        &self,
        _executor_config: &ExecutorConfig,
        configuration: EngineConfiguration,
    ) -> Result<Box<dyn Engine>> {
        self.log.lock().unwrap().built = Some(configuration.clone());
        Ok(Box::new(RecordingEngine::new(configuration, self.log())))
    }
}
