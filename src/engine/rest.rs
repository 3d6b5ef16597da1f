//! Engine backed by the cluster's HTTP interfaces.
//!
//! SQL statements go through a SQL Gateway session; external programs are
//! uploaded and started through the cluster REST API.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::configuration::{CHECKPOINT_INTERVAL, PIPELINE_NAME, RUNTIME_MODE};
use super::{Engine, EngineConfiguration, EngineFactory, JobHandle, Pipeline, PipelineKind};
use crate::config::ExecutorConfig;
use crate::statement::JarProgram;
use crate::types::JobName;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionRequest<'a> {
    session_name: &'a str,
    properties: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionResponse {
    session_handle: String,
}

#[derive(Debug, Serialize)]
struct ExecuteStatementRequest<'a> {
    statement: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteStatementResponse {
    operation_handle: String,
}

#[derive(Debug, Deserialize)]
struct OperationStatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct FetchResultsResponse {
    #[serde(rename = "jobID", default)]
    job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JarUploadResponse {
    filename: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JarRunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    entry_class: Option<String>,
    program_args_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallelism: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    savepoint_path: Option<String>,
    allow_non_restored_state: bool,
    flink_configuration: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct JarRunResponse {
    jobid: String,
}

pub struct RestEngineFactory {
    client: Client,
    gateway_url: String,
    rest_url: String,
    poll_interval: Duration,
}

impl RestEngineFactory {
    pub fn new(gateway_url: &str, rest_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sqljob-submitter/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            rest_url: rest_url.trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

}

impl EngineFactory for RestEngineFactory {
    fn build(
        &self,
        executor_config: &ExecutorConfig,
        configuration: EngineConfiguration,
    ) -> Result<Box<dyn Engine>> {
        Ok(Box::new(RestEngine {
            client: self.client.clone(),
            gateway_url: self.gateway_url.clone(),
            rest_url: self.rest_url.clone(),
            poll_interval: self.poll_interval,
            job_name: executor_config.job_name.clone(),
            configuration,
            session: None,
            synced: BTreeMap::new(),
        }))
    }
}

pub struct RestEngine {
    client: Client,
    gateway_url: String,
    rest_url: String,
    poll_interval: Duration,
    job_name: JobName,
    configuration: EngineConfiguration,
    session: Option<String>,
    /// Configuration the open session has already seen.
    synced: BTreeMap<String, String>,
}

impl RestEngine {
    async fn session(&mut self) -> Result<String> {
        if let Some(handle) = &self.session {
            return Ok(handle.clone());
        }

        let request = OpenSessionRequest {
            session_name: self.job_name.as_str(),
            properties: self.configuration.entries(),
        };
        let response: OpenSessionResponse = self
            .client
            .post(format!("{}/v1/sessions", self.gateway_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("Opened gateway session {}", response.session_handle);
        self.mark_session_open(&response.session_handle);
        Ok(response.session_handle)
    }

    fn mark_session_open(&mut self, handle: &str) {
        self.session = Some(handle.to_string());
        self.synced = self.configuration.entries().clone();
    }

    /// Entries added or changed since the session last saw the configuration.
    fn pending_settings(&self) -> Vec<(String, String)> {
        self.configuration
            .entries()
            .iter()
            .filter(|(key, value)| self.synced.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Push `ADD JAR` / `ADD FILE` and other late changes into the session
    /// before the next statement runs.
    async fn sync_session(&mut self, session: &str) -> Result<()> {
        for (key, value) in self.pending_settings() {
            self.run_operation(session, &set_statement(&key, &value)).await?;
            debug!("Pushed {} to gateway session {}", key, session);
            self.synced.insert(key, value);
        }
        Ok(())
    }

    async fn run_on_gateway(&mut self, statement: &str) -> Result<Option<JobHandle>> {
        let session = self.session().await?;
        self.sync_session(&session).await?;
        self.run_operation(&session, statement).await
    }

    async fn run_operation(&self, session: &str, statement: &str) -> Result<Option<JobHandle>> {
        let base = format!("{}/v1/sessions/{}", self.gateway_url, session);

        let operation: ExecuteStatementResponse = self
            .client
            .post(format!("{}/statements", base))
            .json(&ExecuteStatementRequest { statement })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let operation_url = format!("{}/operations/{}", base, operation.operation_handle);

        loop {
            let status: OperationStatusResponse = self
                .client
                .get(format!("{}/status", operation_url))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match status.status.as_str() {
                "FINISHED" => break,
                "INITIALIZED" | "PENDING" | "RUNNING" => {
                    tokio::time::sleep(self.poll_interval).await
                }
                other => {
                    let detail = self
                        .client
                        .get(format!("{}/result/0", operation_url))
                        .send()
                        .await?
                        .text()
                        .await
                        .unwrap_or_default();
                    bail!("operation ended in state {}: {}", other, detail);
                }
            }
        }

        let results: FetchResultsResponse = self
            .client
            .get(format!("{}/result/0", operation_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(results.job_id.map(|id| JobHandle::new(id).with_name(self.job_name.clone())))
    }

    async fn read_artifact(&self, location: &Url) -> Result<Vec<u8>> {
        match location.scheme() {
            "file" => {
                let path = location
                    .to_file_path()
                    .map_err(|()| anyhow!("invalid file URL {}", location))?;
                tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("cannot read {}", path.display()))
            }
            "http" | "https" => Ok(self
                .client
                .get(location.as_str())
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?
                .to_vec()),
            other => bail!("unsupported program location scheme `{}`", other),
        }
    }

    async fn upload_jar(&self, location: &Url) -> Result<String> {
        let bytes = self.read_artifact(location).await?;
        let file_name = location
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .unwrap_or("program.jar")
            .to_string();

        let form = reqwest::multipart::Form::new().part(
            "jarfile",
            reqwest::multipart::Part::bytes(bytes)
                .file_name(file_name)
                .mime_str("application/x-java-archive")?,
        );

        let uploaded: JarUploadResponse = self
            .client
            .post(format!("{}/jars/upload", self.rest_url))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        jar_id_from_filename(&uploaded.filename)
    }
}

fn jar_id_from_filename(filename: &str) -> Result<String> {
    filename
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("upload response has no jar id: {}", filename))
}

fn set_statement(key: &str, value: &str) -> String {
    format!(
        "SET '{}' = '{}'",
        key.replace('\'', "''"),
        value.replace('\'', "''")
    )
}

fn statement_set_sql(inserts: &[String]) -> String {
    let mut sql = String::from("EXECUTE STATEMENT SET\nBEGIN\n");
    for insert in inserts {
        sql.push_str(insert);
        sql.push_str(";\n");
    }
    sql.push_str("END");
    sql
}

fn run_request(pipeline: &Pipeline, configuration: &EngineConfiguration) -> JarRunRequest {
    let mut flink_configuration = configuration.entries().clone();
    if let Some(ms) = pipeline.checkpoint_interval {
        flink_configuration.insert(CHECKPOINT_INTERVAL.to_string(), format!("{}ms", ms));
    }
    if let Some(name) = &pipeline.job_name {
        flink_configuration.insert(PIPELINE_NAME.to_string(), name.to_string());
    }

    JarRunRequest {
        entry_class: pipeline.program.main_class.clone(),
        program_args_list: pipeline.program.args.clone(),
        parallelism: pipeline.parallelism,
        savepoint_path: pipeline.savepoint.as_ref().map(|s| s.path.clone()),
        allow_non_restored_state: pipeline
            .savepoint
            .as_ref()
            .is_some_and(|s| s.allow_non_restored_state),
        flink_configuration,
    }
}

#[async_trait]
impl Engine for RestEngine {
    fn configuration(&self) -> &EngineConfiguration {
        &self.configuration
    }

    fn configuration_mut(&mut self) -> &mut EngineConfiguration {
        &mut self.configuration
    }

    async fn execute_statement(&mut self, statement: &str) -> Result<Option<JobHandle>> {
        self.run_on_gateway(statement).await
    }

    async fn execute_statement_set(&mut self, inserts: &[String]) -> Result<Option<JobHandle>> {
        self.run_on_gateway(&statement_set_sql(inserts)).await
    }

    async fn compile_program(&mut self, program: &JarProgram, classpath: &[Url]) -> Result<Pipeline> {
        let location = match &program.uri {
            Some(uri) => crate::classpath::to_url(uri)?,
            None => classpath
                .first()
                .cloned()
                .ok_or_else(|| anyhow!("EXECUTE JAR without 'uri' needs a jar in scope"))?,
        };

        let jar_id = self.upload_jar(&location).await?;
        info!("Uploaded program {} as {}", location, jar_id);

        let kind = match self.configuration.get(RUNTIME_MODE) {
            Some(mode) if mode.eq_ignore_ascii_case("batch") => PipelineKind::Batch,
            _ => PipelineKind::Streaming,
        };

        let mut pipeline = Pipeline::new(kind, program.clone(), classpath.to_vec());
        pipeline.artifact = Some(jar_id);
        Ok(pipeline)
    }

    async fn submit_pipeline(&mut self, pipeline: Pipeline) -> Result<JobHandle> {
        let jar_id = pipeline
            .artifact
            .clone()
            .ok_or_else(|| anyhow!("pipeline was not compiled by this engine"))?;
        let request = run_request(&pipeline, &self.configuration);

        let response: JarRunResponse = self
            .client
            .post(format!("{}/jars/{}/run", self.rest_url, jar_id))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let name = pipeline.job_name.unwrap_or_else(|| self.job_name.clone());
        Ok(JobHandle::new(response.jobid).with_name(name))
    }
}
