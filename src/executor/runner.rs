//! Per-kind statement runners and the dispatch table.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use super::RunContext;
use crate::classpath::to_url;
use crate::config::ExecutorConfig;
use crate::engine::configuration::{EngineConfiguration, PYTHON_FILES, SAVEPOINT_IGNORE_UNCLAIMED};
use crate::engine::{JobHandle, Pipeline, PipelineKind, SavepointRestore};
use crate::error::{SubmitError, SubmitResult};
use crate::statement::{
    parse_add_file, parse_add_jar, parse_execute_jar, Executable, PlannedStatement, StatementKind,
};

/// Runs one planned statement. A returned handle means a job was started.
#[async_trait]
pub trait StatementRunner: Send + Sync {
    fn kind(&self) -> StatementKind;

    async fn run(
        &self,
        statement: &PlannedStatement,
        ctx: &mut RunContext<'_>,
    ) -> SubmitResult<Option<JobHandle>>;
}

#[derive(Default)]
pub struct AddJarRunner;

#[async_trait]
impl StatementRunner for AddJarRunner {
    fn kind(&self) -> StatementKind {
        StatementKind::Add
    }

    async fn run(
        &self,
        statement: &PlannedStatement,
        ctx: &mut RunContext<'_>,
    ) -> SubmitResult<Option<JobHandle>> {
        register_added(StatementKind::Add, &statement.display_text(), ctx, true)?;
        Ok(None)
    }
}

#[derive(Default)]
pub struct AddFileRunner;

#[async_trait]
impl StatementRunner for AddFileRunner {
    fn kind(&self) -> StatementKind {
        StatementKind::AddFile
    }

    async fn run(
        &self,
        statement: &PlannedStatement,
        ctx: &mut RunContext<'_>,
    ) -> SubmitResult<Option<JobHandle>> {
        register_added(StatementKind::AddFile, &statement.display_text(), ctx, true)?;
        Ok(None)
    }
}

#[derive(Default)]
pub struct ExecuteJarRunner;

#[async_trait]
impl StatementRunner for ExecuteJarRunner {
    fn kind(&self) -> StatementKind {
        StatementKind::ExecuteJar
    }

    async fn run(
        &self,
        statement: &PlannedStatement,
        ctx: &mut RunContext<'_>,
    ) -> SubmitResult<Option<JobHandle>> {
        submit_jar_program(&statement.display_text(), ctx).await.map(Some)
    }
}

/// Plain SQL and statement sets, executed by the engine.
#[derive(Default)]
pub struct StandardRunner;

#[async_trait]
impl StatementRunner for StandardRunner {
    fn kind(&self) -> StatementKind {
        StatementKind::Standard
    }

    async fn run(
        &self,
        statement: &PlannedStatement,
        ctx: &mut RunContext<'_>,
    ) -> SubmitResult<Option<JobHandle>> {
        let result = match &statement.executable {
            Executable::Sql(text) => ctx.engine.execute_statement(text).await,
            Executable::StatementSet(inserts) => ctx.engine.execute_statement_set(inserts).await,
        };
        result.map_err(SubmitError::statement)
    }
}

/// Maps every statement kind to its runner.
#[derive(Default)]
pub struct RunnerTable {
    add: AddJarRunner,
    add_file: AddFileRunner,
    execute_jar: ExecuteJarRunner,
    standard: StandardRunner,
}

impl RunnerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runner_for(&self, kind: StatementKind) -> &dyn StatementRunner {
        match kind {
            StatementKind::Add => &self.add,
            StatementKind::AddFile => &self.add_file,
            StatementKind::ExecuteJar => &self.execute_jar,
            StatementKind::Standard => &self.standard,
        }
    }
}

/// Register the paths of an `ADD JAR` / `ADD FILE` statement into the scope
/// and return their URLs. With `attach`, jars go to `pipeline.jars` and files
/// to `python.files`.
pub(crate) fn register_added(
    kind: StatementKind,
    text: &str,
    ctx: &mut RunContext<'_>,
    attach: bool,
) -> SubmitResult<Vec<Url>> {
    let references = match kind {
        StatementKind::AddFile => parse_add_file(text)?,
        _ => parse_add_jar(text)?,
    };

    let mut urls = Vec::with_capacity(references.len());
    for reference in references {
        let resolved = ctx.resources.resolve(&reference)?;
        urls.push(to_url(&resolved)?);
    }

    if kind == StatementKind::AddFile {
        for url in &urls {
            ctx.scope.register_file(url.clone());
        }
        if attach {
            let merged = merge_python_files(ctx.engine.configuration(), &urls);
            ctx.engine.set_configuration(PYTHON_FILES, merged);
        }
    } else {
        for url in &urls {
            ctx.scope.register_jar(url.clone());
        }
        if attach {
            ctx.engine.add_jars(&urls);
        }
    }

    debug!("Registered {} {} reference(s)", urls.len(), kind);
    Ok(urls)
}

fn merge_python_files(conf: &EngineConfiguration, urls: &[Url]) -> String {
    let mut files: Vec<String> = conf
        .get(PYTHON_FILES)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    for url in urls {
        if !files.iter().any(|f| f == url.as_str()) {
            files.push(url.to_string());
        }
    }
    files.join(",")
}

/// Parse, compile and submit an `EXECUTE JAR` program.
pub(crate) async fn submit_jar_program(
    text: &str,
    ctx: &mut RunContext<'_>,
) -> SubmitResult<JobHandle> {
    let mut program = parse_execute_jar(text)?;
    if let Some(uri) = &program.uri {
        program.uri = Some(ctx.resources.resolve(uri)?);
    }

    let mut classpath: Vec<Url> = Vec::new();
    for jar in ctx.engine.configuration().pipeline_jars() {
        match Url::parse(&jar) {
            Ok(url) if !classpath.contains(&url) => classpath.push(url),
            Ok(_) => {}
            Err(e) => warn!("Skipping malformed pipeline jar `{}`: {}", jar, e),
        }
    }
    for url in ctx.scope.scope().jars() {
        if !classpath.contains(url) {
            classpath.push(url.clone());
        }
    }

    let pipeline = ctx
        .engine
        .compile_program(&program, &classpath)
        .await
        .map_err(SubmitError::statement)?;
    let pipeline = apply_runtime_settings(
        pipeline,
        ctx.executor_config,
        ctx.engine.configuration(),
        program.allow_non_restored_state,
    );

    let handle = ctx
        .engine
        .submit_pipeline(pipeline)
        .await
        .map_err(SubmitError::statement)?;
    info!("Submitted jar program as job {}", handle.job_id);
    Ok(handle)
}

/// Copy task settings onto a compiled pipeline. Checkpointing and savepoint
/// restore only apply to streaming pipelines.
pub(crate) fn apply_runtime_settings(
    mut pipeline: Pipeline,
    config: &ExecutorConfig,
    conf: &EngineConfiguration,
    allow_non_restored_state: bool,
) -> Pipeline {
    pipeline.job_name = Some(config.job_name.clone());
    pipeline.parallelism = config.parallelism;

    match pipeline.kind {
        PipelineKind::Streaming => {
            pipeline.checkpoint_interval = config.checkpoint.filter(|ms| *ms > 0);
            pipeline.savepoint = config.savepoint_path.as_ref().map(|path| SavepointRestore {
                path: path.clone(),
                allow_non_restored_state: allow_non_restored_state
                    || conf.get_bool(SAVEPOINT_IGNORE_UNCLAIMED),
            });
        }
        PipelineKind::Batch => {
            pipeline.checkpoint_interval = None;
            pipeline.savepoint = None;
        }
    }

    pipeline
}
