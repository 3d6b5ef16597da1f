use tracing::{debug, info};

use super::runner::{register_added, submit_jar_program};
use super::{ExecutionOutcome, RunContext};
use crate::engine::Engine;
use crate::error::SubmitResult;
use crate::statement::{classify, StatementKind};

/// Runs a jar program: `ADD JAR` / `ADD FILE` statements build the scope, the
/// first `EXECUTE JAR` launches the program and ends the run.
#[derive(Debug, Default)]
pub struct JarJobExecutor;

impl JarJobExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        &self,
        statements: &[String],
        ctx: &mut RunContext<'_>,
    ) -> SubmitResult<ExecutionOutcome> {
        // Cluster-native jobs only see what is shipped through the runtime
        // jar registry, files included.
        let attach = ctx.executor_config.deploy_mode.is_cluster_native();

        for (index, text) in statements.iter().enumerate() {
            match classify(text) {
                kind @ (StatementKind::Add | StatementKind::AddFile) => {
                    let urls = register_added(kind, text, ctx, false)?;
                    if attach {
                        ctx.engine.add_jars(&urls);
                    }
                }
                StatementKind::ExecuteJar => {
                    let handle = submit_jar_program(text, ctx).await?;
                    info!(
                        "Jar program started job {} at statement {}",
                        handle.job_id,
                        index + 1
                    );
                    return Ok(ExecutionOutcome::Submitted(handle));
                }
                StatementKind::Standard => {
                    debug!("Skipping statement {} in jar program: {}", index + 1, text);
                }
            }
        }

        info!("Jar program contains no EXECUTE JAR statement");
        Ok(ExecutionOutcome::NoJob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DeployMode, Dialect};
    use crate::engine::configuration::PYTHON_FILES;
    use crate::error::SubmitError;
    use crate::executor::harness::{task, Harness};

    fn program(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_execute_jar_submits_and_stops() {
        let mut h = Harness::new(&task(Dialect::FlinkJar, DeployMode::Local));
        let statements = program(&[
            "ADD JAR '/opt/udf.jar'",
            "EXECUTE JAR WITH ('uri'='/opt/app.jar', 'main-class'='First')",
            "EXECUTE JAR WITH ('uri'='/opt/app.jar', 'main-class'='Second')",
        ]);

        let outcome = JarJobExecutor::new().run(&statements, &mut h.ctx()).await.unwrap();

        assert_eq!(outcome.handle().map(|h| h.job_id.as_str()), Some("jar-job"));
        let log = h.log.lock().unwrap();
        assert_eq!(log.compiled.len(), 1);
        assert_eq!(log.compiled[0].0.main_class.as_deref(), Some("First"));
        assert_eq!(log.compiled[0].1.len(), 1);
    }

    #[tokio::test]
    async fn test_without_execute_jar_is_no_job() {
        let mut h = Harness::new(&task(Dialect::FlinkJar, DeployMode::Local));
        let statements = program(&["ADD JAR '/opt/udf.jar'", "SET 'a' = 'b'"]);

        let outcome = JarJobExecutor::new().run(&statements, &mut h.ctx()).await.unwrap();

        assert!(matches!(outcome, ExecutionOutcome::NoJob));
        assert!(h.executed().is_empty());
    }

    #[tokio::test]
    async fn test_registry_only_touched_when_cluster_native() {
        let statements = program(&["ADD JAR '/opt/udf.jar'"]);

        let mut local = Harness::new(&task(Dialect::FlinkJar, DeployMode::YarnPerJob));
        JarJobExecutor::new().run(&statements, &mut local.ctx()).await.unwrap();
        assert!(local.engine.configuration().pipeline_jars().is_empty());
        assert_eq!(local.scope.scope().jars().len(), 1);

        let mut native = Harness::new(&task(Dialect::FlinkJar, DeployMode::KubernetesApplication));
        JarJobExecutor::new().run(&statements, &mut native.ctx()).await.unwrap();
        assert_eq!(
            native.engine.configuration().pipeline_jars(),
            vec!["file:///opt/udf.jar"]
        );
    }

    #[tokio::test]
    async fn test_add_file_ships_as_runtime_jar_when_cluster_native() {
        let statements = program(&["ADD FILE '/opt/extra/conf.jar'"]);

        let mut native = Harness::new(&task(Dialect::FlinkJar, DeployMode::KubernetesApplication));
        JarJobExecutor::new().run(&statements, &mut native.ctx()).await.unwrap();
        assert_eq!(
            native.engine.configuration().pipeline_jars(),
            vec!["file:///opt/extra/conf.jar"]
        );
        assert_eq!(native.engine.configuration().get(PYTHON_FILES), None);
        assert_eq!(native.scope.scope().files().len(), 1);

        let mut session = Harness::new(&task(Dialect::FlinkJar, DeployMode::YarnSession));
        JarJobExecutor::new().run(&statements, &mut session.ctx()).await.unwrap();
        assert!(session.engine.configuration().pipeline_jars().is_empty());
        assert_eq!(session.scope.scope().files().len(), 1);
    }

    #[tokio::test]
    async fn test_compile_failure_propagates() {
        let mut h = Harness::new(&task(Dialect::FlinkJar, DeployMode::Local));
        let statements = program(&["EXECUTE JAR(FAIL)"]);

        let err = JarJobExecutor::new()
            .run(&statements, &mut h.ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::StatementExecution(_)));
    }
}
