use std::collections::BTreeMap;

use tracing::{debug, error, info};

use super::runner::RunnerTable;
use super::{ExecutionOutcome, RunContext};
use crate::error::SubmitResult;
use crate::statement::{split_statements, PlanOptions, StatementPlan};

/// Runs a SQL program statement by statement until one starts a job.
pub struct StatementPipelineExecutor {
    variables: BTreeMap<String, String>,
    runners: RunnerTable,
}

impl StatementPipelineExecutor {
    /// `variables` are the global fragment values available to `${name}`.
    pub fn new(variables: BTreeMap<String, String>) -> Self {
        Self {
            variables,
            runners: RunnerTable::new(),
        }
    }

    /// Statement failures end the run with [`ExecutionOutcome::Aborted`];
    /// only fatal errors are returned as `Err`.
    pub async fn run(&self, source: &str, ctx: &mut RunContext<'_>) -> SubmitResult<ExecutionOutcome> {
        let options = PlanOptions {
            use_fragments: ctx.executor_config.use_sql_fragment,
            use_statement_set: ctx.executor_config.use_statement_set,
            globals: &self.variables,
        };
        let plan = StatementPlan::build(split_statements(source), &options);

        for statement in plan.executable() {
            debug!("Running statement {} ({})", statement.ordinal, statement.kind);

            match self.runners.runner_for(statement.kind).run(statement, ctx).await {
                Ok(Some(handle)) => {
                    info!("Statement {} started job {}", statement.ordinal, handle.job_id);
                    return Ok(ExecutionOutcome::Submitted(handle));
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    let text = statement.display_text();
                    error!("Statement {} failed: {}\n{}", statement.ordinal, e, text);
                    return Ok(ExecutionOutcome::Aborted {
                        statement: text,
                        error: e,
                    });
                }
            }
        }

        Ok(ExecutionOutcome::NoJob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DeployMode, Dialect};
    use crate::error::SubmitError;
    use crate::executor::harness::{task, Harness};
    use crate::resource::{ResourceManager, ResourceResolver};

    #[tokio::test]
    async fn test_runs_in_order_and_stops_at_first_job() {
        let mut h = Harness::new(&task(Dialect::FlinkSql, DeployMode::Local));
        let source = "SET x=1;\nCREATE TABLE t (id INT);\nINSERT INTO t SELECT * FROM s;\nINSERT INTO u SELECT 1;";

        let outcome = StatementPipelineExecutor::new(BTreeMap::new())
            .run(source, &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(
            h.executed(),
            vec!["SET x=1", "CREATE TABLE t (id INT)", "INSERT INTO t SELECT * FROM s"]
        );
        assert_eq!(outcome.handle().map(|h| h.job_id.as_str()), Some("job-3"));
    }

    #[tokio::test]
    async fn test_statement_failure_is_absorbed() {
        let mut h = Harness::new(&task(Dialect::FlinkSql, DeployMode::Local));
        let source = "SET x=1; CREATE TABLE FAIL (id INT); INSERT INTO t SELECT 1;";

        let outcome = StatementPipelineExecutor::new(BTreeMap::new())
            .run(source, &mut h.ctx())
            .await
            .unwrap();

        match outcome {
            ExecutionOutcome::Aborted { statement, error } => {
                assert_eq!(statement, "CREATE TABLE FAIL (id INT)");
                assert!(matches!(error, SubmitError::StatementExecution(_)));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(h.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_propagates() {
        let mut h = Harness::new(&task(Dialect::FlinkSql, DeployMode::Local));
        h.resources = ResourceResolver::new(ResourceManager::Disabled);

        let err = StatementPipelineExecutor::new(BTreeMap::new())
            .run("ADD JAR 'rs:/udf.jar'; SELECT 1", &mut h.ctx())
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::ClassLoaderRegistration { .. }));
        assert!(h.executed().is_empty());
    }

    #[tokio::test]
    async fn test_statement_set_submits_once() {
        let mut t = task(Dialect::FlinkSql, DeployMode::Local);
        t.statement_set = true;
        let mut h = Harness::new(&t);
        let source = "CREATE TABLE a (id INT); INSERT INTO a SELECT 1; INSERT INTO b SELECT 2;";

        let outcome = StatementPipelineExecutor::new(BTreeMap::new())
            .run(source, &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(outcome.handle().map(|h| h.job_id.as_str()), Some("set-job"));
        assert_eq!(h.executed(), vec!["CREATE TABLE a (id INT)"]);
        assert_eq!(
            h.log.lock().unwrap().statement_sets,
            vec![vec![
                "INSERT INTO a SELECT 1".to_string(),
                "INSERT INTO b SELECT 2".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn test_fragments_use_global_variables() {
        let mut t = task(Dialect::FlinkSql, DeployMode::Local);
        t.fragment = true;
        let mut h = Harness::new(&t);
        let variables = BTreeMap::from([("db".to_string(), "warehouse".to_string())]);
        let source = "tbl := ${db}.orders; SELECT * FROM ${tbl}";

        StatementPipelineExecutor::new(variables)
            .run(source, &mut h.ctx())
            .await
            .unwrap();

        assert_eq!(h.executed(), vec!["SELECT * FROM warehouse.orders"]);
    }

    #[tokio::test]
    async fn test_program_without_job_is_no_job() {
        let mut h = Harness::new(&task(Dialect::FlinkSql, DeployMode::Local));
        let outcome = StatementPipelineExecutor::new(BTreeMap::new())
            .run("CREATE TABLE t (id INT);", &mut h.ctx())
            .await
            .unwrap();
        assert!(matches!(outcome, ExecutionOutcome::NoJob));
    }
}
