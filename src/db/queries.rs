// Database query helpers for SurrealDB.
//
// Records are keyed by their natural identifiers (setting name, task id) so
// that every write is an idempotent UPSERT.

use crate::db::schema::*;
use crate::types::TaskId;
use anyhow::{anyhow, Result};
use surrealdb::{engine::any::Any, Surreal};

pub struct QueryBuilder;

impl QueryBuilder {
    /// Load every persisted system setting.
    pub async fn sys_config_list(db: &Surreal<Any>) -> Result<Vec<SysConfigRecord>> {
        let mut res = db
            .query("SELECT name, value FROM sys_config ORDER BY name")
            .await?;

        let rows: Vec<SysConfigRecord> = res.take(0)?;
        Ok(rows)
    }

    /// Insert or overwrite a single system setting.
    pub async fn upsert_sys_config(
        db: &Surreal<Any>,
        name: &str,
        value: &str,
    ) -> Result<SysConfigRecord> {
        let mut res = db
            .query(
                r#"
                UPSERT type::thing('sys_config', $name) SET
                    name = $name,
                    value = $value
                RETURN name, value
                "#,
            )
            .bind(("name", name.to_string()))
            .bind(("value", value.to_string()))
            .await?;

        let stored: Option<SysConfigRecord> = res.take(0)?;
        stored.ok_or_else(|| anyhow!("failed to upsert sys_config `{}`", name))
    }

    /// Find a task by its numeric id.
    pub async fn find_task(db: &Surreal<Any>, task_id: TaskId) -> Result<Option<TaskRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * OMIT id FROM task
                WHERE task_id = $task_id
                LIMIT 1
                "#,
            )
            .bind(("task_id", task_id))
            .await?;

        let task: Option<TaskRecord> = res.take(0)?;
        Ok(task)
    }

    /// Insert or overwrite a task keyed by its numeric id.
    pub async fn upsert_task(db: &Surreal<Any>, task: &TaskRecord) -> Result<()> {
        db.query("UPSERT type::thing('task', $task_id) CONTENT $data")
            .bind(("task_id", task.task_id))
            .bind(("data", task.clone()))
            .await?
            .check()?;

        Ok(())
    }
}
