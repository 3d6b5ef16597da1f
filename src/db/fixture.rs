//! JSON seed files for the store.
//!
//! An in-memory database starts empty, so local runs and tests describe the
//! system settings and tasks they need in a small JSON document:
//!
//! ```json
//! {
//!   "sys_config": { "service.address": "http://platform:8888" },
//!   "tasks": [ { "task_id": 1, "name": "demo", "dialect": "FlinkSql", "deploy_mode": "local" } ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::db::{Db, QueryBuilder, TaskRecord};

#[derive(Debug, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub sys_config: BTreeMap<String, String>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read fixture {}", path.display()))?;
        let fixture = serde_json::from_str(&raw)
            .with_context(|| format!("invalid fixture {}", path.display()))?;
        Ok(fixture)
    }

    /// Write every setting and task into the store.
    pub async fn apply(&self, db: &Db) -> Result<()> {
        for (name, value) in &self.sys_config {
            QueryBuilder::upsert_sys_config(db, name, value).await?;
        }
        for task in &self.tasks {
            QueryBuilder::upsert_task(db, task).await?;
        }

        info!(
            "Seeded store with {} settings and {} tasks",
            self.sys_config.len(),
            self.tasks.len()
        );
        Ok(())
    }
}
