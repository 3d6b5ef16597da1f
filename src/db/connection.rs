use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("SURREALDB_URL")
                .unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("SURREALDB_NAMESPACE")
                .unwrap_or_else(|_| "platform".to_string()),
            database: env::var("SURREALDB_DATABASE")
                .unwrap_or_else(|_| "submitter".to_string()),
            username: env::var("SURREALDB_USERNAME").ok(),
            password: env::var("SURREALDB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = vec![
        // Process-wide system settings, one row per key
        "DEFINE TABLE IF NOT EXISTS sys_config SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS name ON TABLE sys_config TYPE string;
         DEFINE FIELD IF NOT EXISTS value ON TABLE sys_config TYPE string;
         DEFINE FIELD IF NOT EXISTS updated_at ON TABLE sys_config VALUE time::now();",

        // Submittable tasks; config_json is free-form so the table stays schemaless
        "DEFINE TABLE IF NOT EXISTS task SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS task_id ON TABLE task TYPE int;
         DEFINE FIELD IF NOT EXISTS name ON TABLE task TYPE string;
         DEFINE FIELD IF NOT EXISTS dialect ON TABLE task TYPE string;
         DEFINE FIELD IF NOT EXISTS deploy_mode ON TABLE task TYPE string;
         DEFINE FIELD IF NOT EXISTS checkpoint ON TABLE task TYPE option<int>;
         DEFINE FIELD IF NOT EXISTS parallelism ON TABLE task TYPE option<int>;
         DEFINE FIELD IF NOT EXISTS savepoint_path ON TABLE task TYPE option<string>;",

        "DEFINE INDEX IF NOT EXISTS sys_config_name ON TABLE sys_config COLUMNS name UNIQUE;
         DEFINE INDEX IF NOT EXISTS task_task_id ON TABLE task COLUMNS task_id UNIQUE;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
