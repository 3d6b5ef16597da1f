use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use sqljob_submitter::statement::{PlanOptions, StatementPlan, split_statements};
use sqljob_submitter::{
    AppParams, DatabaseConfig, ExecutionOutcome, Fixture, LogMonitor, RestEngineFactory,
    SubmitterConfig, create_connection, ensure_schema, submit_task,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqljob-submitter")]
#[command(about = "Submit SQL and jar jobs to a compute cluster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit one task and hand its job to monitoring
    Submit {
        #[arg(long, required_unless_present = "app_config")]
        task_id: Option<i64>,
        /// Base64-encoded JSON launch parameters ({"taskId", "url", "username", "password"})
        #[arg(long, env = "SUBMITTER_APP_CONFIG")]
        app_config: Option<String>,
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
        /// Seed the store from a JSON fixture before submitting
        #[arg(long)]
        fixture: Option<PathBuf>,
        #[arg(long, env = "FLINK_HOME", default_value = "/opt/flink")]
        engine_home: PathBuf,
        #[arg(long, env = "SUBMITTER_CONF_DIR", default_value = "/opt/flink/conf")]
        conf_dir: PathBuf,
        #[arg(long, env = "SUBMITTER_SQL_FILE", default_value = "job.sql")]
        sql_file: PathBuf,
        /// SQL Gateway REST endpoint
        #[arg(long, env = "SUBMITTER_GATEWAY_URL", default_value = "http://127.0.0.1:8083")]
        gateway_url: String,
        /// Cluster REST endpoint
        #[arg(long, env = "SUBMITTER_REST_URL", default_value = "http://127.0.0.1:8081")]
        rest_url: String,
    },
    /// Initialize the store, optionally seeding it
    Init {
        #[arg(long, env = "SURREALDB_URL", default_value = "memory")]
        db_url: String,
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Print how a program source is split and classified
    Classify {
        file: PathBuf,
        #[arg(long, default_value_t = false)]
        fragments: bool,
        #[arg(long, default_value_t = false)]
        statement_set: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("sqljob_submitter=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            task_id,
            app_config,
            db_url,
            fixture,
            engine_home,
            conf_dir,
            sql_file,
            gateway_url,
            rest_url,
        } => {
            let mut db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            let task_id = match (task_id, app_config) {
                (Some(id), _) => id,
                (None, Some(encoded)) => {
                    let params = AppParams::decode(&encoded)?;
                    params.apply_to(&mut db_config);
                    params.task_id
                }
                (None, None) => bail!("either --task-id or --app-config is required"),
            };
            info!("Using database url for submission: {}", db_config.url);

            let paths = SubmitterConfig {
                engine_home,
                conf_dir,
                sql_file,
            };
            let engines = Arc::new(RestEngineFactory::new(&gateway_url, &rest_url)?);

            let report = submit_task(
                db_config,
                fixture.as_deref(),
                paths,
                engines,
                Arc::new(LogMonitor),
                task_id,
            )
            .await?;

            match &report.outcome {
                ExecutionOutcome::Submitted(handle) => {
                    println!("Task {} submitted as job {}", report.task_id, handle.job_id)
                }
                ExecutionOutcome::NoJob => {
                    println!("Task {} finished without starting a job", report.task_id)
                }
                ExecutionOutcome::Aborted { statement, error } => {
                    println!("Task {} stopped at `{}`: {}", report.task_id, statement, error)
                }
            }
        }
        Commands::Init { db_url, fixture } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = create_connection(db_config).await?;
            ensure_schema(&db).await?;
            if let Some(path) = fixture {
                Fixture::load(&path)?.apply(&db).await?;
            }
            info!("Database initialized successfully");
        }
        Commands::Classify {
            file,
            fragments,
            statement_set,
        } => {
            let source = fs::read_to_string(&file)?;
            let globals = Default::default();
            let options = PlanOptions {
                use_fragments: fragments,
                use_statement_set: statement_set,
                globals: &globals,
            };
            let plan = StatementPlan::build(split_statements(&source), &options);

            println!("{:<6} {:<12} STATEMENT", "#", "KIND");
            println!("{}", "-".repeat(60));
            for entry in plan.executable() {
                let text = entry.display_text().replace('\n', " ");
                println!("{:<6} {:<12} {}", entry.ordinal, entry.kind.as_str(), text);
            }
        }
    }

    Ok(())
}
