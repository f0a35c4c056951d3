//! CLI entrypoint (spec §6): `run` for a single `(restaurant, date)`,
//! `run-range` for a batch. Tracing/dotenv setup mirrors the teacher's
//! `load_env`/`init_tracing` pair in its own `main.rs`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use restops_core::artifact;
use restops_core::config::AppConfig;
use restops_core::datasource::FsDataSource;
use restops_core::db::{DatabaseClient, SqliteDatabaseClient};
use restops_core::orchestrator::{BatchRequest, Orchestrator};
use restops_core::patterns::PatternStores;
use restops_core::pipeline::{self, PipelineContext};

#[derive(Parser)]
#[command(name = "restops", about = "Restaurant operations analytics pipeline")]
struct Cli {
    #[arg(long, env = "RESTOPS_DATA_ROOT", default_value = "data")]
    data_root: PathBuf,

    #[arg(long, env = "RESTOPS_DB_PATH", default_value = "restops.sqlite3")]
    db_path: PathBuf,

    #[arg(long, env = "RESTOPS_CONFIG", default_value = "config/base.toml")]
    config: PathBuf,

    #[arg(long, env = "RESTOPS_ENVIRONMENT")]
    environment: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline for a single restaurant/date.
    Run {
        #[arg(long)]
        restaurant: String,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Run a batch across restaurants and a date range.
    RunRange {
        #[arg(long, value_delimiter = ',')]
        restaurants: Vec<String>,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, default_value_t = 1)]
        workers: usize,
        #[arg(long, default_value = "outputs/batch_artifact.json")]
        output: PathBuf,
        #[arg(long, default_value = "outputs/dashboard.js")]
        dashboard_output: PathBuf,
    },
}

fn main() -> std::process::ExitCode {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(error = %err, "failed to start async runtime");
            return std::process::ExitCode::from(2);
        }
    };

    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> std::process::ExitCode {
    let config = match AppConfig::load_layered(&cli.config, cli.environment.as_deref(), None) {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "configuration load failed");
            return std::process::ExitCode::from(2);
        }
    };

    match cli.command {
        Command::Run { restaurant, date } => run_single(&cli.data_root, &cli.db_path, config, restaurant, date).await,
        Command::RunRange { restaurants, from, to, workers, output, dashboard_output } => {
            run_range(&cli.data_root, &cli.db_path, config, restaurants, from, to, workers, &output, &dashboard_output)
                .await
        }
    }
}

async fn run_single(
    data_root: &Path,
    db_path: &Path,
    mut config: AppConfig,
    restaurant: String,
    date: NaiveDate,
) -> std::process::ExitCode {
    config.orchestrator.max_workers = 1;
    let db = match SqliteDatabaseClient::open(db_path).context("opening database") {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "database setup failed");
            return std::process::ExitCode::from(2);
        }
    };

    let run_dir = data_root.join(&restaurant).join(date.format("%Y-%m-%d").to_string());
    let data_source = FsDataSource::new(run_dir);
    let patterns = PatternStores::with_config(config.pattern_learning.clone());
    let mut ctx = PipelineContext::new(restaurant.clone(), date, config);

    match pipeline::run_stages(&mut ctx, &data_source, &patterns) {
        Ok(()) => match pipeline::storage::run(&ctx, &db) {
            Ok(()) => {
                info!(restaurant = %restaurant, %date, "run succeeded");
                std::process::ExitCode::SUCCESS
            }
            Err(err) => {
                error!(restaurant = %restaurant, %date, stage = %err.stage, kind = %err.kind, "run failed");
                std::process::ExitCode::from(1)
            }
        },
        Err(err) => {
            error!(restaurant = %restaurant, %date, stage = %err.stage, kind = %err.kind, "run failed");
            std::process::ExitCode::from(1)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_range(
    data_root: &Path,
    db_path: &Path,
    mut config: AppConfig,
    restaurants: Vec<String>,
    from: NaiveDate,
    to: NaiveDate,
    workers: usize,
    output: &Path,
    dashboard_output: &Path,
) -> std::process::ExitCode {
    config.orchestrator.max_workers = workers.max(1);
    let db: Arc<dyn DatabaseClient> = match SqliteDatabaseClient::open(db_path).context("opening database") {
        Ok(db) => Arc::new(db),
        Err(err) => {
            error!(error = %err, "database setup failed");
            return std::process::ExitCode::from(2);
        }
    };

    let orchestrator = Orchestrator::new(data_root.to_path_buf(), db, config);
    let artifact_result = orchestrator.run_batch(BatchRequest { restaurants, from, to }).await;

    for run in artifact_result.runs.iter().filter(|r| !r.success) {
        if let Some(err) = &run.error {
            warn!(restaurant = %run.restaurant, date = %run.date, stage = %err.stage, kind = %err.kind, "run failed");
        }
    }

    if let Err(err) = artifact::write_batch_artifact(&artifact_result, output) {
        error!(error = %err, "failed to write batch artifact");
        return std::process::ExitCode::from(2);
    }
    if let Err(err) = artifact::write_dashboard_js(&artifact_result, dashboard_output) {
        error!(error = %err, "failed to write dashboard artifact");
        return std::process::ExitCode::from(2);
    }

    info!(
        total = artifact_result.summary.total_runs,
        succeeded = artifact_result.summary.succeeded,
        failed = artifact_result.summary.failed,
        "batch complete"
    );
    println!(
        "{} succeeded, {} failed out of {} runs",
        artifact_result.summary.succeeded, artifact_result.summary.failed, artifact_result.summary.total_runs
    );

    if artifact_result.summary.failed == 0 {
        std::process::ExitCode::SUCCESS
    } else {
        std::process::ExitCode::from(1)
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "restops_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv();
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for candidate in [manifest_dir.join(".env"), manifest_dir.join("../.env")] {
        if candidate.exists() {
            let _ = dotenv::from_path(&candidate);
        }
    }
}
