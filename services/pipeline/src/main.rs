//! Employees ETL - one scheduled run of the employees pipeline
//!
//! Steps:
//! - Create `employees` if missing, recreate `employees_temp`
//! - Download the employees CSV and validate its header
//! - Transform it (timestamp, title/sentence case, leave category)
//! - COPY it into `employees_temp`
//! - Upsert `employees_temp` into `employees`
//!
//! Usage:
//!   # Full run:
//!   cargo run --bin employees-etl
//!
//!   # Fetch + transform only, no database:
//!   cargo run --bin employees-etl -- --dry-run

use anyhow::{Context, Result};
use clap::Parser;
use employees_etl::{db, fetch, logging, Config, Pipeline, PipelineError};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "employees-etl", about = "Loads the employees CSV into Postgres")]
struct Args {
    /// Override EMPLOYEES_CSV_URL
    #[arg(long)]
    url: Option<String>,

    /// Override DATA_DIR
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Dry run - fetch and transform only, don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init("info");
    let args = Args::parse();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(url) = args.url {
        config.csv_url = url;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    tracing::info!(
        url = %config.csv_url,
        data_dir = %config.data_dir.display(),
        dry_run = args.dry_run,
        "starting employees pipeline"
    );

    let client = fetch::build_client(config.http_timeout).context("Failed to build HTTP client")?;

    let pool = if args.dry_run {
        None
    } else {
        let db_url = config.require_db_url()?;
        Some(
            db::connect(db_url, config.db_max_connections)
                .await
                .context("Failed to connect to database")?,
        )
    };

    let run_timeout = config.run_timeout;
    let pipeline = Pipeline::new(config, client, pool);

    let run = async {
        if args.dry_run {
            pipeline.dry_run().await
        } else {
            pipeline.run().await
        }
    };

    let report = tokio::time::timeout(run_timeout, run)
        .await
        .map_err(|_| PipelineError::Timeout(run_timeout))??;

    tracing::info!(
        run_id = %report.run_id,
        hash = %report.fetched.content_hash,
        rows_transformed = report.rows_transformed,
        rows_loaded = ?report.rows_loaded,
        rows_merged = ?report.rows_merged,
        "pipeline complete"
    );

    Ok(())
}
