//! One pipeline run: CREATE_TABLES → FETCH (+ VALIDATE) → TRANSFORM → LOAD →
//! MERGE → DONE. The first failing step ends the run; earlier steps are not
//! compensated.

use crate::config::Config;
use crate::db::{self, RunLock};
use crate::error::{PipelineError, Result};
use crate::fetch::{self, FetchedCsv};
use crate::transform;
use chrono::Utc;
use sqlx::PgPool;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateTables,
    Fetch,
    Transform,
    Load,
    Merge,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::CreateTables => "create_tables",
            Step::Fetch => "fetch",
            Step::Transform => "transform",
            Step::Load => "load",
            Step::Merge => "merge",
        };
        f.write_str(name)
    }
}

/// A run that ended in FAILED at `step`
#[derive(Debug, thiserror::Error)]
#[error("pipeline failed at step '{step}': {source}")]
pub struct RunError {
    pub step: Step,
    #[source]
    pub source: PipelineError,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub fetched: FetchedCsv,
    /// File written by TRANSFORM, the one LOAD streams into staging
    pub transformed_path: PathBuf,
    pub rows_transformed: usize,
    /// `None` for dry runs
    pub rows_loaded: Option<u64>,
    pub rows_merged: Option<u64>,
}

/// Output of TRANSFORM, input of LOAD
#[derive(Debug, Clone)]
struct TransformedCsv {
    path: PathBuf,
    rows: usize,
}

async fn run_step<T, F>(step: Step, fut: F) -> std::result::Result<T, RunError>
where
    F: Future<Output = Result<T>>,
{
    tracing::info!(%step, "step started");
    match fut.await {
        Ok(value) => {
            tracing::info!(%step, "step done");
            Ok(value)
        }
        Err(source) => {
            tracing::error!(%step, error = %source, "step failed");
            Err(RunError { step, source })
        }
    }
}

pub struct Pipeline {
    config: Config,
    client: reqwest::Client,
    pool: Option<PgPool>,
}

impl Pipeline {
    /// `pool` may be `None` for dry runs.
    pub fn new(config: Config, client: reqwest::Client, pool: Option<PgPool>) -> Self {
        Self {
            config,
            client,
            pool,
        }
    }

    /// Full run against the database.
    pub async fn run(&self) -> std::result::Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        self.run_live(run_id)
            .instrument(tracing::info_span!("run", %run_id))
            .await
    }

    /// Fetch and transform only; the database is never touched.
    pub async fn dry_run(&self) -> std::result::Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        async {
            let (fetched, transformed) = self.fetch_and_transform().await?;
            tracing::info!("dry run - nothing loaded");
            Ok::<RunReport, RunError>(RunReport {
                run_id,
                fetched,
                transformed_path: transformed.path,
                rows_transformed: transformed.rows,
                rows_loaded: None,
                rows_merged: None,
            })
        }
        .instrument(tracing::info_span!("run", %run_id, dry_run = true))
        .await
    }

    async fn run_live(&self, run_id: Uuid) -> std::result::Result<RunReport, RunError> {
        let pool = self.pool.as_ref().ok_or_else(|| RunError {
            step: Step::CreateTables,
            source: PipelineError::InvalidConfig("no database connection configured".to_string()),
        })?;
        let tables = &self.config.tables;

        let lock = run_step(Step::CreateTables, async {
            let lock = RunLock::acquire(pool, tables).await?;
            db::create_tables(pool, tables).await?;
            Ok::<_, PipelineError>(lock)
        })
        .await?;

        let result = self.run_data_steps(pool, run_id).await;

        if let Err(e) = lock.release().await {
            tracing::warn!(error = %e, "could not release run lock");
        }
        result
    }

    /// FETCH → TRANSFORM → LOAD → MERGE, with the run lock already held.
    async fn run_data_steps(
        &self,
        pool: &PgPool,
        run_id: Uuid,
    ) -> std::result::Result<RunReport, RunError> {
        let tables = &self.config.tables;
        let (fetched, transformed) = self.fetch_and_transform().await?;

        let rows_loaded = run_step(
            Step::Load,
            db::load_staging(pool, tables, &transformed.path),
        )
        .await?;

        let rows_merged = run_step(Step::Merge, db::merge_into_permanent(pool, tables)).await?;

        tracing::info!(rows_loaded, rows_merged, "run done");
        Ok(RunReport {
            run_id,
            fetched,
            transformed_path: transformed.path,
            rows_transformed: transformed.rows,
            rows_loaded: Some(rows_loaded),
            rows_merged: Some(rows_merged),
        })
    }

    async fn fetch_and_transform(
        &self,
    ) -> std::result::Result<(FetchedCsv, TransformedCsv), RunError> {
        let fetched = run_step(
            Step::Fetch,
            fetch::fetch_csv(&self.client, &self.config.csv_url, &self.config.raw_csv_path()),
        )
        .await?;

        let transformed_path = self.config.transformed_csv_path();
        let transformed = run_step(Step::Transform, async {
            let processed_at = Utc::now();
            let records = transform::transform_file(&fetched.path, processed_at).await?;
            let path = transform::write_csv(&transformed_path, &records).await?;
            Ok::<_, PipelineError>(TransformedCsv {
                path,
                rows: records.len(),
            })
        })
        .await?;

        Ok((fetched, transformed))
    }
}
