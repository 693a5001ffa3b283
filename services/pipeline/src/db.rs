//! Postgres side of the pipeline: table setup, staging COPY and the upsert
//! merge. Each function runs in its own transaction; nothing spans steps.

use crate::config::{TableNames, MIN_DB_CONNECTIONS};
use crate::error::{PipelineError, Result};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Column list shared by both tables, in CSV order
const COLUMNS: &str = "serial_number, company_name, employee_markme, description, leave_days, processed_timestamp, leave_category";

pub async fn connect(db_url: &str, max_connections: u32) -> Result<PgPool> {
    if max_connections < MIN_DB_CONNECTIONS {
        return Err(PipelineError::InvalidConfig(format!(
            "pool needs at least {} connections, got {}",
            MIN_DB_CONNECTIONS, max_connections
        )));
    }

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(db_url)
        .await?;
    Ok(pool)
}

fn create_permanent_statement(tables: &TableNames) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            serial_number NUMERIC PRIMARY KEY,
            company_name TEXT,
            employee_markme TEXT,
            description TEXT,
            leave_days INTEGER,
            processed_timestamp TIMESTAMP,
            leave_category TEXT
        )
        "#,
        tables.permanent()
    )
}

fn create_staging_statement(tables: &TableNames) -> String {
    format!(
        r#"
        CREATE TABLE {} (
            serial_number NUMERIC PRIMARY KEY,
            company_name TEXT,
            employee_markme TEXT,
            description TEXT,
            leave_days INTEGER,
            processed_timestamp TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
            leave_category TEXT
        )
        "#,
        tables.staging()
    )
}

fn copy_statement(tables: &TableNames) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, HEADER true, DELIMITER ',', QUOTE '\"')",
        tables.staging(),
        COLUMNS
    )
}

fn merge_statement(tables: &TableNames) -> String {
    format!(
        r#"
        INSERT INTO {permanent} ({columns})
        SELECT {columns}
        FROM (
            SELECT DISTINCT {columns}
            FROM {staging}
        ) t
        ON CONFLICT (serial_number) DO UPDATE
        SET
          employee_markme = excluded.employee_markme,
          description = excluded.description,
          leave_days = excluded.leave_days,
          processed_timestamp = excluded.processed_timestamp,
          leave_category = excluded.leave_category
        "#,
        permanent = tables.permanent(),
        staging = tables.staging(),
        columns = COLUMNS
    )
}

/// Create the permanent table if missing and recreate the staging table.
pub async fn create_tables(pool: &PgPool, tables: &TableNames) -> Result<()> {
    let mut tx = pool.begin().await?;

    let create_permanent = create_permanent_statement(tables);
    sqlx::query(&create_permanent).execute(&mut *tx).await?;

    let drop_staging = format!("DROP TABLE IF EXISTS {}", tables.staging());
    sqlx::query(&drop_staging).execute(&mut *tx).await?;

    let create_staging = create_staging_statement(tables);
    sqlx::query(&create_staging).execute(&mut *tx).await?;

    tx.commit().await?;
    tracing::info!(
        permanent = tables.permanent(),
        staging = tables.staging(),
        "tables ready"
    );
    Ok(())
}

/// Stream the transformed CSV at `path` into the staging table.
///
/// All or nothing: if reading the file or sending to the server fails, the
/// COPY is aborted and the transaction rolled back.
pub async fn load_staging(pool: &PgPool, tables: &TableNames, path: &Path) -> Result<u64> {
    let mut file = File::open(path).await?;
    let mut tx = pool.begin().await?;

    // Processed timestamps are DD-MM-YYYY
    sqlx::query("SET LOCAL datestyle = 'ISO, DMY'")
        .execute(&mut *tx)
        .await?;

    let statement = copy_statement(tables);
    let mut copy = tx.copy_in_raw(&statement).await?;

    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let streamed = async {
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            copy.send(&buf[..n]).await?;
        }
        Ok::<(), PipelineError>(())
    }
    .await;

    let copied = match streamed {
        Ok(()) => copy.finish().await,
        Err(e) => {
            if let Err(abort) = copy.abort(e.to_string()).await {
                tracing::warn!(error = %abort, "COPY abort failed");
            }
            tx.rollback().await?;
            return Err(e);
        }
    };

    let rows = match copied {
        Ok(rows) => rows,
        Err(e) => {
            tx.rollback().await?;
            return Err(e.into());
        }
    };

    tx.commit().await?;
    tracing::info!(rows, staging = tables.staging(), "staging loaded");
    Ok(rows)
}

/// Upsert deduplicated staging rows into the permanent table.
///
/// On a primary key conflict every non-key column except `company_name` is
/// overwritten with the staging value.
pub async fn merge_into_permanent(pool: &PgPool, tables: &TableNames) -> Result<u64> {
    let statement = merge_statement(tables);

    let result = async {
        let mut tx = pool.begin().await?;
        match sqlx::query(&statement).execute(&mut *tx).await {
            Ok(done) => {
                tx.commit().await?;
                Ok::<u64, sqlx::Error>(done.rows_affected())
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
    .await;

    match result {
        Ok(rows) => {
            tracing::info!(rows, "data merged successfully");
            Ok(rows)
        }
        Err(e) => {
            tracing::error!(error = %e, "error merging data");
            Err(e.into())
        }
    }
}

/// Session advisory lock held for the whole run.
///
/// Keyed on the staging table name, since that table and the data files are
/// the resources concurrent runs would fight over.
pub struct RunLock {
    conn: Option<PoolConnection<Postgres>>,
    staging: String,
}

impl RunLock {
    pub async fn acquire(pool: &PgPool, tables: &TableNames) -> Result<Self> {
        let mut conn = pool.acquire().await?;
        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(tables.staging())
            .fetch_one(&mut *conn)
            .await?;

        if !acquired {
            return Err(PipelineError::AlreadyRunning);
        }

        Ok(Self {
            conn: Some(conn),
            staging: tables.staging().to_string(),
        })
    }

    pub async fn release(mut self) -> Result<()> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
                .bind(&self.staging)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Closing the session is the only way to drop the lock without await.
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}
