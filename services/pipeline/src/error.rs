//! Error kinds surfaced by the pipeline steps.
//!
//! Every step returns its failure unchanged to the caller; nothing here is
//! retried. Recovery belongs to whatever scheduler started the run.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Header line of the downloaded CSV is not the expected column sequence
    #[error("CSV file header does not match expected format: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// HTTP request failed or returned a non-success status
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Filesystem read or write failed
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection, COPY or SQL execution failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A data row could not be turned into an employee record
    #[error("Invalid record on line {line}: {message}")]
    InvalidRecord { line: u64, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another run holds the pipeline lock
    #[error("Another pipeline run is in progress")]
    AlreadyRunning,

    #[error("Pipeline run exceeded {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
