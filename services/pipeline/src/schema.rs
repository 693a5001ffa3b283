//! Header validation for the employees CSV.
//!
//! Expected columns (exact, in order):
//!   Serial Number,Company Name,Employee Markme,Description,Leave
//!
//! Only the header line is read. Row bodies, types and encoding are the
//! transformer's problem.

use crate::error::{PipelineError, Result};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Expected header for the raw employees CSV (exact match required)
pub const EXPECTED_HEADERS: &[&str] = &[
    "Serial Number",
    "Company Name",
    "Employee Markme",
    "Description",
    "Leave",
];

/// Compare a header line against [`EXPECTED_HEADERS`] as an ordered sequence.
pub fn check_header(line: &str) -> Result<()> {
    let found: Vec<&str> = line.trim().split(',').collect();

    if found != EXPECTED_HEADERS {
        return Err(PipelineError::SchemaMismatch {
            expected: EXPECTED_HEADERS.iter().map(|h| h.to_string()).collect(),
            found: found.into_iter().map(str::to_string).collect(),
        });
    }

    Ok(())
}

/// Read the first line of `path` and validate it with [`check_header`].
pub async fn validate_header(path: &Path) -> Result<()> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);

    let mut line = String::new();
    reader.read_line(&mut line).await?;

    check_header(&line)?;
    tracing::debug!(path = %path.display(), "headers validated");
    Ok(())
}
