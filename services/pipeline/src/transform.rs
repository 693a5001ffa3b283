//! Transforms validated employee rows into staging-shaped records.
//!
//! This module is DETERMINISTIC apart from the processing timestamp, which
//! the caller captures once and passes in: same file + same timestamp =
//! same output.

use crate::error::{PipelineError, Result};
use crate::model::{EmployeeRecord, LeaveCategory};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Asia/Ho_Chi_Minh has been UTC+07:00 without DST since 1975
const HO_CHI_MINH_OFFSET_SECS: i32 = 7 * 3600;

/// `DD-MM-YYYY HH:MM:SS`
pub const PROCESSED_TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Column header of the transformed CSV, in staging-table order
pub const TRANSFORMED_HEADERS: &[&str] = &[
    "Serial Number",
    "Company Name",
    "Employee Markme",
    "Description",
    "Leave",
    "Processed Timestamp",
    "Leave Category",
];

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Serial Number")]
    serial_number: String,
    #[serde(rename = "Company Name")]
    company_name: String,
    #[serde(rename = "Employee Markme")]
    employee_markme: String,
    #[serde(rename = "Description")]
    description: String,
    #[serde(rename = "Leave")]
    leave: String,
}

/// Render `now` in Ho Chi Minh City local time.
pub fn format_processed_timestamp(now: DateTime<Utc>) -> Result<String> {
    let offset = FixedOffset::east_opt(HO_CHI_MINH_OFFSET_SECS).ok_or_else(|| {
        PipelineError::InvalidConfig("invalid fixed offset +07:00".to_string())
    })?;
    Ok(now
        .with_timezone(&offset)
        .format(PROCESSED_TIMESTAMP_FORMAT)
        .to_string())
}

/// Uppercase the first character of every whitespace-delimited word and
/// lowercase the rest of it.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            out.push(c);
            word_start = true;
        } else if word_start {
            out.extend(c.to_uppercase());
            word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Uppercase the first character only.
pub fn sentence_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn parse_integer(field: &str, column: &str, line: u64) -> Result<i64> {
    field.trim().parse().map_err(|e| PipelineError::InvalidRecord {
        line,
        message: format!("invalid '{}' value '{}': {}", column, field, e),
    })
}

/// Parse CSV content and apply the column transforms.
pub fn transform_rows(content: &[u8], processed_timestamp: &str) -> Result<Vec<EmployeeRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .quote(b'"')
        .trim(csv::Trim::Headers)
        .from_reader(content);

    let headers = reader.headers()?.clone();
    let mut records = Vec::new();

    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let row: RawRow = record.deserialize(Some(&headers))?;

        let serial_number = parse_integer(&row.serial_number, "Serial Number", line)?;
        let leave_days = if row.leave.trim().is_empty() {
            None
        } else {
            Some(parse_integer(&row.leave, "Leave", line)?)
        };

        records.push(EmployeeRecord {
            serial_number,
            company_name: title_case(&row.company_name),
            employee_markme: row.employee_markme,
            description: sentence_case(&row.description),
            leave_days,
            processed_timestamp: processed_timestamp.to_string(),
            leave_category: LeaveCategory::from_leave_days(leave_days),
        });
    }

    Ok(records)
}

/// Load a validated CSV and transform it.
///
/// `processed_at` is stamped on every row, so all rows of one run carry the
/// same `processed_timestamp`.
pub async fn transform_file(path: &Path, processed_at: DateTime<Utc>) -> Result<Vec<EmployeeRecord>> {
    let stamp = format_processed_timestamp(processed_at)?;
    let content = fs::read(path).await?;

    let records = transform_rows(&content, &stamp)?;
    tracing::info!(rows = records.len(), processed_timestamp = %stamp, "transformed");
    Ok(records)
}

/// Serialize records as CSV with a header row.
pub fn to_csv(records: &[EmployeeRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(TRANSFORMED_HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }

    writer.into_inner().map_err(|e| {
        let err = e.error();
        PipelineError::Io(std::io::Error::new(err.kind(), err.to_string()))
    })
}

/// Write the transformed CSV to `path`, creating its parent directory.
pub async fn write_csv(path: &Path, records: &[EmployeeRecord]) -> Result<PathBuf> {
    let bytes = to_csv(records)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, &bytes).await?;

    tracing::info!(path = %path.display(), rows = records.len(), "transformed CSV written");
    Ok(path.to_path_buf())
}
