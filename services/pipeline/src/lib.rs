//! Employees ETL - downloads the employees CSV, validates and transforms it,
//! bulk-loads it into a staging table and upserts it into `employees`.
//!
//! Scheduling, retries and backfill are left to whoever starts the binary.

pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod schema;
pub mod transform;

pub use config::{Config, TableNames};
pub use error::{PipelineError, Result};
pub use model::{EmployeeRecord, LeaveCategory};
pub use pipeline::{Pipeline, RunError, RunReport, Step};
