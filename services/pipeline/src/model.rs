use serde::Serialize;

/// Leave bucket derived from `leave_days`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LeaveCategory {
    Low,
    Medium,
    High,
}

impl LeaveCategory {
    /// Bin leave days into `(-1, 0]`, `(0, 2]` and `(2, +inf)`.
    ///
    /// Each bin is closed on the right. Missing leave and anything at or
    /// below -1 fall outside every bin and get no category.
    pub fn from_leave_days(leave_days: Option<i64>) -> Option<Self> {
        match leave_days? {
            days if days <= -1 => None,
            days if days <= 0 => Some(Self::Low),
            days if days <= 2 => Some(Self::Medium),
            _ => Some(Self::High),
        }
    }
}

/// One transformed employee row, in staging-table column order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeRecord {
    #[serde(rename = "Serial Number")]
    pub serial_number: i64,
    #[serde(rename = "Company Name")]
    pub company_name: String,
    #[serde(rename = "Employee Markme")]
    pub employee_markme: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Leave")]
    pub leave_days: Option<i64>,
    #[serde(rename = "Processed Timestamp")]
    pub processed_timestamp: String,
    #[serde(rename = "Leave Category")]
    pub leave_category: Option<LeaveCategory>,
}
