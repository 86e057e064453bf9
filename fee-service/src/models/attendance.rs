//! Attendance records and the holiday calendar.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Holiday {
    pub holiday_id: Uuid,
    pub holiday_date: NaiveDate,
    pub name: String,
    pub is_government: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Attendance {
    pub attendance_id: Uuid,
    pub student_id: Uuid,
    pub attendance_date: NaiveDate,
    pub is_present: bool,
    pub remarks: Option<String>,
    pub marked_by: Option<String>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceSummary {
    pub student_id: Uuid,
    pub from: NaiveDate,
    pub as_of: NaiveDate,
    pub working_days: i64,
    pub present_days: i64,
    pub percentage: Decimal,
}
