use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct HolidayRequest {
    pub holiday_date: NaiveDate,
    #[validate(length(min = 1, max = 100, message = "Holiday name is required"))]
    pub name: String,
    #[serde(default)]
    pub is_government: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct HolidayQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkAttendanceRequest {
    pub student_id: Uuid,
    /// Defaults to today.
    pub attendance_date: Option<NaiveDate>,
    pub is_present: bool,
    #[validate(length(max = 255))]
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SummaryQuery {
    /// Defaults to today.
    pub as_of: Option<NaiveDate>,
}
