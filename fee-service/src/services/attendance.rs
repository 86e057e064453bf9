//! Attendance marking and the working-day calculator.

use chrono::{Datelike, NaiveDate, Utc, Weekday};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{money, Attendance, AttendanceSummary, Holiday, Student};
use crate::services::error::FeeError;
use crate::services::store::FeeStore;

/// A day classes run: not a Sunday and not a holiday.
pub fn is_working_day(date: NaiveDate, holidays: &HashSet<NaiveDate>) -> bool {
    date.weekday() != Weekday::Sun && !holidays.contains(&date)
}

/// Working days in `[from, to]`, ascending. Empty when `from > to`.
pub fn working_days(from: NaiveDate, to: NaiveDate, holidays: &HashSet<NaiveDate>) -> Vec<NaiveDate> {
    from.iter_days()
        .take_while(|d| *d <= to)
        .filter(|d| is_working_day(*d, holidays))
        .collect()
}

/// Present share of working days as a percentage with two decimals.
pub fn attendance_percentage(present: i64, working: i64) -> Decimal {
    if working <= 0 {
        return money(Decimal::ZERO);
    }
    money(Decimal::from(present) * Decimal::ONE_HUNDRED / Decimal::from(working))
}

#[derive(Clone)]
pub struct AttendanceTracker {
    store: Arc<dyn FeeStore>,
}

impl AttendanceTracker {
    pub fn new(store: Arc<dyn FeeStore>) -> Self {
        Self { store }
    }

    pub async fn create_holiday(
        &self,
        holiday_date: NaiveDate,
        name: String,
        is_government: bool,
    ) -> Result<Holiday, FeeError> {
        let holiday = Holiday {
            holiday_id: Uuid::new_v4(),
            holiday_date,
            name,
            is_government,
        };
        let holiday = self.store.create_holiday(&holiday).await?;
        tracing::info!(date = %holiday.holiday_date, name = %holiday.name, "Holiday added");
        Ok(holiday)
    }

    async fn holiday_set(&self, from: NaiveDate, to: NaiveDate) -> Result<HashSet<NaiveDate>, FeeError> {
        Ok(self
            .store
            .list_holidays(Some(from), Some(to))
            .await?
            .into_iter()
            .map(|h| h.holiday_date)
            .collect())
    }

    /// Record presence for one day. Re-marking a day overwrites it.
    pub async fn mark(
        &self,
        student: &Student,
        date: NaiveDate,
        is_present: bool,
        remarks: Option<String>,
        marked_by: &str,
    ) -> Result<Attendance, FeeError> {
        let today = Utc::now().date_naive();
        if date > today {
            return Err(FeeError::InvalidInput(
                "Cannot mark attendance for a future date".to_string(),
            ));
        }
        if date < student.admission_date {
            return Err(FeeError::InvalidInput(
                "Cannot mark attendance before the admission date".to_string(),
            ));
        }
        if date.weekday() == Weekday::Sun {
            return Err(FeeError::InvalidInput(
                "Cannot mark attendance on a Sunday".to_string(),
            ));
        }
        if !self.holiday_set(date, date).await?.is_empty() {
            return Err(FeeError::InvalidInput(
                "Cannot mark attendance on a holiday".to_string(),
            ));
        }

        let record = Attendance {
            attendance_id: Uuid::new_v4(),
            student_id: student.student_id,
            attendance_date: date,
            is_present,
            remarks,
            marked_by: Some(marked_by.to_string()),
            created_utc: Utc::now(),
        };
        self.store.upsert_attendance(&record).await
    }

    /// Attendance from admission up to `as_of`.
    pub async fn summary(&self, student: &Student, as_of: NaiveDate) -> Result<AttendanceSummary, FeeError> {
        let from = student.admission_date;
        let holidays = self.holiday_set(from, as_of).await?;
        let working: HashSet<NaiveDate> = working_days(from, as_of, &holidays).into_iter().collect();

        let present_days = if working.is_empty() {
            0
        } else {
            self.store
                .present_dates(student.student_id, from, as_of)
                .await?
                .into_iter()
                .filter(|d| working.contains(d))
                .count() as i64
        };
        let working_days = working.len() as i64;

        Ok(AttendanceSummary {
            student_id: student.student_id,
            from,
            as_of,
            working_days,
            present_days,
            percentage: attendance_percentage(present_days, working_days),
        })
    }
}
