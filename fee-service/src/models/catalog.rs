//! Courses and student records the fee ledger hangs off.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub course_id: Uuid,
    pub title: String,
    pub created_utc: DateTime<Utc>,
}

/// Student profile linked to an authenticated subject through `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Student {
    pub student_id: Uuid,
    pub user_id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub enrollment_id: String,
    pub course_id: Option<Uuid>,
    pub admission_date: NaiveDate,
    pub created_utc: DateTime<Utc>,
}

impl Student {
    /// Name printed on receipts and notifications.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone)]
pub struct NewStudent {
    pub user_id: String,
    pub username: String,
    pub full_name: Option<String>,
    pub enrollment_id: String,
    pub course_id: Option<Uuid>,
    pub admission_date: NaiveDate,
}
