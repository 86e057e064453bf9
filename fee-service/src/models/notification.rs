//! Admin notifications.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Payment,
    Enrollment,
    System,
    FeeDue,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminNotification {
    pub notification_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub student_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub is_read: bool,
    pub created_utc: DateTime<Utc>,
}

impl AdminNotification {
    pub fn payment_received(
        student_id: Uuid,
        username: &str,
        amount: Decimal,
        receipt_number: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            title: format!("Payment Received - {}", username),
            message: format!(
                "Student {} has made a payment of Rs. {} on {}. Receipt: {}",
                username,
                amount,
                at.format("%d/%m/%Y at %H:%M"),
                receipt_number
            ),
            notification_type: NotificationType::Payment,
            student_id: Some(student_id),
            amount: Some(amount),
            is_read: false,
            created_utc: at,
        }
    }
}
