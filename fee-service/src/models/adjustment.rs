//! Discounts and fines recorded against a student fee.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// `value` is what the admin entered; `amount` is the resolved deduction.
/// `applied` records whether the total was reduced at the time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeeDiscount {
    pub discount_id: Uuid,
    pub student_fee_id: Uuid,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub amount: Decimal,
    pub reason: String,
    pub applied: bool,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeeFine {
    pub fine_id: Uuid,
    pub student_fee_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    pub due_date: NaiveDate,
    pub is_paid: bool,
    pub applied: bool,
    pub created_utc: DateTime<Utc>,
}
