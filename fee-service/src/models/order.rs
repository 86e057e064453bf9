//! Gateway checkout orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Paid,
    Failed,
}

/// Local mirror of a Razorpay order, keyed by the gateway's order id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentOrder {
    pub order_id: String,
    pub student_fee_id: Uuid,
    pub amount: Decimal,
    pub amount_minor: i64,
    pub currency: String,
    pub receipt_reference: String,
    pub status: OrderStatus,
    pub payment_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
