//! Immutable payment records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    BankTransfer,
    Online,
    Check,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::BankTransfer => "bank_transfer",
            PaymentMode::Online => "online",
            PaymentMode::Check => "check",
        }
    }

    /// Human label used on receipts ("Bank Transfer").
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::BankTransfer => "Bank Transfer",
            PaymentMode::Online => "Online",
            PaymentMode::Check => "Check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Pending,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Failed => "failed",
        }
    }

    /// Only successful payments move the running total.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Success)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeePayment {
    pub payment_id: Uuid,
    pub student_fee_id: Uuid,
    pub amount: Decimal,
    pub payment_mode: PaymentMode,
    pub transaction_id: Option<String>,
    pub receipt_number: String,
    pub status: PaymentStatus,
    pub remarks: Option<String>,
    pub recorded_by: Option<String>,
    pub paid_utc: DateTime<Utc>,
}

/// Payment to append; the receipt number is drawn per attempt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub student_fee_id: Uuid,
    pub amount: Decimal,
    pub payment_mode: PaymentMode,
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    pub remarks: Option<String>,
    pub recorded_by: Option<String>,
    pub paid_utc: DateTime<Utc>,
}

impl NewPayment {
    pub fn into_payment(self, receipt_number: String) -> FeePayment {
        FeePayment {
            payment_id: Uuid::new_v4(),
            student_fee_id: self.student_fee_id,
            amount: self.amount,
            payment_mode: self.payment_mode,
            transaction_id: self.transaction_id,
            receipt_number,
            status: self.status,
            remarks: self.remarks,
            recorded_by: self.recorded_by,
            paid_utc: self.paid_utc,
        }
    }
}
