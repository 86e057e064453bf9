//! Per-student fee account.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::MAX_AMOUNT;
use crate::services::error::FeeError;

/// Payment status of a student fee, always derived from the two amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl FeeStatus {
    pub fn derive(amount_paid: Decimal, total_amount: Decimal) -> Self {
        if amount_paid >= total_amount {
            FeeStatus::Paid
        } else if amount_paid > Decimal::ZERO {
            FeeStatus::PartiallyPaid
        } else {
            FeeStatus::Unpaid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Unpaid => "unpaid",
            FeeStatus::PartiallyPaid => "partially_paid",
            FeeStatus::Paid => "paid",
        }
    }
}

impl std::fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(FeeStatus::Unpaid),
            "partially_paid" => Ok(FeeStatus::PartiallyPaid),
            "paid" => Ok(FeeStatus::Paid),
            _ => Err(format!("Invalid fee status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudentFee {
    pub student_fee_id: Uuid,
    pub student_id: Uuid,
    pub fee_structure_id: Uuid,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub status: FeeStatus,
    pub assigned_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl StudentFee {
    /// Outstanding balance, never negative.
    pub fn due_amount(&self) -> Decimal {
        (self.total_amount - self.amount_paid).max(Decimal::ZERO)
    }

    /// Amount paid beyond the total, held as credit.
    pub fn credit_amount(&self) -> Decimal {
        (self.amount_paid - self.total_amount).max(Decimal::ZERO)
    }

    /// Apply a successful payment in place. Leaves the fee untouched when
    /// the new amount paid would exceed `MAX_AMOUNT`.
    pub fn credit(&mut self, amount: Decimal, at: DateTime<Utc>) -> Result<(), FeeError> {
        self.amount_paid = bounded(self.amount_paid.checked_add(amount), "amount paid")?;
        self.status = FeeStatus::derive(self.amount_paid, self.total_amount);
        self.updated_utc = at;
        Ok(())
    }

    /// Change the total (discount or fine folded in), clamped at zero.
    pub fn adjust_total(&mut self, delta: Decimal, at: DateTime<Utc>) -> Result<(), FeeError> {
        let total = bounded(self.total_amount.checked_add(delta), "total amount")?;
        self.total_amount = total.max(Decimal::ZERO);
        self.status = FeeStatus::derive(self.amount_paid, self.total_amount);
        self.updated_utc = at;
        Ok(())
    }
}

fn bounded(value: Option<Decimal>, what: &str) -> Result<Decimal, FeeError> {
    value
        .filter(|v| *v <= MAX_AMOUNT)
        .ok_or_else(|| FeeError::InvalidAmount(format!("{} would exceed {}", what, MAX_AMOUNT)))
}

/// Staff listing row: the fee plus who it belongs to.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudentFeeOverview {
    pub student_fee_id: Uuid,
    pub student_id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub enrollment_id: String,
    pub fee_structure_name: String,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub status: FeeStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn status_follows_paid_against_total() {
        assert_eq!(FeeStatus::derive(dec("0"), dec("3000")), FeeStatus::Unpaid);
        assert_eq!(
            FeeStatus::derive(dec("0.01"), dec("3000")),
            FeeStatus::PartiallyPaid
        );
        assert_eq!(FeeStatus::derive(dec("3000"), dec("3000")), FeeStatus::Paid);
        assert_eq!(FeeStatus::derive(dec("3500"), dec("3000")), FeeStatus::Paid);
    }

    #[test]
    fn zero_total_counts_as_paid() {
        assert_eq!(FeeStatus::derive(dec("0"), dec("0")), FeeStatus::Paid);
    }

    #[test]
    fn credit_and_adjust_keep_status_in_step() {
        let now = Utc::now();
        let mut fee = StudentFee {
            student_fee_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            fee_structure_id: Uuid::new_v4(),
            total_amount: dec("3000.00"),
            amount_paid: dec("0.00"),
            status: FeeStatus::Unpaid,
            assigned_utc: now,
            updated_utc: now,
        };

        fee.credit(dec("1000.00"), now).unwrap();
        assert_eq!(fee.status, FeeStatus::PartiallyPaid);
        assert_eq!(fee.due_amount(), dec("2000.00"));

        fee.adjust_total(dec("-2000.00"), now).unwrap();
        assert_eq!(fee.status, FeeStatus::Paid);
        assert_eq!(fee.credit_amount(), dec("0.00"));

        fee.adjust_total(dec("-5000.00"), now).unwrap();
        assert_eq!(fee.total_amount, Decimal::ZERO);
        assert_eq!(fee.credit_amount(), dec("1000.00"));
    }

    #[test]
    fn amounts_past_the_column_limit_are_refused() {
        let now = Utc::now();
        let mut fee = StudentFee {
            student_fee_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            fee_structure_id: Uuid::new_v4(),
            total_amount: dec("3000.00"),
            amount_paid: dec("9999999999.00"),
            status: FeeStatus::Paid,
            assigned_utc: now,
            updated_utc: now,
        };

        assert!(matches!(fee.credit(dec("1.00"), now), Err(FeeError::InvalidAmount(_))));
        assert_eq!(fee.amount_paid, dec("9999999999.00"));

        // Decimal::MAX would overflow outright rather than cross the limit.
        assert!(matches!(fee.credit(Decimal::MAX, now), Err(FeeError::InvalidAmount(_))));
        assert!(matches!(
            fee.adjust_total(Decimal::MAX, now),
            Err(FeeError::InvalidAmount(_))
        ));
        assert_eq!(fee.total_amount, dec("3000.00"));

        fee.credit(dec("0.99"), now).unwrap();
        assert_eq!(fee.amount_paid, MAX_AMOUNT);
    }
}
