//! Course-level fee templates and their installment schedules.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeeStructure {
    pub fee_structure_id: Uuid,
    pub course_id: Uuid,
    pub name: String,
    pub registration_fee: Decimal,
    pub tuition_fee: Decimal,
    pub total_amount: Decimal,
    pub installment_count: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeeInstallment {
    pub installment_id: Uuid,
    pub fee_structure_id: Uuid,
    pub sequence: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

/// A structure together with its installments, ascending by sequence.
#[derive(Debug, Clone, Serialize)]
pub struct FeeSchedule {
    #[serde(flatten)]
    pub structure: FeeStructure,
    pub installments: Vec<FeeInstallment>,
}

impl FeeSchedule {
    pub fn new(structure: FeeStructure, mut installments: Vec<FeeInstallment>) -> Self {
        installments.sort_by_key(|i| i.sequence);
        Self {
            structure,
            installments,
        }
    }
}

/// Validated input for creating or replacing a fee structure.
#[derive(Debug, Clone)]
pub struct NewFeeStructure {
    pub course_id: Uuid,
    pub name: String,
    pub registration_fee: Decimal,
    pub tuition_fee: Decimal,
    pub total_amount: Decimal,
    pub installment_count: i32,
    pub installments: Vec<NewInstallment>,
}

#[derive(Debug, Clone)]
pub struct NewInstallment {
    pub sequence: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}
