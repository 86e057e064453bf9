use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

use crate::models::{money, DiscountType, FeeStatus, NewFeeStructure, NewInstallment, MAX_AMOUNT};
use crate::services::error::FeeError;
use crate::services::ledger::validate_amount;

#[derive(Debug, Deserialize, Validate)]
pub struct FeeStructureRequest {
    pub course_id: Uuid,

    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,

    pub registration_fee: Decimal,
    pub tuition_fee: Decimal,
    pub total_amount: Decimal,

    /// Ignored when an installment schedule is supplied.
    #[validate(range(min = 1, max = 60, message = "Installment count must be between 1 and 60"))]
    pub installment_count: Option<i32>,

    #[serde(default)]
    #[validate(
        length(max = 60, message = "At most 60 installments are allowed"),
        nested
    )]
    pub installments: Vec<InstallmentRequest>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct InstallmentRequest {
    #[validate(range(min = 1, message = "Sequence must be at least 1"))]
    pub sequence: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

fn non_negative(label: &str, value: Decimal) -> Result<Decimal, FeeError> {
    if value < Decimal::ZERO {
        return Err(FeeError::InvalidAmount(format!("{} cannot be negative", label)));
    }
    if value > MAX_AMOUNT {
        return Err(FeeError::InvalidAmount(format!(
            "{} must not exceed {}",
            label, MAX_AMOUNT
        )));
    }
    if value.normalize().scale() > 2 {
        return Err(FeeError::InvalidAmount(format!(
            "{} must have at most two decimal places",
            label
        )));
    }
    Ok(money(value))
}

impl FeeStructureRequest {
    /// Money and schedule checks that go beyond field shapes.
    pub fn into_new(self) -> Result<NewFeeStructure, FeeError> {
        let registration_fee = non_negative("registration_fee", self.registration_fee)?;
        let tuition_fee = non_negative("tuition_fee", self.tuition_fee)?;
        let total_amount = validate_amount(self.total_amount)?;

        let mut sequences = HashSet::new();
        let installments = self
            .installments
            .into_iter()
            .map(|i| {
                if !sequences.insert(i.sequence) {
                    return Err(FeeError::InvalidInput(format!(
                        "Duplicate installment sequence {}",
                        i.sequence
                    )));
                }
                Ok(NewInstallment {
                    sequence: i.sequence,
                    amount: validate_amount(i.amount)?,
                    due_date: i.due_date,
                })
            })
            .collect::<Result<Vec<_>, FeeError>>()?;

        let installment_count = if installments.is_empty() {
            self.installment_count.unwrap_or(1)
        } else {
            i32::try_from(installments.len())
                .map_err(|_| FeeError::InvalidInput("Too many installments".to_string()))?
        };

        Ok(NewFeeStructure {
            course_id: self.course_id,
            name: self.name.trim().to_string(),
            registration_fee,
            tuition_fee,
            total_amount,
            installment_count,
            installments,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AssignFeeRequest {
    pub student_id: Uuid,
}

#[derive(Debug, Deserialize, Default)]
pub struct StudentFeeQuery {
    pub status: Option<FeeStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DiscountRequest {
    pub discount_type: DiscountType,
    pub value: Decimal,
    #[validate(length(min = 1, max = 255, message = "Reason is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FineRequest {
    pub amount: Decimal,
    #[validate(length(min = 1, max = 255, message = "Reason is required"))]
    pub reason: String,
    pub due_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(installments: Vec<InstallmentRequest>) -> FeeStructureRequest {
        FeeStructureRequest {
            course_id: Uuid::new_v4(),
            name: " FSD 2024 ".to_string(),
            registration_fee: "500".parse().unwrap(),
            tuition_fee: "2500".parse().unwrap(),
            total_amount: "3000".parse().unwrap(),
            installment_count: Some(4),
            installments,
        }
    }

    fn installment(sequence: i32, amount: &str) -> InstallmentRequest {
        InstallmentRequest {
            sequence,
            amount: amount.parse().unwrap(),
            due_date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        }
    }

    #[test]
    fn schedule_length_overrides_declared_count() {
        let new = request(vec![installment(1, "1500"), installment(2, "1500")])
            .into_new()
            .unwrap();
        assert_eq!(new.installment_count, 2);
        assert_eq!(new.name, "FSD 2024");
        assert_eq!(new.total_amount.to_string(), "3000.00");

        let new = request(vec![]).into_new().unwrap();
        assert_eq!(new.installment_count, 4);
    }

    #[test]
    fn bad_money_and_duplicate_sequences_are_rejected() {
        let dup = request(vec![installment(1, "1500"), installment(1, "1500")]);
        assert!(matches!(dup.into_new(), Err(FeeError::InvalidInput(_))));

        let zero = request(vec![installment(1, "0")]);
        assert!(matches!(zero.into_new(), Err(FeeError::InvalidAmount(_))));

        let mut negative = request(vec![]);
        negative.registration_fee = "-1".parse().unwrap();
        assert!(matches!(negative.into_new(), Err(FeeError::InvalidAmount(_))));

        let mut huge = request(vec![]);
        huge.tuition_fee = "40000000000000000000000000000".parse().unwrap();
        assert!(matches!(huge.into_new(), Err(FeeError::InvalidAmount(_))));

        let mut no_total = request(vec![]);
        no_total.total_amount = Decimal::ZERO;
        assert!(matches!(no_total.into_new(), Err(FeeError::InvalidAmount(_))));
    }

    #[test]
    fn schedules_longer_than_sixty_installments_fail_validation() {
        let at_limit = request((1..=60).map(|n| installment(n, "50")).collect());
        assert!(at_limit.validate().is_ok());

        let too_long = request((1..=61).map(|n| installment(n, "50")).collect());
        let errors = too_long.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("installments"));
    }
}
