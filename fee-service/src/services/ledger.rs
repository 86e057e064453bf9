//! Fee ledger operations.
//!
//! The ledger is an append-only payment log plus a materialized
//! `amount_paid` on each student fee. Balance changes are delegated to the
//! store as single atomic units; this layer resolves students and courses,
//! validates money, draws receipt numbers and applies the configured
//! policies.

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    money, AdminNotification, DiscountType, FeeDiscount, FeeFine, FeeInstallment, FeePayment,
    FeeSchedule, FeeTotals, NewPayment, Student, StudentFee, MAX_AMOUNT,
};
use crate::services::error::FeeError;
use crate::services::metrics;
use crate::services::store::FeeStore;

const RECENT_PAYMENTS_LIMIT: i64 = 10;

/// What to do with a successful payment that pushes `amount_paid` past the
/// total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverpaymentPolicy {
    /// Record it; the excess shows up as `credit_amount`.
    Accept,
    Reject,
}

impl std::str::FromStr for OverpaymentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(OverpaymentPolicy::Accept),
            "reject" => Ok(OverpaymentPolicy::Reject),
            _ => Err(format!("Invalid overpayment policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerPolicy {
    pub apply_discounts_to_total: bool,
    pub apply_fines_to_total: bool,
    pub overpayment: OverpaymentPolicy,
    pub receipt_number_attempts: u32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            apply_discounts_to_total: false,
            apply_fines_to_total: false,
            overpayment: OverpaymentPolicy::Accept,
            receipt_number_attempts: 5,
        }
    }
}

/// Source of candidate receipt numbers. Uniqueness is enforced by the
/// store, not here.
pub trait ReceiptNumberSource: Send + Sync {
    fn next_receipt_number(&self) -> String;
}

/// `REC-` followed by eight random uppercase hex digits.
pub struct RandomReceiptNumbers;

impl ReceiptNumberSource for RandomReceiptNumbers {
    fn next_receipt_number(&self) -> String {
        format!("REC-{:08X}", rand::random::<u32>())
    }
}

/// First installment, in sequence order, whose running total exceeds
/// `amount_paid`. `None` once the schedule is covered.
pub fn next_due_date(installments: &[FeeInstallment], amount_paid: Decimal) -> Option<NaiveDate> {
    let mut ordered: Vec<&FeeInstallment> = installments.iter().collect();
    ordered.sort_by_key(|i| i.sequence);

    let mut cumulative = Decimal::ZERO;
    for installment in ordered {
        cumulative += installment.amount;
        if cumulative > amount_paid {
            return Some(installment.due_date);
        }
    }
    None
}

/// Positive, at most two decimal places and no larger than `MAX_AMOUNT`.
/// Returns the value scaled to cents.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, FeeError> {
    if amount <= Decimal::ZERO {
        return Err(FeeError::InvalidAmount(
            "amount must be greater than zero".to_string(),
        ));
    }
    if amount > MAX_AMOUNT {
        return Err(FeeError::InvalidAmount(format!(
            "amount must not exceed {}",
            MAX_AMOUNT
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(FeeError::InvalidAmount(
            "amount must have at most two decimal places".to_string(),
        ));
    }
    Ok(money(amount))
}

/// A student fee with everything the fee-detail view shows.
#[derive(Debug, Clone, Serialize)]
pub struct FeeDetails {
    #[serde(flatten)]
    pub fee: StudentFee,
    pub due_amount: Decimal,
    pub credit_amount: Decimal,
    pub next_due_date: Option<NaiveDate>,
    pub student: Student,
    pub fee_structure: FeeSchedule,
    pub payments: Vec<FeePayment>,
    pub discounts: Vec<FeeDiscount>,
    pub fines: Vec<FeeFine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeReport {
    #[serde(flatten)]
    pub totals: FeeTotals,
    pub recent_payments: Vec<FeePayment>,
}

#[derive(Clone)]
pub struct FeeLedger {
    store: Arc<dyn FeeStore>,
    policy: LedgerPolicy,
    receipts: Arc<dyn ReceiptNumberSource>,
}

impl FeeLedger {
    pub fn new(store: Arc<dyn FeeStore>, policy: LedgerPolicy) -> Self {
        Self {
            store,
            policy,
            receipts: Arc::new(RandomReceiptNumbers),
        }
    }

    pub fn with_receipt_source(mut self, receipts: Arc<dyn ReceiptNumberSource>) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn store(&self) -> &Arc<dyn FeeStore> {
        &self.store
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    fn allow_overpayment(&self) -> bool {
        self.policy.overpayment == OverpaymentPolicy::Accept
    }

    pub async fn student(&self, student_id: Uuid) -> Result<Student, FeeError> {
        self.store
            .get_student(student_id)
            .await?
            .ok_or_else(|| FeeError::NotFound("Student".to_string()))
    }

    /// Student profile linked to an authenticated user.
    pub async fn student_for_user(&self, user_id: &str) -> Result<Student, FeeError> {
        self.store
            .find_student_by_user(user_id)
            .await?
            .ok_or_else(|| FeeError::NotFound("Student profile".to_string()))
    }

    /// Fee and the student it belongs to.
    pub async fn load_fee(&self, student_fee_id: Uuid) -> Result<(StudentFee, Student), FeeError> {
        let fee = self
            .store
            .get_student_fee(student_fee_id)
            .await?
            .ok_or_else(|| FeeError::NotFound("Student fee".to_string()))?;
        let student = self.student(fee.student_id).await?;
        Ok((fee, student))
    }

    /// Give the student the fee structure of their course. Returns the
    /// existing fee unchanged when one is already assigned; the flag says
    /// whether a new fee was created.
    #[instrument(skip(self))]
    pub async fn assign_fee(&self, student_id: Uuid) -> Result<(StudentFee, bool), FeeError> {
        if let Some(existing) = self.store.find_student_fee_by_student(student_id).await? {
            return Ok((existing, false));
        }

        let student = self.student(student_id).await?;
        let course_id = student.course_id.ok_or(FeeError::NoCourseAssigned)?;
        let schedule = self
            .store
            .find_fee_structure_by_course(course_id)
            .await?
            .ok_or(FeeError::NoFeeStructureForCourse)?;

        let (fee, created) = self
            .store
            .assign_fee(student_id, &schedule.structure)
            .await?;

        if created {
            tracing::info!(
                student_fee_id = %fee.student_fee_id,
                student_id = %student_id,
                total_amount = %fee.total_amount,
                "Fee assigned"
            );
        }
        Ok((fee, created))
    }

    /// Fee details for the student behind `user_id`, assigning the fee on
    /// first lookup.
    pub async fn fee_for_user(&self, user_id: &str) -> Result<FeeDetails, FeeError> {
        let student = self.student_for_user(user_id).await?;
        let (fee, _) = self.assign_fee(student.student_id).await?;
        self.details(fee, student).await
    }

    pub async fn details(&self, fee: StudentFee, student: Student) -> Result<FeeDetails, FeeError> {
        let fee_structure = self
            .store
            .get_fee_structure(fee.fee_structure_id)
            .await?
            .ok_or_else(|| FeeError::NotFound("Fee structure".to_string()))?;
        let payments = self.store.list_payments(fee.student_fee_id).await?;
        let discounts = self.store.list_discounts(fee.student_fee_id).await?;
        let fines = self.store.list_fines(fee.student_fee_id).await?;

        Ok(FeeDetails {
            due_amount: fee.due_amount(),
            credit_amount: fee.credit_amount(),
            next_due_date: next_due_date(&fee_structure.installments, fee.amount_paid),
            fee,
            student,
            fee_structure,
            payments,
            discounts,
            fines,
        })
    }

    /// Run `attempt` with fresh receipt numbers until it stops failing with
    /// `DuplicateReceipt`.
    pub(crate) async fn with_fresh_receipt<T, F, Fut>(&self, mut attempt: F) -> Result<T, FeeError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, FeeError>>,
    {
        let attempts = self.policy.receipt_number_attempts.max(1);
        for n in 1..=attempts {
            let receipt_number = self.receipts.next_receipt_number();
            match attempt(receipt_number.clone()).await {
                Err(FeeError::DuplicateReceipt(_)) => {
                    tracing::warn!(
                        attempt = n,
                        receipt_number = %receipt_number,
                        "Receipt number collision, drawing a new one"
                    );
                }
                other => return other,
            }
        }

        metrics::record_error("receipt_number_exhausted");
        Err(FeeError::Conflict(format!(
            "Could not allocate a unique receipt number after {} attempts",
            attempts
        )))
    }

    /// Append a payment. A successful payment raises `amount_paid` by its
    /// amount and leaves an admin notification, all in one unit of work.
    #[instrument(skip(self, input), fields(student_fee_id = %input.student_fee_id))]
    pub async fn record_payment(
        &self,
        mut input: NewPayment,
    ) -> Result<(FeePayment, StudentFee), FeeError> {
        input.amount = validate_amount(input.amount)?;
        let (_, student) = self.load_fee(input.student_fee_id).await?;
        let allow_overpayment = self.allow_overpayment();

        let result = self
            .with_fresh_receipt(|receipt_number| {
                let store = self.store.clone();
                let payment = input.clone().into_payment(receipt_number);
                let notification = payment.status.is_settled().then(|| {
                    AdminNotification::payment_received(
                        student.student_id,
                        &student.username,
                        payment.amount,
                        &payment.receipt_number,
                        Utc::now(),
                    )
                });
                async move {
                    let fee = store
                        .record_payment(&payment, allow_overpayment, notification.as_ref())
                        .await?;
                    Ok((payment, fee))
                }
            })
            .await;

        match &result {
            Ok((payment, fee)) => {
                metrics::record_payment(
                    payment.payment_mode.as_str(),
                    payment.status.as_str(),
                    payment.amount.to_f64().unwrap_or_default(),
                );
                tracing::info!(
                    receipt_number = %payment.receipt_number,
                    amount = %payment.amount,
                    mode = payment.payment_mode.as_str(),
                    status = %payment.status,
                    amount_paid = %fee.amount_paid,
                    fee_status = %fee.status,
                    "Payment recorded"
                );
            }
            Err(FeeError::Overpayment { amount, outstanding }) => {
                metrics::record_error("overpayment");
                tracing::warn!(amount = %amount, outstanding = %outstanding, "Payment rejected as overpayment");
            }
            Err(e) => tracing::error!(error = %e, "Failed to record payment"),
        }

        result
    }

    /// Record a discount. `value` is a percentage of the current total or a
    /// fixed amount; the resolved amount is stored either way.
    #[instrument(skip(self, reason))]
    pub async fn add_discount(
        &self,
        student_fee_id: Uuid,
        discount_type: DiscountType,
        value: Decimal,
        reason: String,
    ) -> Result<(FeeDiscount, StudentFee), FeeError> {
        let (fee, _) = self.load_fee(student_fee_id).await?;

        let amount = match discount_type {
            DiscountType::Percentage => {
                if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED {
                    return Err(FeeError::InvalidInput(
                        "Percentage discount must be greater than 0 and at most 100".to_string(),
                    ));
                }
                let share = fee
                    .total_amount
                    .checked_mul(value)
                    .ok_or_else(|| FeeError::InvalidAmount("discount out of range".to_string()))?;
                money(share / Decimal::ONE_HUNDRED)
            }
            DiscountType::Fixed => validate_amount(value)?,
        };

        let discount = FeeDiscount {
            discount_id: Uuid::new_v4(),
            student_fee_id,
            discount_type,
            value,
            amount,
            reason,
            applied: self.policy.apply_discounts_to_total,
            created_utc: Utc::now(),
        };
        let fee = self.store.add_discount(&discount).await?;

        tracing::info!(
            discount_id = %discount.discount_id,
            amount = %discount.amount,
            applied = discount.applied,
            total_amount = %fee.total_amount,
            "Discount recorded"
        );
        Ok((discount, fee))
    }

    #[instrument(skip(self, reason))]
    pub async fn add_fine(
        &self,
        student_fee_id: Uuid,
        amount: Decimal,
        reason: String,
        due_date: NaiveDate,
    ) -> Result<(FeeFine, StudentFee), FeeError> {
        let amount = validate_amount(amount)?;
        self.load_fee(student_fee_id).await?;

        let fine = FeeFine {
            fine_id: Uuid::new_v4(),
            student_fee_id,
            amount,
            reason,
            due_date,
            is_paid: false,
            applied: self.policy.apply_fines_to_total,
            created_utc: Utc::now(),
        };
        let fee = self.store.add_fine(&fine).await?;

        tracing::info!(
            fine_id = %fine.fine_id,
            amount = %fine.amount,
            applied = fine.applied,
            total_amount = %fee.total_amount,
            "Fine recorded"
        );
        Ok((fine, fee))
    }

    pub async fn fee_report(&self) -> Result<FeeReport, FeeError> {
        let totals = self.store.fee_totals().await?;
        let recent_payments = self.store.recent_payments(RECENT_PAYMENTS_LIMIT).await?;
        Ok(FeeReport {
            totals,
            recent_payments,
        })
    }

    pub async fn payment_by_receipt(&self, receipt_number: &str) -> Result<FeePayment, FeeError> {
        self.store
            .find_payment_by_receipt(receipt_number)
            .await?
            .ok_or_else(|| FeeError::NotFound("Receipt".to_string()))
    }
}
