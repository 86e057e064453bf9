//! Online fee checkout through the payment gateway.
//!
//! An order is created at the gateway for part or all of the outstanding
//! balance and mirrored locally. When checkout posts back, the signature is
//! verified and the payment is recorded and the order closed in one unit.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{
    AdminNotification, FeePayment, NewPayment, OrderStatus, PaymentMode, PaymentOrder,
    PaymentStatus, Student, StudentFee,
};
use crate::services::error::FeeError;
use crate::services::ledger::{validate_amount, FeeLedger};
use crate::services::metrics;
use crate::services::razorpay::{CheckoutCallback, RazorpayClient};

#[derive(Clone)]
pub struct Checkout {
    ledger: FeeLedger,
    razorpay: RazorpayClient,
}

impl Checkout {
    pub fn new(ledger: FeeLedger, razorpay: RazorpayClient) -> Self {
        Self { ledger, razorpay }
    }

    /// Key id the browser checkout is opened with.
    pub fn key_id(&self) -> &str {
        self.razorpay.key_id()
    }

    pub async fn order(&self, order_id: &str) -> Result<PaymentOrder, FeeError> {
        self.ledger
            .store()
            .get_order(order_id)
            .await?
            .ok_or_else(|| FeeError::NotFound("Payment order".to_string()))
    }

    /// Open a gateway order for `amount`, which must not exceed what is
    /// still owed.
    #[instrument(skip(self, fee, student), fields(student_fee_id = %fee.student_fee_id))]
    pub async fn create_order(
        &self,
        fee: &StudentFee,
        student: &Student,
        amount: Decimal,
    ) -> Result<PaymentOrder, FeeError> {
        let amount = validate_amount(amount)?;
        let outstanding = fee.due_amount();
        if amount > outstanding {
            return Err(FeeError::InvalidAmount(format!(
                "amount exceeds outstanding balance of {}",
                outstanding
            )));
        }
        let receipt_reference = format!("receipt_{}", &Uuid::new_v4().simple().to_string()[..10]);
        let gateway_order = self
            .razorpay
            .create_order(amount, &receipt_reference, student)
            .await
            .map_err(|e| {
                metrics::record_gateway("create_order", false);
                tracing::error!(error = %e, "Failed to create gateway order");
                e
            })?;
        metrics::record_gateway("create_order", true);

        let now = Utc::now();
        let order = PaymentOrder {
            order_id: gateway_order.id,
            student_fee_id: fee.student_fee_id,
            amount,
            amount_minor: i64::try_from(gateway_order.amount_minor)
                .map_err(|_| FeeError::InvalidAmount("amount out of range".to_string()))?,
            currency: gateway_order.currency,
            receipt_reference,
            status: OrderStatus::Created,
            payment_id: None,
            created_utc: now,
            updated_utc: now,
        };
        self.ledger.store().create_order(&order).await?;

        tracing::info!(
            order_id = %order.order_id,
            amount = %order.amount,
            amount_minor = order.amount_minor,
            "Payment order created"
        );
        Ok(order)
    }

    /// Check the gateway signature and record the payment. Verifying an
    /// order that is already paid returns the payment recorded for it.
    #[instrument(skip(self, order, callback), fields(order_id = %order.order_id))]
    pub async fn verify(
        &self,
        order: &PaymentOrder,
        callback: CheckoutCallback,
        recorded_by: Option<String>,
    ) -> Result<(FeePayment, StudentFee), FeeError> {
        match order.status {
            OrderStatus::Paid => return self.settled(order).await,
            OrderStatus::Failed => {
                return Err(FeeError::Conflict(format!(
                    "Payment order {} has failed verification",
                    order.order_id
                )))
            }
            OrderStatus::Created => {}
        }
        if callback.order_id != order.order_id {
            return Err(FeeError::InvalidInput(
                "Order id does not match the payment order".to_string(),
            ));
        }

        let valid = self.razorpay.verify_checkout(&callback)?;
        metrics::record_gateway("verify", valid);
        if !valid {
            self.ledger.store().fail_order(&order.order_id).await?;
            return Err(FeeError::InvalidInput(
                "Payment verification failed".to_string(),
            ));
        }

        let (_, student) = self.ledger.load_fee(order.student_fee_id).await?;
        let input = NewPayment {
            student_fee_id: order.student_fee_id,
            amount: order.amount,
            payment_mode: PaymentMode::Online,
            transaction_id: Some(callback.payment_id.clone()),
            status: PaymentStatus::Success,
            remarks: Some(format!("Online payment via Razorpay - Order: {}", order.order_id)),
            recorded_by,
            paid_utc: Utc::now(),
        };

        let result = self
            .ledger
            .with_fresh_receipt(|receipt_number| {
                let store = self.ledger.store().clone();
                let order_id = order.order_id.clone();
                let payment = input.clone().into_payment(receipt_number);
                let notification = AdminNotification::payment_received(
                    student.student_id,
                    &student.username,
                    payment.amount,
                    &payment.receipt_number,
                    payment.paid_utc,
                );
                async move {
                    // The gateway has already captured the money, so excess
                    // is kept as credit regardless of the overpayment policy.
                    let fee = store
                        .complete_order(&order_id, &payment, true, Some(&notification))
                        .await?;
                    Ok((payment, fee))
                }
            })
            .await;

        match result {
            Ok((payment, fee)) => {
                metrics::record_payment(
                    payment.payment_mode.as_str(),
                    payment.status.as_str(),
                    payment.amount.to_f64().unwrap_or_default(),
                );
                tracing::info!(
                    receipt_number = %payment.receipt_number,
                    gateway_payment_id = %callback.payment_id,
                    amount = %payment.amount,
                    "Online payment recorded"
                );
                Ok((payment, fee))
            }
            Err(FeeError::Conflict(msg)) => {
                // Lost a race with a concurrent verification of the same order.
                let current = self.order(&order.order_id).await?;
                if current.status == OrderStatus::Paid {
                    self.settled(&current).await
                } else {
                    Err(FeeError::Conflict(msg))
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn settled(&self, order: &PaymentOrder) -> Result<(FeePayment, StudentFee), FeeError> {
        let store = self.ledger.store();
        let payment_id = order.payment_id.ok_or_else(|| {
            FeeError::Internal(anyhow::anyhow!(
                "Paid order {} has no payment",
                order.order_id
            ))
        })?;
        let payment = store
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| FeeError::NotFound("Payment".to_string()))?;
        let (fee, _) = self.ledger.load_fee(order.student_fee_id).await?;
        Ok((payment, fee))
    }
}
