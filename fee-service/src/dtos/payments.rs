use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{FeePayment, PaymentMode, PaymentOrder, PaymentStatus, StudentFee};

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub payment_mode: PaymentMode,

    #[validate(length(min = 1, max = 100))]
    pub transaction_id: Option<String>,

    /// Defaults to `success`.
    pub status: Option<PaymentStatus>,

    #[validate(length(max = 500))]
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment: FeePayment,
    pub student_fee: StudentFee,
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct CreateOrderRequest {
    /// Defaults to the whole outstanding balance.
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub student_fee_id: Uuid,
    pub amount: Decimal,
    /// Amount in the smallest currency unit, as sent to the gateway.
    pub amount_minor: i64,
    pub currency: String,
    pub receipt_reference: String,
    /// Key the browser checkout is opened with.
    pub razorpay_key_id: String,
}

impl CreateOrderResponse {
    pub fn new(order: PaymentOrder, razorpay_key_id: &str) -> Self {
        Self {
            order_id: order.order_id,
            student_fee_id: order.student_fee_id,
            amount: order.amount,
            amount_minor: order.amount_minor,
            currency: order.currency,
            receipt_reference: order.receipt_reference,
            razorpay_key_id: razorpay_key_id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1, message = "Order id is required"))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1, message = "Payment id is required"))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1, message = "Signature is required"))]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub status: String,
    pub message: String,
    pub receipt_number: String,
    pub payment: FeePayment,
    pub student_fee: StudentFee,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReceiptQuery {
    #[serde(default)]
    pub format: ReceiptFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptFormat {
    #[default]
    Pdf,
    Html,
    Json,
}

impl ReceiptFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptFormat::Pdf => "pdf",
            ReceiptFormat::Html => "html",
            ReceiptFormat::Json => "json",
        }
    }
}
