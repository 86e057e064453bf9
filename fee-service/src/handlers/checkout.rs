//! Razorpay checkout: order creation and payment verification.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::payments::{
    CreateOrderRequest, CreateOrderResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::middleware::Identity;
use crate::services::policy::{Action, Resource};
use crate::services::razorpay::CheckoutCallback;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Open a gateway order for the fee. Without an amount the whole
/// outstanding balance is requested.
///
/// POST /student-fees/:id/orders
pub async fn create_order(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_fee_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let (fee, student) = state.ledger.load_fee(student_fee_id).await?;
    identity.authorize(Action::Checkout, Resource::StudentFee { owner: &student.user_id })?;

    let amount = req.amount.unwrap_or_else(|| fee.due_amount());
    if amount <= Decimal::ZERO && req.amount.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Nothing is outstanding on this fee"
        )));
    }

    let order = state.checkout.create_order(&fee, &student, amount).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse::new(order, state.checkout.key_id())),
    ))
}

/// Verify the checkout callback and record the payment.
///
/// POST /orders/verify
pub async fn verify_payment(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, AppError> {
    let order = state.checkout.order(&req.razorpay_order_id).await?;
    let (_, student) = state.ledger.load_fee(order.student_fee_id).await?;
    identity.authorize(Action::Checkout, Resource::StudentFee { owner: &student.user_id })?;

    let (payment, student_fee) = state
        .checkout
        .verify(
            &order,
            CheckoutCallback {
                order_id: req.razorpay_order_id,
                payment_id: req.razorpay_payment_id,
                signature: req.razorpay_signature,
            },
            Some(identity.user_id.clone()),
        )
        .await?;

    Ok(Json(VerifyPaymentResponse {
        status: "success".to_string(),
        message: "Payment verified successfully".to_string(),
        receipt_number: payment.receipt_number.clone(),
        payment,
        student_fee,
    }))
}
