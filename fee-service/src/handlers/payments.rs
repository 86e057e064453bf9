//! Payment recording and history.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::payments::{PaymentResponse, RecordPaymentRequest};
use crate::middleware::Identity;
use crate::models::{FeePayment, NewPayment, PaymentStatus};
use crate::services::policy::{Action, Resource};
use crate::utils::ValidatedJson;
use crate::AppState;

/// Record a payment against a student fee.
///
/// POST /student-fees/:id/payments
pub async fn record_payment(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_fee_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    let (_, student) = state.ledger.load_fee(student_fee_id).await?;
    identity.authorize(Action::RecordPayment, Resource::StudentFee { owner: &student.user_id })?;

    let (payment, student_fee) = state
        .ledger
        .record_payment(NewPayment {
            student_fee_id,
            amount: req.amount,
            payment_mode: req.payment_mode,
            transaction_id: req.transaction_id,
            status: req.status.unwrap_or(PaymentStatus::Success),
            remarks: req.remarks,
            recorded_by: Some(identity.user_id.clone()),
            paid_utc: Utc::now(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse {
            payment,
            student_fee,
        }),
    ))
}

/// Payment history, newest first.
///
/// GET /student-fees/:id/payments
pub async fn list_payments(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_fee_id): Path<Uuid>,
) -> Result<Json<Vec<FeePayment>>, AppError> {
    let (_, student) = state.ledger.load_fee(student_fee_id).await?;
    identity.authorize(Action::Read, Resource::StudentFee { owner: &student.user_id })?;

    Ok(Json(state.ledger.store().list_payments(student_fee_id).await?))
}
