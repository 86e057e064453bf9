//! Student fee assignment, details, discounts and fines.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::fees::{AssignFeeRequest, DiscountRequest, FineRequest, StudentFeeQuery};
use crate::middleware::Identity;
use crate::models::{FeeDiscount, FeeFine, StudentFee, StudentFeeOverview};
use crate::services::ledger::FeeDetails;
use crate::services::policy::{Action, Resource};
use crate::utils::ValidatedJson;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DiscountResponse {
    pub discount: FeeDiscount,
    pub student_fee: StudentFee,
}

#[derive(Debug, Serialize)]
pub struct FineResponse {
    pub fine: FeeFine,
    pub student_fee: StudentFee,
}

/// Assign the student's course fee. 201 when created, 200 when the
/// student already had one.
///
/// POST /student-fees
pub async fn assign_fee(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<AssignFeeRequest>,
) -> Result<(StatusCode, Json<StudentFee>), AppError> {
    let student = state.ledger.student(req.student_id).await?;
    identity.authorize(Action::Create, Resource::StudentFee { owner: &student.user_id })?;

    let (fee, created) = state.ledger.assign_fee(student.student_id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(fee)))
}

/// GET /student-fees
pub async fn list_student_fees(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<StudentFeeQuery>,
) -> Result<Json<Vec<StudentFeeOverview>>, AppError> {
    identity.authorize(Action::Read, Resource::StudentFeeList)?;
    Ok(Json(
        state.ledger.store().list_student_fees(query.status).await?,
    ))
}

/// GET /student-fees/:id
pub async fn get_student_fee(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_fee_id): Path<Uuid>,
) -> Result<Json<FeeDetails>, AppError> {
    let (fee, student) = state.ledger.load_fee(student_fee_id).await?;
    identity.authorize(Action::Read, Resource::StudentFee { owner: &student.user_id })?;

    Ok(Json(state.ledger.details(fee, student).await?))
}

/// The caller's own fee, assigned on first visit.
///
/// GET /me/fees
pub async fn my_fees(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<FeeDetails>, AppError> {
    identity.authorize(Action::Read, Resource::StudentFee { owner: &identity.user_id })?;
    Ok(Json(state.ledger.fee_for_user(&identity.user_id).await?))
}

/// POST /student-fees/:id/discounts
pub async fn add_discount(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_fee_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<DiscountRequest>,
) -> Result<(StatusCode, Json<DiscountResponse>), AppError> {
    identity.authorize(Action::Create, Resource::Adjustment)?;

    let (discount, student_fee) = state
        .ledger
        .add_discount(student_fee_id, req.discount_type, req.value, req.reason)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(DiscountResponse {
            discount,
            student_fee,
        }),
    ))
}

/// POST /student-fees/:id/fines
pub async fn add_fine(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_fee_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<FineRequest>,
) -> Result<(StatusCode, Json<FineResponse>), AppError> {
    identity.authorize(Action::Create, Resource::Adjustment)?;

    let (fine, student_fee) = state
        .ledger
        .add_fine(student_fee_id, req.amount, req.reason, req.due_date)
        .await?;
    Ok((StatusCode::CREATED, Json(FineResponse { fine, student_fee })))
}
