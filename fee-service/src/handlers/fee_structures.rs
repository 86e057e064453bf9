//! Fee structure administration.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::fees::FeeStructureRequest;
use crate::middleware::Identity;
use crate::models::FeeSchedule;
use crate::services::error::FeeError;
use crate::services::policy::{Action, Resource};
use crate::utils::ValidatedJson;
use crate::AppState;

/// Create a fee structure with its installment schedule.
///
/// POST /fee-structures
pub async fn create_fee_structure(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<FeeStructureRequest>,
) -> Result<(StatusCode, Json<FeeSchedule>), AppError> {
    identity.authorize(Action::Create, Resource::FeeStructure)?;

    let input = req.into_new()?;
    let schedule = state.ledger.store().create_fee_structure(&input).await?;

    tracing::info!(
        fee_structure_id = %schedule.structure.fee_structure_id,
        course_id = %schedule.structure.course_id,
        total_amount = %schedule.structure.total_amount,
        installments = schedule.installments.len(),
        "Fee structure created"
    );
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// GET /fee-structures
pub async fn list_fee_structures(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<FeeSchedule>>, AppError> {
    identity.authorize(Action::Read, Resource::FeeStructure)?;
    Ok(Json(state.ledger.store().list_fee_structures().await?))
}

/// GET /fee-structures/:id
pub async fn get_fee_structure(
    State(state): State<AppState>,
    identity: Identity,
    Path(fee_structure_id): Path<Uuid>,
) -> Result<Json<FeeSchedule>, AppError> {
    identity.authorize(Action::Read, Resource::FeeStructure)?;

    let schedule = state
        .ledger
        .store()
        .get_fee_structure(fee_structure_id)
        .await?
        .ok_or_else(|| FeeError::NotFound("Fee structure".to_string()))?;
    Ok(Json(schedule))
}

/// Replace a fee structure and its schedule. Fees already assigned keep
/// the total they were assigned with.
///
/// PUT /fee-structures/:id
pub async fn update_fee_structure(
    State(state): State<AppState>,
    identity: Identity,
    Path(fee_structure_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<FeeStructureRequest>,
) -> Result<Json<FeeSchedule>, AppError> {
    identity.authorize(Action::Update, Resource::FeeStructure)?;

    let input = req.into_new()?;
    let schedule = state
        .ledger
        .store()
        .update_fee_structure(fee_structure_id, &input)
        .await?;

    tracing::info!(fee_structure_id = %fee_structure_id, "Fee structure updated");
    Ok(Json(schedule))
}

/// DELETE /fee-structures/:id
pub async fn delete_fee_structure(
    State(state): State<AppState>,
    identity: Identity,
    Path(fee_structure_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    identity.authorize(Action::Delete, Resource::FeeStructure)?;

    state
        .ledger
        .store()
        .delete_fee_structure(fee_structure_id)
        .await?;

    tracing::info!(fee_structure_id = %fee_structure_id, "Fee structure deleted");
    Ok(StatusCode::NO_CONTENT)
}
