//! Admin fee report and payment notifications.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::NotificationQuery;
use crate::middleware::Identity;
use crate::models::AdminNotification;
use crate::services::error::FeeError;
use crate::services::ledger::FeeReport;
use crate::services::policy::{Action, Resource};
use crate::AppState;

/// GET /reports/fees
pub async fn fee_report(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<FeeReport>, AppError> {
    identity.authorize(Action::Read, Resource::Report)?;
    Ok(Json(state.ledger.fee_report().await?))
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<AdminNotification>>, AppError> {
    identity.authorize(Action::Read, Resource::Notification)?;
    Ok(Json(
        state
            .ledger
            .store()
            .list_notifications(query.unread)
            .await?,
    ))
}

/// POST /notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    identity: Identity,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    identity.authorize(Action::Update, Resource::Notification)?;

    if !state
        .ledger
        .store()
        .mark_notification_read(notification_id)
        .await?
    {
        return Err(FeeError::NotFound("Notification".to_string()).into());
    }
    Ok(Json(json!({ "status": "success" })))
}

/// POST /notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Value>, AppError> {
    identity.authorize(Action::Update, Resource::Notification)?;

    let updated = state.ledger.store().mark_all_notifications_read().await?;
    Ok(Json(json!({ "status": "success", "updated": updated })))
}
