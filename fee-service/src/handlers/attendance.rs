//! Holidays and attendance.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::attendance::{HolidayQuery, HolidayRequest, MarkAttendanceRequest, SummaryQuery};
use crate::middleware::Identity;
use crate::models::{Attendance, AttendanceSummary, Holiday};
use crate::services::policy::{Action, Resource};
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /holidays
pub async fn create_holiday(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<HolidayRequest>,
) -> Result<(StatusCode, Json<Holiday>), AppError> {
    identity.authorize(Action::Create, Resource::Holiday)?;

    let holiday = state
        .attendance
        .create_holiday(req.holiday_date, req.name.trim().to_string(), req.is_government)
        .await?;
    Ok((StatusCode::CREATED, Json(holiday)))
}

/// GET /holidays
pub async fn list_holidays(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<HolidayQuery>,
) -> Result<Json<Vec<Holiday>>, AppError> {
    identity.authorize(Action::Read, Resource::Holiday)?;
    Ok(Json(
        state
            .ledger
            .store()
            .list_holidays(query.from, query.to)
            .await?,
    ))
}

/// Mark a student present or absent for a day.
///
/// POST /attendance
pub async fn mark_attendance(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<MarkAttendanceRequest>,
) -> Result<Json<Attendance>, AppError> {
    let student = state.ledger.student(req.student_id).await?;
    identity.authorize(Action::MarkAttendance, Resource::Attendance { owner: &student.user_id })?;

    let date = req
        .attendance_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let record = state
        .attendance
        .mark(&student, date, req.is_present, req.remarks, &identity.user_id)
        .await?;
    Ok(Json(record))
}

/// GET /students/:id/attendance/summary
pub async fn attendance_summary(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_id): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<AttendanceSummary>, AppError> {
    let student = state.ledger.student(student_id).await?;
    identity.authorize(Action::Read, Resource::Attendance { owner: &student.user_id })?;

    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(state.attendance.summary(&student, as_of).await?))
}
