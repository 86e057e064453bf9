//! Courses and student records.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::catalog::{CreateCourseRequest, CreateStudentRequest};
use crate::middleware::Identity;
use crate::models::{Course, NewStudent, Student};
use crate::services::policy::{Action, Resource};
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /courses
pub async fn create_course(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<CreateCourseRequest>,
) -> Result<(StatusCode, Json<Course>), AppError> {
    identity.authorize(Action::Create, Resource::Course)?;

    let course = state.ledger.store().create_course(req.title.trim()).await?;
    tracing::info!(course_id = %course.course_id, "Course created");

    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /courses
pub async fn list_courses(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<Course>>, AppError> {
    identity.authorize(Action::Read, Resource::Course)?;
    Ok(Json(state.ledger.store().list_courses().await?))
}

/// POST /students
pub async fn create_student(
    State(state): State<AppState>,
    identity: Identity,
    ValidatedJson(req): ValidatedJson<CreateStudentRequest>,
) -> Result<(StatusCode, Json<Student>), AppError> {
    identity.authorize(Action::Create, Resource::Student { owner: &req.user_id })?;

    let student = state
        .ledger
        .store()
        .create_student(&NewStudent {
            user_id: req.user_id,
            username: req.username,
            full_name: req.full_name,
            enrollment_id: req.enrollment_id,
            course_id: req.course_id,
            admission_date: req
                .admission_date
                .unwrap_or_else(|| Utc::now().date_naive()),
        })
        .await?;

    tracing::info!(
        student_id = %student.student_id,
        enrollment_id = %student.enrollment_id,
        "Student created"
    );
    Ok((StatusCode::CREATED, Json(student)))
}

/// GET /students/:id
pub async fn get_student(
    State(state): State<AppState>,
    identity: Identity,
    Path(student_id): Path<Uuid>,
) -> Result<Json<Student>, AppError> {
    let student = state.ledger.student(student_id).await?;
    identity.authorize(Action::Read, Resource::Student { owner: &student.user_id })?;
    Ok(Json(student))
}
