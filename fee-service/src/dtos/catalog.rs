use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200, message = "Course title is required"))]
    pub title: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 100, message = "User id is required"))]
    pub user_id: String,

    #[validate(length(min = 1, max = 150, message = "Username is required"))]
    pub username: String,

    #[validate(length(max = 200))]
    pub full_name: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Enrollment id is required"))]
    pub enrollment_id: String,

    pub course_id: Option<Uuid>,

    /// Defaults to today.
    pub admission_date: Option<NaiveDate>,
}
