//! Role-based authorization, decided in one place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::error::FeeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Faculty | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "faculty" => Ok(Role::Faculty),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    RecordPayment,
    Checkout,
    MarkAttendance,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Read => "read",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::RecordPayment => "record payments for",
            Action::Checkout => "check out",
            Action::MarkAttendance => "mark attendance for",
        };
        f.write_str(name)
    }
}

/// What is being acted on. Student-owned resources carry the `user_id` of
/// the owning student.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Course,
    FeeStructure,
    Holiday,
    Student { owner: &'a str },
    StudentFee { owner: &'a str },
    StudentFeeList,
    Adjustment,
    Receipt { owner: &'a str },
    Attendance { owner: &'a str },
    Report,
    Notification,
}

impl Resource<'_> {
    fn name(&self) -> &'static str {
        match self {
            Resource::Course => "courses",
            Resource::FeeStructure => "fee structures",
            Resource::Holiday => "holidays",
            Resource::Student { .. } => "students",
            Resource::StudentFee { .. } => "student fees",
            Resource::StudentFeeList => "student fee listings",
            Resource::Adjustment => "discounts and fines",
            Resource::Receipt { .. } => "receipts",
            Resource::Attendance { .. } => "attendance",
            Resource::Report => "fee reports",
            Resource::Notification => "notifications",
        }
    }

    fn owner(&self) -> Option<&str> {
        match self {
            Resource::Student { owner }
            | Resource::StudentFee { owner }
            | Resource::Receipt { owner }
            | Resource::Attendance { owner } => Some(owner),
            _ => None,
        }
    }
}

/// Allow or refuse `action` on `resource` for a subject with `role` and
/// `user_id`.
pub fn authorize(
    role: Role,
    user_id: &str,
    action: Action,
    resource: Resource<'_>,
) -> Result<(), FeeError> {
    let owns = resource.owner() == Some(user_id);

    let allowed = match role {
        Role::Admin => true,
        Role::Faculty => match action {
            Action::Read => !matches!(resource, Resource::Report | Resource::Notification),
            Action::Create => matches!(resource, Resource::Student { .. }),
            Action::MarkAttendance => matches!(resource, Resource::Attendance { .. }),
            _ => false,
        },
        Role::Student => match (action, resource) {
            (Action::Read, Resource::Course | Resource::FeeStructure | Resource::Holiday) => true,
            (
                Action::Read,
                Resource::Student { .. }
                | Resource::StudentFee { .. }
                | Resource::Receipt { .. }
                | Resource::Attendance { .. },
            ) => owns,
            (Action::RecordPayment | Action::Checkout, Resource::StudentFee { .. }) => owns,
            (Action::MarkAttendance, Resource::Attendance { .. }) => owns,
            _ => false,
        },
    };

    if allowed {
        Ok(())
    } else {
        tracing::warn!(
            role = %role,
            user_id = %user_id,
            action = %action,
            resource = resource.name(),
            "Authorization denied"
        );
        Err(FeeError::PermissionDenied(format!(
            "{} may not {} {}",
            role,
            action,
            resource.name()
        )))
    }
}
