//! Caller identity from request headers.
//!
//! Authentication happens upstream; the gateway forwards the subject as
//! `X-User-ID` and `X-User-Role`.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

use crate::services::error::FeeError;
use crate::services::policy::{authorize, Action, Resource, Role};

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn authorize(&self, action: Action, resource: Resource<'_>) -> Result<(), FeeError> {
        authorize(self.role, &self.user_id, action, resource)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing {} header", USER_ID_HEADER))
            })?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!("Missing {} header", USER_ROLE_HEADER))
            })?
            .parse::<Role>()
            .map_err(|e| AppError::Unauthorized(anyhow::anyhow!(e)))?;

        tracing::Span::current().record("user_id", user_id);

        Ok(Identity::new(user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<Identity, AppError> {
        let (mut parts, _) = request.into_parts();
        Identity::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_user_and_role() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "user-42")
            .header(USER_ROLE_HEADER, "faculty")
            .body(())
            .unwrap();

        let identity = extract(request).await.unwrap();
        assert_eq!(identity.user_id, "user-42");
        assert_eq!(identity.role, Role::Faculty);
    }

    #[tokio::test]
    async fn missing_or_unknown_headers_are_unauthorized() {
        let no_user = Request::builder()
            .header(USER_ROLE_HEADER, "admin")
            .body(())
            .unwrap();
        assert!(matches!(extract(no_user).await, Err(AppError::Unauthorized(_))));

        let bad_role = Request::builder()
            .header(USER_ID_HEADER, "user-42")
            .header(USER_ROLE_HEADER, "superuser")
            .body(())
            .unwrap();
        assert!(matches!(extract(bad_role).await, Err(AppError::Unauthorized(_))));
    }
}
