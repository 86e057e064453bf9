use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeeError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("No fee structure found for your course")]
    NoFeeStructureForCourse,

    #[error("No course assigned")]
    NoCourseAssigned,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Payment of {amount} exceeds outstanding balance of {outstanding}")]
    Overpayment {
        amount: Decimal,
        outstanding: Decimal,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Receipt number {0} already issued")]
    DuplicateReceipt(String),

    #[error("{0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<FeeError> for AppError {
    fn from(err: FeeError) -> Self {
        match err {
            FeeError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            e @ (FeeError::NoFeeStructureForCourse | FeeError::NoCourseAssigned) => {
                AppError::NotFound(anyhow::anyhow!(e.to_string()))
            }
            e @ (FeeError::InvalidAmount(_)
            | FeeError::InvalidInput(_)
            | FeeError::Overpayment { .. }) => AppError::BadRequest(anyhow::anyhow!(e.to_string())),
            FeeError::PermissionDenied(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            FeeError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            e @ FeeError::DuplicateReceipt(_) => AppError::Conflict(anyhow::anyhow!(e.to_string())),
            FeeError::ExternalService(msg) => AppError::BadGateway(msg),
            FeeError::Database(e) => AppError::from(e),
            FeeError::Internal(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn missing_fee_structure_is_not_found() {
        let err: AppError = FeeError::NoFeeStructureForCourse.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("No fee structure found for your course"));
    }

    #[test]
    fn ledger_errors_classify_for_callers() {
        let cases = [
            (FeeError::InvalidAmount("must be positive".into()), StatusCode::BAD_REQUEST),
            (FeeError::PermissionDenied("x".into()), StatusCode::FORBIDDEN),
            (FeeError::DuplicateReceipt("REC-1".into()), StatusCode::CONFLICT),
            (FeeError::ExternalService("gateway down".into()), StatusCode::BAD_GATEWAY),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }
}
