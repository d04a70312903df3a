use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::api::middleware::auth::AuthError;
use crate::db::StoreError;
use crate::models::validation::FieldError;
use crate::services::{coupon_evaluator::RedemptionError, group_capacity::MembershipError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_debug = format!("{:?}", self);

        let (status, error_message, fields) = match self {
            AppError::Validation(fields) => (
                StatusCode::BAD_REQUEST,
                "Validation failed".to_string(),
                Some(fields),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.".to_string(),
                None,
            ),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::Rejected(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg, None),
            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = match fields {
            Some(fields) => json!({
                "error": error_debug,
                "message": error_message,
                "fields": fields,
            }),
            None => json!({
                "error": error_debug,
                "message": error_message,
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthorized => AppError::Unauthorized,
            AuthError::Forbidden => AppError::Forbidden("Admin access required".to_string()),
            AuthError::SessionError => AppError::Internal(anyhow::anyhow!("session store error")),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => {
                AppError::Conflict("Record was modified concurrently, please retry".to_string())
            }
            StoreError::NotFound => AppError::NotFound("Record not found".to_string()),
            StoreError::Duplicate => AppError::Conflict(err.to_string()),
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

impl From<RedemptionError> for AppError {
    fn from(err: RedemptionError) -> Self {
        match err {
            RedemptionError::NotFound => AppError::NotFound("Coupon not found".to_string()),
            RedemptionError::Conflict => AppError::Conflict(err.to_string()),
            RedemptionError::Invalid(_) => AppError::Rejected(err.to_string()),
            RedemptionError::AlreadyRedeemed(_) => AppError::Conflict(err.to_string()),
            RedemptionError::UsageNotFound(_) => AppError::NotFound(err.to_string()),
            RedemptionError::Store(e) => e.into(),
        }
    }
}

impl From<MembershipError> for AppError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::NotFound => AppError::NotFound("Group tour not found".to_string()),
            MembershipError::NotHost => AppError::Forbidden(err.to_string()),
            MembershipError::Conflict => AppError::Conflict(err.to_string()),
            MembershipError::Store(e) => e.into(),
            MembershipError::NotOpen(_)
            | MembershipError::TourFull
            | MembershipError::HostCannotJoin
            | MembershipError::AlreadyRequested
            | MembershipError::NoPendingRequest
            | MembershipError::InvalidTransition { .. } => AppError::Rejected(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redemption_conflict_maps_to_409() {
        let response = AppError::from(RedemptionError::Conflict).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_business_rejections_map_to_422() {
        let response = AppError::from(MembershipError::TourFull).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = AppError::from(RedemptionError::Invalid(
            crate::services::coupon_evaluator::InvalidReason::Expired,
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_duplicate_usage_maps_to_409() {
        let response = AppError::from(StoreError::Duplicate).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_not_host_is_forbidden() {
        let response = AppError::from(MembershipError::NotHost).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_validation_is_bad_request() {
        let response = AppError::Validation(Vec::new()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
