//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.
//!
//! Store methods return `anyhow::Result`; the conversion below downcasts to the
//! concrete cause so that schema drift and unique conflicts get a useful response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::services::orders::{CheckoutError, StatusError};
use crate::services::voucher::{VoucherError, VoucherInputError};

/// 스키마 불일치 시 안내할 마이그레이션 파일
pub const MIGRATION_HINT: &str =
    "Database schema is out of date. Apply migrations/0001_storefront.sql (or restart the server to run migrations).";

/// Postgres SQLSTATE: undefined_table, undefined_column
const SCHEMA_ERROR_CODES: [&str; 2] = ["42P01", "42703"];

/// API 에러 타입
///
/// # Design Decision
///
/// 각 에러 variant는 적절한 HTTP 상태 코드에 매핑됨
/// - 클라이언트 에러: 4xx (잘못된 요청, 인증 실패, 잘못된 바우처 등)
/// - 서버 에러: 5xx (내부 오류)
///
/// 민감한 내부 정보는 클라이언트에 노출하지 않음
#[derive(Debug, Error)]
pub enum ApiError {
    // ============ 400 Bad Request ============
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    ValidationError(String),

    // ============ 401 Unauthorized ============
    #[error("Authentication required")]
    Unauthorized,

    // ============ 403 Forbidden ============
    #[error("Forbidden")]
    Forbidden,

    // ============ 404 Not Found ============
    #[error("Resource not found: {0}")]
    NotFound(String),

    // ============ 409 Conflict ============
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ 422 Unprocessable Entity ============
    #[error("Voucher invalid")]
    VoucherInvalid,

    // ============ 500 Internal Server Error ============
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal server error")]
    InternalError,
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            // 4xx 클라이언트 에러
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                msg.clone(),
                None,
            ),
            ApiError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(msg.clone()),
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
                None,
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have access to this resource".to_string(),
                None,
            ),
            ApiError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", resource),
                None,
            ),
            ApiError::Conflict(msg) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                "Request conflicts with current state".to_string(),
                Some(msg.clone()),
            ),
            ApiError::VoucherInvalid => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VOUCHER_INVALID",
                "Voucher invalid".to_string(),
                None,
            ),

            // 5xx 서버 에러
            ApiError::SchemaMismatch(cause) => {
                // 운영자가 바로 조치할 수 있도록 마이그레이션 안내를 포함
                tracing::error!("Schema mismatch: {}", cause);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SCHEMA_MISMATCH",
                    "Database schema does not match the application".to_string(),
                    Some(MIGRATION_HINT.to_string()),
                )
            }
            ApiError::DatabaseError(_) => {
                // 내부 에러는 클라이언트에 상세 정보 노출 안 함
                tracing::error!("Database error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
            ApiError::InternalError => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// 스키마 불일치 판별 (SQLSTATE 우선, 메시지 문자열 보조)
fn is_schema_mismatch(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code()
                .map_or(false, |code| SCHEMA_ERROR_CODES.iter().any(|c| code == *c))
                || db.message().contains("does not exist")
        }
        sqlx::Error::ColumnNotFound(_) => true,
        _ => false,
    }
}

/// SQLx 에러를 ApiError로 변환
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if is_schema_mismatch(&err) {
            return ApiError::SchemaMismatch(err.to_string());
        }
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return ApiError::Conflict(db.message().to_string());
            }
        }
        tracing::error!("SQLx error: {:?}", err);
        ApiError::DatabaseError(err.to_string())
    }
}

/// anyhow 에러를 ApiError로 변환
///
/// Store 구현체의 에러는 anyhow로 감싸져 있으므로 원인 타입으로 분류
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(StoreError::Conflict(what)) = err.downcast_ref::<StoreError>() {
            return ApiError::Conflict(what.clone());
        }
        match err.downcast::<sqlx::Error>() {
            Ok(sqlx_err) => ApiError::from(sqlx_err),
            Err(err) => {
                tracing::error!("Anyhow error: {:?}", err);
                ApiError::InternalError
            }
        }
    }
}

impl From<VoucherError> for ApiError {
    fn from(err: VoucherError) -> Self {
        match err {
            VoucherError::Invalid => ApiError::VoucherInvalid,
            VoucherError::Store(e) => ApiError::from(e),
        }
    }
}

impl From<VoucherInputError> for ApiError {
    fn from(err: VoucherInputError) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::Validation(msg) => ApiError::ValidationError(msg),
            CheckoutError::ProductUnavailable(id) => {
                ApiError::ValidationError(format!("product {} is not available", id))
            }
            CheckoutError::Voucher(e) => ApiError::from(e),
            CheckoutError::Store(e) => ApiError::from(e),
        }
    }
}

impl From<StatusError> for ApiError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::NotFound => ApiError::NotFound("Order".to_string()),
            e @ StatusError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
            StatusError::Store(e) => ApiError::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_conflict_maps_to_409() {
        let err: anyhow::Error = StoreError::Conflict("voucher code HEMAT10".to_string()).into();
        let api: ApiError = err.into();
        assert!(matches!(api, ApiError::Conflict(_)));
        assert_eq!(api.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_column_not_found_is_schema_mismatch() {
        let err: anyhow::Error = sqlx::Error::ColumnNotFound("cost_price".to_string()).into();
        let api: ApiError = err.into();
        assert!(matches!(api, ApiError::SchemaMismatch(_)));
    }

    #[test]
    fn test_voucher_invalid_maps_to_422() {
        let api = ApiError::from(VoucherError::Invalid);
        assert_eq!(api.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_unknown_error_is_internal() {
        let api = ApiError::from(anyhow::anyhow!("boom"));
        assert!(matches!(api, ApiError::InternalError));
    }
}
