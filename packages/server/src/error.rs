use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::blobs::BlobError;
use common::generation::PromptError;
use common::storage::StorageError;
use common::store::StoreError;
use sea_orm::DbErr;
use serde::Serialize;

/// Structured error response returned by all endpoints on failure.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code. One of: `VALIDATION_ERROR`, `TOKEN_MISSING`,
    /// `TOKEN_INVALID`, `PERMISSION_DENIED`, `NOT_FOUND`, `CONFLICT`,
    /// `STORAGE_ERROR`, `INTERNAL_ERROR`.
    #[schema(example = "VALIDATION_ERROR")]
    pub code: &'static str,
    /// Human-readable error description.
    #[schema(example = "Prompt must not be empty")]
    pub message: String,
}

/// Application-level error type.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    TokenMissing,
    TokenInvalid,
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    Storage(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message: msg,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Authentication required".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "You do not own this resource".into(),
                },
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message: msg,
                },
            ),
            AppError::Conflict(msg) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message: msg,
                },
            ),
            AppError::Storage(detail) => {
                tracing::error!("Storage error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "STORAGE_ERROR",
                        message: "Blob storage is unavailable".into(),
                    },
                )
            }
            AppError::Internal(detail) => {
                tracing::error!("Internal error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "An unexpected error occurred".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<PromptError> for AppError {
    fn from(err: PromptError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(r) => AppError::NotFound(format!("Blob {r} not found")),
            BlobError::NotOwner(_) => AppError::PermissionDenied,
            BlobError::NotUploaded(r) => {
                AppError::Validation(format!("Blob {r} has not been uploaded yet"))
            }
            BlobError::AlreadyUploaded(r) => {
                AppError::Conflict(format!("Blob {r} was already uploaded"))
            }
            BlobError::AlreadyAttached(r) => {
                AppError::Conflict(format!("Blob {r} is already used by a generation"))
            }
            e @ BlobError::UnsupportedContentType(_) => AppError::Validation(e.to_string()),
            BlobError::Storage(StorageError::SizeLimitExceeded { actual, limit }) => {
                AppError::Validation(format!(
                    "Upload of {actual} bytes exceeds the {limit} byte limit"
                ))
            }
            BlobError::Storage(e) => AppError::Storage(e.to_string()),
            BlobError::Index(e) => AppError::Internal(e),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidCursor(c) => AppError::Validation(format!("Invalid cursor: {c}")),
            StoreError::Duplicate(id) => AppError::Conflict(format!("Generation {id} exists")),
            other => AppError::Internal(other.to_string()),
        }
    }
}
