use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    /// No snapshot has ever loaded; reads cannot be served at all.
    #[error("Transaction cache unavailable: {0}")]
    CacheUnavailable(anyhow::Error),

    /// A refresh is overdue or the last one failed; the previous snapshot
    /// still serves. Only surfaced to callers that demanded freshness.
    #[error("Transaction cache stale: {0}")]
    CacheStale(anyhow::Error),

    /// More than one persisted transaction matched an import candidate.
    #[error("Duplicate match ambiguous: {0} existing transactions matched")]
    DuplicateAmbiguous(usize),

    #[error("Transaction insert failed: {0}")]
    InsertFailed(anyhow::Error),

    /// Soft error: a cancelled import's artifact could not be removed.
    #[error("Artifact cleanup failed: {0}")]
    CleanupFailed(anyhow::Error),

    /// A read outside the authorized tenant set reached an enforcement
    /// boundary. Treated as a defect, never as a normal error path.
    #[error("Tenant isolation violation")]
    UnauthorizedTenantAccess,
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let (status, error_message, details) = match self {
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string(), None),
            AppError::InternalError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(format!("{:#?}", err)),
            ),
            AppError::ServiceUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable".to_string(),
                None,
            ),
            AppError::DatabaseError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                Some(err.to_string()),
            ),
            AppError::ConfigError(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
            ),
            AppError::CacheUnavailable(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Transaction cache unavailable".to_string(),
                Some(err.to_string()),
            ),
            AppError::CacheStale(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Transaction cache stale".to_string(),
                Some(err.to_string()),
            ),
            AppError::DuplicateAmbiguous(count) => (
                StatusCode::CONFLICT,
                format!("Duplicate match ambiguous: {} candidates", count),
                None,
            ),
            AppError::InsertFailed(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Transaction insert failed".to_string(),
                Some(err.to_string()),
            ),
            AppError::CleanupFailed(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Artifact cleanup failed".to_string(),
                Some(err.to_string()),
            ),
            // Never echo tenant identifiers back through an error body.
            AppError::UnauthorizedTenantAccess => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Tenant isolation violation".to_string(),
                None,
            ),
        };

        (
            status,
            Json(ErrorResponse {
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}
