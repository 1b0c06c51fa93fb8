use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationRejected(String),

    #[error("{0}")]
    StorageFailure(String),

    #[error("{0}")]
    ApplyFailure(String),

    #[error("{0}")]
    LockContention(String),

    #[error("{0}")]
    Cancelled(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "invalid_input",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationRejected(_) => "validation_rejected",
            AppError::StorageFailure(_) => "storage_failure",
            AppError::ApplyFailure(_) => "apply_failure",
            AppError::LockContention(_) => "lock_contention",
            AppError::Cancelled(_) => "cancelled",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Json extractor whose rejections render through the AppError envelope.
///
/// The stock `Json` extractor answers malformed bodies with plain text;
/// every failure out of this service must carry `{success, error, kind}`.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(AppJson(value)),
            Err(rejection) => Err(AppError::InvalidInput(rejection.body_text())),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::InvalidInput(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::ValidationRejected(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            AppError::StorageFailure(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
            AppError::ApplyFailure(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
            AppError::LockContention(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Cancelled(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };
        let kind = self.kind();
        (status, Json(json!({ "success": false, "error": msg, "kind": kind }))).into_response()
    }
}
