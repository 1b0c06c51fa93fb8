use crate::error::{AppError, AppJson};
use crate::models::restore::RestoreRequest;
use crate::services::orchestrator::{self, RestoreOutcome};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(restore_database))
        .route("/{operation_id}", get(get_restore_phase))
}

async fn restore_database(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<RestoreRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    // HTTP callers have no cancellation path; the token exists for callers
    // that do (cancellation is only honored before apply begins).
    let outcome = orchestrator::run(state, body, CancellationToken::new()).await?;

    let payload = match outcome {
        RestoreOutcome::Validated { valid, reason, tables } => serde_json::json!({
            "success": true,
            "valid": valid,
            "reason": reason,
            "tables": tables,
        }),
        RestoreOutcome::Applied(result) => serde_json::json!({
            "success": true,
            "result": result,
        }),
    };

    Ok(Json(payload))
}

async fn get_restore_phase(
    State(state): State<Arc<AppState>>,
    Path(operation_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    match state.restores.get(&operation_id) {
        Some(phase) => Ok(Json(serde_json::json!({
            "success": true,
            "operationId": operation_id,
            "phase": phase,
        }))),
        None => Err(AppError::NotFound(format!(
            "restore operation {} not found",
            operation_id
        ))),
    }
}
