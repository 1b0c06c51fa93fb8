use crate::error::{AppError, AppJson};
use crate::models::backup_record::{self, BackupKind, CreateBackupRequest};
use crate::services::generator;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;

pub fn router(_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_backups).post(create_backup))
        .route("/{id}", get(get_backup).delete(delete_backup))
        .route("/{id}/download", get(download_backup))
}

async fn create_backup(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<CreateBackupRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let record = generator::generate(
        state.clone(),
        body.tables,
        body.name,
        body.description,
        BackupKind::Manual,
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "success": true, "backup": record })),
    ))
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let catalog = state.catalog.clone();
    let records = tokio::task::spawn_blocking(move || {
        let conn = catalog.get()?;
        backup_record::find_all(&conn)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    Ok(Json(serde_json::json!({ "success": true, "backups": records })))
}

async fn get_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let catalog = state.catalog.clone();
    let id2 = id.clone();
    let record = tokio::task::spawn_blocking(move || {
        let conn = catalog.get()?;
        backup_record::find_by_id(&conn, &id2)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    match record {
        Some(r) => Ok(Json(serde_json::json!({ "success": true, "backup": r }))),
        None => Err(AppError::NotFound(format!("backup {} not found", id))),
    }
}

async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let catalog = state.catalog.clone();
    let id2 = id.clone();
    let deleted = tokio::task::spawn_blocking(move || {
        let conn = catalog.get()?;
        backup_record::delete(&conn, &id2)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    if !deleted {
        return Err(AppError::NotFound(format!("backup {} not found", id)));
    }

    // Release the artifact after the catalog row is gone
    let path = generator::artifact_path(&state.config, &id);
    tokio::spawn(async move {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove artifact {}: {}", path.display(), e);
        }
    });

    state
        .events
        .broadcast("backup:deleted", serde_json::json!({ "backupId": id }));

    Ok(Json(serde_json::json!({ "success": true, "deleted": id })))
}

async fn download_backup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let catalog = state.catalog.clone();
    let id2 = id.clone();
    let record = tokio::task::spawn_blocking(move || {
        let conn = catalog.get()?;
        backup_record::find_by_id(&conn, &id2)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??
    .ok_or_else(|| AppError::NotFound(format!("backup {} not found", id)))?;

    let path = generator::artifact_path(&state.config, &record.id);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::StorageFailure(format!("artifact read failed: {}", e)))?;

    // Keep the download name filesystem-safe
    let safe_name: String = record
        .name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/sql")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.sql\"", safe_name),
        )
        .body(Body::from(Bytes::from(bytes)))
        .map_err(|e| anyhow::anyhow!(e))?;

    Ok(response)
}
