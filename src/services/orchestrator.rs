//! Restore sequencing: validate, safety snapshot, transactional apply.
//!
//! Phases per operation: Validating -> SnapshotInProgress -> Applying ->
//! Completed | Failed. The safety snapshot is taken over the full table
//! catalog before any statement runs; a restore never proceeds without one.

use crate::error::AppError;
use crate::models::backup_record::{self, BackupKind};
use crate::models::restore::{RestorePhase, RestoreRequest, RestoreResult};
use crate::services::{generator, sql_guard};
use crate::state::AppState;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long a finished operation stays observable before it is pruned.
const TERMINAL_TTL: Duration = Duration::from_secs(3600);

/// Phase of each restore operation, kept for polling. Terminal entries stay
/// observable for a grace period and are then dropped so the map does not
/// grow for the life of the process.
pub struct RestoreTracker {
    ops: DashMap<String, (RestorePhase, Instant)>,
}

impl RestoreTracker {
    pub fn new() -> Self {
        Self { ops: DashMap::new() }
    }

    pub fn set(&self, operation_id: &str, phase: RestorePhase) {
        self.prune_terminal(TERMINAL_TTL);
        self.ops
            .insert(operation_id.to_string(), (phase, Instant::now()));
    }

    pub fn get(&self, operation_id: &str) -> Option<RestorePhase> {
        self.ops.get(operation_id).map(|entry| entry.0)
    }

    /// Drop Completed/Failed entries older than `ttl`; running operations are
    /// never pruned.
    pub fn prune_terminal(&self, ttl: Duration) {
        let now = Instant::now();
        self.ops.retain(|_, entry| {
            let (phase, updated_at) = *entry;
            !matches!(phase, RestorePhase::Completed | RestorePhase::Failed)
                || now.duration_since(updated_at) < ttl
        });
    }
}

impl Default for RestoreTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a restore call. `validate_only` requests stop after the
/// Validating phase and report the result either way.
#[derive(Debug)]
pub enum RestoreOutcome {
    Validated {
        valid: bool,
        reason: Option<String>,
        tables: Vec<String>,
    },
    Applied(RestoreResult),
}

async fn resolve_script(state: &AppState, request: &RestoreRequest) -> Result<String, AppError> {
    match (&request.backup_id, &request.sql_content) {
        (Some(backup_id), None) => {
            let catalog = state.catalog.clone();
            let id = backup_id.clone();
            let record = tokio::task::spawn_blocking(move || {
                let conn = catalog.get()?;
                backup_record::find_by_id(&conn, &id)
            })
            .await
            .map_err(|e| anyhow::anyhow!(e))??
            .ok_or_else(|| AppError::NotFound(format!("backup {} not found", backup_id)))?;

            let path = generator::artifact_path(&state.config, &record.id);
            tokio::fs::read_to_string(&path).await.map_err(|e| {
                AppError::StorageFailure(format!(
                    "artifact for backup {} unreadable: {}",
                    record.id, e
                ))
            })
        }
        (None, Some(sql)) => Ok(sql.clone()),
        _ => Err(AppError::InvalidInput(
            "exactly one of backupId or sqlContent is required".into(),
        )),
    }
}

/// Run a restore operation end to end.
///
/// Cancellation is honored between phases up to the moment Applying begins;
/// after that the operation runs to completion. The restore lock permit is an
/// RAII guard, so it is released on every exit path.
pub async fn run(
    state: Arc<AppState>,
    request: RestoreRequest,
    cancel: CancellationToken,
) -> Result<RestoreOutcome, AppError> {
    let operation_id = match &request.operation_id {
        Some(id) => {
            if state.restores.get(id).is_some() {
                return Err(AppError::InvalidInput(format!(
                    "operation id {} is already in use",
                    id
                )));
            }
            id.clone()
        }
        None => Uuid::new_v4().to_string(),
    };

    // Registered before any I/O so the operation is pollable from the start.
    state.restores.set(&operation_id, RestorePhase::Validating);
    tracing::info!(operation_id = %operation_id, validate_only = request.validate_only, "Restore requested");

    let script = match resolve_script(&state, &request).await {
        Ok(script) => script,
        Err(e) => {
            state.restores.set(&operation_id, RestorePhase::Failed);
            return Err(e);
        }
    };

    let validation = match sql_guard::validate(&script) {
        Ok(v) => v,
        Err(reason) => {
            state.restores.set(&operation_id, RestorePhase::Failed);
            if request.validate_only {
                return Ok(RestoreOutcome::Validated {
                    valid: false,
                    reason: Some(reason.to_string()),
                    tables: Vec::new(),
                });
            }
            state.events.broadcast(
                "restore:failed",
                serde_json::json!({ "operationId": operation_id, "reason": reason.to_string() }),
            );
            return Err(AppError::ValidationRejected(reason.to_string()));
        }
    };

    let tables_affected: Vec<String> = validation.tables.iter().cloned().collect();

    if request.validate_only {
        state.restores.set(&operation_id, RestorePhase::Completed);
        return Ok(RestoreOutcome::Validated {
            valid: true,
            reason: None,
            tables: tables_affected,
        });
    }

    // Exclusive restore lock, held through snapshot and apply.
    let _permit = match state.restore_lock.clone().try_acquire_owned() {
        Ok(p) => p,
        Err(_) => {
            state.restores.set(&operation_id, RestorePhase::Failed);
            return Err(AppError::LockContention(
                "a restore is already in progress".into(),
            ));
        }
    };

    if cancel.is_cancelled() {
        state.restores.set(&operation_id, RestorePhase::Failed);
        return Err(AppError::Cancelled("restore cancelled before snapshot".into()));
    }

    state
        .restores
        .set(&operation_id, RestorePhase::SnapshotInProgress);

    let store = state.store.clone();
    let full_catalog = tokio::task::spawn_blocking(move || {
        let conn = store.get()?;
        generator::known_tables(&conn)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    let snapshot = match generator::generate(
        state.clone(),
        full_catalog.into_iter().collect(),
        format!("Pre-restore snapshot {}", operation_id),
        Some("Automatic safety backup taken before restore".into()),
        BackupKind::Automatic,
    )
    .await
    {
        Ok(record) => record,
        Err(e) => {
            tracing::error!(operation_id = %operation_id, "Pre-restore snapshot failed: {e}");
            state.restores.set(&operation_id, RestorePhase::Failed);
            state.events.broadcast(
                "restore:failed",
                serde_json::json!({ "operationId": operation_id, "reason": "snapshot failed" }),
            );
            return Err(e);
        }
    };

    if cancel.is_cancelled() {
        state.restores.set(&operation_id, RestorePhase::Failed);
        return Err(AppError::Cancelled("restore cancelled before apply".into()));
    }

    // Point of no return: cancellation is ignored from here on.
    state.restores.set(&operation_id, RestorePhase::Applying);
    state.events.broadcast(
        "restore:applying",
        serde_json::json!({ "operationId": operation_id, "preRestoreBackupId": snapshot.id }),
    );

    let store = state.store.clone();
    let script_to_apply = script.clone();
    let apply = tokio::task::spawn_blocking(move || {
        let mut conn = store.get()?;
        // Dump artifacts drop and recreate tables; suspend FK checks for the
        // duration so drop order does not matter.
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        let result = (|| -> anyhow::Result<()> {
            let tx = conn.transaction()?;
            tx.execute_batch(&script_to_apply)?;
            tx.commit()?;
            Ok(())
        })();
        // The connection goes back to the pool; leaving FK checks off there
        // would affect every later borrower.
        if let Err(e) = conn.pragma_update(None, "foreign_keys", "ON") {
            tracing::warn!("Failed to re-enable foreign_keys after restore: {}", e);
        }
        result
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))?;

    if let Err(e) = apply {
        state.restores.set(&operation_id, RestorePhase::Failed);
        state.events.broadcast(
            "restore:failed",
            serde_json::json!({ "operationId": operation_id, "tables": tables_affected }),
        );
        return Err(AppError::ApplyFailure(format!(
            "restore rolled back (tables targeted: {}): {e:#}",
            tables_affected.join(", ")
        )));
    }

    state.restores.set(&operation_id, RestorePhase::Completed);
    let result = RestoreResult {
        success: true,
        operation_id: operation_id.clone(),
        pre_restore_backup_id: snapshot.id,
        restored_at: chrono::Utc::now().to_rfc3339(),
        tables_affected,
    };
    state.events.broadcast(
        "restore:completed",
        serde_json::json!({
            "operationId": result.operation_id,
            "preRestoreBackupId": result.pre_restore_backup_id,
        }),
    );
    tracing::info!(operation_id = %operation_id, "Restore completed");

    Ok(RestoreOutcome::Applied(result))
}
