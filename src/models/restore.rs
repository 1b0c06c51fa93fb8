use serde::{Deserialize, Serialize};

/// Exactly one of `backup_id` / `sql_content` must be set; the orchestrator
/// rejects anything else before touching the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub backup_id: Option<String>,
    pub sql_content: Option<String>,
    #[serde(default)]
    pub validate_only: bool,
    /// Optional caller-chosen id, registered in the phase tracker before any
    /// work starts so the operation can be polled while it runs.
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    pub success: bool,
    pub operation_id: String,
    pub pre_restore_backup_id: String,
    pub restored_at: String,
    pub tables_affected: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Validating,
    SnapshotInProgress,
    Applying,
    Completed,
    Failed,
}
