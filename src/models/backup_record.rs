use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Manual,
    Automatic,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Manual => "manual",
            BackupKind::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    InProgress,
    Completed,
    Failed,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::InProgress => "in_progress",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "completed" => BackupStatus::Completed,
            "failed" => BackupStatus::Failed,
            _ => BackupStatus::InProgress,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub tables_included: Vec<String>,
    pub size_bytes: i64,
    pub kind: BackupKind,
    pub status: BackupStatus,
    pub error: Option<String>,
    pub created_at: String,
}

impl BackupRecord {
    /// A fresh in-progress record. Ids are assigned exactly once, here.
    pub fn new(
        name: String,
        description: Option<String>,
        tables: Vec<String>,
        kind: BackupKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            description,
            tables_included: tables,
            size_bytes: 0,
            kind,
            status: BackupStatus::InProgress,
            error: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    pub tables: Vec<String>,
    pub name: String,
    pub description: Option<String>,
}

fn row_to_record(row: &Row) -> rusqlite::Result<BackupRecord> {
    let tables_json: String = row.get("tables_included")?;
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    Ok(BackupRecord {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        tables_included: serde_json::from_str(&tables_json).unwrap_or_default(),
        size_bytes: row.get("size_bytes")?,
        kind: if kind == "automatic" {
            BackupKind::Automatic
        } else {
            BackupKind::Manual
        },
        status: BackupStatus::from_str(&status),
        error: row.get("error")?,
        created_at: row.get("created_at")?,
    })
}

/// Insert fails on a duplicate id: the primary key makes ids assign-once.
pub fn insert(conn: &Connection, record: &BackupRecord) -> anyhow::Result<()> {
    let tables_json = serde_json::to_string(&record.tables_included)?;
    conn.execute(
        "INSERT INTO backups (id, name, description, tables_included, size_bytes, kind, status, error, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.id,
            record.name,
            record.description,
            tables_json,
            record.size_bytes,
            record.kind.as_str(),
            record.status.as_str(),
            record.error,
            record.created_at,
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backups WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_record(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

/// Newest first, ties broken by id so the order is stable.
pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<BackupRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backups ORDER BY created_at DESC, id DESC")?;
    let rows = stmt.query_map([], |row| row_to_record(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Only an in-progress record can complete; terminal statuses never change.
pub fn mark_completed(conn: &Connection, id: &str, size_bytes: i64) -> anyhow::Result<bool> {
    let changes = conn.execute(
        "UPDATE backups SET status = 'completed', size_bytes = ?
         WHERE id = ? AND status = 'in_progress'",
        params![size_bytes, id],
    )?;
    Ok(changes > 0)
}

pub fn mark_failed(conn: &Connection, id: &str, error: &str) -> anyhow::Result<bool> {
    let changes = conn.execute(
        "UPDATE backups SET status = 'failed', error = ?
         WHERE id = ? AND status = 'in_progress'",
        params![error, id],
    )?;
    Ok(changes > 0)
}

pub fn delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changes = conn.execute("DELETE FROM backups WHERE id = ?", params![id])?;
    Ok(changes > 0)
}
