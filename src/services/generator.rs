//! Backup generation: a deterministic SQL dump of selected store tables,
//! written to the artifacts directory and recorded in the catalog.
//!
//! The record goes in as `in_progress` before any work happens, so a failed
//! generation stays visible in the catalog instead of vanishing.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::models::backup_record::{self, BackupKind, BackupRecord};
use crate::state::AppState;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

pub fn artifact_path(config: &AppConfig, backup_id: &str) -> PathBuf {
    config.artifacts_dir.join(format!("{}.sql", backup_id))
}

/// Tables available for backup: everything in the store except SQLite
/// internals and protected namespaces.
pub fn known_tables(conn: &Connection) -> anyhow::Result<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows
        .filter_map(|r| r.ok())
        .filter(|name| !crate::services::sql_guard::is_protected(name))
        .collect())
}

fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".into(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => format!("{}", f),
        ValueRef::Text(t) => format!(
            "'{}'",
            String::from_utf8_lossy(t).replace('\'', "''")
        ),
        ValueRef::Blob(b) => {
            let mut s = String::with_capacity(b.len() * 2 + 3);
            s.push_str("X'");
            for byte in b {
                s.push_str(&format!("{:02x}", byte));
            }
            s.push('\'');
            s
        }
    }
}

/// Serialize the given tables to a single SQL script.
///
/// Output is byte-identical for unchanged data: tables come out sorted by
/// identifier (a BTreeSet guarantees it), rows ordered by rowid, and nothing
/// time- or environment-dependent is emitted.
pub fn dump_tables(conn: &Connection, tables: &BTreeSet<String>) -> anyhow::Result<String> {
    let mut out = String::new();

    for table in tables {
        let ddl: Option<String> = conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
                |row| row.get(0),
            )
            .ok();
        let ddl = ddl.ok_or_else(|| anyhow::anyhow!("no DDL found for table {}", table))?;

        out.push_str(&format!("-- {}\n", table));
        out.push_str(&format!("DROP TABLE IF EXISTS \"{}\";\n", table));
        out.push_str(&ddl);
        out.push_str(";\n");

        let mut col_stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table))?;
        let columns: Vec<String> = col_stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .filter_map(|r| r.ok())
            .collect();

        let column_list = columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        let select_list = columns
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut row_stmt = conn.prepare(&format!(
            "SELECT {} FROM \"{}\" ORDER BY rowid",
            select_list, table
        ))?;
        let mut rows = row_stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(sql_literal(row.get_ref(i)?));
            }
            out.push_str(&format!(
                "INSERT INTO \"{}\" ({}) VALUES ({});\n",
                table,
                column_list,
                values.join(", ")
            ));
        }
        out.push('\n');
    }

    Ok(out)
}

/// Generate a backup of `tables` and return the completed record.
///
/// Fails with `InvalidInput` before anything is written if the request names
/// an unknown table; fails with `StorageFailure` (record retained, tagged
/// failed) if the dump or the artifact write goes wrong.
pub async fn generate(
    state: Arc<AppState>,
    tables: Vec<String>,
    name: String,
    description: Option<String>,
    kind: BackupKind,
) -> Result<BackupRecord, AppError> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput("name is required".into()));
    }
    if tables.is_empty() {
        return Err(AppError::InvalidInput("tables must not be empty".into()));
    }

    let requested: BTreeSet<String> = tables.into_iter().collect();

    let store = state.store.clone();
    let known = tokio::task::spawn_blocking(move || {
        let conn = store.get()?;
        known_tables(&conn)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    if let Some(unknown) = requested.iter().find(|t| !known.contains(*t)) {
        return Err(AppError::InvalidInput(format!("unknown table: {}", unknown)));
    }

    let _permit = state
        .generation_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let record = BackupRecord::new(
        name,
        description,
        requested.iter().cloned().collect(),
        kind,
    );

    let catalog = state.catalog.clone();
    let rec = record.clone();
    tokio::task::spawn_blocking(move || {
        let conn = catalog.get()?;
        backup_record::insert(&conn, &rec)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    state.events.broadcast(
        "backup:created",
        serde_json::json!({ "backupId": record.id, "name": record.name }),
    );

    match build_and_store(&state, &record, &requested).await {
        Ok(size_bytes) => {
            let catalog = state.catalog.clone();
            let id = record.id.clone();
            let changed = tokio::task::spawn_blocking(move || {
                let conn = catalog.get()?;
                backup_record::mark_completed(&conn, &id, size_bytes)
            })
            .await
            .map_err(|e| anyhow::anyhow!(e))??;
            if !changed {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "backup {} was not in progress at completion",
                    record.id
                )));
            }

            state.events.broadcast(
                "backup:completed",
                serde_json::json!({ "backupId": record.id, "sizeBytes": size_bytes }),
            );

            let catalog = state.catalog.clone();
            let id = record.id.clone();
            let completed = tokio::task::spawn_blocking(move || {
                let conn = catalog.get()?;
                backup_record::find_by_id(&conn, &id)
            })
            .await
            .map_err(|e| anyhow::anyhow!(e))??;
            completed.ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("backup {} vanished from catalog", record.id))
            })
        }
        Err(e) => {
            tracing::error!(backup_id = %record.id, "Backup generation failed: {e:#}");
            let catalog = state.catalog.clone();
            let id = record.id.clone();
            let err_text = format!("{e:#}");
            let marked = tokio::task::spawn_blocking(move || {
                let conn = catalog.get()?;
                backup_record::mark_failed(&conn, &id, &err_text)
            })
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r);
            if let Err(mark_err) = marked {
                tracing::warn!(backup_id = %record.id, "Failed to mark backup failed: {mark_err}");
            }

            state.events.broadcast(
                "backup:failed",
                serde_json::json!({ "backupId": record.id }),
            );

            Err(AppError::StorageFailure(format!(
                "backup {} failed: {e:#}",
                record.id
            )))
        }
    }
}

async fn build_and_store(
    state: &AppState,
    record: &BackupRecord,
    tables: &BTreeSet<String>,
) -> anyhow::Result<i64> {
    let store = state.store.clone();
    let tables = tables.clone();
    let dump = tokio::task::spawn_blocking(move || {
        let conn = store.get()?;
        dump_tables(&conn, &tables)
    })
    .await
    .map_err(|e| anyhow::anyhow!(e))??;

    let path = artifact_path(&state.config, &record.id);
    tokio::fs::write(&path, dump.as_bytes()).await?;

    Ok(dump.len() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backup_record::BackupStatus;
    use crate::state::test_util::{seed_store, test_state};

    #[tokio::test]
    async fn nightly_backup_completes_with_real_size() {
        let (_dir, state) = test_state();
        seed_store(&state);

        let record = generate(
            state.clone(),
            vec!["users".into(), "clients".into()],
            "Nightly".into(),
            None,
            BackupKind::Manual,
        )
        .await
        .unwrap();

        assert_eq!(record.status, BackupStatus::Completed);
        assert_eq!(record.tables_included, vec!["clients", "users"]);
        assert!(record.size_bytes > 0);

        let artifact = tokio::fs::read(artifact_path(&state.config, &record.id))
            .await
            .unwrap();
        assert_eq!(artifact.len() as i64, record.size_bytes);
    }

    #[tokio::test]
    async fn repeated_generation_is_byte_identical() {
        let (_dir, state) = test_state();
        seed_store(&state);

        let a = generate(
            state.clone(),
            vec!["clients".into(), "users".into()],
            "first".into(),
            None,
            BackupKind::Manual,
        )
        .await
        .unwrap();
        let b = generate(
            state.clone(),
            vec!["users".into(), "clients".into()],
            "second".into(),
            None,
            BackupKind::Manual,
        )
        .await
        .unwrap();

        let bytes_a = tokio::fs::read(artifact_path(&state.config, &a.id)).await.unwrap();
        let bytes_b = tokio::fs::read(artifact_path(&state.config, &b.id)).await.unwrap();
        assert_eq!(bytes_a, bytes_b);
    }

    #[tokio::test]
    async fn unknown_table_is_invalid_input() {
        let (_dir, state) = test_state();
        seed_store(&state);

        let err = generate(
            state.clone(),
            vec!["users".into(), "no_such_table".into()],
            "bad".into(),
            None,
            BackupKind::Manual,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        // Nothing was recorded for the rejected request
        let conn = state.catalog.get().unwrap();
        assert!(backup_record::find_all(&conn).unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_table_set_is_invalid_input() {
        let (_dir, state) = test_state();
        let err = generate(state.clone(), vec![], "x".into(), None, BackupKind::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
