//! Screening of candidate restore scripts.
//!
//! Pure and deterministic: no I/O, no store access. Rejects destructive
//! statements and extracts the tables a script touches. The dialect is the
//! store's (SQLite); identifiers may be quoted with `"`, `` ` `` or `[`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

/// Namespaces the restore path must never truncate or delete from.
const PROTECTED_PREFIXES: &[&str] = &["auth.", "auth_", "storage.", "storage_", "sqlite_"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Empty or whitespace-only script.
    Empty,
    /// A statement matched the destructive denylist.
    Dangerous(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Empty => write!(f, "script has no content"),
            RejectReason::Dangerous(what) => {
                write!(f, "script contains a disallowed operation: {}", what)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// Tables referenced by INSERT/UPDATE/CREATE TABLE, de-duplicated.
    pub tables: BTreeSet<String>,
}

static DROP_DATABASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdrop\s+(?:database|schema)\b").unwrap());

static TRUNCATE_OR_DELETE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:truncate(?:\s+table)?|delete\s+from)\s+["`\[]?([A-Za-z_][A-Za-z0-9_$]*(?:\.[A-Za-z_][A-Za-z0-9_$]*)?)"#,
    )
    .unwrap()
});

static TABLE_REFS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(?:insert\s+into|update|create\s+table(?:\s+if\s+not\s+exists)?)\s+["`\[]?([A-Za-z_][A-Za-z0-9_$]*(?:\.[A-Za-z_][A-Za-z0-9_$]*)?)"#,
    )
    .unwrap()
});

/// Whether an identifier lives in a namespace the service never touches.
pub fn is_protected(identifier: &str) -> bool {
    let lowered = identifier.to_ascii_lowercase();
    PROTECTED_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

/// Validate a restore script.
///
/// Rejections distinguish an empty script from a dangerous one so callers can
/// report them separately. On acceptance the referenced table set comes back
/// ordered and de-duplicated.
pub fn validate(script: &str) -> Result<Validation, RejectReason> {
    if script.trim().is_empty() {
        return Err(RejectReason::Empty);
    }

    if let Some(m) = DROP_DATABASE.find(script) {
        return Err(RejectReason::Dangerous(m.as_str().to_string()));
    }

    for cap in TRUNCATE_OR_DELETE.captures_iter(script) {
        let target = &cap[1];
        if is_protected(target) {
            return Err(RejectReason::Dangerous(format!(
                "destructive statement against protected table {}",
                target.to_ascii_lowercase()
            )));
        }
    }

    let mut tables = BTreeSet::new();
    for cap in TABLE_REFS.captures_iter(script) {
        tables.insert(cap[1].to_ascii_lowercase());
    }

    Ok(Validation { tables })
}
