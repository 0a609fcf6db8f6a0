use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("enrolld.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS draft_store(
            wizard TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT,
            PRIMARY KEY(wizard, key)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_draft_store_wizard ON draft_store(wizard)",
        [],
    )?;

    Ok(conn)
}

pub fn draft_get_json(
    conn: &Connection,
    wizard: &str,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM draft_store WHERE wizard = ? AND key = ?",
            [wizard, key],
            |r| r.get(0),
        )
        .optional()?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    // A corrupted row must read as absent, not crash the wizard.
    Ok(serde_json::from_str(&raw).ok())
}

pub fn draft_set_json(
    conn: &Connection,
    wizard: &str,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO draft_store(wizard, key, value, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(wizard, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        (wizard, key, raw, now),
    )?;
    Ok(())
}

pub fn draft_delete(conn: &Connection, wizard: &str, key: &str) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM draft_store WHERE wizard = ? AND key = ?",
        [wizard, key],
    )?;
    Ok(())
}

/// Removes the listed keys in one statement so a caller never observes a
/// partially-cleared draft.
pub fn draft_clear_keys(conn: &Connection, wizard: &str, keys: &[&str]) -> anyhow::Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let placeholders = vec!["?"; keys.len()].join(", ");
    let sql = format!(
        "DELETE FROM draft_store WHERE wizard = ? AND key IN ({})",
        placeholders
    );
    let params = std::iter::once(wizard).chain(keys.iter().copied());
    conn.execute(&sql, rusqlite::params_from_iter(params))?;
    Ok(())
}
