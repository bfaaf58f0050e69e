//! Schema migrations for the SQLite design store.
//!
//! The schema version lives in SQLite's `user_version` pragma. Entry `n` of
//! [`MIGRATIONS`] upgrades a database from version `n` to `n + 1`.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Result, StoreError};

/// Migration scripts in order.
const MIGRATIONS: &[&str] = &[
    // v1: one row per design, full document as JSON text. The scalar columns
    // duplicate document fields so listing never parses JSON.
    r#"
    CREATE TABLE designs (
        project_id    TEXT PRIMARY KEY,
        owner_id      TEXT NOT NULL,
        name          TEXT NOT NULL,
        access_level  TEXT NOT NULL,
        last_modified INTEGER NOT NULL,
        document      TEXT NOT NULL,
        created_at    INTEGER NOT NULL,
        updated_at    INTEGER NOT NULL
    );
    CREATE INDEX idx_designs_owner ON designs(owner_id, last_modified DESC);
    "#,
];

/// Schema version after all migrations.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let found: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if found > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database is at version {found}, newer than supported {CURRENT_VERSION}"
        )));
    }

    if found < CURRENT_VERSION {
        info!(from = found, to = CURRENT_VERSION, "migrating design store schema");
    }
    let tx = conn.transaction()?;
    for script in &MIGRATIONS[found as usize..] {
        tx.execute_batch(script)?;
    }
    // Pragmas take no bound parameters.
    tx.execute_batch(&format!("PRAGMA user_version = {CURRENT_VERSION}"))?;
    tx.commit()?;
    Ok(())
}
