//! Connection setup.

use std::fs;
use std::path::Path;

use log::info;
use rusqlite::Connection;

use crate::errors::{Result, StorageError};

const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA busy_timeout = 30000;
    PRAGMA synchronous  = NORMAL;
";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blobs (
        key        TEXT PRIMARY KEY NOT NULL,
        value      TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
";

/// Open (or create) the database file at `path` and apply the schema.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }

    let conn = Connection::open(path)
        .map_err(|e| StorageError::ConnectionFailed(format!("{}: {}", path.display(), e)))?;
    conn.execute_batch(PRAGMAS)?;
    conn.execute_batch(SCHEMA)?;
    info!("Opened blob store at {}", path.display());
    Ok(conn)
}

/// Private in-memory database with the schema applied.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()
        .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}
