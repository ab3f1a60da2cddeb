// src/store.rs

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use tracing::{debug, error, info};

use crate::errors::StoreError;
use crate::line_item::LineItemDraft;

/// Where the table's line items live between sessions. Every save fully
/// overwrites the previous value.
pub trait LineItemStore {
    fn load(&self) -> Result<Option<Vec<LineItemDraft>>, StoreError>;
    fn save(&self, rows: &[LineItemDraft]) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Single-key value store on SQLite; the line items are one JSON array
/// stored under a fixed key.
pub struct SqliteStore {
    conn: Connection,
    key: String,
}

impl SqliteStore {
    /// Open (or create) the store file, creating parent directories as needed.
    pub fn open<P: AsRef<Path>>(db_path: P, key: &str) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        info!(path = %db_path.display(), key = %key, "Store opened");
        Self::with_connection(conn, key)
    }

    /// Like [`SqliteStore::open`], but an unusable file falls back to an
    /// in-memory store so the table still works for this session.
    pub fn open_or_in_memory<P: AsRef<Path>>(db_path: P, key: &str) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();
        match Self::open(db_path, key) {
            Ok(store) => Ok(store),
            Err(e) => {
                error!(path = %db_path.display(), error = %e, "Store unusable, keeping data in memory");
                Self::in_memory(key)
            }
        }
    }

    pub fn in_memory(key: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, key)
    }

    fn with_connection(conn: Connection, key: &str) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(Self {
            conn,
            key: key.to_string(),
        })
    }

    /// Raw stored value, if any.
    pub fn raw(&self) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    #[cfg(test)]
    fn put_raw(&self, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![self.key, value],
        )?;
        Ok(())
    }
}

impl LineItemStore for SqliteStore {
    fn load(&self) -> Result<Option<Vec<LineItemDraft>>, StoreError> {
        let Some(value) = self.raw()? else {
            return Ok(None);
        };
        let rows: Vec<LineItemDraft> = serde_json::from_str(&value)?;
        debug!(rows = rows.len(), "Loaded line items");
        Ok(Some(rows))
    }

    fn save(&self, rows: &[LineItemDraft]) -> Result<(), StoreError> {
        let json = serde_json::to_string(rows)?;
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![self.key, json],
        )?;
        debug!(rows = rows.len(), "Saved line items");
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![self.key])?;
        info!(key = %self.key, "Stored line items removed");
        Ok(())
    }
}
