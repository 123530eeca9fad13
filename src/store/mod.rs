use crate::errors::AppResult;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// String-keyed persistence consumed by the engine. Implementations never
/// surface errors to callers: failures are logged and reported as
/// `None`/`false`, so a storage outage degrades to stale data instead of a
/// crash.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> bool;
    fn remove(&self, key: &str) -> bool;
}

/// Durable store backed by a single-table sqlite database.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Option<String> {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => {
                tracing::error!(key, "store mutex poisoned");
                return None;
            }
        };
        match conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
        {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to read persisted value");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> bool {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => {
                tracing::error!(key, "store mutex poisoned");
                return false;
            }
        };
        let result = conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        );
        match result {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to persist value");
                false
            }
        }
    }

    fn remove(&self, key: &str) -> bool {
        let conn = match self.conn.lock() {
            Ok(conn) => conn,
            Err(_) => {
                tracing::error!(key, "store mutex poisoned");
                return false;
            }
        };
        match conn.execute("DELETE FROM kv WHERE key = ?1", params![key]) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to remove persisted value");
                false
            }
        }
    }
}

/// In-memory store with the same contract, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.entries.lock() {
            Ok(entries) => entries.get(key).cloned(),
            Err(_) => {
                tracing::error!(key, "memory store mutex poisoned");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.insert(key.to_string(), value.to_string());
                true
            }
            Err(_) => {
                tracing::error!(key, "memory store mutex poisoned");
                false
            }
        }
    }

    fn remove(&self, key: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.remove(key);
                true
            }
            Err(_) => {
                tracing::error!(key, "memory store mutex poisoned");
                false
            }
        }
    }
}
