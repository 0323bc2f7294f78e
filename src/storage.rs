use chrono::Utc;
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};

pub const ACCESS_TOKEN_KEY: &str = "user_access_token";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("No data directory available")]
    NoDataDir,
    #[error("Local storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Local storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Small key/value table persisted on the device. A connection is opened
/// per call, so the handle is cheap to clone and share.
#[derive(Debug, Clone)]
pub struct KeyValueStore {
    path: PathBuf,
}

fn default_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "regattaboard", "RegattaBoard")?;
    Some(proj.data_dir().join("cache.sqlite"))
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl KeyValueStore {
    pub fn open_default() -> Result<Self, StorageError> {
        let path = default_path().ok_or(StorageError::NoDataDir)?;
        Self::at(path)
    }

    pub fn at(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self { path: path.into() };
        ensure_dir(&store.path)?;
        store.open_conn()?;
        Ok(store)
    }

    fn open_conn(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(conn)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.open_conn()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.open_conn()?;
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value=excluded.value,
                updated_at=excluded.updated_at
            "#,
            params![key, value, Utc::now()],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.open_conn()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.get(ACCESS_TOKEN_KEY)
    }

    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.set(ACCESS_TOKEN_KEY, token)
    }

    pub fn clear_access_token(&self) -> Result<(), StorageError> {
        self.remove(ACCESS_TOKEN_KEY)
    }
}
