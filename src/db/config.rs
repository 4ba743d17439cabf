use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{env_bool, env_u64};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub sqlite: SqliteConfig,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Self {
            sqlite: SqliteConfig::from_env(),
        }
    }

    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            sqlite: SqliteConfig {
                path: path.into(),
                ..SqliteConfig::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub path: PathBuf,
    pub journal_mode: SqliteJournalMode,
    pub synchronous: SqliteSynchronous,
    pub busy_timeout: Duration,
    pub foreign_keys: bool,
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/lms.db"),
            journal_mode: SqliteJournalMode::Wal,
            synchronous: SqliteSynchronous::Normal,
            busy_timeout: Duration::from_secs(30),
            foreign_keys: true,
            max_connections: 5,
        }
    }
}

impl SqliteConfig {
    fn from_env() -> Self {
        let defaults = Self::default();

        let raw_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/lms.db".to_string());
        let path = resolve_path_relative_to_manifest_dir(&raw_path);

        let journal_mode = std::env::var("SQLITE_JOURNAL_MODE")
            .ok()
            .as_deref()
            .and_then(SqliteJournalMode::parse)
            .unwrap_or(defaults.journal_mode);

        let synchronous = std::env::var("SQLITE_SYNCHRONOUS")
            .ok()
            .as_deref()
            .and_then(SqliteSynchronous::parse)
            .unwrap_or(defaults.synchronous);

        let busy_timeout = env_u64("SQLITE_BUSY_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.busy_timeout);

        let max_connections = env_u64("SQLITE_MAX_CONNECTIONS")
            .filter(|value| *value > 0)
            .map(|value| value as u32)
            .unwrap_or(defaults.max_connections);

        Self {
            path,
            journal_mode,
            synchronous,
            busy_timeout,
            foreign_keys: env_bool("SQLITE_FOREIGN_KEYS").unwrap_or(defaults.foreign_keys),
            max_connections,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteJournalMode {
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl SqliteJournalMode {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "WAL" => Some(Self::Wal),
            "DELETE" => Some(Self::Delete),
            "TRUNCATE" => Some(Self::Truncate),
            "MEMORY" => Some(Self::Memory),
            _ => None,
        }
    }

    pub fn to_sqlx(self) -> sqlx::sqlite::SqliteJournalMode {
        match self {
            Self::Wal => sqlx::sqlite::SqliteJournalMode::Wal,
            Self::Delete => sqlx::sqlite::SqliteJournalMode::Delete,
            Self::Truncate => sqlx::sqlite::SqliteJournalMode::Truncate,
            Self::Memory => sqlx::sqlite::SqliteJournalMode::Memory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteSynchronous {
    Off,
    Normal,
    Full,
}

impl SqliteSynchronous {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OFF" => Some(Self::Off),
            "NORMAL" => Some(Self::Normal),
            "FULL" => Some(Self::Full),
            _ => None,
        }
    }

    pub fn to_sqlx(self) -> sqlx::sqlite::SqliteSynchronous {
        match self {
            Self::Off => sqlx::sqlite::SqliteSynchronous::Off,
            Self::Normal => sqlx::sqlite::SqliteSynchronous::Normal,
            Self::Full => sqlx::sqlite::SqliteSynchronous::Full,
        }
    }
}

fn resolve_path_relative_to_manifest_dir(value: &str) -> PathBuf {
    let raw = Path::new(value);
    if raw.is_absolute() {
        return raw.to_path_buf();
    }
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn journal_mode_parse_is_case_insensitive() {
        assert_eq!(SqliteJournalMode::parse("wal"), Some(SqliteJournalMode::Wal));
        assert_eq!(SqliteJournalMode::parse(" DELETE "), Some(SqliteJournalMode::Delete));
        assert_eq!(SqliteJournalMode::parse("bogus"), None);
    }

    #[test]
    fn relative_paths_resolve_under_manifest_dir() {
        let resolved = resolve_path_relative_to_manifest_dir("data/x.db");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("data/x.db"));

        let absolute = resolve_path_relative_to_manifest_dir("/tmp/y.db");
        assert_eq!(absolute, PathBuf::from("/tmp/y.db"));
    }
}
