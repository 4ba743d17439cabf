pub mod config;
pub mod operations;
pub mod schema;

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::db::config::DbConfig;

#[derive(Clone)]
pub struct DatabaseProxy {
    pool: SqlitePool,
}

impl DatabaseProxy {
    pub async fn from_env() -> Result<Arc<Self>, DbInitError> {
        Self::connect(DbConfig::from_env()).await
    }

    pub async fn connect(config: DbConfig) -> Result<Arc<Self>, DbInitError> {
        let sqlite = &config.sqlite;

        if let Some(parent) = sqlite.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&sqlite.path)
            .create_if_missing(true)
            .journal_mode(sqlite.journal_mode.to_sqlx())
            .synchronous(sqlite.synchronous.to_sqlx())
            .busy_timeout(sqlite.busy_timeout)
            .foreign_keys(sqlite.foreign_keys);

        let pool = SqlitePoolOptions::new()
            .max_connections(sqlite.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        schema::run_migrations(&pool).await?;

        tracing::info!(
            path = %sqlite.path.display(),
            max_connections = sqlite.max_connections,
            "ledger database ready"
        );

        Ok(Arc::new(Self { pool }))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip latency of a trivial query, or `None` when the pool cannot answer
    /// within `timeout`.
    pub async fn ping(&self, timeout: Duration) -> Option<Duration> {
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(&self.pool)).await;
        match result {
            Ok(Ok(_)) => Some(started.elapsed()),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "database ping failed");
                None
            }
            Err(_) => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
