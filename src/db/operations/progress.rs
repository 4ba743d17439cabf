//! Per-user progress ledger.
//!
//! Every mutation here is a single SQL statement so that concurrent pulses for the
//! same `(user, resource)` pair are serialized by the database rather than by
//! application code. Counters only ever move through `x = x + ?`.

use serde::{Deserialize, Serialize};
use sqlx::{Executor, Row, Sqlite};

use crate::db::operations::new_id;
use crate::db::DatabaseProxy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::NotStarted,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceProgress {
    pub id: String,
    pub user_id: String,
    pub resource_id: String,
    pub watch_time_seconds: i64,
    pub last_position_seconds: i64,
    pub completed: bool,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleProgress {
    pub id: String,
    pub user_id: String,
    pub module_id: String,
    pub status: ModuleStatus,
    pub started_at: Option<i64>,
    pub last_accessed: i64,
    pub completed_at: Option<i64>,
}

pub async fn ensure_resource_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    resource_id: &str,
    now_ms: i64,
) -> Result<ResourceProgress, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "resource_progress" ("id", "user_id", "resource_id", "updated_at")
        VALUES (?, ?, ?, ?)
        ON CONFLICT ("user_id", "resource_id") DO NOTHING
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(resource_id)
    .bind(now_ms)
    .execute(proxy.pool())
    .await?;

    get_resource_progress(proxy, user_id, resource_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn get_resource_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    resource_id: &str,
) -> Result<Option<ResourceProgress>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "resource_progress" WHERE "user_id" = ? AND "resource_id" = ? LIMIT 1"#,
    )
    .bind(user_id)
    .bind(resource_id)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(row.map(|r| map_resource_progress(&r)))
}

/// Atomic `watch_time += delta`. A delta that would overflow the counter is
/// refused and reported as `false`.
pub async fn increment_watch_time(
    proxy: &DatabaseProxy,
    user_id: &str,
    resource_id: &str,
    delta_seconds: i64,
    now_ms: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "resource_progress"
        SET "watch_time_seconds" = "watch_time_seconds" + ?, "updated_at" = ?
        WHERE "user_id" = ? AND "resource_id" = ?
          AND "watch_time_seconds" <= 9223372036854775807 - ?
        "#,
    )
    .bind(delta_seconds)
    .bind(now_ms)
    .bind(user_id)
    .bind(resource_id)
    .bind(delta_seconds)
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn set_watch_time(
    proxy: &DatabaseProxy,
    user_id: &str,
    resource_id: &str,
    watch_time_seconds: i64,
    now_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "resource_progress"
        SET "watch_time_seconds" = ?, "updated_at" = ?
        WHERE "user_id" = ? AND "resource_id" = ?
        "#,
    )
    .bind(watch_time_seconds)
    .bind(now_ms)
    .bind(user_id)
    .bind(resource_id)
    .execute(proxy.pool())
    .await?;
    Ok(())
}

pub async fn set_last_position(
    proxy: &DatabaseProxy,
    user_id: &str,
    resource_id: &str,
    position_seconds: i64,
    now_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "resource_progress"
        SET "last_position_seconds" = ?, "updated_at" = ?
        WHERE "user_id" = ? AND "resource_id" = ?
        "#,
    )
    .bind(position_seconds)
    .bind(now_ms)
    .bind(user_id)
    .bind(resource_id)
    .execute(proxy.pool())
    .await?;
    Ok(())
}

/// Returns `true` only for the call that flipped the flag; `completed_at` is
/// never rewritten afterwards.
pub async fn mark_resource_completed(
    proxy: &DatabaseProxy,
    user_id: &str,
    resource_id: &str,
    now_ms: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "resource_progress"
        SET "completed" = 1, "completed_at" = ?, "updated_at" = ?
        WHERE "user_id" = ? AND "resource_id" = ? AND "completed" = 0
        "#,
    )
    .bind(now_ms)
    .bind(now_ms)
    .bind(user_id)
    .bind(resource_id)
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn count_completed_resources(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM "resource_progress" rp
        JOIN "resources" r ON r."id" = rp."resource_id"
        WHERE rp."user_id" = ? AND r."module_id" = ? AND rp."completed" = 1
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .fetch_one(proxy.pool())
    .await
}

pub async fn ensure_module_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
    now_ms: i64,
) -> Result<ModuleProgress, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "module_progress" ("id", "user_id", "module_id", "status", "last_accessed")
        VALUES (?, ?, ?, 'not_started', ?)
        ON CONFLICT ("user_id", "module_id") DO NOTHING
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(module_id)
    .bind(now_ms)
    .execute(proxy.pool())
    .await?;

    get_module_progress(proxy, user_id, module_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn get_module_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
) -> Result<Option<ModuleProgress>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "module_progress" WHERE "user_id" = ? AND "module_id" = ? LIMIT 1"#,
    )
    .bind(user_id)
    .bind(module_id)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(row.map(|r| map_module_progress(&r)))
}

/// First touch moves `not_started` to `in_progress`; later touches only refresh
/// `last_accessed`. A completed module keeps its status.
pub async fn touch_module_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
    now_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "module_progress"
        SET "status" = CASE WHEN "status" = 'not_started' THEN 'in_progress' ELSE "status" END,
            "started_at" = COALESCE("started_at", ?),
            "last_accessed" = ?
        WHERE "user_id" = ? AND "module_id" = ?
        "#,
    )
    .bind(now_ms)
    .bind(now_ms)
    .bind(user_id)
    .bind(module_id)
    .execute(proxy.pool())
    .await?;
    Ok(())
}

/// Guarded terminal transition. Returns `true` only for the caller whose update
/// moved the row into `completed`.
pub async fn mark_module_completed<'e, E>(
    executor: E,
    user_id: &str,
    module_id: &str,
    now_ms: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE "module_progress"
        SET "status" = 'completed',
            "completed_at" = ?,
            "started_at" = COALESCE("started_at", ?),
            "last_accessed" = ?
        WHERE "user_id" = ? AND "module_id" = ? AND "status" != 'completed'
        "#,
    )
    .bind(now_ms)
    .bind(now_ms)
    .bind(now_ms)
    .bind(user_id)
    .bind(module_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn list_all_module_progress(proxy: &DatabaseProxy) -> Result<Vec<ModuleProgress>, sqlx::Error> {
    let rows = sqlx::query(r#"SELECT * FROM "module_progress" ORDER BY "user_id", "module_id""#)
        .fetch_all(proxy.pool())
        .await?;
    Ok(rows.iter().map(map_module_progress).collect())
}

/// Resource progress rows whose user has no progress row for the owning module.
pub async fn count_orphan_resource_progress(proxy: &DatabaseProxy) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM "resource_progress" rp
        JOIN "resources" r ON r."id" = rp."resource_id"
        WHERE NOT EXISTS (
            SELECT 1 FROM "module_progress" mp
            WHERE mp."user_id" = rp."user_id" AND mp."module_id" = r."module_id"
        )
        "#,
    )
    .fetch_one(proxy.pool())
    .await
}

fn map_resource_progress(row: &sqlx::sqlite::SqliteRow) -> ResourceProgress {
    ResourceProgress {
        id: row.try_get("id").unwrap_or_default(),
        user_id: row.try_get("user_id").unwrap_or_default(),
        resource_id: row.try_get("resource_id").unwrap_or_default(),
        watch_time_seconds: row.try_get("watch_time_seconds").unwrap_or(0),
        last_position_seconds: row.try_get("last_position_seconds").unwrap_or(0),
        completed: row.try_get("completed").unwrap_or(false),
        completed_at: row.try_get("completed_at").ok().flatten(),
        updated_at: row.try_get("updated_at").unwrap_or(0),
    }
}

fn map_module_progress(row: &sqlx::sqlite::SqliteRow) -> ModuleProgress {
    let status: String = row.try_get("status").unwrap_or_default();
    ModuleProgress {
        id: row.try_get("id").unwrap_or_default(),
        user_id: row.try_get("user_id").unwrap_or_default(),
        module_id: row.try_get("module_id").unwrap_or_default(),
        status: ModuleStatus::parse(&status),
        started_at: row.try_get("started_at").ok().flatten(),
        last_accessed: row.try_get("last_accessed").unwrap_or(0),
        completed_at: row.try_get("completed_at").ok().flatten(),
    }
}
