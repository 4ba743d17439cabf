use serde::Serialize;
use sqlx::Row;

use crate::db::operations::new_id;
use crate::db::DatabaseProxy;

#[derive(Debug, Clone, Serialize)]
pub struct LearningSession {
    pub id: String,
    pub user_id: String,
    pub module_id: Option<String>,
    pub start_time: i64,
    pub last_ping_at: i64,
    pub focus_duration_seconds: i64,
}

/// Inserts a fresh session unless one for the same scope was pinged at or after
/// `live_since_ms`. The existence check and the insert run as one statement, so
/// concurrent first pulses cannot each open their own session.
pub async fn open_session_if_idle(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: Option<&str>,
    live_since_ms: i64,
    now_ms: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO "learning_sessions"
            ("id", "user_id", "module_id", "start_time", "last_ping_at", "focus_duration_seconds")
        SELECT ?, ?, ?, ?, ?, 0
        WHERE NOT EXISTS (
            SELECT 1 FROM "learning_sessions"
            WHERE "user_id" = ?
              AND (? IS NULL OR "module_id" = ?)
              AND "last_ping_at" >= ?
        )
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(module_id)
    .bind(now_ms)
    .bind(now_ms)
    .bind(user_id)
    .bind(module_id)
    .bind(module_id)
    .bind(live_since_ms)
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn find_live_session(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: Option<&str>,
    live_since_ms: i64,
) -> Result<Option<LearningSession>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT * FROM "learning_sessions"
        WHERE "user_id" = ?
          AND (? IS NULL OR "module_id" = ?)
          AND "last_ping_at" >= ?
        ORDER BY "last_ping_at" DESC, "start_time" DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(module_id)
    .bind(module_id)
    .bind(live_since_ms)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(row.map(|r| map_session(&r)))
}

pub async fn get_session(proxy: &DatabaseProxy, session_id: &str) -> Result<Option<LearningSession>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "learning_sessions" WHERE "id" = ? LIMIT 1"#)
        .bind(session_id)
        .fetch_optional(proxy.pool())
        .await?;
    Ok(row.map(|r| map_session(&r)))
}

/// Atomic `focus += delta`. `last_ping_at` only moves forward. Returns `false`
/// when the delta would overflow the counter and nothing was written.
pub async fn add_focus_seconds(
    proxy: &DatabaseProxy,
    session_id: &str,
    delta_seconds: i64,
    now_ms: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "learning_sessions"
        SET "focus_duration_seconds" = "focus_duration_seconds" + ?,
            "last_ping_at" = MAX("last_ping_at", ?)
        WHERE "id" = ?
          AND "focus_duration_seconds" <= 9223372036854775807 - ?
        "#,
    )
    .bind(delta_seconds)
    .bind(now_ms)
    .bind(session_id)
    .bind(delta_seconds)
    .execute(proxy.pool())
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn list_user_sessions(
    proxy: &DatabaseProxy,
    user_id: &str,
    limit: i64,
) -> Result<Vec<LearningSession>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "learning_sessions"
        WHERE "user_id" = ?
        ORDER BY "start_time" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(proxy.pool())
    .await?;
    Ok(rows.iter().map(map_session).collect())
}

pub async fn count_user_sessions(proxy: &DatabaseProxy, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "learning_sessions" WHERE "user_id" = ?"#)
        .bind(user_id)
        .fetch_one(proxy.pool())
        .await
}

fn map_session(row: &sqlx::sqlite::SqliteRow) -> LearningSession {
    LearningSession {
        id: row.try_get("id").unwrap_or_default(),
        user_id: row.try_get("user_id").unwrap_or_default(),
        module_id: row.try_get("module_id").ok().flatten(),
        start_time: row.try_get("start_time").unwrap_or(0),
        last_ping_at: row.try_get("last_ping_at").unwrap_or(0),
        focus_duration_seconds: row.try_get("focus_duration_seconds").unwrap_or(0),
    }
}
