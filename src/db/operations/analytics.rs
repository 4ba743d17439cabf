//! Read-side aggregates. Nothing here writes; manager views are computed from
//! committed ledger state on every call.

use serde::Serialize;
use sqlx::Row;

use crate::db::DatabaseProxy;

/// Raw per-learner counters over a `[window_start, now]` range.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearnerAggregates {
    pub last_session_start: Option<i64>,
    pub last_ping_at: Option<i64>,
    pub focus_seconds_in_window: i64,
    pub modules_completed: i64,
    pub modules_in_progress: i64,
    pub completions_in_window: i64,
    pub quiz_avg_in_window: Option<f64>,
    pub quiz_pass_count_in_window: i64,
    pub quiz_total_in_window: i64,
}

pub async fn load_learner_aggregates(
    proxy: &DatabaseProxy,
    user_id: &str,
    window_start_ms: i64,
    now_ms: i64,
) -> Result<LearnerAggregates, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT MAX("start_time") FROM "learning_sessions"
              WHERE "user_id" = ?1 AND "start_time" <= ?3) AS last_session_start,
            (SELECT MAX("last_ping_at") FROM "learning_sessions"
              WHERE "user_id" = ?1 AND "start_time" <= ?3) AS last_ping_at,
            (SELECT COALESCE(SUM("focus_duration_seconds"), 0) FROM "learning_sessions"
              WHERE "user_id" = ?1 AND "start_time" >= ?2 AND "start_time" <= ?3) AS focus_seconds,
            (SELECT COUNT(*) FROM "module_progress"
              WHERE "user_id" = ?1 AND "status" = 'completed') AS modules_completed,
            (SELECT COUNT(*) FROM "module_progress"
              WHERE "user_id" = ?1 AND "status" = 'in_progress') AS modules_in_progress,
            (SELECT COUNT(*) FROM "module_progress"
              WHERE "user_id" = ?1 AND "completed_at" >= ?2 AND "completed_at" <= ?3) AS completions_in_window,
            (SELECT AVG("score") FROM "quiz_attempts"
              WHERE "user_id" = ?1 AND "timestamp" >= ?2 AND "timestamp" <= ?3) AS quiz_avg,
            (SELECT COUNT(*) FROM "quiz_attempts"
              WHERE "user_id" = ?1 AND "timestamp" >= ?2 AND "timestamp" <= ?3 AND "passed" = 1) AS quiz_pass_count,
            (SELECT COUNT(*) FROM "quiz_attempts"
              WHERE "user_id" = ?1 AND "timestamp" >= ?2 AND "timestamp" <= ?3) AS quiz_total
        "#,
    )
    .bind(user_id)
    .bind(window_start_ms)
    .bind(now_ms)
    .fetch_one(proxy.pool())
    .await?;

    Ok(LearnerAggregates {
        last_session_start: row.try_get("last_session_start").ok().flatten(),
        last_ping_at: row.try_get("last_ping_at").ok().flatten(),
        focus_seconds_in_window: row.try_get("focus_seconds").unwrap_or(0),
        modules_completed: row.try_get("modules_completed").unwrap_or(0),
        modules_in_progress: row.try_get("modules_in_progress").unwrap_or(0),
        completions_in_window: row.try_get("completions_in_window").unwrap_or(0),
        quiz_avg_in_window: row.try_get("quiz_avg").ok().flatten(),
        quiz_pass_count_in_window: row.try_get("quiz_pass_count").unwrap_or(0),
        quiz_total_in_window: row.try_get("quiz_total").unwrap_or(0),
    })
}

pub async fn sum_focus_seconds(
    proxy: &DatabaseProxy,
    user_id: &str,
    since_ms: Option<i64>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COALESCE(SUM("focus_duration_seconds"), 0) FROM "learning_sessions"
        WHERE "user_id" = ? AND (? IS NULL OR "start_time" >= ?)
        "#,
    )
    .bind(user_id)
    .bind(since_ms)
    .bind(since_ms)
    .fetch_one(proxy.pool())
    .await
}

pub async fn user_quiz_scores(proxy: &DatabaseProxy, user_id: &str) -> Result<Vec<f64>, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT "score" FROM "quiz_attempts" WHERE "user_id" = ? ORDER BY "timestamp" ASC"#)
        .bind(user_id)
        .fetch_all(proxy.pool())
        .await
}

pub async fn count_failed_attempts(proxy: &DatabaseProxy, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "quiz_attempts" WHERE "user_id" = ? AND "passed" = 0"#)
        .bind(user_id)
        .fetch_one(proxy.pool())
        .await
}

/// Explicitly overdue rows plus open assignments whose due date has passed.
pub async fn count_overdue_assignments(proxy: &DatabaseProxy, user_id: &str, now_ms: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM "assignments"
        WHERE "user_id" = ?
          AND ("status" = 'overdue'
               OR ("status" != 'completed' AND "due_date" IS NOT NULL AND "due_date" < ?))
        "#,
    )
    .bind(user_id)
    .bind(now_ms)
    .fetch_one(proxy.pool())
    .await
}

/// Weighted action count in `[start, end)`: completed resources plus two per quiz attempt.
pub async fn count_weighted_actions(
    proxy: &DatabaseProxy,
    user_id: &str,
    start_ms: i64,
    end_ms: i64,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM "resource_progress"
              WHERE "user_id" = ?1 AND "completed" = 1
                AND "completed_at" >= ?2 AND "completed_at" < ?3) AS resources,
            (SELECT COUNT(*) FROM "quiz_attempts"
              WHERE "user_id" = ?1 AND "timestamp" >= ?2 AND "timestamp" < ?3) AS quizzes
        "#,
    )
    .bind(user_id)
    .bind(start_ms)
    .bind(end_ms)
    .fetch_one(proxy.pool())
    .await?;

    let resources: i64 = row.try_get("resources").unwrap_or(0);
    let quizzes: i64 = row.try_get("quizzes").unwrap_or(0);
    Ok(resources + quizzes * 2)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteStats {
    pub count: i64,
    pub last_update: Option<i64>,
}

/// Counts only; note bodies are never selected.
pub async fn note_stats(proxy: &DatabaseProxy, user_id: &str) -> Result<NoteStats, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT COUNT(*) AS count, MAX("updated_at") AS last_update FROM "notes" WHERE "user_id" = ?"#,
    )
    .bind(user_id)
    .fetch_one(proxy.pool())
    .await?;

    Ok(NoteStats {
        count: row.try_get("count").unwrap_or(0),
        last_update: row.try_get("last_update").ok().flatten(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentCounts {
    pub total: i64,
    pub with_submission: i64,
    pub graded: i64,
}

pub async fn user_assignment_counts(proxy: &DatabaseProxy, user_id: &str) -> Result<AssignmentCounts, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) AS total,
            COALESCE(SUM(CASE WHEN EXISTS (
                SELECT 1 FROM "submissions" s WHERE s."assignment_id" = a."id"
            ) THEN 1 ELSE 0 END), 0) AS with_submission,
            COALESCE(SUM(CASE WHEN EXISTS (
                SELECT 1 FROM "submissions" s WHERE s."assignment_id" = a."id" AND s."status" = 'graded'
            ) THEN 1 ELSE 0 END), 0) AS graded
        FROM "assignments" a
        WHERE a."user_id" = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(proxy.pool())
    .await?;

    Ok(AssignmentCounts {
        total: row.try_get("total").unwrap_or(0),
        with_submission: row.try_get("with_submission").unwrap_or(0),
        graded: row.try_get("graded").unwrap_or(0),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CurrentModule {
    pub module_id: String,
    pub title: String,
    pub status: String,
    pub last_accessed: i64,
}

pub async fn current_module(proxy: &DatabaseProxy, user_id: &str) -> Result<Option<CurrentModule>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT mp."module_id", m."title", mp."status", mp."last_accessed"
        FROM "module_progress" mp
        JOIN "modules" m ON m."id" = mp."module_id"
        WHERE mp."user_id" = ?
        ORDER BY mp."last_accessed" DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(proxy.pool())
    .await?;

    Ok(row.map(|r| CurrentModule {
        module_id: r.try_get("module_id").unwrap_or_default(),
        title: r.try_get("title").unwrap_or_default(),
        status: r.try_get("status").unwrap_or_default(),
        last_accessed: r.try_get("last_accessed").unwrap_or(0),
    }))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeamActivity {
    pub active_24h: i64,
    pub inactive_72h: i64,
    pub avg_session_focus_seconds: f64,
    pub avg_quiz_score: f64,
    pub total_assignments: i64,
    pub graded_assignments: i64,
}

pub async fn team_activity(proxy: &DatabaseProxy, now_ms: i64) -> Result<TeamActivity, sqlx::Error> {
    const HOUR_MS: i64 = 60 * 60 * 1000;
    let since_24h = now_ms - 24 * HOUR_MS;
    let since_72h = now_ms - 72 * HOUR_MS;
    let since_7d = now_ms - 7 * 24 * HOUR_MS;

    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(DISTINCT "user_id") FROM "learning_sessions"
              WHERE "last_ping_at" >= ?1) AS active_24h,
            (SELECT COUNT(*) FROM "module_progress"
              WHERE "last_accessed" < ?2) AS inactive_72h,
            (SELECT COALESCE(AVG("focus_duration_seconds"), 0.0) FROM "learning_sessions"
              WHERE "start_time" >= ?3) AS avg_focus,
            (SELECT COALESCE(AVG("score"), 0.0) FROM "quiz_attempts"
              WHERE "timestamp" >= ?3) AS avg_score,
            (SELECT COUNT(*) FROM "assignments") AS total_assignments,
            (SELECT COUNT(DISTINCT "assignment_id") FROM "submissions"
              WHERE "status" = 'graded') AS graded_assignments
        "#,
    )
    .bind(since_24h)
    .bind(since_72h)
    .bind(since_7d)
    .fetch_one(proxy.pool())
    .await?;

    Ok(TeamActivity {
        active_24h: row.try_get("active_24h").unwrap_or(0),
        inactive_72h: row.try_get("inactive_72h").unwrap_or(0),
        avg_session_focus_seconds: row.try_get("avg_focus").unwrap_or(0.0),
        avg_quiz_score: row.try_get("avg_score").unwrap_or(0.0),
        total_assignments: row.try_get("total_assignments").unwrap_or(0),
        graded_assignments: row.try_get("graded_assignments").unwrap_or(0),
    })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeamTotals {
    pub total_learners: i64,
    pub total_enrollments: i64,
    pub total_completions: i64,
    pub avg_quiz_score: f64,
    pub pending_submissions: i64,
    pub total_assignments: i64,
}

pub async fn team_totals(proxy: &DatabaseProxy) -> Result<TeamTotals, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM "users" WHERE "role" = 'learner') AS total_learners,
            (SELECT COUNT(*) FROM "module_progress") AS total_enrollments,
            (SELECT COUNT(*) FROM "module_progress" WHERE "status" = 'completed') AS total_completions,
            (SELECT COALESCE(AVG("score"), 0.0) FROM "quiz_attempts") AS avg_score,
            (SELECT COUNT(*) FROM "submissions" WHERE "status" = 'pending') AS pending_submissions,
            (SELECT COUNT(*) FROM "assignments") AS total_assignments
        "#,
    )
    .fetch_one(proxy.pool())
    .await?;

    Ok(TeamTotals {
        total_learners: row.try_get("total_learners").unwrap_or(0),
        total_enrollments: row.try_get("total_enrollments").unwrap_or(0),
        total_completions: row.try_get("total_completions").unwrap_or(0),
        avg_quiz_score: row.try_get("avg_score").unwrap_or(0.0),
        pending_submissions: row.try_get("pending_submissions").unwrap_or(0),
        total_assignments: row.try_get("total_assignments").unwrap_or(0),
    })
}

pub async fn completion_timestamps_since(proxy: &DatabaseProxy, since_ms: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT "completed_at" FROM "module_progress"
        WHERE "status" = 'completed' AND "completed_at" >= ?
        "#,
    )
    .bind(since_ms)
    .fetch_all(proxy.pool())
    .await
}

#[derive(Debug, Clone, Serialize)]
pub struct StuckLearner {
    pub id: String,
    pub username: String,
    pub module_title: String,
    pub last_accessed: i64,
}

pub async fn stuck_learners(proxy: &DatabaseProxy, threshold_ms: i64) -> Result<Vec<StuckLearner>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT u."id", u."username", m."title" AS module_title, mp."last_accessed"
        FROM "module_progress" mp
        JOIN "users" u ON u."id" = mp."user_id"
        JOIN "modules" m ON m."id" = mp."module_id"
        WHERE mp."status" = 'in_progress' AND mp."last_accessed" < ?
        ORDER BY mp."last_accessed" ASC
        "#,
    )
    .bind(threshold_ms)
    .fetch_all(proxy.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|r| StuckLearner {
            id: r.try_get("id").unwrap_or_default(),
            username: r.try_get("username").unwrap_or_default(),
            module_title: r.try_get("module_title").unwrap_or_default(),
            last_accessed: r.try_get("last_accessed").unwrap_or(0),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleEnrollment {
    pub module_id: String,
    pub title: String,
    pub enrollments: i64,
    pub completions: i64,
}

pub async fn module_enrollments(proxy: &DatabaseProxy) -> Result<Vec<ModuleEnrollment>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT m."id", m."title",
               COUNT(mp."id") AS enrollments,
               COALESCE(SUM(CASE WHEN mp."status" = 'completed' THEN 1 ELSE 0 END), 0) AS completions
        FROM "modules" m
        LEFT JOIN "module_progress" mp ON mp."module_id" = m."id"
        GROUP BY m."id", m."title"
        ORDER BY m."created_at" DESC
        "#,
    )
    .fetch_all(proxy.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|r| ModuleEnrollment {
            module_id: r.try_get("id").unwrap_or_default(),
            title: r.try_get("title").unwrap_or_default(),
            enrollments: r.try_get("enrollments").unwrap_or(0),
            completions: r.try_get("completions").unwrap_or(0),
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityEvent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: String,
    pub title: String,
    pub status: String,
    pub time: i64,
}

pub async fn recent_quiz_events(proxy: &DatabaseProxy, limit: i64) -> Result<Vec<ActivityEvent>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT u."username", q."title", qa."score", qa."passed", qa."timestamp"
        FROM "quiz_attempts" qa
        JOIN "users" u ON u."id" = qa."user_id"
        JOIN "quizzes" q ON q."id" = qa."quiz_id"
        ORDER BY qa."timestamp" DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(proxy.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|r| {
            let score: f64 = r.try_get("score").unwrap_or(0.0);
            let passed: bool = r.try_get("passed").unwrap_or(false);
            ActivityEvent {
                kind: "quiz",
                user: r.try_get("username").unwrap_or_default(),
                title: r.try_get("title").unwrap_or_default(),
                status: format!("{score:.1}% - {}", if passed { "Passed" } else { "Failed" }),
                time: r.try_get("timestamp").unwrap_or(0),
            }
        })
        .collect())
}

pub async fn recent_submission_events(proxy: &DatabaseProxy, limit: i64) -> Result<Vec<ActivityEvent>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT u."username", m."title", s."submitted_at"
        FROM "submissions" s
        JOIN "assignments" a ON a."id" = s."assignment_id"
        JOIN "users" u ON u."id" = a."user_id"
        JOIN "modules" m ON m."id" = a."module_id"
        ORDER BY s."submitted_at" DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(proxy.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|r| ActivityEvent {
            kind: "assignment",
            user: r.try_get("username").unwrap_or_default(),
            title: r.try_get("title").unwrap_or_default(),
            status: "Submitted".to_string(),
            time: r.try_get("submitted_at").unwrap_or(0),
        })
        .collect())
}
