use serde::Serialize;
use sqlx::{Executor, Row, Sqlite};

use crate::db::operations::new_id;
use crate::db::DatabaseProxy;

#[derive(Debug, Clone, Serialize)]
pub struct QuizAttempt {
    pub id: String,
    pub user_id: String,
    pub quiz_id: String,
    pub score: f64,
    pub passed: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizAttemptDetail {
    pub id: String,
    pub quiz_id: String,
    pub quiz_title: String,
    pub module_id: String,
    pub score: f64,
    pub passed: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub id: String,
    pub user_id: String,
    pub module_id: String,
    pub assigned_by: Option<String>,
    pub status: String,
    pub due_date: Option<i64>,
    pub assigned_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub id: String,
    pub assignment_id: String,
    pub content: String,
    pub status: String,
    pub grade: Option<f64>,
    pub submitted_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentDetail {
    pub id: String,
    pub module_id: String,
    pub module_title: String,
    pub status: String,
    pub assigned_at: i64,
    pub due_date: Option<i64>,
    pub completed_at: Option<i64>,
    pub submission_count: i64,
    pub last_submitted_at: Option<i64>,
    pub last_submission_status: Option<String>,
    pub last_grade: Option<f64>,
}

pub async fn insert_quiz_attempt(
    proxy: &DatabaseProxy,
    user_id: &str,
    quiz_id: &str,
    score: f64,
    passed: bool,
    now_ms: i64,
) -> Result<QuizAttempt, sqlx::Error> {
    let attempt = QuizAttempt {
        id: new_id(),
        user_id: user_id.to_string(),
        quiz_id: quiz_id.to_string(),
        score,
        passed,
        timestamp: now_ms,
    };

    sqlx::query(
        r#"
        INSERT INTO "quiz_attempts" ("id", "user_id", "quiz_id", "score", "passed", "timestamp")
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&attempt.id)
    .bind(&attempt.user_id)
    .bind(&attempt.quiz_id)
    .bind(attempt.score)
    .bind(attempt.passed)
    .bind(attempt.timestamp)
    .execute(proxy.pool())
    .await?;

    Ok(attempt)
}

pub async fn has_passed_attempt(proxy: &DatabaseProxy, user_id: &str, quiz_id: &str) -> Result<bool, sqlx::Error> {
    let found: Option<i64> = sqlx::query_scalar(
        r#"SELECT 1 FROM "quiz_attempts" WHERE "user_id" = ? AND "quiz_id" = ? AND "passed" = 1 LIMIT 1"#,
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(found.is_some())
}

pub async fn list_user_quiz_attempts(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<QuizAttemptDetail>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT qa."id", qa."quiz_id", q."title" AS quiz_title, q."module_id",
               qa."score", qa."passed", qa."timestamp"
        FROM "quiz_attempts" qa
        JOIN "quizzes" q ON q."id" = qa."quiz_id"
        WHERE qa."user_id" = ?
        ORDER BY qa."timestamp" DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|row| QuizAttemptDetail {
            id: row.try_get("id").unwrap_or_default(),
            quiz_id: row.try_get("quiz_id").unwrap_or_default(),
            quiz_title: row.try_get("quiz_title").unwrap_or_default(),
            module_id: row.try_get("module_id").unwrap_or_default(),
            score: row.try_get("score").unwrap_or(0.0),
            passed: row.try_get("passed").unwrap_or(false),
            timestamp: row.try_get("timestamp").unwrap_or(0),
        })
        .collect())
}

/// Self-enrollment: creates the `(user, module)` assignment at most once.
pub async fn ensure_assignment(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
    now_ms: i64,
) -> Result<Assignment, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "assignments" ("id", "user_id", "module_id", "assigned_by", "status", "assigned_at")
        VALUES (?, ?, ?, NULL, 'pending', ?)
        ON CONFLICT ("user_id", "module_id") DO NOTHING
        "#,
    )
    .bind(new_id())
    .bind(user_id)
    .bind(module_id)
    .bind(now_ms)
    .execute(proxy.pool())
    .await?;

    get_assignment(proxy, user_id, module_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn get_assignment(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT * FROM "assignments" WHERE "user_id" = ? AND "module_id" = ? LIMIT 1"#,
    )
    .bind(user_id)
    .bind(module_id)
    .fetch_optional(proxy.pool())
    .await?;

    Ok(row.map(|r| Assignment {
        id: r.try_get("id").unwrap_or_default(),
        user_id: r.try_get("user_id").unwrap_or_default(),
        module_id: r.try_get("module_id").unwrap_or_default(),
        assigned_by: r.try_get("assigned_by").ok().flatten(),
        status: r.try_get("status").unwrap_or_else(|_| "pending".to_string()),
        due_date: r.try_get("due_date").ok().flatten(),
        assigned_at: r.try_get("assigned_at").unwrap_or(0),
        completed_at: r.try_get("completed_at").ok().flatten(),
    }))
}

pub async fn mark_assignment_in_progress(proxy: &DatabaseProxy, assignment_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE "assignments" SET "status" = 'in_progress' WHERE "id" = ? AND "status" = 'pending'"#)
        .bind(assignment_id)
        .execute(proxy.pool())
        .await?;
    Ok(())
}

/// Mirrors a module's terminal state onto the learner's assignment, if any.
pub async fn apply_assignment_terminal_state<'e, E>(
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
        UPDATE "assignments"
        SET "status" = 'completed', "completed_at" = ?
        WHERE "user_id" = ? AND "module_id" = ? AND "status" != 'completed'
        "#,
    )
    .bind(now_ms)
    .bind(user_id)
    .bind(module_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert_submission(
    proxy: &DatabaseProxy,
    assignment_id: &str,
    content: &str,
    now_ms: i64,
) -> Result<Submission, sqlx::Error> {
    let submission = Submission {
        id: new_id(),
        assignment_id: assignment_id.to_string(),
        content: content.to_string(),
        status: "pending".to_string(),
        grade: None,
        submitted_at: now_ms,
    };

    sqlx::query(
        r#"
        INSERT INTO "submissions" ("id", "assignment_id", "content", "status", "submitted_at")
        VALUES (?, ?, ?, 'pending', ?)
        "#,
    )
    .bind(&submission.id)
    .bind(&submission.assignment_id)
    .bind(&submission.content)
    .bind(submission.submitted_at)
    .execute(proxy.pool())
    .await?;

    Ok(submission)
}

pub async fn count_submissions(proxy: &DatabaseProxy, assignment_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "submissions" WHERE "assignment_id" = ?"#)
        .bind(assignment_id)
        .fetch_one(proxy.pool())
        .await
}

pub async fn list_submissions(proxy: &DatabaseProxy, assignment_id: &str) -> Result<Vec<Submission>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "submissions" WHERE "assignment_id" = ? ORDER BY "submitted_at" DESC"#,
    )
    .bind(assignment_id)
    .fetch_all(proxy.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|r| Submission {
            id: r.try_get("id").unwrap_or_default(),
            assignment_id: r.try_get("assignment_id").unwrap_or_default(),
            content: r.try_get("content").unwrap_or_default(),
            status: r.try_get("status").unwrap_or_else(|_| "pending".to_string()),
            grade: r.try_get("grade").ok().flatten(),
            submitted_at: r.try_get("submitted_at").unwrap_or(0),
        })
        .collect())
}

pub async fn list_user_assignments(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<AssignmentDetail>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT a."id", a."module_id", m."title" AS module_title, a."status",
               a."assigned_at", a."due_date", a."completed_at",
               (SELECT COUNT(*) FROM "submissions" s WHERE s."assignment_id" = a."id") AS submission_count,
               ls."submitted_at" AS last_submitted_at,
               ls."status" AS last_submission_status,
               ls."grade" AS last_grade
        FROM "assignments" a
        JOIN "modules" m ON m."id" = a."module_id"
        LEFT JOIN "submissions" ls ON ls."id" = (
            SELECT s2."id" FROM "submissions" s2
            WHERE s2."assignment_id" = a."id"
            ORDER BY s2."submitted_at" DESC
            LIMIT 1
        )
        WHERE a."user_id" = ?
        ORDER BY a."assigned_at" DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    Ok(rows
        .iter()
        .map(|r| AssignmentDetail {
            id: r.try_get("id").unwrap_or_default(),
            module_id: r.try_get("module_id").unwrap_or_default(),
            module_title: r.try_get("module_title").unwrap_or_default(),
            status: r.try_get("status").unwrap_or_default(),
            assigned_at: r.try_get("assigned_at").unwrap_or(0),
            due_date: r.try_get("due_date").ok().flatten(),
            completed_at: r.try_get("completed_at").ok().flatten(),
            submission_count: r.try_get("submission_count").unwrap_or(0),
            last_submitted_at: r.try_get("last_submitted_at").ok().flatten(),
            last_submission_status: r.try_get("last_submission_status").ok().flatten(),
            last_grade: r.try_get("last_grade").ok().flatten(),
        })
        .collect())
}
