use std::collections::HashMap;

use serde::Serialize;
use sqlx::Row;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub has_quiz: bool,
    pub has_assignment: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceRecord {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub kind: String,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizRecord {
    pub id: String,
    pub module_id: String,
    pub title: String,
    pub passing_score: f64,
}

pub async fn get_user(proxy: &DatabaseProxy, user_id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT "id", "username", "email", "role", "created_at" FROM "users" WHERE "id" = ? LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(row.map(|r| map_user(&r)))
}

pub async fn list_learners(proxy: &DatabaseProxy) -> Result<Vec<UserRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "username", "email", "role", "created_at"
        FROM "users"
        WHERE "role" = 'learner'
        ORDER BY "username" ASC
        "#,
    )
    .fetch_all(proxy.pool())
    .await?;
    Ok(rows.iter().map(map_user).collect())
}

pub async fn get_module(proxy: &DatabaseProxy, module_id: &str) -> Result<Option<ModuleRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "title", "description", "has_quiz", "has_assignment"
        FROM "modules" WHERE "id" = ? LIMIT 1
        "#,
    )
    .bind(module_id)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(row.map(|r| map_module(&r)))
}

pub async fn list_modules(proxy: &DatabaseProxy) -> Result<Vec<ModuleRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "title", "description", "has_quiz", "has_assignment"
        FROM "modules" ORDER BY "created_at" DESC
        "#,
    )
    .fetch_all(proxy.pool())
    .await?;
    Ok(rows.iter().map(map_module).collect())
}

/// Looks a resource up only within its owning module, so a mismatched pair is a miss.
pub async fn get_module_resource(
    proxy: &DatabaseProxy,
    module_id: &str,
    resource_id: &str,
) -> Result<Option<ResourceRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "module_id", "title", "kind", "position"
        FROM "resources" WHERE "id" = ? AND "module_id" = ? LIMIT 1
        "#,
    )
    .bind(resource_id)
    .bind(module_id)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(row.map(|r| ResourceRecord {
        id: r.try_get("id").unwrap_or_default(),
        module_id: r.try_get("module_id").unwrap_or_default(),
        title: r.try_get("title").unwrap_or_default(),
        kind: r.try_get("kind").unwrap_or_default(),
        position: r.try_get("position").unwrap_or(0),
    }))
}

pub async fn count_module_resources(proxy: &DatabaseProxy, module_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "resources" WHERE "module_id" = ?"#)
        .bind(module_id)
        .fetch_one(proxy.pool())
        .await
}

pub async fn get_module_quiz(proxy: &DatabaseProxy, module_id: &str) -> Result<Option<QuizRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT "id", "module_id", "title", "passing_score" FROM "quizzes" WHERE "module_id" = ? LIMIT 1"#,
    )
    .bind(module_id)
    .fetch_optional(proxy.pool())
    .await?;
    Ok(row.map(|r| QuizRecord {
        id: r.try_get("id").unwrap_or_default(),
        module_id: r.try_get("module_id").unwrap_or_default(),
        title: r.try_get("title").unwrap_or_default(),
        passing_score: r.try_get("passing_score").unwrap_or(70.0),
    }))
}

pub async fn count_quiz_questions(proxy: &DatabaseProxy, quiz_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "questions" WHERE "quiz_id" = ?"#)
        .bind(quiz_id)
        .fetch_one(proxy.pool())
        .await
}

/// `(question_id, answer_id) -> is_correct` for every answer belonging to the quiz.
pub async fn load_answer_key(
    proxy: &DatabaseProxy,
    quiz_id: &str,
) -> Result<HashMap<(String, String), bool>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT a."id" AS answer_id, a."question_id" AS question_id, a."is_correct" AS is_correct
        FROM "answers" a
        JOIN "questions" q ON q."id" = a."question_id"
        WHERE q."quiz_id" = ?
        "#,
    )
    .bind(quiz_id)
    .fetch_all(proxy.pool())
    .await?;

    let mut key = HashMap::with_capacity(rows.len());
    for row in rows {
        let question_id: String = row.try_get("question_id").unwrap_or_default();
        let answer_id: String = row.try_get("answer_id").unwrap_or_default();
        let is_correct: bool = row.try_get("is_correct").unwrap_or(false);
        key.insert((question_id, answer_id), is_correct);
    }
    Ok(key)
}

fn map_user(row: &sqlx::sqlite::SqliteRow) -> UserRecord {
    UserRecord {
        id: row.try_get("id").unwrap_or_default(),
        username: row.try_get("username").unwrap_or_default(),
        email: row.try_get("email").unwrap_or_default(),
        role: row.try_get("role").unwrap_or_else(|_| "learner".to_string()),
        created_at: row.try_get("created_at").unwrap_or(0),
    }
}

fn map_module(row: &sqlx::sqlite::SqliteRow) -> ModuleRecord {
    ModuleRecord {
        id: row.try_get("id").unwrap_or_default(),
        title: row.try_get("title").unwrap_or_default(),
        description: row.try_get("description").unwrap_or_default(),
        has_quiz: row.try_get("has_quiz").unwrap_or(false),
        has_assignment: row.try_get("has_assignment").unwrap_or(false),
    }
}
