#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use lms_backend_rust::auth::sign_token;
use lms_backend_rust::config::{AnalyticsSettings, Config};
use lms_backend_rust::db::config::DbConfig;
use lms_backend_rust::db::DatabaseProxy;

pub const SECRET: &str = "test-secret";
pub const HOUR_MS: i64 = 60 * 60 * 1000;

pub struct TestApp {
    pub app: Router,
    pub db: Arc<DatabaseProxy>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_secret(Some(SECRET)).await
    }

    pub async fn with_secret(secret: Option<&str>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = DatabaseProxy::connect(DbConfig::for_path(dir.path().join("lms.db")))
            .await
            .unwrap();

        let config = Config {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            log_level: "warn".to_string(),
            jwt_secret: secret.map(str::to_string),
            analytics: AnalyticsSettings::default(),
        };
        let app = lms_backend_rust::create_app(config, db.clone());

        Self { app, db, _dir: dir }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        self.db.pool()
    }

    pub async fn get(&self, uri: &str, user_id: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header(header::AUTHORIZATION, bearer(user_id));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, user_id: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, user_id, body.to_string()).await
    }

    pub async fn post_raw(&self, uri: &str, user_id: &str, body: String) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, bearer(user_id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}

pub fn bearer(user_id: &str) -> String {
    format!("Bearer {}", sign_token(user_id, SECRET, 3600).unwrap())
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn pulse_uri(module_id: &str, resource_id: &str) -> String {
    format!("/api/modules/{module_id}/resources/{resource_id}/update-progress")
}

// ---- fixtures ----

pub async fn insert_user(app: &TestApp, id: &str, role: &str) {
    sqlx::query(r#"INSERT INTO "users" ("id", "username", "email", "role", "created_at") VALUES (?, ?, ?, ?, ?)"#)
        .bind(id)
        .bind(format!("{id}-name"))
        .bind(format!("{id}@example.com"))
        .bind(role)
        .bind(now_ms())
        .execute(app.pool())
        .await
        .unwrap();
}

pub async fn insert_module(app: &TestApp, id: &str, has_quiz: bool, has_assignment: bool) {
    sqlx::query(
        r#"INSERT INTO "modules" ("id", "title", "has_quiz", "has_assignment", "created_at") VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(id)
    .bind(format!("Module {id}"))
    .bind(has_quiz)
    .bind(has_assignment)
    .bind(now_ms())
    .execute(app.pool())
    .await
    .unwrap();
}

pub async fn insert_resources(app: &TestApp, module_id: &str, ids: &[&str]) {
    for (position, id) in ids.iter().enumerate() {
        sqlx::query(r#"INSERT INTO "resources" ("id", "module_id", "title", "position") VALUES (?, ?, ?, ?)"#)
            .bind(*id)
            .bind(module_id)
            .bind(format!("Resource {id}"))
            .bind(position as i64)
            .execute(app.pool())
            .await
            .unwrap();
    }
}

/// Quiz with one question `q1` whose correct answer is `a-right`.
pub async fn insert_single_question_quiz(app: &TestApp, module_id: &str, quiz_id: &str) {
    sqlx::query(r#"INSERT INTO "quizzes" ("id", "module_id", "title", "passing_score") VALUES (?, ?, ?, 70)"#)
        .bind(quiz_id)
        .bind(module_id)
        .bind("Checkpoint")
        .execute(app.pool())
        .await
        .unwrap();
    sqlx::query(r#"INSERT INTO "questions" ("id", "quiz_id", "prompt") VALUES ('q1', ?, 'pick one')"#)
        .bind(quiz_id)
        .execute(app.pool())
        .await
        .unwrap();
    for (answer_id, correct) in [("a-right", true), ("a-wrong", false)] {
        sqlx::query(r#"INSERT INTO "answers" ("id", "question_id", "is_correct") VALUES (?, 'q1', ?)"#)
            .bind(answer_id)
            .bind(correct)
            .execute(app.pool())
            .await
            .unwrap();
    }
}

pub async fn insert_session(app: &TestApp, user_id: &str, start_ms: i64, last_ping_ms: i64, focus_seconds: i64) {
    sqlx::query(
        r#"INSERT INTO "learning_sessions" ("id", "user_id", "module_id", "start_time", "last_ping_at", "focus_duration_seconds")
           VALUES (?, ?, NULL, ?, ?, ?)"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(start_ms)
    .bind(last_ping_ms)
    .bind(focus_seconds)
    .execute(app.pool())
    .await
    .unwrap();
}

pub async fn module_status(app: &TestApp, user_id: &str, module_id: &str) -> Option<String> {
    sqlx::query_scalar(r#"SELECT "status" FROM "module_progress" WHERE "user_id" = ? AND "module_id" = ?"#)
        .bind(user_id)
        .bind(module_id)
        .fetch_optional(app.pool())
        .await
        .unwrap()
}

pub async fn count_rows(app: &TestApp, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(app.pool()).await.unwrap()
}

pub async fn insert_note(app: &TestApp, user_id: &str, content: &str) {
    sqlx::query(r#"INSERT INTO "notes" ("id", "user_id", "module_id", "content", "updated_at") VALUES (?, ?, NULL, ?, ?)"#)
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(content)
        .bind(now_ms())
        .execute(app.pool())
        .await
        .unwrap();
}

pub async fn insert_assignment(app: &TestApp, user_id: &str, module_id: &str, status: &str, due_date: Option<i64>) {
    sqlx::query(
        r#"INSERT INTO "assignments" ("id", "user_id", "module_id", "status", "due_date", "assigned_at")
           VALUES (?, ?, ?, ?, ?, ?)"#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(module_id)
    .bind(status)
    .bind(due_date)
    .bind(now_ms())
    .execute(app.pool())
    .await
    .unwrap();
}
