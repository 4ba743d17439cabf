use sqlx::SqlitePool;

pub const SCHEMA_VERSION: &str = "1";

/// Timestamps are epoch milliseconds (UTC). Users, catalog, quiz content and notes
/// are written by collaborating services; this crate only reads them.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS "_db_metadata" (
    "key" TEXT PRIMARY KEY,
    "value" TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS "users" (
    "id" TEXT PRIMARY KEY,
    "username" TEXT NOT NULL UNIQUE,
    "email" TEXT NOT NULL DEFAULT '',
    "role" TEXT NOT NULL DEFAULT 'learner',
    "created_at" INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS "modules" (
    "id" TEXT PRIMARY KEY,
    "title" TEXT NOT NULL,
    "description" TEXT NOT NULL DEFAULT '',
    "has_quiz" INTEGER NOT NULL DEFAULT 0,
    "has_assignment" INTEGER NOT NULL DEFAULT 0,
    "created_at" INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS "resources" (
    "id" TEXT PRIMARY KEY,
    "module_id" TEXT NOT NULL REFERENCES "modules"("id") ON DELETE CASCADE,
    "title" TEXT NOT NULL,
    "kind" TEXT NOT NULL DEFAULT 'video',
    "position" INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS "idx_resources_module" ON "resources"("module_id");

CREATE TABLE IF NOT EXISTS "quizzes" (
    "id" TEXT PRIMARY KEY,
    "module_id" TEXT NOT NULL UNIQUE REFERENCES "modules"("id") ON DELETE CASCADE,
    "title" TEXT NOT NULL,
    "passing_score" REAL NOT NULL DEFAULT 70
);

CREATE TABLE IF NOT EXISTS "questions" (
    "id" TEXT PRIMARY KEY,
    "quiz_id" TEXT NOT NULL REFERENCES "quizzes"("id") ON DELETE CASCADE,
    "prompt" TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS "answers" (
    "id" TEXT PRIMARY KEY,
    "question_id" TEXT NOT NULL REFERENCES "questions"("id") ON DELETE CASCADE,
    "is_correct" INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS "notes" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL REFERENCES "users"("id") ON DELETE CASCADE,
    "module_id" TEXT REFERENCES "modules"("id") ON DELETE SET NULL,
    "content" TEXT NOT NULL DEFAULT '',
    "updated_at" INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS "resource_progress" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL REFERENCES "users"("id") ON DELETE CASCADE,
    "resource_id" TEXT NOT NULL REFERENCES "resources"("id") ON DELETE CASCADE,
    "watch_time_seconds" INTEGER NOT NULL DEFAULT 0 CHECK ("watch_time_seconds" >= 0),
    "last_position_seconds" INTEGER NOT NULL DEFAULT 0,
    "completed" INTEGER NOT NULL DEFAULT 0,
    "completed_at" INTEGER,
    "updated_at" INTEGER NOT NULL,
    UNIQUE ("user_id", "resource_id")
);

CREATE TABLE IF NOT EXISTS "module_progress" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL REFERENCES "users"("id") ON DELETE CASCADE,
    "module_id" TEXT NOT NULL REFERENCES "modules"("id") ON DELETE CASCADE,
    "status" TEXT NOT NULL DEFAULT 'not_started',
    "started_at" INTEGER,
    "last_accessed" INTEGER NOT NULL,
    "completed_at" INTEGER,
    UNIQUE ("user_id", "module_id")
);

CREATE TABLE IF NOT EXISTS "learning_sessions" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL REFERENCES "users"("id") ON DELETE CASCADE,
    "module_id" TEXT REFERENCES "modules"("id") ON DELETE SET NULL,
    "start_time" INTEGER NOT NULL,
    "last_ping_at" INTEGER NOT NULL,
    "focus_duration_seconds" INTEGER NOT NULL DEFAULT 0 CHECK ("focus_duration_seconds" >= 0)
);

CREATE INDEX IF NOT EXISTS "idx_sessions_user_ping" ON "learning_sessions"("user_id", "last_ping_at");

CREATE TABLE IF NOT EXISTS "quiz_attempts" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL REFERENCES "users"("id") ON DELETE CASCADE,
    "quiz_id" TEXT NOT NULL REFERENCES "quizzes"("id") ON DELETE CASCADE,
    "score" REAL NOT NULL,
    "passed" INTEGER NOT NULL,
    "timestamp" INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS "idx_quiz_attempts_user" ON "quiz_attempts"("user_id", "timestamp");

CREATE TABLE IF NOT EXISTS "assignments" (
    "id" TEXT PRIMARY KEY,
    "user_id" TEXT NOT NULL REFERENCES "users"("id") ON DELETE CASCADE,
    "module_id" TEXT NOT NULL REFERENCES "modules"("id") ON DELETE CASCADE,
    "assigned_by" TEXT REFERENCES "users"("id") ON DELETE SET NULL,
    "status" TEXT NOT NULL DEFAULT 'pending',
    "due_date" INTEGER,
    "assigned_at" INTEGER NOT NULL,
    "completed_at" INTEGER,
    UNIQUE ("user_id", "module_id")
);

CREATE TABLE IF NOT EXISTS "submissions" (
    "id" TEXT PRIMARY KEY,
    "assignment_id" TEXT NOT NULL REFERENCES "assignments"("id") ON DELETE CASCADE,
    "content" TEXT NOT NULL,
    "status" TEXT NOT NULL DEFAULT 'pending',
    "grade" REAL,
    "submitted_at" INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS "idx_submissions_assignment" ON "submissions"("assignment_id");
"#;

pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
            }
            ';' if !in_single_quote && !in_double_quote => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }

        current.push(ch);
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in split_sql_statements(SCHEMA_SQL) {
        let sql: String = stmt
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(pool).await?;
    }

    sqlx::query(r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#)
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}
