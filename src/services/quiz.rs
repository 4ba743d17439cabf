use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::operations::assessments;
use crate::db::operations::catalog;
use crate::db::operations::progress::{self, ModuleStatus};
use crate::db::operations::to_millis;
use crate::db::DatabaseProxy;
use crate::services::{completion, ServiceError, ServiceResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuizSubmission {
    /// `question_id -> answer_id`. Ids may arrive as strings or numbers.
    #[serde(default)]
    pub answers: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizResult {
    pub attempt_id: String,
    pub score: f64,
    pub passed: bool,
    pub correct: i64,
    pub total_questions: i64,
    pub module_status: ModuleStatus,
}

/// Percentage of questions answered correctly. Unknown question or answer
/// ids simply score nothing.
pub fn score_answers(
    answer_key: &HashMap<(String, String), bool>,
    answers: &HashMap<String, Value>,
    total_questions: i64,
) -> (i64, f64) {
    let correct = answers
        .iter()
        .filter_map(|(question_id, answer)| answer_id(answer).map(|a| (question_id.clone(), a)))
        .filter(|key| answer_key.get(key).copied().unwrap_or(false))
        .count() as i64;

    if total_questions <= 0 {
        return (correct, 0.0);
    }
    (correct, correct as f64 * 100.0 / total_questions as f64)
}

fn answer_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub async fn submit_quiz(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
    submission: &QuizSubmission,
    now: DateTime<Utc>,
) -> ServiceResult<QuizResult> {
    let module = catalog::get_module(proxy, module_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("module {module_id}")))?;
    let quiz = catalog::get_module_quiz(proxy, module_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz for module {module_id}")))?;

    let total_questions = catalog::count_quiz_questions(proxy, &quiz.id).await?;
    if total_questions == 0 {
        return Err(ServiceError::Validation("Quiz has no questions".to_string()));
    }

    let answer_key = catalog::load_answer_key(proxy, &quiz.id).await?;
    let (correct, score) = score_answers(&answer_key, &submission.answers, total_questions);
    let passed = score >= quiz.passing_score;

    let now_ms = to_millis(now);
    let attempt = assessments::insert_quiz_attempt(proxy, user_id, &quiz.id, score, passed, now_ms).await?;
    tracing::info!(user_id, module_id, quiz_id = %quiz.id, score, passed, "quiz attempt recorded");

    progress::ensure_module_progress(proxy, user_id, module_id, now_ms).await?;
    progress::touch_module_progress(proxy, user_id, module_id, now_ms).await?;
    if passed {
        completion::check_completion(proxy, user_id, &module, now).await?;
    }

    let module_status = progress::get_module_progress(proxy, user_id, module_id)
        .await?
        .map(|row| row.status)
        .unwrap_or(ModuleStatus::NotStarted);

    Ok(QuizResult {
        attempt_id: attempt.id,
        score,
        passed,
        correct,
        total_questions,
        module_status,
    })
}
