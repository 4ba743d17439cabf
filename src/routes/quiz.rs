use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Extension, Json, Router};
use chrono::Utc;

use crate::auth::AuthUser;
use crate::response::AppError;
use crate::services::quiz::{self, QuizResult, QuizSubmission};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:module_id/submit", post(submit))
}

async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
    payload: Result<Json<QuizSubmission>, JsonRejection>,
) -> Result<Json<QuizResult>, AppError> {
    let Json(submission) = payload?;
    let result = quiz::submit_quiz(state.db(), &user.id, &module_id, &submission, Utc::now()).await?;
    Ok(Json(result))
}
