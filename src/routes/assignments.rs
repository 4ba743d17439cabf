use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;

use crate::auth::AuthUser;
use crate::db::operations::assessments::Submission;
use crate::response::AppError;
use crate::services::assignment::{self, SubmissionReceipt, SubmissionRequest};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/modules/:module_id/submit", post(submit))
        .route("/modules/:module_id/submissions", get(list_submissions))
}

async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
    payload: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmissionReceipt>), AppError> {
    let Json(request) = payload?;
    let receipt =
        assignment::submit_assignment(state.db(), &user.id, &module_id, &request, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn list_submissions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
) -> Result<Json<Vec<Submission>>, AppError> {
    let submissions = assignment::list_own_submissions(state.db(), &user.id, &module_id).await?;
    Ok(Json(submissions))
}
