use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;

use crate::auth::AuthUser;
use crate::db::operations::catalog;
use crate::response::AppError;
use crate::services::completion::{self, CompletionReport};
use crate::services::pulse::{self, PulseOutcome, PulsePayload};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:module_id/resources/:resource_id/complete", post(record_pulse))
        .route("/:module_id/resources/:resource_id/update-progress", post(record_pulse))
        .route("/:module_id/progress", get(module_progress))
}

async fn record_pulse(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((module_id, resource_id)): Path<(String, String)>,
    payload: Result<Json<PulsePayload>, JsonRejection>,
) -> Result<Json<PulseOutcome>, AppError> {
    let Json(payload) = payload?;
    let outcome = pulse::ingest_pulse(
        state.db(),
        &state.config().analytics,
        &user.id,
        &module_id,
        &resource_id,
        &payload,
        Utc::now(),
    )
    .await?;
    Ok(Json(outcome))
}

async fn module_progress(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(module_id): Path<String>,
) -> Result<Json<CompletionReport>, AppError> {
    let module = catalog::get_module(state.db(), &module_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("module {module_id}")))?;
    let report = completion::evaluate(state.db(), &user.id, &module, Utc::now()).await?;
    Ok(Json(report))
}
