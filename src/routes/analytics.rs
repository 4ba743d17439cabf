use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::{millis_to_iso, to_millis};
use crate::middleware::auth::{ensure_manager, ensure_manager_or_self};
use crate::response::AppError;
use crate::services::cognitive::{self, CognitiveProfile};
use crate::services::reconcile::{self, ReconcileReport};
use crate::services::rollup::{
    self, IntelligenceOverview, LearnerDetails, LearnerSnapshot, ModuleStatsEntry, RecentActivity,
    RiskAssessment, StuckLearnerEntry, TeamStats, TeamSummary,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/intelligence/overview", get(intelligence_overview))
        .route("/manager/team-summary", get(team_summary))
        .route("/manager/learners", get(learners))
        .route("/manager/:learner_id/details", get(learner_details))
        .route("/manager/:learner_id/risk", get(learner_risk))
        .route("/manager/:learner_id/cognitive", get(learner_cognitive))
        .route("/team-stats", get(team_stats))
        .route("/stuck-learners", get(stuck_learners))
        .route("/module-stats", get(module_stats))
        .route("/recent-activity", get(recent_activity))
        .route("/reconcile", get(reconcile))
}

const MAX_WINDOW_DAYS: i64 = 365;

#[derive(Debug, Default, Deserialize)]
struct WindowQuery {
    window_days: Option<i64>,
}

/// Requested classifier window, clamped to `1..=365`; the configured window when absent.
fn resolve_window(query: Result<Query<WindowQuery>, QueryRejection>, configured: i64) -> Result<i64, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::validation(rejection.body_text()))?;
    Ok(query
        .window_days
        .map(|days| days.clamp(1, MAX_WINDOW_DAYS))
        .unwrap_or(configured))
}

#[derive(Serialize)]
struct CognitiveResponse {
    learner_id: String,
    #[serde(flatten)]
    profile: CognitiveProfile,
    window_days: i64,
    computed_at: String,
}

async fn intelligence_overview(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<IntelligenceOverview>, AppError> {
    ensure_manager(&user)?;
    let window_days = resolve_window(query, state.config().analytics.window_days)?;
    Ok(Json(rollup::intelligence_overview(state.db(), window_days, Utc::now()).await?))
}

async fn team_summary(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TeamSummary>, AppError> {
    ensure_manager(&user)?;
    Ok(Json(rollup::team_summary(state.db(), Utc::now()).await?))
}

async fn learners(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<LearnerSnapshot>>, AppError> {
    ensure_manager(&user)?;
    Ok(Json(rollup::learner_snapshots(state.db(), Utc::now()).await?))
}

async fn learner_details(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(learner_id): Path<String>,
) -> Result<Json<LearnerDetails>, AppError> {
    ensure_manager(&user)?;
    let learner = rollup::require_user(state.db(), &learner_id).await?;
    Ok(Json(rollup::learner_details(state.db(), &learner, Utc::now()).await?))
}

async fn learner_risk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(learner_id): Path<String>,
) -> Result<Json<RiskAssessment>, AppError> {
    ensure_manager(&user)?;
    let learner = rollup::require_user(state.db(), &learner_id).await?;
    Ok(Json(rollup::risk_assessment(state.db(), &learner, Utc::now()).await?))
}

async fn learner_cognitive(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(learner_id): Path<String>,
    query: Result<Query<WindowQuery>, QueryRejection>,
) -> Result<Json<CognitiveResponse>, AppError> {
    ensure_manager_or_self(&user, &learner_id)?;
    let window_days = resolve_window(query, state.config().analytics.window_days)?;
    let learner = rollup::require_user(state.db(), &learner_id).await?;

    let now = Utc::now();
    let profile = cognitive::profile_for(state.db(), &learner.id, window_days, now).await?;

    Ok(Json(CognitiveResponse {
        learner_id: learner.id,
        profile,
        window_days,
        computed_at: millis_to_iso(to_millis(now)),
    }))
}

async fn team_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TeamStats>, AppError> {
    ensure_manager(&user)?;
    Ok(Json(rollup::team_stats(state.db(), Utc::now()).await?))
}

async fn stuck_learners(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<StuckLearnerEntry>>, AppError> {
    ensure_manager(&user)?;
    Ok(Json(rollup::stuck_learners(state.db(), Utc::now()).await?))
}

async fn module_stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ModuleStatsEntry>>, AppError> {
    ensure_manager(&user)?;
    Ok(Json(rollup::module_stats(state.db()).await?))
}

async fn recent_activity(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<RecentActivity>>, AppError> {
    ensure_manager(&user)?;
    Ok(Json(rollup::recent_activity(state.db()).await?))
}

async fn reconcile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ReconcileReport>, AppError> {
    ensure_manager(&user)?;
    Ok(Json(reconcile::audit(state.db(), Utc::now()).await?))
}
