//! Progress pulse ingestion.
//!
//! Clients send pulses while a learner consumes a resource. Pulses may be
//! retried or delivered concurrently: incremental deltas go through atomic
//! `+=` updates, absolute fields are plain overwrites, and completion flags
//! are guarded so repeated delivery is harmless.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalyticsSettings;
use crate::db::operations::catalog;
use crate::db::operations::progress::{self, ModuleStatus};
use crate::db::operations::to_millis;
use crate::db::DatabaseProxy;
use crate::services::{completion, focus_session, ServiceError, ServiceResult};

/// Largest `duration_delta` a single pulse may carry: one day of watching.
pub const MAX_PULSE_DELTA_SECONDS: i64 = 86_400;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PulsePayload {
    #[serde(default)]
    pub duration_delta: Option<i64>,
    #[serde(default)]
    pub watch_time: Option<i64>,
    #[serde(default)]
    pub last_position: Option<i64>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl PulsePayload {
    /// Rejects negative counters and oversized deltas before anything is written.
    pub fn validate(&self) -> ServiceResult<()> {
        for (field, value) in [
            ("duration_delta", self.duration_delta),
            ("watch_time", self.watch_time),
            ("last_position", self.last_position),
        ] {
            if let Some(v) = value {
                if v < 0 {
                    return Err(ServiceError::Validation(format!("{field} must be >= 0")));
                }
            }
        }
        if self.duration_delta.is_some_and(|d| d > MAX_PULSE_DELTA_SECONDS) {
            return Err(ServiceError::Validation(format!(
                "duration_delta must be <= {MAX_PULSE_DELTA_SECONDS}"
            )));
        }
        Ok(())
    }

    /// Positive delta, if any. Zero counts as absent.
    fn delta(&self) -> Option<i64> {
        self.duration_delta.filter(|d| *d > 0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PulseOutcome {
    pub status: &'static str,
    pub resource_completed: bool,
    pub module_status: ModuleStatus,
    pub watch_time_seconds: i64,
}

pub async fn ingest_pulse(
    proxy: &DatabaseProxy,
    settings: &AnalyticsSettings,
    user_id: &str,
    module_id: &str,
    resource_id: &str,
    payload: &PulsePayload,
    now: DateTime<Utc>,
) -> ServiceResult<PulseOutcome> {
    payload.validate()?;

    let module = catalog::get_module(proxy, module_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("module {module_id}")))?;
    catalog::get_module_resource(proxy, module_id, resource_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("resource {resource_id} in module {module_id}")))?;

    let now_ms = to_millis(now);
    progress::ensure_resource_progress(proxy, user_id, resource_id, now_ms).await?;
    progress::ensure_module_progress(proxy, user_id, module_id, now_ms).await?;

    if let Some(delta) = payload.delta() {
        if !progress::increment_watch_time(proxy, user_id, resource_id, delta, now_ms).await? {
            tracing::warn!(user_id, resource_id, delta, "watch time saturated, delta dropped");
        }
        let scope = focus_session::scope_for(settings, module_id);
        focus_session::record_focus(proxy, settings, user_id, scope, delta, now).await?;
    } else if let Some(absolute) = payload.watch_time {
        progress::set_watch_time(proxy, user_id, resource_id, absolute, now_ms).await?;
    }

    if let Some(position) = payload.last_position {
        progress::set_last_position(proxy, user_id, resource_id, position, now_ms).await?;
    }

    if payload.completed == Some(true) {
        let flipped = progress::mark_resource_completed(proxy, user_id, resource_id, now_ms).await?;
        if flipped {
            tracing::info!(user_id, module_id, resource_id, "resource completed");
        }
    }

    progress::touch_module_progress(proxy, user_id, module_id, now_ms).await?;
    completion::check_completion(proxy, user_id, &module, now).await?;

    let resource = progress::get_resource_progress(proxy, user_id, resource_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;
    let module_progress = progress::get_module_progress(proxy, user_id, module_id)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    tracing::debug!(
        user_id,
        module_id,
        resource_id,
        delta = ?payload.delta(),
        watch_time = resource.watch_time_seconds,
        "pulse synchronized"
    );

    Ok(PulseOutcome {
        status: "synchronized",
        resource_completed: resource.completed,
        module_status: module_progress.status,
        watch_time_seconds: resource.watch_time_seconds,
    })
}
