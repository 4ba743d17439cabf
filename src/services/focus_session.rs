//! Learning-session bucketing.
//!
//! A session stays live while pulses keep arriving within the idle window.
//! Opening is a conditional insert and crediting is a single `+= delta`
//! update, so concurrent pulses neither fork sessions nor lose seconds.

use chrono::{DateTime, Utc};

use crate::config::AnalyticsSettings;
use crate::db::operations::sessions::{self, LearningSession};
use crate::db::operations::to_millis;
use crate::db::DatabaseProxy;
use crate::services::ServiceResult;

/// Session scope for a pulse against `module_id`: the module itself when
/// sessions are per-module, otherwise the whole user.
pub fn scope_for<'a>(settings: &AnalyticsSettings, module_id: &'a str) -> Option<&'a str> {
    settings.session_per_module.then_some(module_id)
}

pub async fn get_or_open_session(
    proxy: &DatabaseProxy,
    settings: &AnalyticsSettings,
    user_id: &str,
    module_id: Option<&str>,
    now: DateTime<Utc>,
) -> ServiceResult<LearningSession> {
    let now_ms = to_millis(now);
    let live_since = live_since_ms(settings, now_ms);

    let opened = sessions::open_session_if_idle(proxy, user_id, module_id, live_since, now_ms).await?;
    if opened {
        tracing::debug!(user_id, module_id = ?module_id, "opened learning session");
    }

    sessions::find_live_session(proxy, user_id, module_id, live_since)
        .await?
        .ok_or_else(|| sqlx::Error::RowNotFound.into())
}

/// Credits `delta_seconds` of focus to the live session, opening one first if
/// the user has been idle. Non-positive deltas are ignored.
pub async fn record_focus(
    proxy: &DatabaseProxy,
    settings: &AnalyticsSettings,
    user_id: &str,
    module_id: Option<&str>,
    delta_seconds: i64,
    now: DateTime<Utc>,
) -> ServiceResult<Option<LearningSession>> {
    if delta_seconds <= 0 {
        return Ok(None);
    }

    let session = get_or_open_session(proxy, settings, user_id, module_id, now).await?;
    if !sessions::add_focus_seconds(proxy, &session.id, delta_seconds, to_millis(now)).await? {
        tracing::warn!(user_id, session_id = %session.id, delta_seconds, "focus counter saturated, delta dropped");
    }

    Ok(sessions::get_session(proxy, &session.id).await?)
}

fn live_since_ms(settings: &AnalyticsSettings, now_ms: i64) -> i64 {
    let idle_ms = i64::try_from(settings.session_idle.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_sub(idle_ms)
}
