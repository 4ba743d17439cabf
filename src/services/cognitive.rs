//! Cognitive-state and risk classification.
//!
//! `load_inputs` gathers a learner's windowed counters; `classify` is a pure
//! function of those counters so the same inputs always produce the same
//! profile. Nothing here is persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::operations::analytics;
use crate::db::operations::to_millis;
use crate::db::DatabaseProxy;
use crate::services::ServiceResult;

const INACTIVITY_HOURS: i64 = 72;
const LOW_FOCUS_SECONDS: i64 = 600;
const HIGH_FOCUS_SECONDS: i64 = 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CognitiveState {
    Critical,
    Struggling,
    SkillReady,
    HighVelocity,
    Stable,
    Unengaged,
}

impl CognitiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::Struggling => "STRUGGLING",
            Self::SkillReady => "SKILL_READY",
            Self::HighVelocity => "HIGH_VELOCITY",
            Self::Stable => "STABLE",
            Self::Unengaged => "UNENGAGED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CognitiveInputs {
    /// Time since the latest session started; `None` when the learner never had one.
    pub last_activity_gap: Option<Duration>,
    pub focus_seconds: i64,
    pub modules_completed: i64,
    pub modules_in_progress: i64,
    pub quiz_avg: f64,
    pub quiz_passed: i64,
    pub quiz_total: i64,
    pub completions_in_window: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CognitiveMetrics {
    pub total_focus_mins: f64,
    pub modules_completed: i64,
    pub modules_in_progress: i64,
    pub quiz_avg: f64,
    pub quiz_pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CognitiveProfile {
    pub state: CognitiveState,
    pub risk_score: u32,
    pub velocity: f64,
    pub risk_factors: Vec<String>,
    pub metrics: CognitiveMetrics,
}

pub async fn load_inputs(
    proxy: &DatabaseProxy,
    user_id: &str,
    window_days: i64,
    now: DateTime<Utc>,
) -> ServiceResult<CognitiveInputs> {
    let window_start = now - Duration::days(window_days);
    let aggregates =
        analytics::load_learner_aggregates(proxy, user_id, to_millis(window_start), to_millis(now)).await?;

    let last_activity_gap = aggregates
        .last_session_start
        .map(|start| Duration::milliseconds(to_millis(now) - start));

    Ok(CognitiveInputs {
        last_activity_gap,
        focus_seconds: aggregates.focus_seconds_in_window,
        modules_completed: aggregates.modules_completed,
        modules_in_progress: aggregates.modules_in_progress,
        quiz_avg: aggregates.quiz_avg_in_window.unwrap_or(0.0),
        quiz_passed: aggregates.quiz_pass_count_in_window,
        quiz_total: aggregates.quiz_total_in_window,
        completions_in_window: aggregates.completions_in_window,
    })
}

pub fn classify(inputs: &CognitiveInputs, window_days: i64) -> CognitiveProfile {
    let velocity = round_to(inputs.completions_in_window as f64 / window_days.max(1) as f64, 2);
    let has_quizzes = inputs.quiz_total > 0;

    let mut risk_score = 0u32;
    let mut risk_factors = Vec::new();

    let inactive = match inputs.last_activity_gap {
        Some(gap) => gap > Duration::hours(INACTIVITY_HOURS),
        None => true,
    };
    if inactive {
        risk_score += 40;
        risk_factors.push("No activity >72h".to_string());
    }
    if inputs.modules_in_progress > 0 && inputs.focus_seconds < LOW_FOCUS_SECONDS {
        risk_score += 30;
        risk_factors.push("Low engagement".to_string());
    }
    if has_quizzes && inputs.quiz_avg < 50.0 {
        risk_score += 20;
        risk_factors.push("Low quiz scores".to_string());
    }
    if inputs.modules_in_progress > 3 && inputs.modules_completed == 0 {
        risk_score += 10;
        risk_factors.push("No completions".to_string());
    }
    let risk_score = risk_score.min(100);

    let state = if risk_score >= 70 {
        CognitiveState::Critical
    } else if has_quizzes && inputs.quiz_avg < 60.0 {
        CognitiveState::Struggling
    } else if inputs.modules_completed >= 3 && inputs.quiz_avg >= 80.0 {
        CognitiveState::SkillReady
    } else if velocity >= 1.0 && inputs.focus_seconds > HIGH_FOCUS_SECONDS {
        CognitiveState::HighVelocity
    } else if inputs.focus_seconds > LOW_FOCUS_SECONDS {
        CognitiveState::Stable
    } else {
        CognitiveState::Unengaged
    };

    let quiz_pass_rate = if has_quizzes {
        inputs.quiz_passed as f64 * 100.0 / inputs.quiz_total as f64
    } else {
        0.0
    };

    CognitiveProfile {
        state,
        risk_score,
        velocity,
        risk_factors,
        metrics: CognitiveMetrics {
            total_focus_mins: round_to(inputs.focus_seconds as f64 / 60.0, 1),
            modules_completed: inputs.modules_completed,
            modules_in_progress: inputs.modules_in_progress,
            quiz_avg: round_to(inputs.quiz_avg, 1),
            quiz_pass_rate: round_to(quiz_pass_rate, 1),
        },
    }
}

pub async fn profile_for(
    proxy: &DatabaseProxy,
    user_id: &str,
    window_days: i64,
    now: DateTime<Utc>,
) -> ServiceResult<CognitiveProfile> {
    let inputs = load_inputs(proxy, user_id, window_days, now).await?;
    let profile = classify(&inputs, window_days);
    tracing::debug!(
        user_id,
        state = profile.state.as_str(),
        risk_score = profile.risk_score,
        "cognitive profile computed"
    );
    Ok(profile)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn active() -> CognitiveInputs {
        CognitiveInputs {
            last_activity_gap: Some(Duration::hours(1)),
            ..Default::default()
        }
    }

    #[test]
    fn never_active_learner_is_flagged() {
        let profile = classify(&CognitiveInputs::default(), 7);
        assert_eq!(profile.risk_score, 40);
        assert_eq!(profile.risk_factors, vec!["No activity >72h".to_string()]);
        assert_eq!(profile.state, CognitiveState::Unengaged);
    }

    #[test]
    fn exactly_72_hours_is_not_inactive() {
        let inputs = CognitiveInputs {
            last_activity_gap: Some(Duration::hours(72)),
            ..Default::default()
        };
        assert_eq!(classify(&inputs, 7).risk_score, 0);
    }

    #[test]
    fn critical_beats_high_quiz_average() {
        let inputs = CognitiveInputs {
            last_activity_gap: Some(Duration::hours(100)),
            modules_in_progress: 2,
            focus_seconds: 100,
            modules_completed: 5,
            quiz_avg: 90.0,
            quiz_passed: 3,
            quiz_total: 3,
            ..Default::default()
        };
        let profile = classify(&inputs, 7);
        assert_eq!(profile.risk_score, 70);
        assert_eq!(profile.state, CognitiveState::Critical);
    }

    #[test]
    fn risk_is_capped_at_100() {
        let inputs = CognitiveInputs {
            last_activity_gap: None,
            modules_in_progress: 4,
            modules_completed: 0,
            focus_seconds: 0,
            quiz_avg: 10.0,
            quiz_total: 2,
            ..Default::default()
        };
        let profile = classify(&inputs, 7);
        assert_eq!(profile.risk_score, 100);
        assert_eq!(profile.risk_factors.len(), 4);
    }

    #[test]
    fn struggling_on_low_quiz_average() {
        let inputs = CognitiveInputs {
            quiz_avg: 55.0,
            quiz_total: 2,
            quiz_passed: 0,
            focus_seconds: 4000,
            ..active()
        };
        assert_eq!(classify(&inputs, 7).state, CognitiveState::Struggling);
    }

    #[test]
    fn skill_ready_high_velocity_and_stable() {
        let skill = CognitiveInputs {
            modules_completed: 3,
            quiz_avg: 85.0,
            quiz_total: 3,
            quiz_passed: 3,
            ..active()
        };
        assert_eq!(classify(&skill, 7).state, CognitiveState::SkillReady);

        let fast = CognitiveInputs {
            completions_in_window: 7,
            focus_seconds: 2000,
            ..active()
        };
        let profile = classify(&fast, 7);
        assert_eq!(profile.velocity, 1.0);
        assert_eq!(profile.state, CognitiveState::HighVelocity);

        let steady = CognitiveInputs {
            focus_seconds: 900,
            ..active()
        };
        assert_eq!(classify(&steady, 7).state, CognitiveState::Stable);
    }

    #[test]
    fn metrics_are_rounded() {
        let inputs = CognitiveInputs {
            focus_seconds: 100,
            quiz_avg: 66.666,
            quiz_passed: 1,
            quiz_total: 3,
            completions_in_window: 1,
            ..active()
        };
        let profile = classify(&inputs, 7);
        assert_eq!(profile.metrics.total_focus_mins, 1.7);
        assert_eq!(profile.metrics.quiz_avg, 66.7);
        assert_eq!(profile.metrics.quiz_pass_rate, 33.3);
        assert_eq!(profile.velocity, 0.14);
    }

    proptest! {
        #[test]
        fn classification_is_deterministic(
            gap_hours in proptest::option::of(0i64..500),
            focus in 0i64..10_000,
            completed in 0i64..10,
            in_progress in 0i64..10,
            avg in 0.0f64..100.0,
            total in 0i64..10,
            completions in 0i64..20,
        ) {
            let inputs = CognitiveInputs {
                last_activity_gap: gap_hours.map(Duration::hours),
                focus_seconds: focus,
                modules_completed: completed,
                modules_in_progress: in_progress,
                quiz_avg: avg,
                quiz_passed: total / 2,
                quiz_total: total,
                completions_in_window: completions,
            };
            let first = classify(&inputs, 7);
            let second = classify(&inputs, 7);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.risk_score <= 100);
            if first.risk_score >= 70 {
                prop_assert_eq!(first.state, CognitiveState::Critical);
            }
        }
    }
}
