//! Manager-facing rollups. Every view is recomputed from the ledger on each
//! call and stamped with `computed_at`.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::operations::analytics::{self, NoteStats};
use crate::db::operations::catalog::{self, UserRecord};
use crate::db::operations::{assessments, from_millis, millis_to_iso, sessions, to_millis};
use crate::db::DatabaseProxy;
use crate::services::cognitive::{self, round_to, CognitiveMetrics, CognitiveState};
use crate::services::{ServiceError, ServiceResult};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const STAGNANT_DAYS: i64 = 3;
const STUCK_DAYS: i64 = 7;
const TIMELINE_LIMIT: i64 = 20;
const RECENT_EVENTS_PER_KIND: i64 = 5;
const RECENT_EVENTS_TOTAL: usize = 10;

// ---- intelligence overview ----

#[derive(Debug, Clone, Serialize)]
pub struct LearnerNode {
    pub learner_id: String,
    pub name: String,
    pub email: String,
    pub cognitive_state: CognitiveState,
    pub velocity: f64,
    pub risk_score: u32,
    pub risk_factors: Vec<String>,
    pub last_active: Option<String>,
    pub metrics: CognitiveMetrics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StateSummary {
    pub critical: i64,
    pub struggling: i64,
    pub stable: i64,
    pub high_velocity: i64,
    pub skill_ready: i64,
    pub unengaged: i64,
    pub total_learners: i64,
    pub last_updated: String,
}

impl StateSummary {
    fn count(&mut self, state: CognitiveState) {
        let slot = match state {
            CognitiveState::Critical => &mut self.critical,
            CognitiveState::Struggling => &mut self.struggling,
            CognitiveState::Stable => &mut self.stable,
            CognitiveState::HighVelocity => &mut self.high_velocity,
            CognitiveState::SkillReady => &mut self.skill_ready,
            CognitiveState::Unengaged => &mut self.unengaged,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IntelligenceOverview {
    pub summary: StateSummary,
    pub nodes: Vec<LearnerNode>,
    pub computed_at: String,
}

pub async fn intelligence_overview(
    proxy: &DatabaseProxy,
    window_days: i64,
    now: DateTime<Utc>,
) -> ServiceResult<IntelligenceOverview> {
    let learners = catalog::list_learners(proxy).await?;
    let now_ms = to_millis(now);
    let computed_at = millis_to_iso(now_ms);

    let mut summary = StateSummary {
        total_learners: learners.len() as i64,
        last_updated: computed_at.clone(),
        ..StateSummary::default()
    };
    let mut nodes = Vec::with_capacity(learners.len());

    for learner in learners {
        let inputs = cognitive::load_inputs(proxy, &learner.id, window_days, now).await?;
        let profile = cognitive::classify(&inputs, window_days);
        summary.count(profile.state);

        let last_active = inputs
            .last_activity_gap
            .map(|gap| millis_to_iso(now_ms - gap.num_milliseconds()));

        nodes.push(LearnerNode {
            learner_id: learner.id,
            name: learner.username,
            email: learner.email,
            cognitive_state: profile.state,
            velocity: profile.velocity,
            risk_score: profile.risk_score,
            risk_factors: profile.risk_factors,
            last_active,
            metrics: profile.metrics,
        });
    }

    Ok(IntelligenceOverview {
        summary,
        nodes,
        computed_at,
    })
}

// ---- risk ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn from_trigger_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 => Self::Medium,
            _ => Self::High,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskTrigger {
    pub code: &'static str,
    pub msg: String,
    pub detected: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub triggers: Vec<RiskTrigger>,
    pub computed_at: String,
}

pub async fn risk_assessment(
    proxy: &DatabaseProxy,
    learner: &UserRecord,
    now: DateTime<Utc>,
) -> ServiceResult<RiskAssessment> {
    let now_ms = to_millis(now);
    let mut triggers = Vec::new();

    let aggregates = analytics::load_learner_aggregates(proxy, &learner.id, now_ms, now_ms).await?;
    match aggregates.last_ping_at.or(aggregates.last_session_start) {
        None => triggers.push(RiskTrigger {
            code: "NO_ACTIVITY",
            msg: "No recorded sessions".to_string(),
            detected: Some(millis_to_iso(learner.created_at)),
        }),
        Some(last) => {
            let days_idle = (now_ms - last).max(0) / DAY_MS;
            if days_idle > STAGNANT_DAYS {
                triggers.push(RiskTrigger {
                    code: "STAGNANT",
                    msg: format!("Inactive for {days_idle} days"),
                    detected: Some(millis_to_iso(last)),
                });
            }
        }
    }

    let failures = analytics::count_failed_attempts(proxy, &learner.id).await?;
    if failures >= 2 {
        triggers.push(RiskTrigger {
            code: "REPEATED_FAIL",
            msg: format!("{failures} Quiz Failures detected"),
            detected: Some(millis_to_iso(now_ms)),
        });
    }

    let overdue = analytics::count_overdue_assignments(proxy, &learner.id, now_ms).await?;
    if overdue > 0 {
        triggers.push(RiskTrigger {
            code: "OVERDUE",
            msg: format!("{overdue} Overdue Assignments"),
            detected: Some(millis_to_iso(now_ms)),
        });
    }

    Ok(RiskAssessment {
        level: RiskLevel::from_trigger_count(triggers.len()),
        triggers,
        computed_at: millis_to_iso(now_ms),
    })
}

// ---- quality signals ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VelocityTrend {
    Improving,
    Stable,
    Declining,
}

/// Compares weighted actions this week against last week with a 20 % band.
pub fn velocity_trend(this_week: i64, last_week: i64) -> VelocityTrend {
    let this_week = this_week as f64;
    let last_week = last_week as f64;
    if this_week > last_week * 1.2 {
        VelocityTrend::Improving
    } else if this_week < last_week * 0.8 {
        VelocityTrend::Declining
    } else {
        VelocityTrend::Stable
    }
}

/// 100 for fewer than two scores, otherwise `max(0, 100 - 2 * population stddev)`.
pub fn knowledge_stability(scores: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 100.0;
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    round_to((100.0 - variance.sqrt() * 2.0).max(0.0), 1)
}

pub fn engagement_score(focus_seconds: i64, sessions: i64, notes: i64, days_enrolled: i64) -> f64 {
    let focus_mins = focus_seconds as f64 / 60.0;
    let raw = focus_mins + sessions as f64 + notes as f64 * 5.0;
    round_to(raw / days_enrolled.max(1) as f64, 2)
}

async fn learner_velocity_trend(proxy: &DatabaseProxy, user_id: &str, now_ms: i64) -> ServiceResult<VelocityTrend> {
    let this_week_start = now_ms - 7 * DAY_MS;
    let last_week_start = now_ms - 14 * DAY_MS;
    let this_week = analytics::count_weighted_actions(proxy, user_id, this_week_start, now_ms + 1).await?;
    let last_week = analytics::count_weighted_actions(proxy, user_id, last_week_start, this_week_start).await?;
    Ok(velocity_trend(this_week, last_week))
}

// ---- team summary ----

#[derive(Debug, Clone, Serialize)]
pub struct TeamSummary {
    pub active_24h: i64,
    pub inactive_72h: i64,
    pub avg_focus_mins: f64,
    pub avg_accuracy: f64,
    pub assignment_rate: f64,
    pub at_risk_count: i64,
    pub computed_at: String,
    pub data_freshness_seconds: i64,
}

pub async fn team_summary(proxy: &DatabaseProxy, now: DateTime<Utc>) -> ServiceResult<TeamSummary> {
    let now_ms = to_millis(now);
    let activity = analytics::team_activity(proxy, now_ms).await?;

    let assignment_rate = if activity.total_assignments > 0 {
        activity.graded_assignments as f64 * 100.0 / activity.total_assignments as f64
    } else {
        0.0
    };

    let mut at_risk_count = 0;
    for learner in catalog::list_learners(proxy).await? {
        if risk_assessment(proxy, &learner, now).await?.level == RiskLevel::High {
            at_risk_count += 1;
        }
    }

    Ok(TeamSummary {
        active_24h: activity.active_24h,
        inactive_72h: activity.inactive_72h,
        avg_focus_mins: round_to(activity.avg_session_focus_seconds / 60.0, 1),
        avg_accuracy: round_to(activity.avg_quiz_score, 1),
        assignment_rate: round_to(assignment_rate, 1),
        at_risk_count,
        computed_at: millis_to_iso(now_ms),
        data_freshness_seconds: 0,
    })
}

// ---- learner snapshot ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LearnerStatus {
    Stuck,
    Idle,
    Active,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerSnapshot {
    pub id: String,
    pub name: String,
    pub email: String,
    pub last_active: Option<String>,
    pub current_module: Option<String>,
    pub status: LearnerStatus,
    pub focus_time_7d: f64,
    pub total_focus_mins: f64,
    pub modules_completed: i64,
    pub modules_in_progress: i64,
    pub quiz_avg: f64,
    pub quiz_attempts: i64,
    pub assignment_pct: f64,
    pub velocity: VelocityTrend,
    pub risk_level: RiskLevel,
    pub action_needed: bool,
}

pub async fn learner_snapshot(
    proxy: &DatabaseProxy,
    learner: &UserRecord,
    now: DateTime<Utc>,
) -> ServiceResult<LearnerSnapshot> {
    let now_ms = to_millis(now);
    let risk = risk_assessment(proxy, learner, now).await?;
    let current = analytics::current_module(proxy, &learner.id).await?;
    let aggregates = analytics::load_learner_aggregates(proxy, &learner.id, now_ms - 7 * DAY_MS, now_ms).await?;
    let total_focus = analytics::sum_focus_seconds(proxy, &learner.id, None).await?;
    let scores = analytics::user_quiz_scores(proxy, &learner.id).await?;
    let assignments = analytics::user_assignment_counts(proxy, &learner.id).await?;

    let quiz_avg = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    let assignment_pct = if assignments.total > 0 {
        assignments.with_submission as f64 * 100.0 / assignments.total as f64
    } else {
        0.0
    };

    let status = match risk.level {
        RiskLevel::High => LearnerStatus::Stuck,
        RiskLevel::Medium => LearnerStatus::Idle,
        RiskLevel::Low => LearnerStatus::Active,
    };

    Ok(LearnerSnapshot {
        id: learner.id.clone(),
        name: learner.username.clone(),
        email: learner.email.clone(),
        last_active: current.as_ref().map(|c| millis_to_iso(c.last_accessed)),
        current_module: current.map(|c| c.title),
        status,
        focus_time_7d: round_to(aggregates.focus_seconds_in_window as f64 / 60.0, 1),
        total_focus_mins: round_to(total_focus as f64 / 60.0, 1),
        modules_completed: aggregates.modules_completed,
        modules_in_progress: aggregates.modules_in_progress,
        quiz_avg: round_to(quiz_avg, 1),
        quiz_attempts: scores.len() as i64,
        assignment_pct: round_to(assignment_pct, 1),
        velocity: learner_velocity_trend(proxy, &learner.id, now_ms).await?,
        risk_level: risk.level,
        action_needed: risk.level == RiskLevel::High,
    })
}

pub async fn learner_snapshots(proxy: &DatabaseProxy, now: DateTime<Utc>) -> ServiceResult<Vec<LearnerSnapshot>> {
    let learners = catalog::list_learners(proxy).await?;
    let mut snapshots = Vec::with_capacity(learners.len());
    for learner in &learners {
        snapshots.push(learner_snapshot(proxy, learner, now).await?);
    }
    Ok(snapshots)
}

// ---- learner details ----

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub session_id: String,
    pub module_id: Option<String>,
    pub start: String,
    pub end: String,
    pub duration: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizHistoryEntry {
    pub quiz_id: String,
    pub title: String,
    pub module_id: String,
    pub score: f64,
    pub passed: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentHistoryEntry {
    pub assignment_id: String,
    pub module_id: String,
    pub title: String,
    pub assignment_status: String,
    pub assigned: String,
    pub due_date: Option<String>,
    pub submitted: Option<String>,
    pub submissions: i64,
    pub status: String,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteSummary {
    pub count: i64,
    pub last_update: Option<String>,
}

impl From<NoteStats> for NoteSummary {
    fn from(stats: NoteStats) -> Self {
        Self {
            count: stats.count,
            last_update: stats.last_update.map(millis_to_iso),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualitySignals {
    pub engagement: f64,
    pub stability: f64,
    pub velocity: VelocityTrend,
}

#[derive(Debug, Clone, Serialize)]
pub struct LearnerDetails {
    pub learner_id: String,
    pub name: String,
    pub timeline: Vec<TimelineEntry>,
    pub quizzes: Vec<QuizHistoryEntry>,
    pub assignments: Vec<AssignmentHistoryEntry>,
    pub notes: NoteSummary,
    pub quality: QualitySignals,
    pub computed_at: String,
}

pub async fn learner_details(
    proxy: &DatabaseProxy,
    learner: &UserRecord,
    now: DateTime<Utc>,
) -> ServiceResult<LearnerDetails> {
    let now_ms = to_millis(now);

    let timeline = sessions::list_user_sessions(proxy, &learner.id, TIMELINE_LIMIT)
        .await?
        .into_iter()
        .map(|s| TimelineEntry {
            session_id: s.id,
            module_id: s.module_id,
            start: millis_to_iso(s.start_time),
            end: millis_to_iso(s.last_ping_at),
            duration: s.focus_duration_seconds,
        })
        .collect();

    let quizzes = assessments::list_user_quiz_attempts(proxy, &learner.id)
        .await?
        .into_iter()
        .map(|a| QuizHistoryEntry {
            quiz_id: a.quiz_id,
            title: a.quiz_title,
            module_id: a.module_id,
            score: a.score,
            passed: a.passed,
            timestamp: millis_to_iso(a.timestamp),
        })
        .collect();

    let assignments = assessments::list_user_assignments(proxy, &learner.id)
        .await?
        .into_iter()
        .map(|a| AssignmentHistoryEntry {
            assignment_id: a.id,
            module_id: a.module_id,
            title: a.module_title,
            assignment_status: a.status,
            assigned: millis_to_iso(a.assigned_at),
            due_date: a.due_date.map(millis_to_iso),
            submitted: a.last_submitted_at.map(millis_to_iso),
            submissions: a.submission_count,
            status: a.last_submission_status.unwrap_or_else(|| "Pending".to_string()),
            grade: a.last_grade,
        })
        .collect();

    let notes = analytics::note_stats(proxy, &learner.id).await?;
    let total_focus = analytics::sum_focus_seconds(proxy, &learner.id, None).await?;
    let session_count = sessions::count_user_sessions(proxy, &learner.id).await?;
    let days_enrolled = (now_ms - learner.created_at).max(0) / DAY_MS;
    let scores = analytics::user_quiz_scores(proxy, &learner.id).await?;

    let quality = QualitySignals {
        engagement: engagement_score(total_focus, session_count, notes.count, days_enrolled),
        stability: knowledge_stability(&scores),
        velocity: learner_velocity_trend(proxy, &learner.id, now_ms).await?,
    };

    Ok(LearnerDetails {
        learner_id: learner.id.clone(),
        name: learner.username.clone(),
        timeline,
        quizzes,
        assignments,
        notes: notes.into(),
        quality,
        computed_at: millis_to_iso(now_ms),
    })
}

pub async fn require_user(proxy: &DatabaseProxy, user_id: &str) -> ServiceResult<UserRecord> {
    catalog::get_user(proxy, user_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("learner {user_id}")))
}

// ---- team dashboards ----

#[derive(Debug, Clone, Serialize)]
pub struct TeamStatsSummary {
    pub total_learners: i64,
    pub total_completions: i64,
    pub completion_rate: f64,
    pub avg_quiz_score: f64,
    pub assignments_pending: i64,
    pub total_assignments: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyCompletions {
    pub date: String,
    pub completions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamStats {
    pub summary: TeamStatsSummary,
    pub timeline: Vec<DailyCompletions>,
    pub computed_at: String,
}

pub async fn team_stats(proxy: &DatabaseProxy, now: DateTime<Utc>) -> ServiceResult<TeamStats> {
    let totals = analytics::team_totals(proxy).await?;
    let today = now.date_naive();
    let first_day = today - Duration::days(6);
    let since_ms = first_day
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default();
    let stamps = analytics::completion_timestamps_since(proxy, since_ms).await?;

    let timeline = (0..7)
        .map(|offset| {
            let day = first_day + Duration::days(offset);
            let completions = stamps
                .iter()
                .filter(|ms| from_millis(**ms).date_naive() == day)
                .count() as i64;
            DailyCompletions {
                date: day.format("%b %d").to_string(),
                completions,
            }
        })
        .collect();

    let completion_rate = if totals.total_enrollments > 0 {
        totals.total_completions as f64 * 100.0 / totals.total_enrollments as f64
    } else {
        0.0
    };

    Ok(TeamStats {
        summary: TeamStatsSummary {
            total_learners: totals.total_learners,
            total_completions: totals.total_completions,
            completion_rate: round_to(completion_rate, 1),
            avg_quiz_score: round_to(totals.avg_quiz_score, 1),
            assignments_pending: totals.pending_submissions,
            total_assignments: totals.total_assignments,
        },
        timeline,
        computed_at: millis_to_iso(to_millis(now)),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct StuckLearnerEntry {
    pub id: String,
    pub username: String,
    pub module_title: String,
    pub last_accessed: String,
    pub days_inactive: i64,
}

pub async fn stuck_learners(proxy: &DatabaseProxy, now: DateTime<Utc>) -> ServiceResult<Vec<StuckLearnerEntry>> {
    let now_ms = to_millis(now);
    let rows = analytics::stuck_learners(proxy, now_ms - STUCK_DAYS * DAY_MS).await?;
    Ok(rows
        .into_iter()
        .map(|row| StuckLearnerEntry {
            days_inactive: (now_ms - row.last_accessed).max(0) / DAY_MS,
            last_accessed: millis_to_iso(row.last_accessed),
            id: row.id,
            username: row.username,
            module_title: row.module_title,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatsEntry {
    pub module_id: String,
    pub title: String,
    pub enrollments: i64,
    pub completions: i64,
    pub success_rate: f64,
}

pub async fn module_stats(proxy: &DatabaseProxy) -> ServiceResult<Vec<ModuleStatsEntry>> {
    let rows = analytics::module_enrollments(proxy).await?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let success_rate = if row.enrollments > 0 {
                round_to(row.completions as f64 * 100.0 / row.enrollments as f64, 1)
            } else {
                0.0
            };
            ModuleStatsEntry {
                module_id: row.module_id,
                title: row.title,
                enrollments: row.enrollments,
                completions: row.completions,
                success_rate,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: String,
    pub title: String,
    pub status: String,
    pub time: String,
}

pub async fn recent_activity(proxy: &DatabaseProxy) -> ServiceResult<Vec<RecentActivity>> {
    let mut events = analytics::recent_quiz_events(proxy, RECENT_EVENTS_PER_KIND).await?;
    events.extend(analytics::recent_submission_events(proxy, RECENT_EVENTS_PER_KIND).await?);
    events.sort_by(|a, b| b.time.cmp(&a.time));
    events.truncate(RECENT_EVENTS_TOTAL);

    Ok(events
        .into_iter()
        .map(|e| RecentActivity {
            kind: e.kind,
            user: e.user,
            title: e.title,
            status: e.status,
            time: millis_to_iso(e.time),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_uses_twenty_percent_band() {
        assert_eq!(velocity_trend(13, 10), VelocityTrend::Improving);
        assert_eq!(velocity_trend(12, 10), VelocityTrend::Stable);
        assert_eq!(velocity_trend(8, 10), VelocityTrend::Stable);
        assert_eq!(velocity_trend(7, 10), VelocityTrend::Declining);
        assert_eq!(velocity_trend(0, 0), VelocityTrend::Stable);
        assert_eq!(velocity_trend(1, 0), VelocityTrend::Improving);
    }

    #[test]
    fn stability_penalizes_spread() {
        assert_eq!(knowledge_stability(&[]), 100.0);
        assert_eq!(knowledge_stability(&[40.0]), 100.0);
        assert_eq!(knowledge_stability(&[80.0, 80.0]), 100.0);
        // stddev 10 -> 80
        assert_eq!(knowledge_stability(&[70.0, 90.0]), 80.0);
        assert_eq!(knowledge_stability(&[0.0, 100.0]), 0.0);
    }

    #[test]
    fn engagement_divides_by_enrolled_days() {
        assert_eq!(engagement_score(600, 2, 1, 0), 17.0);
        assert_eq!(engagement_score(600, 2, 1, 4), 4.25);
    }

    #[test]
    fn risk_level_from_trigger_count() {
        assert_eq!(RiskLevel::from_trigger_count(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_trigger_count(1), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_trigger_count(3), RiskLevel::High);
    }
}
