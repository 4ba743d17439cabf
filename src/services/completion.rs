//! Module completion policy.
//!
//! A module is complete when every applicable requirement is satisfied. The
//! requirements form an ordered list of predicates over a snapshot that is
//! read fresh on every evaluation. `check_completion` is the only place that
//! moves a `ModuleProgress` row into `completed` and the only place that
//! mirrors that onto the learner's assignment.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::operations::catalog::{self, ModuleRecord, QuizRecord};
use crate::db::operations::progress::{self, ModuleStatus};
use crate::db::operations::{assessments, to_millis};
use crate::db::DatabaseProxy;
use crate::services::ServiceResult;

#[derive(Debug, Clone, Default)]
pub struct RequirementSnapshot {
    pub total_resources: i64,
    pub completed_resources: i64,
    pub quiz: Option<QuizRecord>,
    pub quiz_passed: bool,
    pub assignment_exists: bool,
    pub submission_count: i64,
}

pub trait Requirement {
    fn name(&self) -> &'static str;

    /// Whether the module's configuration asks for this requirement at all.
    fn applies(&self, module: &ModuleRecord) -> bool;

    fn is_satisfied(&self, module: &ModuleRecord, snapshot: &RequirementSnapshot) -> bool;

    /// `(satisfied, required)` progress units contributed to `progress_percent`.
    fn units(&self, module: &ModuleRecord, snapshot: &RequirementSnapshot) -> (i64, i64);

    fn detail(&self, snapshot: &RequirementSnapshot) -> String;
}

pub struct ResourceRequirement;

impl Requirement for ResourceRequirement {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn applies(&self, _module: &ModuleRecord) -> bool {
        true
    }

    fn is_satisfied(&self, _module: &ModuleRecord, snapshot: &RequirementSnapshot) -> bool {
        snapshot.total_resources == 0 || snapshot.completed_resources >= snapshot.total_resources
    }

    fn units(&self, _module: &ModuleRecord, snapshot: &RequirementSnapshot) -> (i64, i64) {
        let required = snapshot.total_resources.max(0);
        (snapshot.completed_resources.clamp(0, required), required)
    }

    fn detail(&self, snapshot: &RequirementSnapshot) -> String {
        format!(
            "{}/{} resources completed",
            snapshot.completed_resources, snapshot.total_resources
        )
    }
}

pub struct QuizRequirement;

impl Requirement for QuizRequirement {
    fn name(&self) -> &'static str {
        "quiz"
    }

    fn applies(&self, module: &ModuleRecord) -> bool {
        module.has_quiz
    }

    /// A module that demands a quiz but has none configured can never pass.
    fn is_satisfied(&self, module: &ModuleRecord, snapshot: &RequirementSnapshot) -> bool {
        if !module.has_quiz {
            return true;
        }
        snapshot.quiz.is_some() && snapshot.quiz_passed
    }

    fn units(&self, module: &ModuleRecord, snapshot: &RequirementSnapshot) -> (i64, i64) {
        if !module.has_quiz {
            return (0, 0);
        }
        (i64::from(self.is_satisfied(module, snapshot)), 1)
    }

    fn detail(&self, snapshot: &RequirementSnapshot) -> String {
        match (&snapshot.quiz, snapshot.quiz_passed) {
            (None, _) => "quiz required but not configured".to_string(),
            (Some(_), true) => "quiz passed".to_string(),
            (Some(_), false) => "quiz not passed yet".to_string(),
        }
    }
}

pub struct AssignmentRequirement;

impl Requirement for AssignmentRequirement {
    fn name(&self) -> &'static str {
        "assignment"
    }

    fn applies(&self, module: &ModuleRecord) -> bool {
        module.has_assignment
    }

    fn is_satisfied(&self, module: &ModuleRecord, snapshot: &RequirementSnapshot) -> bool {
        if !module.has_assignment {
            return true;
        }
        snapshot.assignment_exists && snapshot.submission_count > 0
    }

    fn units(&self, module: &ModuleRecord, snapshot: &RequirementSnapshot) -> (i64, i64) {
        if !module.has_assignment {
            return (0, 0);
        }
        (i64::from(self.is_satisfied(module, snapshot)), 1)
    }

    fn detail(&self, snapshot: &RequirementSnapshot) -> String {
        format!("{} submission(s)", snapshot.submission_count)
    }
}

/// Evaluation order is fixed; the first entry is the cheapest to satisfy.
pub fn requirements() -> [&'static dyn Requirement; 3] {
    [&ResourceRequirement, &QuizRequirement, &AssignmentRequirement]
}

pub fn is_complete(module: &ModuleRecord, snapshot: &RequirementSnapshot) -> bool {
    requirements()
        .iter()
        .all(|requirement| requirement.is_satisfied(module, snapshot))
}

#[derive(Debug, Clone, Serialize)]
pub struct RequirementReport {
    pub name: &'static str,
    pub satisfied: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub module_id: String,
    pub status: ModuleStatus,
    pub is_complete: bool,
    pub progress_percent: f64,
    pub requirements: Vec<RequirementReport>,
}

pub fn build_report(module: &ModuleRecord, status: ModuleStatus, snapshot: &RequirementSnapshot) -> CompletionReport {
    let mut satisfied_units = 0;
    let mut required_units = 0;
    let mut reports = Vec::new();

    for requirement in requirements() {
        if !requirement.applies(module) {
            continue;
        }
        let (satisfied, required) = requirement.units(module, snapshot);
        satisfied_units += satisfied;
        required_units += required;
        reports.push(RequirementReport {
            name: requirement.name(),
            satisfied: requirement.is_satisfied(module, snapshot),
            detail: requirement.detail(snapshot),
        });
    }

    let progress_percent = if required_units == 0 {
        100.0
    } else {
        round1(satisfied_units as f64 * 100.0 / required_units as f64)
    };

    CompletionReport {
        module_id: module.id.clone(),
        status,
        is_complete: is_complete(module, snapshot),
        progress_percent,
        requirements: reports,
    }
}

pub async fn load_snapshot(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: &ModuleRecord,
) -> ServiceResult<RequirementSnapshot> {
    let total_resources = catalog::count_module_resources(proxy, &module.id).await?;
    let completed_resources = progress::count_completed_resources(proxy, user_id, &module.id).await?;

    let mut snapshot = RequirementSnapshot {
        total_resources,
        completed_resources,
        ..RequirementSnapshot::default()
    };

    if module.has_quiz {
        snapshot.quiz = catalog::get_module_quiz(proxy, &module.id).await?;
        match &snapshot.quiz {
            Some(quiz) => {
                snapshot.quiz_passed = assessments::has_passed_attempt(proxy, user_id, &quiz.id).await?;
            }
            None => {
                tracing::warn!(module_id = %module.id, "module requires a quiz but none is configured");
            }
        }
    }

    if module.has_assignment {
        if let Some(assignment) = assessments::get_assignment(proxy, user_id, &module.id).await? {
            snapshot.assignment_exists = true;
            snapshot.submission_count = assessments::count_submissions(proxy, &assignment.id).await?;
        }
    }

    Ok(snapshot)
}

/// Re-evaluates the module for `user_id` and records completion when every
/// requirement holds. Returns whether the module is complete after the call.
pub async fn check_completion(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: &ModuleRecord,
    now: DateTime<Utc>,
) -> ServiceResult<bool> {
    let now_ms = to_millis(now);
    let current = progress::ensure_module_progress(proxy, user_id, &module.id, now_ms).await?;
    if current.status == ModuleStatus::Completed {
        return Ok(true);
    }

    let snapshot = load_snapshot(proxy, user_id, module).await?;
    if !is_complete(module, &snapshot) {
        return Ok(false);
    }

    let mut tx = proxy.pool().begin().await?;
    let transitioned = progress::mark_module_completed(&mut *tx, user_id, &module.id, now_ms).await?;
    let assignment_closed = if transitioned {
        assessments::apply_assignment_terminal_state(&mut *tx, user_id, &module.id, now_ms).await?
    } else {
        false
    };
    tx.commit().await?;

    if transitioned {
        tracing::info!(
            user_id,
            module_id = %module.id,
            assignment_closed,
            "module completed"
        );
    }

    Ok(true)
}

/// Read-mostly view used by the learner progress endpoint.
pub async fn evaluate(
    proxy: &DatabaseProxy,
    user_id: &str,
    module: &ModuleRecord,
    now: DateTime<Utc>,
) -> ServiceResult<CompletionReport> {
    let row = progress::ensure_module_progress(proxy, user_id, &module.id, to_millis(now)).await?;
    let snapshot = load_snapshot(proxy, user_id, module).await?;
    Ok(build_report(module, row.status, &snapshot))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(has_quiz: bool, has_assignment: bool) -> ModuleRecord {
        ModuleRecord {
            id: "m1".to_string(),
            title: "Module".to_string(),
            description: String::new(),
            has_quiz,
            has_assignment,
        }
    }

    fn quiz() -> QuizRecord {
        QuizRecord {
            id: "q1".to_string(),
            module_id: "m1".to_string(),
            title: "Quiz".to_string(),
            passing_score: 70.0,
        }
    }

    #[test]
    fn resource_only_module_needs_every_resource() {
        let m = module(false, false);
        let partial = RequirementSnapshot {
            total_resources: 3,
            completed_resources: 2,
            ..Default::default()
        };
        assert!(!is_complete(&m, &partial));

        let full = RequirementSnapshot {
            completed_resources: 3,
            ..partial
        };
        assert!(is_complete(&m, &full));
    }

    #[test]
    fn empty_module_is_trivially_complete() {
        let m = module(false, false);
        let snapshot = RequirementSnapshot::default();
        assert!(is_complete(&m, &snapshot));
        assert_eq!(build_report(&m, ModuleStatus::NotStarted, &snapshot).progress_percent, 100.0);
    }

    #[test]
    fn quiz_gate_blocks_until_passed() {
        let m = module(true, false);
        let mut snapshot = RequirementSnapshot {
            total_resources: 1,
            completed_resources: 1,
            quiz: Some(quiz()),
            ..Default::default()
        };
        assert!(!is_complete(&m, &snapshot));
        snapshot.quiz_passed = true;
        assert!(is_complete(&m, &snapshot));
    }

    #[test]
    fn missing_quiz_configuration_is_never_satisfied() {
        let m = module(true, false);
        let snapshot = RequirementSnapshot {
            quiz: None,
            quiz_passed: true,
            ..Default::default()
        };
        assert!(!is_complete(&m, &snapshot));
    }

    #[test]
    fn assignment_needs_a_submission() {
        let m = module(false, true);
        let mut snapshot = RequirementSnapshot {
            assignment_exists: true,
            ..Default::default()
        };
        assert!(!is_complete(&m, &snapshot));
        snapshot.submission_count = 1;
        assert!(is_complete(&m, &snapshot));
    }

    #[test]
    fn progress_counts_resources_quiz_and_assignment_as_units() {
        let m = module(true, true);
        let snapshot = RequirementSnapshot {
            total_resources: 2,
            completed_resources: 2,
            quiz: Some(quiz()),
            quiz_passed: false,
            assignment_exists: true,
            submission_count: 1,
        };
        let report = build_report(&m, ModuleStatus::InProgress, &snapshot);
        assert_eq!(report.progress_percent, 75.0);
        assert!(!report.is_complete);
        assert_eq!(report.requirements.len(), 3);
        assert_eq!(report.requirements[1].name, "quiz");
        assert!(!report.requirements[1].satisfied);
    }
}
