use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::operations::assessments::{self, Submission};
use crate::db::operations::catalog;
use crate::db::operations::progress::{self, ModuleStatus};
use crate::db::operations::to_millis;
use crate::db::DatabaseProxy;
use crate::services::{completion, ServiceError, ServiceResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub submission: Submission,
    pub assignment_id: String,
    pub assignment_status: String,
    pub module_status: ModuleStatus,
}

/// Records a submission, self-enrolling the learner on first contact. The
/// `(user, module)` unique pair keeps concurrent first submissions on a single
/// assignment.
pub async fn submit_assignment(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
    request: &SubmissionRequest,
    now: DateTime<Utc>,
) -> ServiceResult<SubmissionReceipt> {
    let content = request.content.trim();
    if content.is_empty() {
        return Err(ServiceError::Validation("content must not be empty".to_string()));
    }

    let module = catalog::get_module(proxy, module_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("module {module_id}")))?;

    let now_ms = to_millis(now);
    let assignment = assessments::ensure_assignment(proxy, user_id, module_id, now_ms).await?;
    let submission = assessments::insert_submission(proxy, &assignment.id, content, now_ms).await?;
    assessments::mark_assignment_in_progress(proxy, &assignment.id).await?;
    tracing::info!(user_id, module_id, assignment_id = %assignment.id, "assignment submission recorded");

    progress::ensure_module_progress(proxy, user_id, module_id, now_ms).await?;
    progress::touch_module_progress(proxy, user_id, module_id, now_ms).await?;
    completion::check_completion(proxy, user_id, &module, now).await?;

    let assignment_status = assessments::get_assignment(proxy, user_id, module_id)
        .await?
        .map(|a| a.status)
        .unwrap_or(assignment.status);
    let module_status = progress::get_module_progress(proxy, user_id, module_id)
        .await?
        .map(|row| row.status)
        .unwrap_or(ModuleStatus::NotStarted);

    Ok(SubmissionReceipt {
        submission,
        assignment_id: assignment.id,
        assignment_status,
        module_status,
    })
}

pub async fn list_own_submissions(
    proxy: &DatabaseProxy,
    user_id: &str,
    module_id: &str,
) -> ServiceResult<Vec<Submission>> {
    catalog::get_module(proxy, module_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("module {module_id}")))?;

    match assessments::get_assignment(proxy, user_id, module_id).await? {
        Some(assignment) => Ok(assessments::list_submissions(proxy, &assignment.id).await?),
        None => Ok(Vec::new()),
    }
}
