//! Read-only audit of stored module status against the completion policy.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::operations::catalog::{self, ModuleRecord};
use crate::db::operations::progress::{self, ModuleStatus};
use crate::db::operations::{millis_to_iso, to_millis};
use crate::db::DatabaseProxy;
use crate::services::cognitive::round_to;
use crate::services::{completion, ServiceResult};

#[derive(Debug, Clone, Serialize)]
pub struct StatusMismatch {
    pub user_id: String,
    pub module_id: String,
    pub stored_status: ModuleStatus,
    pub policy_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub rows_checked: i64,
    pub mismatches: Vec<StatusMismatch>,
    pub orphan_resource_progress: i64,
    pub confidence: f64,
    pub computed_at: String,
}

/// Drift in either direction is reported: rows marked completed that the
/// policy would reject, and rows the policy would complete that are still open.
pub async fn audit(proxy: &DatabaseProxy, now: DateTime<Utc>) -> ServiceResult<ReconcileReport> {
    let modules: HashMap<String, ModuleRecord> = catalog::list_modules(proxy)
        .await?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();

    let rows = progress::list_all_module_progress(proxy).await?;
    let mut mismatches = Vec::new();

    for row in &rows {
        let Some(module) = modules.get(&row.module_id) else {
            continue;
        };
        let snapshot = completion::load_snapshot(proxy, &row.user_id, module).await?;
        let policy_complete = completion::is_complete(module, &snapshot);
        let stored_complete = row.status == ModuleStatus::Completed;

        if policy_complete != stored_complete {
            mismatches.push(StatusMismatch {
                user_id: row.user_id.clone(),
                module_id: row.module_id.clone(),
                stored_status: row.status,
                policy_complete,
            });
        }
    }

    let orphan_resource_progress = progress::count_orphan_resource_progress(proxy).await?;
    let rows_checked = rows.len() as i64;
    let confidence = if rows_checked == 0 {
        100.0
    } else {
        round_to((rows_checked - mismatches.len() as i64) as f64 * 100.0 / rows_checked as f64, 1)
    };

    if !mismatches.is_empty() {
        tracing::warn!(
            mismatches = mismatches.len(),
            rows_checked,
            "module status drift detected"
        );
    }

    Ok(ReconcileReport {
        rows_checked,
        mismatches,
        orphan_resource_progress,
        confidence,
        computed_at: millis_to_iso(to_millis(now)),
    })
}
