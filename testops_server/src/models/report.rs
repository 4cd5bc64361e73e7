//! Reports: one row per observed build completion of a task.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::models::task::{TaskKind, TaskRef};
use crate::schema::reports;

/// Report status words. Jenkins results outside SUCCESS/FAILURE/ABORTED are
/// stored lowercased as they arrive.
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
    pub const CANCELLED: &str = "cancelled";
    pub const COMPLETED: &str = "completed";

    /// Older rows used raw Jenkins words.
    pub const LEGACY_FAILURE: &str = "failure";
    pub const LEGACY_ABORTED: &str = "aborted";
}

/// Report status for a finished Jenkins build result.
pub fn status_for_result(result: Option<&str>) -> String {
    match result {
        Some("SUCCESS") => status::SUCCESS.to_string(),
        Some("FAILURE") => status::FAILED.to_string(),
        Some("ABORTED") => status::CANCELLED.to_string(),
        Some(other) if !other.is_empty() => other.to_lowercase(),
        _ => status::COMPLETED.to_string(),
    }
}

pub fn is_cancelled_status(value: &str) -> bool {
    value == status::CANCELLED || value == status::LEGACY_ABORTED
}

pub fn is_failed_status(value: &str) -> bool {
    value == status::FAILED || value == status::LEGACY_FAILURE
}

/// Statuses a "latest meaningful report" lookup may fall back to.
pub fn is_outcome_status(value: &str) -> bool {
    value == status::SUCCESS || is_failed_status(value)
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = reports)]
pub struct Report {
    pub id: i64,
    pub task_code: String,
    pub task_kind: String,
    pub task_row_id: i32,
    pub project_id: Option<i32>,
    pub project_name: Option<String>,
    pub jenkins_job: Option<String>,
    pub build_number: Option<i64>,
    pub status: String,
    pub total_tests: i32,
    pub passed_tests: i32,
    pub failed_tests: i32,
    pub skipped_tests: i32,
    pub duration_seconds: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn task_ref(&self) -> Option<TaskRef> {
        TaskKind::parse(&self.task_kind).map(|kind| TaskRef::new(kind, self.task_row_id))
    }

    /// Pass percentage rounded to two decimals; zero when no tests ran.
    pub fn success_rate(&self) -> f64 {
        success_rate(i64::from(self.passed_tests), i64::from(self.total_tests))
    }
}

pub fn success_rate(passed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (passed as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Values written by the recording path, for both insert and upsert.
#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset)]
#[diesel(table_name = reports, treat_none_as_null = true)]
pub struct NewReport {
    pub task_code: String,
    pub task_kind: String,
    pub task_row_id: i32,
    pub project_id: Option<i32>,
    pub project_name: Option<String>,
    pub jenkins_job: Option<String>,
    pub build_number: Option<i64>,
    pub status: String,
    pub total_tests: i32,
    pub passed_tests: i32,
    pub failed_tests: i32,
    pub skipped_tests: i32,
    pub duration_seconds: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Filters for the report history listing.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub project_id: Option<i32>,
    pub kind: Option<TaskKind>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    pub limit: i64,
}

/// Newest report for a task that carries a real outcome.
///
/// `reports` must be ordered newest first. When the newest entry is a
/// cancellation, the first success/failure behind it wins; if there is none
/// the newest entry is returned anyway.
pub fn latest_meaningful(reports: &[Report]) -> Option<&Report> {
    let newest = reports.first()?;
    if !is_cancelled_status(&newest.status) {
        return Some(newest);
    }
    reports
        .iter()
        .find(|r| is_outcome_status(&r.status))
        .or(Some(newest))
}

#[cfg(test)]
pub(crate) fn sample_report(id: i64, code: &str, status: &str, build: i64) -> Report {
    Report {
        id,
        task_code: code.to_string(),
        task_kind: TaskKind::from_code(code)
            .unwrap_or(TaskKind::Execution)
            .as_str()
            .to_string(),
        task_row_id: 1,
        project_id: Some(1),
        project_name: Some("Storefront".to_string()),
        jenkins_job: Some("X".to_string()),
        build_number: Some(build),
        status: status.to_string(),
        total_tests: 10,
        passed_tests: 7,
        failed_tests: 2,
        skipped_tests: 1,
        duration_seconds: 42,
        start_time: None,
        end_time: None,
        created_at: Utc::now() - chrono::Duration::minutes(id),
    }
}
