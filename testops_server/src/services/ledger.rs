//! Report ledger read side: latest results per task, per-task history and
//! filtered history listings.
//!
//! Duplicate reports for one build are expected; every view goes through
//! the store's newest-first ordering and [`latest_meaningful`].

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::report::{latest_meaningful, success_rate, Report, ReportFilter};
use crate::models::task::{TaskKind, TaskRef};
use crate::services::store::TaskStore;

const DEFAULT_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskInfo {
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub task_id: String,
    pub task_name: String,
    pub project_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestEntry {
    pub id: Option<i64>,
    pub task_info: TaskInfo,
    pub total_tests: i32,
    pub passed_tests: i32,
    pub failed_tests: i32,
    pub skipped_tests: i32,
    pub success_rate: f64,
    pub created_at: Option<DateTime<Utc>>,
    pub jenkins_job: Option<String>,
    pub build_number: Option<i64>,
    pub has_report: bool,
}

impl LatestEntry {
    fn placeholder(task_info: TaskInfo) -> Self {
        Self {
            id: None,
            task_info,
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            skipped_tests: 0,
            success_rate: 0.0,
            created_at: None,
            jenkins_job: None,
            build_number: None,
            has_report: false,
        }
    }

    fn from_report(task_info: TaskInfo, report: &Report) -> Self {
        Self {
            id: Some(report.id),
            task_info,
            total_tests: report.total_tests,
            passed_tests: report.passed_tests,
            failed_tests: report.failed_tests,
            skipped_tests: report.skipped_tests,
            success_rate: report.success_rate(),
            created_at: Some(report.created_at),
            jenkins_job: report.jenkins_job.clone(),
            build_number: report.build_number,
            has_report: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestResults {
    pub total_tests: i64,
    pub passed_tests: i64,
    pub failed_tests: i64,
    pub skipped_tests: i64,
    pub success_rate: f64,
    pub latest_reports: Vec<LatestEntry>,
}

impl LatestResults {
    /// Totals over the entries that have a report.
    pub fn from_entries(latest_reports: Vec<LatestEntry>) -> Self {
        let mut totals = [0i64; 4];
        for entry in latest_reports.iter().filter(|e| e.has_report) {
            totals[0] += i64::from(entry.total_tests);
            totals[1] += i64::from(entry.passed_tests);
            totals[2] += i64::from(entry.failed_tests);
            totals[3] += i64::from(entry.skipped_tests);
        }
        let [total_tests, passed_tests, failed_tests, skipped_tests] = totals;
        Self {
            total_tests,
            passed_tests,
            failed_tests,
            skipped_tests,
            success_rate: success_rate(passed_tests, total_tests),
            latest_reports,
        }
    }
}

/// Latest meaningful report of every task, placeholders for tasks without one.
pub async fn latest_test_results(store: &dyn TaskStore) -> anyhow::Result<LatestResults> {
    let projects: HashMap<i32, String> = store
        .list_projects()
        .await?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();

    let mut entries = Vec::new();
    for kind in TaskKind::ALL {
        for task in store.list_tasks(kind, None).await? {
            let reports = store.reports_for_task(&task.code).await?;
            let info = TaskInfo {
                kind,
                project_name: projects.get(&task.project_id).cloned(),
                task_id: task.code,
                task_name: task.name,
            };
            entries.push(match latest_meaningful(&reports) {
                Some(report) => LatestEntry::from_report(info, report),
                None => LatestEntry::placeholder(info),
            });
        }
    }
    Ok(LatestResults::from_entries(entries))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPoint {
    pub report_id: i64,
    pub build_number: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub success_rate: f64,
    pub total_tests: i32,
    pub passed_tests: i32,
    pub failed_tests: i32,
    pub skipped_tests: i32,
    pub duration_seconds: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskHistory {
    pub task_id: String,
    pub history: Vec<HistoryPoint>,
    pub count: usize,
}

/// All reports of one task code, oldest first.
pub async fn task_history(store: &dyn TaskStore, code: &str) -> anyhow::Result<TaskHistory> {
    let mut reports = store.reports_for_task(code).await?;
    reports.reverse();
    let history: Vec<HistoryPoint> = reports
        .into_iter()
        .map(|r| HistoryPoint {
            report_id: r.id,
            build_number: r.build_number,
            created_at: r.created_at,
            success_rate: r.success_rate(),
            total_tests: r.total_tests,
            passed_tests: r.passed_tests,
            failed_tests: r.failed_tests,
            skipped_tests: r.skipped_tests,
            duration_seconds: r.duration_seconds,
            status: r.status,
        })
        .collect();
    Ok(TaskHistory {
        task_id: code.to_string(),
        count: history.len(),
        history,
    })
}

/// Query string of the history listing. Unknown task types and unparseable
/// dates are ignored rather than rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub project_id: Option<i32>,
    pub task_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: Option<i64>,
}

impl HistoryQuery {
    pub fn to_filter(&self) -> ReportFilter {
        let day = |value: &Option<String>| {
            value
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        };
        ReportFilter {
            project_id: self.project_id,
            kind: self.task_type.as_deref().and_then(TaskKind::from_collection),
            created_from: day(&self.start_date),
            // End date is inclusive.
            created_before: day(&self.end_date).and_then(|d| d.checked_add_signed(Duration::days(1))),
            limit: self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_HISTORY_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub report: Report,
    pub task_name: Option<String>,
    pub task_type: &'static str,
    pub success_rate: f64,
}

pub async fn history_reports(store: &dyn TaskStore, query: &HistoryQuery) -> anyhow::Result<Vec<HistoryEntry>> {
    let reports = store.list_reports(&query.to_filter()).await?;
    let mut names: HashMap<TaskRef, Option<String>> = HashMap::new();
    let mut entries = Vec::with_capacity(reports.len());
    for report in reports {
        let task_ref = report.task_ref();
        let task_name = match task_ref {
            Some(task_ref) => match names.get(&task_ref) {
                Some(name) => name.clone(),
                None => {
                    let name = store.get_task(task_ref).await?.map(|t| t.name);
                    names.insert(task_ref, name.clone());
                    name
                }
            },
            None => None,
        };
        entries.push(HistoryEntry {
            task_type: task_ref.map_or("unknown", |r| r.kind.collection()),
            success_rate: report.success_rate(),
            task_name,
            report,
        });
    }
    Ok(entries)
}
