//! Dashboard aggregates over tasks and the report ledger.

pub mod kpi;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::sql_types::{BigInt, Date};
use diesel::QueryableByName;
use serde::Serialize;

use crate::models::project::Project;
use crate::models::report::{self, Report};
use crate::models::task::{Task, TaskKind, TaskStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub projects: ProjectCounts,
    pub tasks: TaskCounts,
    pub testcases: TestcaseCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, QueryableByName)]
pub struct ProjectCounts {
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub active: i64,
    #[diesel(sql_type = BigInt)]
    pub inactive: i64,
}

impl ProjectCounts {
    pub fn tally(projects: &[Project]) -> Self {
        let total = projects.len() as i64;
        let active = projects.iter().filter(|p| p.status == "active").count() as i64;
        Self {
            total,
            active,
            inactive: total - active,
        }
    }
}

/// Status counts for one task table.
#[derive(Debug, Clone, Copy, Default, PartialEq, QueryableByName)]
pub struct KindCounts {
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub running: i64,
    #[diesel(sql_type = BigInt)]
    pub success: i64,
    #[diesel(sql_type = BigInt)]
    pub failed: i64,
    #[diesel(sql_type = BigInt)]
    pub cancelled: i64,
    #[diesel(sql_type = BigInt)]
    pub today: i64,
}

impl KindCounts {
    pub fn tally<'a>(tasks: impl IntoIterator<Item = &'a Task>, today: NaiveDate) -> Self {
        tasks.into_iter().fold(Self::default(), |mut acc, task| {
            acc.total += 1;
            acc.running += i64::from(task.has_status(TaskStatus::Running));
            acc.success += i64::from(task.has_status(TaskStatus::Success));
            acc.failed += i64::from(task.has_status(TaskStatus::Failed));
            acc.cancelled += i64::from(task.has_status(TaskStatus::Cancelled));
            acc.today += i64::from(task.created_at.date_naive() == today);
            acc
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskCounts {
    pub total: i64,
    pub total_executions: i64,
    pub total_plans: i64,
    pub total_cicd: i64,
    pub running: i64,
    pub success: i64,
    pub success_executions: i64,
    pub success_plans: i64,
    pub success_cicd: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub today: i64,
    /// Successful share of tasks that are not running, in percent.
    pub success_rate: f64,
}

impl TaskCounts {
    pub fn summarize(per_kind: &[(TaskKind, KindCounts)]) -> Self {
        let mut counts = Self::default();
        for (kind, k) in per_kind {
            counts.total += k.total;
            counts.running += k.running;
            counts.success += k.success;
            counts.failed += k.failed;
            counts.cancelled += k.cancelled;
            counts.today += k.today;
            match kind {
                TaskKind::Execution => {
                    counts.total_executions = k.total;
                    counts.success_executions = k.success;
                }
                TaskKind::Plan => {
                    counts.total_plans = k.total;
                    counts.success_plans = k.success;
                }
                TaskKind::Cicd => {
                    counts.total_cicd = k.total;
                    counts.success_cicd = k.success;
                }
            }
        }
        counts.success_rate = report::success_rate(counts.success, counts.total - counts.running);
        counts
    }
}

/// Test counts summed over every stored report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, QueryableByName)]
pub struct TestcaseCounts {
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    /// Tests that actually executed (passed plus failed).
    #[diesel(sql_type = BigInt)]
    pub active: i64,
}

impl TestcaseCounts {
    pub fn tally(reports: &[Report]) -> Self {
        reports.iter().fold(Self::default(), |mut acc, r| {
            acc.total += i64::from(r.total_tests);
            acc.active += i64::from(r.passed_tests) + i64::from(r.failed_tests);
            acc
        })
    }
}

/// Report outcomes recorded on one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, QueryableByName)]
pub struct TrendDay {
    #[diesel(sql_type = Date)]
    pub date: NaiveDate,
    #[diesel(sql_type = BigInt)]
    pub total: i64,
    #[diesel(sql_type = BigInt)]
    pub success: i64,
    #[diesel(sql_type = BigInt)]
    pub failed: i64,
    #[diesel(sql_type = BigInt)]
    pub cancelled: i64,
}

impl TrendDay {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total: 0,
            success: 0,
            failed: 0,
            cancelled: 0,
        }
    }
}

/// First instant counted by a trend window of `days` ending at `now`.
pub fn trend_window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// Group reports created since `since` by day.
pub fn tally_trends(reports: &[Report], since: DateTime<Utc>) -> Vec<TrendDay> {
    let mut days: Vec<TrendDay> = Vec::new();
    for r in reports.iter().filter(|r| r.created_at >= since) {
        let date = r.created_at.date_naive();
        let idx = match days.iter().position(|d| d.date == date) {
            Some(idx) => idx,
            None => {
                days.push(TrendDay::empty(date));
                days.len() - 1
            }
        };
        let day = &mut days[idx];
        day.total += 1;
        if r.status == report::status::SUCCESS {
            day.success += 1;
        } else if report::is_failed_status(&r.status) {
            day.failed += 1;
        } else if report::is_cancelled_status(&r.status) {
            day.cancelled += 1;
        }
    }
    days
}

/// One entry per calendar day from the window start through `now`, with
/// zeros for days without reports.
pub fn fill_trend_window(rows: Vec<TrendDay>, now: DateTime<Utc>, days: i64) -> Vec<TrendDay> {
    let first = trend_window_start(now, days).date_naive();
    let last = now.date_naive();
    first
        .iter_days()
        .take_while(|date| *date <= last)
        .map(|date| {
            rows.iter()
                .find(|row| row.date == date)
                .cloned()
                .unwrap_or_else(|| TrendDay::empty(date))
        })
        .collect()
}
