//! Persistence port for tasks, reports, projects and the log ledger.

use async_trait::async_trait;

use crate::dashboard::{DashboardStats, TrendDay};
use crate::models::log::{LogEntry, NewLogEntry};
use crate::models::project::{NewProject, Project};
use crate::models::report::{NewReport, Report, ReportFilter};
use crate::models::task::{Task, TaskKind, TaskRef};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn get_project(&self, id: i32) -> anyhow::Result<Option<Project>>;

    async fn list_projects(&self) -> anyhow::Result<Vec<Project>>;

    async fn create_project(&self, project: NewProject) -> anyhow::Result<Project>;

    /// Tasks of one kind ordered by id, optionally limited to a project.
    async fn list_tasks(&self, kind: TaskKind, project_id: Option<i32>) -> anyhow::Result<Vec<Task>>;

    async fn get_task(&self, task: TaskRef) -> anyhow::Result<Option<Task>>;

    async fn find_task_by_code(&self, kind: TaskKind, code: &str) -> anyhow::Result<Option<Task>>;

    /// Every task of every kind backed by `job`.
    async fn find_tasks_by_job(&self, job: &str) -> anyhow::Result<Vec<Task>>;

    /// Store a task whose id and code were already allocated.
    async fn insert_task(&self, task: &Task) -> anyhow::Result<()>;

    /// Overwrite the editable columns of an existing task.
    async fn update_task(&self, task: &Task) -> anyhow::Result<()>;

    /// Last write wins; writing the current value again is harmless.
    async fn set_task_status(&self, task: TaskRef, status: &str) -> anyhow::Result<()>;

    async fn delete_task(&self, task: TaskRef) -> anyhow::Result<bool>;

    async fn insert_report(&self, report: NewReport) -> anyhow::Result<Report>;

    /// Newest report for `(code, build_number)`.
    async fn find_report(&self, code: &str, build_number: i64) -> anyhow::Result<Option<Report>>;

    async fn update_report(&self, id: i64, report: NewReport) -> anyhow::Result<Report>;

    /// Reports for a task code, newest first.
    async fn reports_for_task(&self, code: &str) -> anyhow::Result<Vec<Report>>;

    /// Filtered history, newest first.
    async fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>>;

    async fn delete_reports(&self, code: &str) -> anyhow::Result<usize>;

    async fn append_log(&self, entry: NewLogEntry) -> anyhow::Result<()>;

    async fn recent_logs(&self, limit: i64) -> anyhow::Result<Vec<LogEntry>>;

    async fn dashboard_stats(&self) -> anyhow::Result<DashboardStats>;

    /// Per-day report outcomes over the last `days` days, gaps filled.
    async fn execution_trends(&self, days: i64) -> anyhow::Result<Vec<TrendDay>>;
}
