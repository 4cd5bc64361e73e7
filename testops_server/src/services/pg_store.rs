//! [`TaskStore`] on PostgreSQL.
//!
//! Every call checks one connection out of the pool for its own duration;
//! the connection returns to the pool when the guard drops, on every path.

use async_trait::async_trait;
use chrono::Utc;
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::AsyncPgConnection;

use super::store::TaskStore;
use super::{log_service, project_service, report_service, task_service};
use crate::dashboard::{self, kpi, DashboardStats, ProjectCounts, TaskCounts, TrendDay};
use crate::models::log::{LogEntry, NewLogEntry};
use crate::models::project::{NewProject, Project};
use crate::models::report::{NewReport, Report, ReportFilter};
use crate::models::task::{Task, TaskKind, TaskRef};

pub type DbPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgTaskStore {
    pool: DbPool,
}

impl PgTaskStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> anyhow::Result<Object<AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn get_project(&self, id: i32) -> anyhow::Result<Option<Project>> {
        let mut conn = self.conn().await?;
        project_service::get_project(&mut conn, id).await
    }

    async fn list_projects(&self) -> anyhow::Result<Vec<Project>> {
        let mut conn = self.conn().await?;
        project_service::list_projects(&mut conn).await
    }

    async fn create_project(&self, project: NewProject) -> anyhow::Result<Project> {
        let mut conn = self.conn().await?;
        project_service::create_project(&mut conn, project).await
    }

    async fn list_tasks(&self, kind: TaskKind, project_id: Option<i32>) -> anyhow::Result<Vec<Task>> {
        let mut conn = self.conn().await?;
        task_service::list_tasks(&mut conn, kind, project_id).await
    }

    async fn get_task(&self, task: TaskRef) -> anyhow::Result<Option<Task>> {
        let mut conn = self.conn().await?;
        task_service::get_task(&mut conn, task).await
    }

    async fn find_task_by_code(&self, kind: TaskKind, code: &str) -> anyhow::Result<Option<Task>> {
        let mut conn = self.conn().await?;
        task_service::find_by_code(&mut conn, kind, code).await
    }

    async fn find_tasks_by_job(&self, job: &str) -> anyhow::Result<Vec<Task>> {
        let mut conn = self.conn().await?;
        task_service::find_by_job(&mut conn, job).await
    }

    async fn insert_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        task_service::insert_task(&mut conn, task).await
    }

    async fn update_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        task_service::update_task(&mut conn, task).await
    }

    async fn set_task_status(&self, task: TaskRef, status: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        task_service::set_status(&mut conn, task, status).await
    }

    async fn delete_task(&self, task: TaskRef) -> anyhow::Result<bool> {
        let mut conn = self.conn().await?;
        task_service::delete_task(&mut conn, task).await
    }

    async fn insert_report(&self, report: NewReport) -> anyhow::Result<Report> {
        let mut conn = self.conn().await?;
        report_service::insert_report(&mut conn, report).await
    }

    async fn find_report(&self, code: &str, build_number: i64) -> anyhow::Result<Option<Report>> {
        let mut conn = self.conn().await?;
        report_service::find_for_build(&mut conn, code, build_number).await
    }

    async fn update_report(&self, id: i64, report: NewReport) -> anyhow::Result<Report> {
        let mut conn = self.conn().await?;
        report_service::update_report(&mut conn, id, report).await
    }

    async fn reports_for_task(&self, code: &str) -> anyhow::Result<Vec<Report>> {
        let mut conn = self.conn().await?;
        report_service::list_for_task(&mut conn, code).await
    }

    async fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>> {
        let mut conn = self.conn().await?;
        report_service::list_filtered(&mut conn, filter).await
    }

    async fn delete_reports(&self, code: &str) -> anyhow::Result<usize> {
        let mut conn = self.conn().await?;
        report_service::delete_for_task(&mut conn, code).await
    }

    async fn append_log(&self, entry: NewLogEntry) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        log_service::append(&mut conn, entry).await
    }

    async fn recent_logs(&self, limit: i64) -> anyhow::Result<Vec<LogEntry>> {
        let mut conn = self.conn().await?;
        log_service::recent(&mut conn, limit).await
    }

    async fn dashboard_stats(&self) -> anyhow::Result<DashboardStats> {
        let mut conn = self.conn().await?;
        let projects: ProjectCounts = kpi::query_project_counts(&mut conn).await?;
        let mut per_kind = Vec::with_capacity(TaskKind::ALL.len());
        for kind in TaskKind::ALL {
            per_kind.push((kind, kpi::query_kind_counts(&mut conn, kind).await?));
        }
        let testcases = kpi::query_testcase_counts(&mut conn).await?;
        Ok(DashboardStats {
            projects,
            tasks: TaskCounts::summarize(&per_kind),
            testcases,
        })
    }

    async fn execution_trends(&self, days: i64) -> anyhow::Result<Vec<TrendDay>> {
        let mut conn = self.conn().await?;
        let rows = kpi::query_trend_days(&mut conn, days).await?;
        Ok(dashboard::fill_trend_window(rows, Utc::now(), days))
    }
}
