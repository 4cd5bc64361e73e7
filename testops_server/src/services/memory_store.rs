//! In-memory store for reconciler and router tests.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::store::TaskStore;
use crate::dashboard::{
    self, DashboardStats, KindCounts, ProjectCounts, TaskCounts, TestcaseCounts, TrendDay,
};
use crate::models::log::{LogEntry, NewLogEntry};
use crate::models::project::{NewProject, Project};
use crate::models::report::{NewReport, Report, ReportFilter};
use crate::models::task::{Task, TaskKind, TaskRef};

/// Thread-safe in-memory task store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskStore {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    projects: Vec<Project>,
    tasks: Vec<Task>,
    reports: Vec<Report>,
    logs: Vec<LogEntry>,
}

fn newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn report_from(id: i64, new: NewReport, created_at: chrono::DateTime<Utc>) -> Report {
    Report {
        id,
        task_code: new.task_code,
        task_kind: new.task_kind,
        task_row_id: new.task_row_id,
        project_id: new.project_id,
        project_name: new.project_name,
        jenkins_job: new.jenkins_job,
        build_number: new.build_number,
        status: new.status,
        total_tests: new.total_tests,
        passed_tests: new.passed_tests,
        failed_tests: new.failed_tests,
        skipped_tests: new.skipped_tests,
        duration_seconds: new.duration_seconds,
        start_time: new.start_time,
        end_time: new.end_time,
        created_at,
    }
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> anyhow::Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    fn write(&self) -> anyhow::Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }

    pub fn add_project(&self, name: &str, repo_link: Option<&str>) -> Project {
        let mut state = self.state.write().unwrap();
        let project = Project {
            id: state.projects.len() as i32 + 1,
            name: name.to_string(),
            description: None,
            status: "active".to_string(),
            repo_link: repo_link.map(str::to_string),
            created_at: Utc::now(),
        };
        state.projects.push(project.clone());
        project
    }

    /// Store a task directly; `jenkins_job` and status are taken as given.
    pub fn add_task(&self, kind: TaskKind, id: i32, job: Option<&str>, status: &str) -> Task {
        let task = Task {
            kind,
            id,
            code: format!("{}-{id:03}", kind.prefix()),
            name: format!("{} {id}", kind.label()),
            description: None,
            project_id: 1,
            jenkins_job: job.map(str::to_string),
            status: status.to_string(),
            schedule_time: (kind == TaskKind::Plan).then(|| "*/5 * * * *".to_string()),
            cicd_type: (kind == TaskKind::Cicd).then(|| "Test".to_string()),
            created_at: Utc::now(),
        };
        self.state.write().unwrap().tasks.push(task.clone());
        task
    }

    pub fn add_report(&self, report: Report) {
        self.state.write().unwrap().reports.push(report);
    }

    pub fn status_of(&self, task: TaskRef) -> Option<String> {
        let state = self.state.read().unwrap();
        state
            .tasks
            .iter()
            .find(|t| t.task_ref() == task)
            .map(|t| t.status.clone())
    }

    pub fn all_reports(&self) -> Vec<Report> {
        self.state.read().unwrap().reports.clone()
    }

    pub fn all_logs(&self) -> Vec<LogEntry> {
        self.state.read().unwrap().logs.clone()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get_project(&self, id: i32) -> anyhow::Result<Option<Project>> {
        Ok(self.read()?.projects.iter().find(|p| p.id == id).cloned())
    }

    async fn list_projects(&self) -> anyhow::Result<Vec<Project>> {
        Ok(self.read()?.projects.clone())
    }

    async fn create_project(&self, project: NewProject) -> anyhow::Result<Project> {
        let mut state = self.write()?;
        let created = Project {
            id: state.projects.iter().map(|p| p.id).max().unwrap_or(0) + 1,
            name: project.name,
            description: project.description,
            status: project.status,
            repo_link: project.repo_link,
            created_at: Utc::now(),
        };
        state.projects.push(created.clone());
        Ok(created)
    }

    async fn list_tasks(&self, kind: TaskKind, project_id: Option<i32>) -> anyhow::Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .read()?
            .tasks
            .iter()
            .filter(|t| t.kind == kind && project_id.map_or(true, |p| t.project_id == p))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.id);
        Ok(tasks)
    }

    async fn get_task(&self, task: TaskRef) -> anyhow::Result<Option<Task>> {
        Ok(self.read()?.tasks.iter().find(|t| t.task_ref() == task).cloned())
    }

    async fn find_task_by_code(&self, kind: TaskKind, code: &str) -> anyhow::Result<Option<Task>> {
        Ok(self
            .read()?
            .tasks
            .iter()
            .find(|t| t.kind == kind && t.code == code)
            .cloned())
    }

    async fn find_tasks_by_job(&self, job: &str) -> anyhow::Result<Vec<Task>> {
        Ok(self
            .read()?
            .tasks
            .iter()
            .filter(|t| t.jenkins_job.as_deref() == Some(job))
            .cloned()
            .collect())
    }

    async fn insert_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut state = self.write()?;
        if state.tasks.iter().any(|t| t.task_ref() == task.task_ref()) {
            anyhow::bail!("duplicate key: {}", task.task_ref());
        }
        state.tasks.push(task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &Task) -> anyhow::Result<()> {
        let mut state = self.write()?;
        if let Some(stored) = state.tasks.iter_mut().find(|t| t.task_ref() == task.task_ref()) {
            *stored = task.clone();
        }
        Ok(())
    }

    async fn set_task_status(&self, task: TaskRef, status: &str) -> anyhow::Result<()> {
        let mut state = self.write()?;
        if let Some(stored) = state.tasks.iter_mut().find(|t| t.task_ref() == task) {
            stored.status = status.to_string();
        }
        Ok(())
    }

    async fn delete_task(&self, task: TaskRef) -> anyhow::Result<bool> {
        let mut state = self.write()?;
        let before = state.tasks.len();
        state.tasks.retain(|t| t.task_ref() != task);
        Ok(state.tasks.len() < before)
    }

    async fn insert_report(&self, report: NewReport) -> anyhow::Result<Report> {
        let mut state = self.write()?;
        let id = state.reports.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let stored = report_from(id, report, Utc::now());
        state.reports.push(stored.clone());
        Ok(stored)
    }

    async fn find_report(&self, code: &str, build_number: i64) -> anyhow::Result<Option<Report>> {
        let mut matching: Vec<Report> = self
            .read()?
            .reports
            .iter()
            .filter(|r| r.task_code == code && r.build_number == Some(build_number))
            .cloned()
            .collect();
        newest_first(&mut matching);
        Ok(matching.into_iter().next())
    }

    async fn update_report(&self, id: i64, report: NewReport) -> anyhow::Result<Report> {
        let mut state = self.write()?;
        let stored = state
            .reports
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("report {id} missing"))?;
        *stored = report_from(id, report, stored.created_at);
        Ok(stored.clone())
    }

    async fn reports_for_task(&self, code: &str) -> anyhow::Result<Vec<Report>> {
        let mut matching: Vec<Report> = self
            .read()?
            .reports
            .iter()
            .filter(|r| r.task_code == code)
            .cloned()
            .collect();
        newest_first(&mut matching);
        Ok(matching)
    }

    async fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<Vec<Report>> {
        let mut matching: Vec<Report> = self
            .read()?
            .reports
            .iter()
            .filter(|r| filter.project_id.map_or(true, |p| r.project_id == Some(p)))
            .filter(|r| filter.kind.map_or(true, |k| r.task_kind == k.as_str()))
            .filter(|r| filter.created_from.map_or(true, |from| r.created_at >= from))
            .filter(|r| filter.created_before.map_or(true, |before| r.created_at < before))
            .cloned()
            .collect();
        newest_first(&mut matching);
        matching.truncate(usize::try_from(filter.limit).unwrap_or(0));
        Ok(matching)
    }

    async fn delete_reports(&self, code: &str) -> anyhow::Result<usize> {
        let mut state = self.write()?;
        let before = state.reports.len();
        state.reports.retain(|r| r.task_code != code);
        Ok(before - state.reports.len())
    }

    async fn append_log(&self, entry: NewLogEntry) -> anyhow::Result<()> {
        let mut state = self.write()?;
        let id = state.logs.len() as i64 + 1;
        state.logs.push(LogEntry {
            id,
            level: entry.level,
            message: entry.message,
            source: entry.source,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_logs(&self, limit: i64) -> anyhow::Result<Vec<LogEntry>> {
        let state = self.read()?;
        Ok(state
            .logs
            .iter()
            .rev()
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn dashboard_stats(&self) -> anyhow::Result<DashboardStats> {
        let state = self.read()?;
        let today = Utc::now().date_naive();
        let per_kind: Vec<(TaskKind, KindCounts)> = TaskKind::ALL
            .into_iter()
            .map(|kind| {
                let tasks = state.tasks.iter().filter(|t| t.kind == kind);
                (kind, KindCounts::tally(tasks, today))
            })
            .collect();
        Ok(DashboardStats {
            projects: ProjectCounts::tally(&state.projects),
            tasks: TaskCounts::summarize(&per_kind),
            testcases: TestcaseCounts::tally(&state.reports),
        })
    }

    async fn execution_trends(&self, days: i64) -> anyhow::Result<Vec<TrendDay>> {
        let state = self.read()?;
        let now = Utc::now();
        let rows = dashboard::tally_trends(&state.reports, dashboard::trend_window_start(now, days));
        Ok(dashboard::fill_trend_window(rows, now, days))
    }
}
