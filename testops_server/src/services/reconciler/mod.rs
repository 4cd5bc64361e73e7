//! Task-to-Jenkins reconciliation.
//!
//! [`Reconciler`] owns every task status write. It triggers and configures
//! Jenkins jobs (`trigger`), maps observed builds onto task statuses
//! (`status`) and turns finished builds into reports (`recording`). No step
//! holds anything across a Jenkins call beyond the task row it works on, and
//! every status write is last-write-wins.

mod recording;
mod status;
mod trigger;

pub use recording::{RecordedReport, WebhookOutcome, WebhookPayload};
pub use status::{StatusOutcome, StopOutcome};
pub use trigger::RunOutcome;

use std::sync::Arc;

use serde::Serialize;

use crate::config::TestOpsConfig;
use crate::error::{ApiError, RemoteError};
use crate::metrics;
use crate::models::report::latest_meaningful;
use crate::models::task::{NewTask, Task, TaskChanges, TaskKind, TaskRef, TaskStatus};
use crate::services::github_service::HookRegistrar;
use crate::services::jenkins_gateway::{BuildInfo, BuildRef, JenkinsGateway};
use crate::services::store::TaskStore;
use crate::services::task_codes;
use crate::services::xml_trigger::{self, XmlEditError};

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn TaskStore>,
    jenkins: Arc<dyn JenkinsGateway>,
    hooks: Arc<dyn HookRegistrar>,
    config: Arc<TestOpsConfig>,
}

/// Why a job config round trip did not complete.
#[derive(Debug)]
enum ConfigEditError {
    Remote(RemoteError),
    Xml(XmlEditError),
}

impl ConfigEditError {
    fn into_api_error(self, job: &str) -> ApiError {
        match self {
            Self::Remote(e) => ApiError::Remote(e),
            Self::Xml(e) => ApiError::ConfigXml {
                job: job.to_string(),
                reason: e.to_string(),
            },
        }
    }
}

impl std::fmt::Display for ConfigEditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Remote(e) => e.fmt(f),
            Self::Xml(e) => e.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub message: String,
    pub task_code: String,
    pub reports_deleted: usize,
    /// Result of removing the job trigger, when one applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jenkins_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultFile {
    pub name: &'static str,
    pub url: String,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResults {
    pub task: Task,
    pub jenkins_job: String,
    pub build_info: BuildInfo,
    pub artifacts: Vec<serde_json::Value>,
    pub result_files: Vec<ResultFile>,
    pub console_log: String,
    pub jenkins_url: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        jenkins: Arc<dyn JenkinsGateway>,
        hooks: Arc<dyn HookRegistrar>,
        config: Arc<TestOpsConfig>,
    ) -> Self {
        Self {
            store,
            jenkins,
            hooks,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn jenkins(&self) -> &Arc<dyn JenkinsGateway> {
        &self.jenkins
    }

    pub async fn load_task(&self, task: TaskRef) -> Result<Task, ApiError> {
        self.store
            .get_task(task)
            .await?
            .ok_or_else(|| ApiError::NotFound(task.to_string()))
    }

    fn require_job(task: &Task) -> Result<String, ApiError> {
        task.job().map(str::to_string).ok_or_else(|| {
            ApiError::Configuration(format!("{} has no Jenkins job configured", task.code))
        })
    }

    /// Persist `status` unless the task already has it. Returns whether a
    /// write happened; `task` reflects the stored status afterwards.
    async fn write_status(&self, task: &mut Task, status: TaskStatus) -> Result<bool, ApiError> {
        self.write_raw_status(task, status.as_str()).await
    }

    /// Like [`Self::write_status`] for Jenkins words outside [`TaskStatus`].
    async fn write_raw_status(&self, task: &mut Task, status: &str) -> Result<bool, ApiError> {
        if task.status == status {
            return Ok(false);
        }
        self.store.set_task_status(task.task_ref(), status).await?;
        metrics::task_status_changed(task.kind.as_str(), status);
        tracing::info!(task = %task.code, from = %task.status, to = status, "Task status written");
        task.status = status.to_string();
        Ok(true)
    }

    /// Fetch a job config, apply `edit` and write it back when it changed.
    async fn edit_job_config<F>(&self, job: &str, edit: F) -> Result<(), ConfigEditError>
    where
        F: FnOnce(&str) -> Result<String, XmlEditError> + Send,
    {
        let current = self
            .jenkins
            .get_job_config(job)
            .await
            .map_err(ConfigEditError::Remote)?;
        let updated = edit(&current).map_err(ConfigEditError::Xml)?;
        if updated == current {
            tracing::debug!(job, "Job config already up to date");
            return Ok(());
        }
        self.jenkins
            .put_job_config(job, &updated)
            .await
            .map_err(ConfigEditError::Remote)
    }

    // ── CRUD ──

    pub async fn create_task(&self, kind: TaskKind, new: NewTask) -> Result<Task, ApiError> {
        if self.store.get_project(new.project_id).await?.is_none() {
            return Err(ApiError::NotFound(format!("Project {}", new.project_id)));
        }
        let schedule_time = match kind {
            TaskKind::Plan => {
                let schedule = new.schedule_time.as_deref().map(str::trim).unwrap_or_default();
                task_codes::validate_schedule(schedule)?;
                Some(schedule.to_string())
            }
            _ => None,
        };
        let cicd_type = match kind {
            TaskKind::Cicd => Some(
                new.cicd_type
                    .clone()
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| ApiError::Validation("cicd_type is required".to_string()))?,
            ),
            _ => None,
        };

        let existing = self.store.list_tasks(kind, None).await?;
        let ids: Vec<i32> = existing.iter().map(|t| t.id).collect();
        let codes: Vec<&str> = existing.iter().map(|t| t.code.as_str()).collect();
        let task = Task {
            kind,
            id: task_codes::smallest_free_id(&ids),
            code: task_codes::next_code(kind, &codes),
            name: new.name,
            description: new.description,
            project_id: new.project_id,
            jenkins_job: normalize_job(new.jenkins_job),
            status: TaskStatus::Initialized.as_str().to_string(),
            schedule_time,
            cicd_type,
            created_at: chrono::Utc::now(),
        };
        self.store.insert_task(&task).await?;
        tracing::info!(task = %task.code, id = task.id, "Task created");
        Ok(task)
    }

    /// Apply edits; a changed job binding or trigger setting resets the task
    /// to `initialized`.
    pub async fn update_task(&self, task_ref: TaskRef, changes: TaskChanges) -> Result<Task, ApiError> {
        let mut task = self.load_task(task_ref).await?;
        let mut reset = false;

        if let Some(name) = changes.name {
            task.name = name;
        }
        if let Some(description) = changes.description {
            task.description = Some(description);
        }
        if let Some(job) = changes.jenkins_job {
            let job = normalize_job(Some(job));
            reset |= job != task.jenkins_job;
            task.jenkins_job = job;
        }
        if task.kind == TaskKind::Plan {
            if let Some(schedule) = changes.schedule_time {
                let schedule = schedule.trim().to_string();
                task_codes::validate_schedule(&schedule)?;
                reset |= task.schedule_time.as_deref() != Some(schedule.as_str());
                task.schedule_time = Some(schedule);
            }
        }
        if task.kind == TaskKind::Cicd {
            if let Some(cicd_type) = changes.cicd_type {
                reset |= task.cicd_type.as_deref() != Some(cicd_type.as_str());
                task.cicd_type = Some(cicd_type);
            }
        }
        if reset {
            tracing::info!(task = %task.code, "Jenkins binding changed, status reset");
            task.status = TaskStatus::Initialized.as_str().to_string();
        }
        self.store.update_task(&task).await?;
        Ok(task)
    }

    /// Delete a task and its reports. Trigger cleanup in Jenkins is best
    /// effort and never blocks the deletion.
    pub async fn delete_task(&self, task_ref: TaskRef) -> Result<DeleteOutcome, ApiError> {
        let task = self.load_task(task_ref).await?;
        let jenkins_message = match (task.kind, task.job()) {
            (TaskKind::Plan, Some(job)) => Some(
                match self
                    .edit_job_config(job, |xml| Ok(xml_trigger::remove_timer_trigger(xml)))
                    .await
                {
                    Ok(()) => format!("Removed timer trigger from {job}"),
                    Err(e) => format!("Could not remove timer trigger from {job}: {e}"),
                },
            ),
            (TaskKind::Cicd, Some(job)) => Some(
                match self
                    .edit_job_config(job, |xml| Ok(xml_trigger::remove_push_trigger(xml)))
                    .await
                {
                    Ok(()) => format!("Removed push trigger from {job}"),
                    Err(e) => format!("Could not remove push trigger from {job}: {e}"),
                },
            ),
            _ => None,
        };

        let reports_deleted = self.store.delete_reports(&task.code).await?;
        self.store.delete_task(task_ref).await?;
        tracing::info!(task = %task.code, reports_deleted, "Task deleted");
        Ok(DeleteOutcome {
            message: format!("{} deleted", task.code),
            task_code: task.code,
            reports_deleted,
            jenkins_message,
        })
    }

    // ── Results ──

    /// Build details and result links for one build of the task's job.
    ///
    /// Without an explicit build number the latest meaningful report's build
    /// is used, then `lastBuild`.
    pub async fn results(&self, task_ref: TaskRef, build_number: Option<i64>) -> Result<TaskResults, ApiError> {
        let task = self.load_task(task_ref).await?;
        let job = Self::require_job(&task)?;
        let build_number = match build_number {
            Some(n) => Some(n),
            None => {
                let reports = self.store.reports_for_task(&task.code).await?;
                latest_meaningful(&reports).and_then(|r| r.build_number)
            }
        };
        let build = BuildRef::from(build_number);

        let info = self.jenkins.get_build_info(&job, build).await.ok_or_else(|| {
            RemoteError::connection(format!("build {build} of '{job}' is unavailable"))
        })?;
        let console_log = self.jenkins.fetch_console_log(&job, build).await;

        let ws = format!("{}/job/{job}/{build}/ws", self.config.jenkins_url);
        let result_files = vec![
            ResultFile {
                name: "report.html",
                url: format!("{ws}/report.html"),
                description: "Robot Framework Test Report",
            },
            ResultFile {
                name: "log.html",
                url: format!("{ws}/log.html"),
                description: "Robot Framework Test Log",
            },
            ResultFile {
                name: "output.xml",
                url: format!("{ws}/output.xml"),
                description: "Robot Framework Test Results XML",
            },
        ];

        Ok(TaskResults {
            task,
            jenkins_job: job,
            artifacts: info.artifacts.clone(),
            build_info: info,
            result_files,
            console_log,
            jenkins_url: self.config.jenkins_url.clone(),
        })
    }
}

fn normalize_job(job: Option<String>) -> Option<String> {
    job.map(|j| j.trim().to_string()).filter(|j| !j.is_empty())
}
