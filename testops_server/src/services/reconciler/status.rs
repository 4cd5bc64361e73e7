//! Mapping observed Jenkins builds onto task statuses: poll, force update
//! and stop.

use serde::Serialize;

use super::Reconciler;
use crate::error::{ApiError, RemoteError};
use crate::models::task::{TaskKind, TaskRef, TaskStatus};
use crate::services::jenkins_gateway::{BuildInfo, BuildRef};
use crate::services::xml_trigger;

/// Task status a poll derives from the job's last build.
///
/// SUCCESS and FAILURE both count as a completed run. A task that is already
/// cancelled stays cancelled while Jenkins still reports the build as running.
pub fn poll_status(current: &str, build: &BuildInfo) -> TaskStatus {
    let observed = if build.building {
        TaskStatus::Running
    } else {
        match build.result.as_deref() {
            Some("SUCCESS" | "FAILURE") => TaskStatus::Success,
            Some("ABORTED") => TaskStatus::Cancelled,
            _ => TaskStatus::Running,
        }
    };
    if observed == TaskStatus::Running && current == TaskStatus::Cancelled.as_str() {
        return TaskStatus::Cancelled;
    }
    observed
}

/// Status word for a settled build, as written by a forced update.
pub fn settled_status(result: Option<&str>) -> String {
    match result {
        Some("SUCCESS" | "FAILURE") => TaskStatus::Success.as_str().to_string(),
        Some("ABORTED") => TaskStatus::Cancelled.as_str().to_string(),
        Some(other) if !other.is_empty() => other.to_lowercase(),
        _ => "unknown".to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusOutcome {
    pub task_code: String,
    pub status: String,
    pub changed: bool,
    pub message: String,
    /// Last build as Jenkins reported it; absent when Jenkins was unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub message: String,
    pub task_code: String,
    pub status: String,
    /// Whether Jenkins acknowledged a stop request, when one was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_stopped: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jenkins_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reconciler {
    /// Poll Jenkins for the last build and align the task status with it.
    ///
    /// An unreachable Jenkins keeps the stored status. A plan that has just
    /// turned successful gets its report saved in the background.
    pub async fn check_status(&self, task_ref: TaskRef) -> Result<StatusOutcome, ApiError> {
        let mut task = self.load_task(task_ref).await?;
        let job = Self::require_job(&task)?;

        let Some(build) = self.jenkins.get_build_info(&job, BuildRef::Last).await else {
            tracing::warn!(task = %task.code, job = %job, "Jenkins status unavailable, keeping stored status");
            return Ok(StatusOutcome {
                task_code: task.code,
                status: task.status,
                changed: false,
                message: format!("Could not reach Jenkins for '{job}'"),
                build: None,
            });
        };

        let status = poll_status(&task.status, &build);
        let changed = self.write_status(&mut task, status).await?;
        if changed && task.kind == TaskKind::Plan && status == TaskStatus::Success {
            let reconciler = self.clone();
            let code = task.code.clone();
            tokio::spawn(async move {
                if let Err(e) = reconciler.save_report(&code).await {
                    tracing::warn!(task = %code, error = %e, "Background report save failed");
                }
            });
        }

        Ok(StatusOutcome {
            task_code: task.code,
            status: task.status,
            changed,
            message: format!("Build #{} of '{job}'", build.number),
            build: Some(build),
        })
    }

    /// Write the settled result of the last build, refusing while it runs.
    pub async fn force_update(&self, task_ref: TaskRef) -> Result<StatusOutcome, ApiError> {
        let mut task = self.load_task(task_ref).await?;
        let job = Self::require_job(&task)?;
        let build = self
            .jenkins
            .get_build_info(&job, BuildRef::Last)
            .await
            .ok_or_else(|| RemoteError::connection(format!("build info for '{job}' is unavailable")))?;
        if build.building {
            return Err(ApiError::StillBuilding(job));
        }

        let status = settled_status(build.result.as_deref());
        let changed = self.write_raw_status(&mut task, &status).await?;
        Ok(StatusOutcome {
            task_code: task.code,
            status: task.status,
            changed,
            message: format!("Status forced from build #{} of '{job}'", build.number),
            build: Some(build),
        })
    }

    /// Cancel a task. Executions and plans are always cancelled locally,
    /// whatever Jenkins answers; CI/CD tasks are deactivated only once their
    /// push trigger is gone.
    pub async fn stop(&self, task_ref: TaskRef) -> Result<StopOutcome, ApiError> {
        let mut task = self.load_task(task_ref).await?;
        if task.kind == TaskKind::Cicd {
            let job = Self::require_job(&task)?;
            let edited = self
                .edit_job_config(&job, |xml| Ok(xml_trigger::remove_push_trigger(xml)))
                .await;
            return match edited {
                Ok(()) => {
                    self.write_status(&mut task, TaskStatus::Deactive).await?;
                    Ok(StopOutcome {
                        message: format!("Push trigger removed from '{job}'"),
                        task_code: task.code,
                        status: task.status,
                        remote_stopped: None,
                        jenkins_message: None,
                        error: None,
                    })
                }
                Err(e) => {
                    tracing::warn!(task = %task.code, job = %job, error = %e, "Push trigger removal failed");
                    Ok(StopOutcome {
                        message: format!("Could not deactivate '{job}'"),
                        task_code: task.code,
                        status: task.status,
                        remote_stopped: None,
                        jenkins_message: None,
                        error: Some(e.to_string()),
                    })
                }
            };
        }

        let mut remote_stopped = None;
        let mut jenkins_message = None;
        if let Some(job) = task.job().map(str::to_string) {
            if let Some(build) = self.jenkins.get_build_info(&job, BuildRef::Last).await {
                if build.building {
                    let stopped = self.jenkins.stop_build(&job, BuildRef::Number(build.number)).await;
                    if !stopped {
                        tracing::warn!(task = %task.code, job = %job, build = build.number, "Jenkins did not confirm stop");
                    }
                    remote_stopped = Some(stopped);
                }
            }
            if task.kind == TaskKind::Plan {
                jenkins_message = Some(
                    match self
                        .edit_job_config(&job, |xml| Ok(xml_trigger::remove_timer_trigger(xml)))
                        .await
                    {
                        Ok(()) => format!("Timer trigger removed from '{job}'"),
                        Err(e) => format!("Could not remove timer trigger from '{job}': {e}"),
                    },
                );
            }
        }

        self.write_status(&mut task, TaskStatus::Cancelled).await?;
        Ok(StopOutcome {
            message: format!("{} cancelled", task.code),
            task_code: task.code,
            status: task.status,
            remote_stopped,
            jenkins_message,
            error: None,
        })
    }
}
