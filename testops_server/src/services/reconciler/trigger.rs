//! The `run` action for each task kind.

use serde::Serialize;

use super::{ConfigEditError, Reconciler};
use crate::error::ApiError;
use crate::models::task::{Task, TaskKind, TaskRef, TaskStatus};
use crate::services::task_codes;
use crate::services::xml_trigger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Warning,
    Info,
    Error,
}

/// Outcome of one independent configuration step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub status: StepStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub message: String,
    pub task_code: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<i64>,
    /// Jenkins' own error text when the run was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
}

impl RunOutcome {
    fn new(task: &Task, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            task_code: task.code.clone(),
            status: task.status.clone(),
            build_number: None,
            error: None,
            steps: Vec::new(),
        }
    }
}

const JENKINS_STEP: &str = "Jenkins Configuration";
const GITHUB_STEP: &str = "GitHub Webhook";

impl Reconciler {
    /// Start or configure a task in Jenkins.
    ///
    /// Remote rejections end up in the task status and the returned message;
    /// only local problems (missing job, unpatchable XML) are errors.
    pub async fn run(&self, task_ref: TaskRef) -> Result<RunOutcome, ApiError> {
        let task = self.load_task(task_ref).await?;
        match task.kind {
            TaskKind::Execution => self.run_execution(task).await,
            TaskKind::Plan => self.schedule_plan(task).await,
            TaskKind::Cicd => self.activate_cicd(task).await,
        }
    }

    async fn run_execution(&self, mut task: Task) -> Result<RunOutcome, ApiError> {
        let job = Self::require_job(&task)?;
        let params = vec![("TASK_ID".to_string(), task.code.clone())];
        let triggered = self.jenkins.trigger_build(&job, params).await;

        if triggered.accepted {
            self.write_status(&mut task, TaskStatus::Running).await?;
            tracing::info!(task = %task.code, job = %job, build = ?triggered.build_number, "Build triggered");
            let mut outcome = RunOutcome::new(&task, format!("Triggered Jenkins job '{job}'"));
            outcome.build_number = triggered.build_number;
            return Ok(outcome);
        }

        let error = triggered.failure_message();
        tracing::warn!(task = %task.code, job = %job, %error, "Jenkins rejected build");
        self.write_status(&mut task, TaskStatus::Failed).await?;
        let mut outcome = RunOutcome::new(&task, format!("Failed to trigger Jenkins job '{job}'"));
        outcome.error = Some(error);
        Ok(outcome)
    }

    /// Install the timer trigger and result publisher; Jenkins runs the plan.
    async fn schedule_plan(&self, mut task: Task) -> Result<RunOutcome, ApiError> {
        let job = Self::require_job(&task)?;
        let cron = task
            .schedule_time
            .clone()
            .ok_or_else(|| ApiError::Configuration(format!("{} has no schedule", task.code)))?;
        task_codes::validate_schedule(&cron)?;

        let webhook_url = self.config.result_webhook_url.clone();
        let (job_name, code) = (job.clone(), task.code.clone());
        let edited = self
            .edit_job_config(&job, move |xml| {
                let xml = xml_trigger::ensure_timer_trigger(xml, &cron)?;
                xml_trigger::ensure_result_webhook(&xml, &webhook_url, &job_name, "plan", &code)
            })
            .await;

        match edited {
            Ok(()) => {
                self.write_status(&mut task, TaskStatus::Configured).await?;
                let schedule = task.schedule_time.as_deref().unwrap_or_default();
                Ok(RunOutcome::new(
                    &task,
                    format!("Scheduled '{job}' with cron '{schedule}'"),
                ))
            }
            Err(ConfigEditError::Remote(e)) => {
                tracing::warn!(task = %task.code, job = %job, error = %e, "Plan configuration failed");
                self.write_status(&mut task, TaskStatus::Failed).await?;
                let mut outcome = RunOutcome::new(&task, format!("Failed to configure '{job}'"));
                outcome.error = Some(e.to_string());
                Ok(outcome)
            }
            Err(e) => Err(e.into_api_error(&job)),
        }
    }

    /// Enable push builds on the job, then register the repository hook.
    async fn activate_cicd(&self, mut task: Task) -> Result<RunOutcome, ApiError> {
        task_codes::validate_cicd_type(task.cicd_type.as_deref().unwrap_or_default())?;
        let job = Self::require_job(&task)?;
        let project = self
            .store
            .get_project(task.project_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Project {}", task.project_id)))?;

        self.write_status(&mut task, TaskStatus::Configuring).await?;
        let mut steps = Vec::with_capacity(2);

        match self
            .edit_job_config(&job, xml_trigger::ensure_push_trigger)
            .await
        {
            Ok(()) => steps.push(StepReport {
                step: JENKINS_STEP,
                status: StepStatus::Success,
                message: format!("GitHub push trigger enabled on '{job}'"),
            }),
            Err(e) => {
                tracing::warn!(task = %task.code, job = %job, error = %e, "Push trigger setup failed");
                steps.push(StepReport {
                    step: JENKINS_STEP,
                    status: StepStatus::Error,
                    message: e.to_string(),
                });
                self.write_status(&mut task, TaskStatus::Error).await?;
                let mut outcome = RunOutcome::new(&task, format!("Failed to configure '{job}'"));
                outcome.error = Some(e.to_string());
                outcome.steps = steps;
                return Ok(outcome);
            }
        }

        let repo_link = project.repo_link.as_deref().map(str::trim).unwrap_or_default();
        if repo_link.is_empty() {
            steps.push(StepReport {
                step: GITHUB_STEP,
                status: StepStatus::Info,
                message: format!("Project '{}' has no repository link", project.name),
            });
        } else {
            steps.push(match self.hooks.register_push_hook(repo_link).await {
                Ok(registration) => StepReport {
                    step: GITHUB_STEP,
                    status: StepStatus::Success,
                    message: registration.message,
                },
                Err(e) => {
                    tracing::warn!(task = %task.code, repo = repo_link, error = %e, "Hook registration failed");
                    StepReport {
                        step: GITHUB_STEP,
                        status: StepStatus::Warning,
                        message: e.to_string(),
                    }
                }
            });
        }

        self.write_status(&mut task, TaskStatus::Active).await?;
        let mut outcome = RunOutcome::new(&task, format!("CI/CD pipeline active on '{job}'"));
        outcome.steps = steps;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::RemoteError;
    use crate::services::github_service::{HookError, HookRegistration, MockHookRegistrar};
    use crate::services::jenkins_gateway::{BuildTriggerResult, MockJenkinsGateway};
    use crate::services::memory_store::InMemoryTaskStore;
    use std::sync::{Arc, Mutex};

    fn store_with_project(repo_link: Option<&str>) -> InMemoryTaskStore {
        let store = InMemoryTaskStore::new();
        store.add_project("Storefront", repo_link);
        store
    }

    #[tokio::test]
    async fn accepted_execution_is_running() {
        let store = store_with_project(None);
        let task = store.add_task(TaskKind::Execution, 1, Some("smoke"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_trigger_build()
            .withf(|job, params| {
                job == "smoke" && params == &vec![("TASK_ID".to_string(), "TASK-001".to_string())]
            })
            .returning(|_, _| BuildTriggerResult {
                accepted: true,
                build_number: Some(42),
                raw_status: Some(201),
                raw_body: String::new(),
            });
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.status, "running");
        assert_eq!(outcome.build_number, Some(42));
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("running"));
    }

    #[tokio::test]
    async fn rejected_execution_fails_with_jenkins_text() {
        let store = store_with_project(None);
        let task = store.add_task(TaskKind::Execution, 1, Some("smoke"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins.expect_trigger_build().returning(|_, _| BuildTriggerResult {
            accepted: false,
            build_number: None,
            raw_status: Some(404),
            raw_body: "No such job".to_string(),
        });
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.status, "failed");
        assert_eq!(outcome.error.as_deref(), Some("HTTP 404: No such job"));
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn execution_without_job_is_a_configuration_error() {
        let store = store_with_project(None);
        let task = store.add_task(TaskKind::Execution, 1, None, "initialized");
        let rec = reconciler(&store, MockJenkinsGateway::new(), MockHookRegistrar::new());

        let err = rec.run(task.task_ref()).await.unwrap_err();
        assert!(matches!(err, ApiError::Configuration(_)));
    }

    #[tokio::test]
    async fn plan_run_installs_one_timer_and_one_publisher() {
        let store = store_with_project(None);
        let task = store.add_task(TaskKind::Plan, 1, Some("nightly"), "initialized");
        let written = Arc::new(Mutex::new(Vec::<String>::new()));

        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_job_config()
            .returning(|_| Ok(PIPELINE_XML.to_string()));
        let sink = Arc::clone(&written);
        jenkins
            .expect_put_job_config()
            .times(1)
            .returning(move |_, xml| {
                sink.lock().unwrap().push(xml.to_string());
                Ok(())
            });
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.status, "configured");
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("configured"));
        let xml = written.lock().unwrap().pop().unwrap();
        assert_eq!(xml.matches("<hudson.triggers.TimerTrigger>").count(), 1);
        assert!(xml.contains("<spec>*/5 * * * *</spec>"));
        assert_eq!(
            xml.matches("<hudson.plugins.http_request.HttpRequestPublisher").count(),
            1
        );
        assert!(xml.contains("http://testops.test/api/reports/jenkins/webhook"));
        assert_eq!(xml.matches("PLAN-001").count(), 1);
    }

    #[tokio::test]
    async fn plan_run_fails_when_config_cannot_be_read() {
        let store = store_with_project(None);
        let task = store.add_task(TaskKind::Plan, 1, Some("nightly"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_job_config()
            .returning(|_| Err(RemoteError::http(404, "Not Found")));
        jenkins.expect_put_job_config().never();
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.status, "failed");
        assert_eq!(outcome.error.as_deref(), Some("HTTP 404: Not Found"));
    }

    #[tokio::test]
    async fn plan_on_freestyle_job_is_an_xml_error() {
        let store = store_with_project(None);
        let task = store.add_task(TaskKind::Plan, 1, Some("legacy"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_job_config()
            .returning(|_| Ok("<project><builders/></project>".to_string()));
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let err = rec.run(task.task_ref()).await.unwrap_err();

        assert!(matches!(err, ApiError::ConfigXml { .. }));
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("initialized"));
    }

    #[tokio::test]
    async fn cicd_hook_failure_still_activates() {
        let store = store_with_project(Some("https://github.com/acme/storefront"));
        let task = store.add_task(TaskKind::Cicd, 1, Some("ci"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_job_config()
            .returning(|_| Ok(PIPELINE_XML.to_string()));
        jenkins
            .expect_put_job_config()
            .withf(|_, xml| xml.contains("GitHubPushTrigger"))
            .returning(|_, _| Ok(()));
        let mut hooks = MockHookRegistrar::new();
        hooks
            .expect_register_push_hook()
            .returning(|_| Err(HookError::Forbidden("acme/storefront".into())));
        let rec = reconciler(&store, jenkins, hooks);

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.status, "active");
        assert_eq!(outcome.steps[0].status, StepStatus::Success);
        assert_eq!(outcome.steps[1].status, StepStatus::Warning);
        assert!(outcome.steps[1].message.contains("acme/storefront"));
    }

    #[tokio::test]
    async fn cicd_jenkins_failure_is_error_and_skips_hook() {
        let store = store_with_project(Some("https://github.com/acme/storefront"));
        let task = store.add_task(TaskKind::Cicd, 1, Some("ci"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_job_config()
            .returning(|_| Err(RemoteError::connection("refused")));
        let mut hooks = MockHookRegistrar::new();
        hooks.expect_register_push_hook().never();
        let rec = reconciler(&store, jenkins, hooks);

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.status, "error");
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("error"));
    }

    #[tokio::test]
    async fn cicd_without_repository_reports_info_step() {
        let store = store_with_project(None);
        let task = store.add_task(TaskKind::Cicd, 1, Some("ci"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_job_config()
            .returning(|_| Ok(PIPELINE_XML.to_string()));
        jenkins.expect_put_job_config().returning(|_, _| Ok(()));
        let mut hooks = MockHookRegistrar::new();
        hooks.expect_register_push_hook().never();
        let rec = reconciler(&store, jenkins, hooks);

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.status, "active");
        assert_eq!(outcome.steps[1].status, StepStatus::Info);
    }

    #[tokio::test]
    async fn cicd_hook_success_message_is_passed_through() {
        let store = store_with_project(Some("https://github.com/acme/storefront.git"));
        let task = store.add_task(TaskKind::Cicd, 1, Some("ci"), "initialized");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_job_config()
            .returning(|_| Ok(PIPELINE_XML.to_string()));
        jenkins.expect_put_job_config().returning(|_, _| Ok(()));
        let mut hooks = MockHookRegistrar::new();
        hooks.expect_register_push_hook().returning(|_| {
            Ok(HookRegistration {
                message: "Webhook created".to_string(),
                webhook_url: "https://hooks.test/github-webhook/".to_string(),
            })
        });
        let rec = reconciler(&store, jenkins, hooks);

        let outcome = rec.run(task.task_ref()).await.unwrap();

        assert_eq!(outcome.steps[1].message, "Webhook created");
    }
}
