//! Turning finished builds into reports, from the Jenkins webhook and from
//! manual saves.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::Reconciler;
use crate::error::{ApiError, RemoteError};
use crate::metrics;
use crate::models::report::{status_for_result, NewReport};
use crate::models::task::{Task, TaskKind, TaskStatus};
use crate::services::jenkins_gateway::BuildRef;
use crate::services::robot_output::{self, RobotSummary};

const FINISHED: &str = "FINISHED";
const RECORDABLE_RESULTS: [&str; 3] = ["SUCCESS", "FAILURE", "ABORTED"];

/// Body Jenkins' HTTP publisher sends when a build completes.
///
/// Jenkins fills the numeric fields from build variables, so they may arrive
/// as strings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub name: Option<String>,
    #[serde(default)]
    pub build: WebhookBuild,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookBuild {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub number: Option<i64>,
    pub result: Option<String>,
    pub status: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    /// Milliseconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub duration: Option<i64>,
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

impl WebhookPayload {
    fn is_finished(&self) -> bool {
        self.build.status.as_deref() == Some(FINISHED) || self.status.as_deref() == Some(FINISHED)
    }

    fn is_recordable(&self) -> bool {
        self.build
            .result
            .as_deref()
            .is_some_and(|r| RECORDABLE_RESULTS.contains(&r))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedReport {
    pub task_code: String,
    pub report_id: i64,
    pub build_number: i64,
    pub report_status: String,
    pub task_status: String,
    pub total_tests: i32,
    pub passed_tests: i32,
    pub failed_tests: i32,
    pub skipped_tests: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub message: String,
    pub processed: Vec<RecordedReport>,
    pub errors: Vec<String>,
}

impl WebhookOutcome {
    fn empty(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            processed: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// How a recorded report reaches the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Append,
    /// Replace the report already stored for the same build, if any.
    Upsert,
}

/// Build facts known before any artifact is fetched.
struct FinishedBuild<'a> {
    number: i64,
    result: Option<&'a str>,
    timestamp_ms: Option<i64>,
    duration_ms: Option<i64>,
}

impl Reconciler {
    /// Record a report for every task bound to the finished job.
    ///
    /// Payloads for unfinished or unrecordable builds are acknowledged without
    /// any write. One task failing does not stop the others.
    pub async fn process_webhook(&self, payload: WebhookPayload) -> Result<WebhookOutcome, ApiError> {
        if !payload.is_finished() || !payload.is_recordable() {
            metrics::webhook_received("ignored");
            tracing::debug!(job = ?payload.name, result = ?payload.build.result, "Webhook ignored");
            return Ok(WebhookOutcome::empty(
                "Ignored: build not finished or result not recordable",
            ));
        }
        let job = payload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::Validation("webhook payload has no job name".to_string()))?;
        let number = payload
            .build
            .number
            .ok_or_else(|| ApiError::Validation("webhook payload has no build number".to_string()))?;

        let tasks = self.store.find_tasks_by_job(job).await?;
        if tasks.is_empty() {
            metrics::webhook_received("unmatched");
            tracing::info!(job, build = number, "No task bound to webhook job");
            return Ok(WebhookOutcome::empty("No tasks processed"));
        }

        let build = FinishedBuild {
            number,
            result: payload.build.result.as_deref(),
            timestamp_ms: payload.build.timestamp,
            duration_ms: payload.build.duration,
        };
        let mut outcome = WebhookOutcome::empty("");
        for task in tasks {
            let code = task.code.clone();
            match self.record(task, &build, WriteMode::Append).await {
                Ok(recorded) => outcome.processed.push(recorded),
                Err(e) => {
                    tracing::warn!(task = %code, job, build = number, error = %e, "Report recording failed");
                    outcome.errors.push(format!("{code}: {e}"));
                }
            }
        }
        metrics::webhook_received(if outcome.errors.is_empty() { "recorded" } else { "partial" });
        outcome.message = format!(
            "Processed {} task(s) for '{job}' build #{number}",
            outcome.processed.len()
        );
        Ok(outcome)
    }

    /// Record the last build of the task with `code`, replacing the report
    /// already stored for that build.
    pub async fn save_report(&self, code: &str) -> Result<RecordedReport, ApiError> {
        let not_found = || ApiError::NotFound(format!("Task {code}"));
        let kind = TaskKind::from_code(code).ok_or_else(not_found)?;
        let task = self
            .store
            .find_task_by_code(kind, code)
            .await?
            .ok_or_else(not_found)?;
        let job = Self::require_job(&task)?;

        let info = self
            .jenkins
            .get_build_info(&job, BuildRef::Last)
            .await
            .ok_or_else(|| RemoteError::connection(format!("build info for '{job}' is unavailable")))?;
        if info.building {
            return Err(ApiError::StillBuilding(job));
        }
        let build = FinishedBuild {
            number: info.number,
            result: info.result.as_deref(),
            timestamp_ms: Some(info.timestamp),
            duration_ms: Some(info.duration),
        };
        self.record(task, &build, WriteMode::Upsert).await
    }

    async fn record(
        &self,
        mut task: Task,
        build: &FinishedBuild<'_>,
        mode: WriteMode,
    ) -> Result<RecordedReport, ApiError> {
        let job = Self::require_job(&task)?;
        let build_ref = BuildRef::Number(build.number);

        let summary = if build.result == Some("ABORTED") {
            RobotSummary::default()
        } else {
            match self.jenkins.fetch_test_results(&job, build_ref).await {
                Some(xml) => robot_output::parse_output_xml(&xml),
                None => {
                    tracing::info!(task = %task.code, job = %job, build = build.number, "No output.xml, recording zero tests");
                    RobotSummary::default()
                }
            }
        };

        let (start_time, end_time, duration_seconds) = timing(&summary, build);
        let project = self.store.get_project(task.project_id).await?;
        let report = NewReport {
            task_code: task.code.clone(),
            task_kind: task.kind.as_str().to_string(),
            task_row_id: task.id,
            project_id: Some(task.project_id),
            project_name: project.map(|p| p.name),
            jenkins_job: Some(job.clone()),
            build_number: Some(build.number),
            status: status_for_result(build.result),
            total_tests: summary.total(),
            passed_tests: summary.passed,
            failed_tests: summary.failed,
            skipped_tests: summary.skipped,
            duration_seconds,
            start_time,
            end_time,
        };

        let stored = match mode {
            WriteMode::Append => self.store.insert_report(report).await?,
            WriteMode::Upsert => match self.store.find_report(&task.code, build.number).await? {
                Some(existing) => self.store.update_report(existing.id, report).await?,
                None => self.store.insert_report(report).await?,
            },
        };
        metrics::report_recorded(task.kind.as_str(), &stored.status, stored.total_tests);
        tracing::info!(
            task = %task.code,
            job = %job,
            build = build.number,
            status = %stored.status,
            total = stored.total_tests,
            "Report recorded"
        );

        if let Some(status) = recorded_task_status(build.result) {
            self.write_status(&mut task, status).await?;
        }

        Ok(RecordedReport {
            task_code: task.code,
            report_id: stored.id,
            build_number: build.number,
            report_status: stored.status,
            task_status: task.status,
            total_tests: stored.total_tests,
            passed_tests: stored.passed_tests,
            failed_tests: stored.failed_tests,
            skipped_tests: stored.skipped_tests,
        })
    }
}

/// Task status after a recorded build. Unlike polling, a failed build marks
/// the task failed.
fn recorded_task_status(result: Option<&str>) -> Option<TaskStatus> {
    match result {
        Some("SUCCESS") => Some(TaskStatus::Success),
        Some("FAILURE") => Some(TaskStatus::Failed),
        Some("ABORTED") => Some(TaskStatus::Cancelled),
        _ => None,
    }
}

/// Suite timing from `output.xml` when it is ordered, else the build's own
/// timestamp and duration. An unrepresentable end time is left unknown.
fn timing(
    summary: &RobotSummary,
    build: &FinishedBuild<'_>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>, i64) {
    if let (Some(start), Some(end)) = (summary.start, summary.end) {
        if start <= end {
            return (Some(start), Some(end), (end - start).num_seconds());
        }
    }
    let duration_ms = build.duration_ms.filter(|d| *d > 0).unwrap_or(0);
    let start = build
        .timestamp_ms
        .filter(|t| *t > 0)
        .and_then(DateTime::from_timestamp_millis);
    let end = start.and_then(|s| s.checked_add_signed(Duration::try_milliseconds(duration_ms)?));
    (start, end, duration_ms / 1000)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::models::report::sample_report;
    use crate::services::github_service::MockHookRegistrar;
    use crate::services::jenkins_gateway::MockJenkinsGateway;
    use crate::services::memory_store::InMemoryTaskStore;
    use rstest::rstest;

    const OUTPUT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<robot generator="Robot 6.1.1 (Python 3.11.4 on linux)">
<suite id="s1" name="Checkout">
<status status="FAIL" starttime="20240601 12:00:00.000" endtime="20240601 12:02:01.000"/>
</suite>
<statistics>
<total>
<stat pass="7" fail="2" skip="1">All Tests</stat>
</total>
</statistics>
</robot>"#;

    fn payload(json: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(json).unwrap()
    }

    fn finished(job: &str, number: i64, result: &str) -> WebhookPayload {
        payload(serde_json::json!({
            "name": job,
            "build": {"number": number, "result": result, "status": "FINISHED",
                      "timestamp": 1_717_243_200_000_i64, "duration": 90_000},
        }))
    }

    #[rstest]
    #[case(serde_json::json!({"name": "X", "build": {"number": 1, "result": "SUCCESS", "status": "STARTED"}}))]
    #[case(serde_json::json!({"name": "X", "build": {"number": 1, "result": "UNSTABLE", "status": "FINISHED"}}))]
    #[case(serde_json::json!({"name": "X", "build": {"number": 1}, "status": "FINISHED"}))]
    #[tokio::test]
    async fn unrecordable_webhooks_write_nothing(#[case] body: serde_json::Value) {
        let store = InMemoryTaskStore::new();
        let task = store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let rec = reconciler(&store, MockJenkinsGateway::new(), MockHookRegistrar::new());

        let outcome = rec.process_webhook(payload(body)).await.unwrap();

        assert!(outcome.processed.is_empty());
        assert!(store.all_reports().is_empty());
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("running"));
    }

    #[tokio::test]
    async fn top_level_finished_status_is_accepted() {
        let store = InMemoryTaskStore::new();
        store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins.expect_fetch_test_results().returning(|_, _| None);
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let body = serde_json::json!({
            "name": "X",
            "build": {"number": "12", "result": "SUCCESS"},
            "status": "FINISHED",
        });
        let outcome = rec.process_webhook(payload(body)).await.unwrap();

        assert_eq!(outcome.processed.len(), 1);
        assert_eq!(outcome.processed[0].build_number, 12);
    }

    #[tokio::test]
    async fn webhook_without_matching_task_is_acknowledged() {
        let store = InMemoryTaskStore::new();
        let rec = reconciler(&store, MockJenkinsGateway::new(), MockHookRegistrar::new());

        let outcome = rec.process_webhook(finished("orphan", 3, "SUCCESS")).await.unwrap();

        assert_eq!(outcome.message, "No tasks processed");
    }

    #[tokio::test]
    async fn webhook_without_build_number_is_rejected() {
        let store = InMemoryTaskStore::new();
        let rec = reconciler(&store, MockJenkinsGateway::new(), MockHookRegistrar::new());
        let body = serde_json::json!({"name": "X", "build": {"result": "SUCCESS", "status": "FINISHED"}});

        let err = rec.process_webhook(payload(body)).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn webhook_records_every_task_on_the_job() {
        let store = InMemoryTaskStore::new();
        store.add_project("Storefront", None);
        let execution = store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let plan = store.add_task(TaskKind::Plan, 1, Some("X"), "configured");
        store.add_task(TaskKind::Execution, 2, Some("other"), "running");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_fetch_test_results()
            .returning(|_, _| Some(OUTPUT_XML.to_string()));
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let outcome = rec.process_webhook(finished("X", 7, "FAILURE")).await.unwrap();

        assert_eq!(outcome.processed.len(), 2);
        assert!(outcome.errors.is_empty());
        let reports = store.all_reports();
        assert_eq!(reports.len(), 2);
        let report = &reports[0];
        assert_eq!(report.status, "failed");
        assert_eq!(report.total_tests, 10);
        assert_eq!(report.passed_tests, 7);
        assert_eq!(report.failed_tests, 2);
        assert_eq!(report.skipped_tests, 1);
        assert_eq!(report.duration_seconds, 121);
        assert_eq!(report.project_name.as_deref(), Some("Storefront"));
        assert_eq!(store.status_of(execution.task_ref()).as_deref(), Some("failed"));
        assert_eq!(store.status_of(plan.task_ref()).as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn duplicate_webhooks_append() {
        let store = InMemoryTaskStore::new();
        store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins.expect_fetch_test_results().returning(|_, _| None);
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        rec.process_webhook(finished("X", 7, "SUCCESS")).await.unwrap();
        rec.process_webhook(finished("X", 7, "SUCCESS")).await.unwrap();

        assert_eq!(store.all_reports().len(), 2);
    }

    #[tokio::test]
    async fn aborted_build_skips_artifacts_and_uses_webhook_timing() {
        let store = InMemoryTaskStore::new();
        let task = store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins.expect_fetch_test_results().never();
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        rec.process_webhook(finished("X", 4, "ABORTED")).await.unwrap();

        let report = &store.all_reports()[0];
        assert_eq!(report.status, "cancelled");
        assert_eq!(report.total_tests, 0);
        assert_eq!(report.duration_seconds, 90);
        assert_eq!(report.start_time.map(|t| t.timestamp()), Some(1_717_243_200));
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn oversized_build_duration_leaves_end_time_unknown() {
        let store = InMemoryTaskStore::new();
        store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let rec = reconciler(&store, MockJenkinsGateway::new(), MockHookRegistrar::new());
        let body = payload(serde_json::json!({
            "name": "X",
            "build": {"number": 4, "result": "ABORTED", "status": "FINISHED",
                      "timestamp": 1_717_243_200_000_i64, "duration": 9_000_000_000_000_000_000_i64},
        }));

        let outcome = rec.process_webhook(body).await.unwrap();

        assert_eq!(outcome.processed.len(), 1);
        let report = &store.all_reports()[0];
        assert!(report.start_time.is_some());
        assert_eq!(report.end_time, None);
    }

    #[tokio::test]
    async fn reversed_suite_timing_falls_back_to_the_build() {
        let store = InMemoryTaskStore::new();
        store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins.expect_fetch_test_results().returning(|_, _| {
            Some(
                r#"<robot><suite name="Skewed" starttime="20240601 12:05:00.000" endtime="20240601 12:00:00.000">
</suite><statistics><total><stat pass="1" fail="0" skip="0">All Tests</stat></total></statistics></robot>"#
                    .to_string(),
            )
        });
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        rec.process_webhook(finished("X", 5, "SUCCESS")).await.unwrap();

        let report = &store.all_reports()[0];
        assert_eq!(report.passed_tests, 1);
        assert_eq!(report.duration_seconds, 90);
        assert_eq!(report.start_time.map(|t| t.timestamp()), Some(1_717_243_200));
    }

    #[tokio::test]
    async fn save_report_replaces_the_stored_build() {
        let store = InMemoryTaskStore::new();
        let task = store.add_task(TaskKind::Plan, 1, Some("X"), "success");
        let mut existing = sample_report(5, "PLAN-001", "completed", 9);
        existing.total_tests = 0;
        store.add_report(existing);
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_build_info()
            .returning(|_, _| Some(finished_build(9, "SUCCESS")));
        jenkins
            .expect_fetch_test_results()
            .returning(|_, _| Some(OUTPUT_XML.to_string()));
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let recorded = rec.save_report("PLAN-001").await.unwrap();

        assert_eq!(recorded.report_id, 5);
        let reports = store.all_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].status, "success");
        assert_eq!(reports[0].total_tests, 10);
        assert_eq!(store.status_of(task.task_ref()).as_deref(), Some("success"));
    }

    #[tokio::test]
    async fn save_report_refuses_running_build() {
        let store = InMemoryTaskStore::new();
        store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_get_build_info()
            .returning(|_, _| Some(running_build(3)));
        let rec = reconciler(&store, jenkins, MockHookRegistrar::new());

        let err = rec.save_report("TASK-001").await.unwrap_err();
        assert!(matches!(err, ApiError::StillBuilding(_)));
    }

    #[rstest]
    #[case("BOGUS-001")]
    #[case("TASK-404")]
    #[tokio::test]
    async fn save_report_for_unknown_code_is_not_found(#[case] code: &str) {
        let store = InMemoryTaskStore::new();
        store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let rec = reconciler(&store, MockJenkinsGateway::new(), MockHookRegistrar::new());

        let err = rec.save_report(code).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
