//! Report ledger endpoints: the Jenkins webhook, manual saves, history and
//! dashboard aggregates.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::dashboard::{DashboardStats, TrendDay};
use crate::error::ApiError;
use crate::services::ledger::{self, HistoryEntry, HistoryQuery, LatestResults, TaskHistory};
use crate::services::reconciler::{RecordedReport, WebhookOutcome, WebhookPayload};

const DEFAULT_TREND_DAYS: i64 = 30;
const MAX_TREND_DAYS: i64 = 366;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jenkins/webhook", post(jenkins_webhook))
        .route("/jenkins/save-report/{code}", post(save_report))
        .route("/latest-test-results", get(latest_test_results))
        .route("/task-history/{code}", get(task_history))
        .route("/history-reports", get(history_reports))
        .route("/dashboard-stats", get(dashboard_stats))
        .route("/execution-trends", get(execution_trends))
        .route("/task-reports/{code}", delete(delete_task_reports))
}

async fn jenkins_webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<WebhookOutcome>, ApiError> {
    state
        .log(
            "INFO",
            format!(
                "Jenkins webhook received: job={} build={} result={}",
                payload.name.as_deref().unwrap_or("?"),
                payload.build.number.map_or_else(|| "?".to_string(), |n| n.to_string()),
                payload.build.result.as_deref().unwrap_or("?"),
            ),
        )
        .await;
    let result = state.reconciler.process_webhook(payload).await;
    state.ledger(result).await.map(Json)
}

async fn save_report(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<RecordedReport>, ApiError> {
    let result = state.reconciler.save_report(&code).await;
    state.ledger(result).await.map(Json)
}

async fn latest_test_results(State(state): State<AppState>) -> Result<Json<LatestResults>, ApiError> {
    let result = ledger::latest_test_results(state.store.as_ref())
        .await
        .map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

async fn task_history(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<TaskHistory>, ApiError> {
    let result = ledger::task_history(state.store.as_ref(), &code)
        .await
        .map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

async fn history_reports(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let result = ledger::history_reports(state.store.as_ref(), &query)
        .await
        .map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

async fn dashboard_stats(State(state): State<AppState>) -> Result<Json<DashboardStats>, ApiError> {
    let result = state.store.dashboard_stats().await.map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

#[derive(Deserialize)]
pub struct TrendQuery {
    pub days: Option<i64>,
}

async fn execution_trends(
    State(state): State<AppState>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Vec<TrendDay>>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    if !(0..=MAX_TREND_DAYS).contains(&days) {
        return Err(ApiError::Validation(format!(
            "days must be between 0 and {MAX_TREND_DAYS}"
        )));
    }
    let result = state.store.execution_trends(days).await.map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

#[derive(Serialize)]
pub struct DeletedReports {
    pub message: String,
    pub task_id: String,
    pub deleted: usize,
}

async fn delete_task_reports(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<DeletedReports>, ApiError> {
    let result = state.store.delete_reports(&code).await.map_err(ApiError::from);
    let deleted = state.ledger(result).await?;
    tracing::info!(task = %code, deleted, "Reports deleted");
    Ok(Json(DeletedReports {
        message: format!("Deleted {deleted} report(s) for {code}"),
        task_id: code,
        deleted,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use crate::models::report::sample_report;
    use crate::models::task::TaskKind;
    use crate::services::jenkins_gateway::MockJenkinsGateway;
    use crate::services::memory_store::InMemoryTaskStore;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn webhook_for_unknown_job_is_ok_and_logged() {
        let store = InMemoryTaskStore::new();
        let body = serde_json::json!({
            "name": "orphan",
            "build": {"number": 3, "result": "SUCCESS", "status": "FINISHED"},
        });

        let (status, response) = send(
            app(&store, MockJenkinsGateway::new()),
            "POST",
            "/api/reports/jenkins/webhook",
            Some(body),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "No tasks processed");
        let logs = store.all_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, "INFO");
        assert!(logs[0].message.contains("job=orphan"));
    }

    #[tokio::test]
    async fn webhook_records_report() {
        let store = InMemoryTaskStore::new();
        store.add_task(TaskKind::Execution, 1, Some("X"), "running");
        let mut jenkins = MockJenkinsGateway::new();
        jenkins.expect_fetch_test_results().returning(|_, _| None);
        let body = serde_json::json!({
            "name": "X",
            "build": {"number": "8", "result": "SUCCESS", "status": "FINISHED"},
            "task_type": "execution",
            "task_id": "TASK-001",
        });

        let (status, response) = send(app(&store, jenkins), "POST", "/api/reports/jenkins/webhook", Some(body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["processed"][0]["task_code"], "TASK-001");
        assert_eq!(store.all_reports().len(), 1);
    }

    #[tokio::test]
    async fn task_reports_can_be_deleted() {
        let store = InMemoryTaskStore::new();
        store.add_report(sample_report(1, "TASK-001", "success", 1));
        store.add_report(sample_report(2, "TASK-001", "failed", 2));
        store.add_report(sample_report(3, "PLAN-001", "failed", 2));

        let (status, body) = send(
            app(&store, MockJenkinsGateway::new()),
            "DELETE",
            "/api/reports/task-reports/TASK-001",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 2);
        assert_eq!(store.all_reports().len(), 1);
    }

    #[tokio::test]
    async fn trends_cover_the_window() {
        let store = InMemoryTaskStore::new();
        store.add_report(sample_report(1, "TASK-001", "success", 1));

        let (status, body) = send(
            app(&store, MockJenkinsGateway::new()),
            "GET",
            "/api/reports/execution-trends?days=7",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let days = body.as_array().unwrap();
        assert_eq!(days.len(), 8);
        let total: i64 = days.iter().map(|d| d["total"].as_i64().unwrap()).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn negative_trend_window_is_rejected() {
        let store = InMemoryTaskStore::new();

        let (status, _) = send(
            app(&store, MockJenkinsGateway::new()),
            "GET",
            "/api/reports/execution-trends?days=-1",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dashboard_counts_tasks_across_kinds() {
        let store = InMemoryTaskStore::new();
        store.add_project("Storefront", None);
        store.add_task(TaskKind::Execution, 1, Some("X"), "success");
        store.add_task(TaskKind::Plan, 1, Some("Y"), "running");
        store.add_task(TaskKind::Cicd, 1, Some("Z"), "failed");

        let (status, body) = send(
            app(&store, MockJenkinsGateway::new()),
            "GET",
            "/api/reports/dashboard-stats",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tasks"]["total"], 3);
        assert_eq!(body["tasks"]["running"], 1);
        assert_eq!(body["tasks"]["success_rate"], 50.0);
        assert_eq!(body["projects"]["total"], 1);
    }
}
