//! HTTP routes: task lifecycle per kind, report ledger, projects, logs and
//! the Jenkins job listing.

pub mod reports;
pub mod tasks;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::models::log::{LogEntry, NewLogEntry};
use crate::models::project::{NewProject, Project};
use crate::models::task::TaskKind;
use crate::services::jenkins_gateway::JobSummary;
use crate::services::reconciler::Reconciler;
use crate::services::store::TaskStore;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Reconciler,
    pub store: Arc<dyn TaskStore>,
}

impl AppState {
    pub fn new(reconciler: Reconciler) -> Self {
        let store = Arc::clone(reconciler.store());
        Self { reconciler, store }
    }

    /// Append to the log ledger. A failing ledger never fails the request.
    pub async fn log(&self, level: &str, message: impl Into<String>) {
        if let Err(e) = self.store.append_log(NewLogEntry::backend(level, message)).await {
            tracing::warn!(error = %e, "Could not write log ledger entry");
        }
    }

    /// Pass `result` through, recording unexpected failures in the ledger.
    pub async fn ledger<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        let failure = result
            .as_ref()
            .err()
            .filter(|e| e.is_unexpected())
            .map(ToString::to_string);
        if let Some(message) = failure {
            self.log("ERROR", message).await;
        }
        result
    }
}

/// Build the TestOps API router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/executions", tasks::kind_router(TaskKind::Execution))
        .nest("/api/plans", tasks::kind_router(TaskKind::Plan))
        .nest("/api/cicd", tasks::kind_router(TaskKind::Cicd))
        .nest("/api/reports", reports::router())
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/logs", get(list_logs))
        .route("/api/jenkins/jobs", get(list_jenkins_jobs))
        .with_state(state)
}

// ── Projects ──

async fn list_projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, ApiError> {
    let result = state.store.list_projects().await.map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

async fn create_project(
    State(state): State<AppState>,
    Json(project): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if project.name.trim().is_empty() {
        return Err(ApiError::Validation("project name is required".to_string()));
    }
    let result = state.store.create_project(project).await.map_err(ApiError::from);
    let project = state.ledger(result).await?;
    tracing::info!(project = project.id, name = %project.name, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

// ── Log ledger ──

#[derive(serde::Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
}

async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(100);
    let result = state.store.recent_logs(limit).await.map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

// ── Jenkins ──

#[derive(serde::Serialize)]
pub struct JobList {
    pub jobs: Vec<JobSummary>,
}

async fn list_jenkins_jobs(State(state): State<AppState>) -> Result<Json<JobList>, ApiError> {
    let jobs = state.reconciler.jenkins().list_jobs().await?;
    Ok(Json(JobList { jobs }))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::error::RemoteError;
    use crate::services::jenkins_gateway::{JobSummary, MockJenkinsGateway};
    use crate::services::memory_store::InMemoryTaskStore;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn projects_can_be_created_and_listed() {
        let store = InMemoryTaskStore::new();
        let body = serde_json::json!({"name": "Storefront", "repo_link": "https://github.com/acme/storefront"});

        let (status, created) = send(app(&store, MockJenkinsGateway::new()), "POST", "/api/projects", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["status"], "active");

        let (status, listed) = send(app(&store, MockJenkinsGateway::new()), "GET", "/api/projects", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn jenkins_jobs_are_listed() {
        let store = InMemoryTaskStore::new();
        let mut jenkins = MockJenkinsGateway::new();
        jenkins.expect_list_jobs().returning(|| {
            Ok(vec![JobSummary {
                name: "smoke".into(),
                url: "http://jenkins.test/job/smoke/".into(),
            }])
        });

        let (status, body) = send(app(&store, jenkins), "GET", "/api/jenkins/jobs", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["jobs"][0]["name"], "smoke");
    }

    #[tokio::test]
    async fn unreachable_jenkins_is_bad_gateway() {
        let store = InMemoryTaskStore::new();
        let mut jenkins = MockJenkinsGateway::new();
        jenkins
            .expect_list_jobs()
            .returning(|| Err(RemoteError::connection("refused")));

        let (status, body) = send(app(&store, jenkins), "GET", "/api/jenkins/jobs", None).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["detail"], "Connection error: refused");
    }
}
