//! Task lifecycle endpoints, mounted once per task kind.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;
use crate::models::task::{NewTask, Task, TaskChanges, TaskKind, TaskRef};
use crate::services::reconciler::{DeleteOutcome, RunOutcome, StatusOutcome, StopOutcome, TaskResults};

/// Routes for one task kind; the kind reaches handlers as an extension.
pub fn kind_router(kind: TaskKind) -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/{id}", get(get_task).put(update_task).delete(delete_task))
        .route("/{id}/run", post(run_task))
        .route("/{id}/status", get(check_status))
        .route("/{id}/force-update-status", put(force_update_status))
        .route("/{id}/stop", post(stop_task))
        .route("/{id}/results", get(task_results))
        .layer(Extension(kind))
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub project_id: Option<i32>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let result = state
        .store
        .list_tasks(kind, query.project_id)
        .await
        .map_err(ApiError::from);
    state.ledger(result).await.map(Json)
}

async fn get_task(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
) -> Result<Json<Task>, ApiError> {
    let result = state.reconciler.load_task(TaskRef::new(kind, id)).await;
    state.ledger(result).await.map(Json)
}

async fn create_task(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Json(new_task): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let result = state.reconciler.create_task(kind, new_task).await;
    let task = state.ledger(result).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
    Json(changes): Json<TaskChanges>,
) -> Result<Json<Task>, ApiError> {
    let result = state.reconciler.update_task(TaskRef::new(kind, id), changes).await;
    state.ledger(result).await.map(Json)
}

async fn delete_task(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let result = state.reconciler.delete_task(TaskRef::new(kind, id)).await;
    state.ledger(result).await.map(Json)
}

async fn run_task(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
) -> Result<Json<RunOutcome>, ApiError> {
    let result = state.reconciler.run(TaskRef::new(kind, id)).await;
    state.ledger(result).await.map(Json)
}

async fn check_status(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
) -> Result<Json<StatusOutcome>, ApiError> {
    let result = state.reconciler.check_status(TaskRef::new(kind, id)).await;
    state.ledger(result).await.map(Json)
}

async fn force_update_status(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
) -> Result<Json<StatusOutcome>, ApiError> {
    let result = state.reconciler.force_update(TaskRef::new(kind, id)).await;
    state.ledger(result).await.map(Json)
}

async fn stop_task(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
) -> Result<Json<StopOutcome>, ApiError> {
    let result = state.reconciler.stop(TaskRef::new(kind, id)).await;
    state.ledger(result).await.map(Json)
}

#[derive(Deserialize)]
pub struct ResultsQuery {
    pub build_number: Option<i64>,
}

async fn task_results(
    State(state): State<AppState>,
    Extension(kind): Extension<TaskKind>,
    Path(id): Path<i32>,
    Query(query): Query<ResultsQuery>,
) -> Result<Json<TaskResults>, ApiError> {
    let result = state
        .reconciler
        .results(TaskRef::new(kind, id), query.build_number)
        .await;
    state.ledger(result).await.map(Json)
}
