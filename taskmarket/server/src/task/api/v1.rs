use crate::auth::CurrentUser;
use crate::entities::task::TaskStatus;
use crate::task::{NewTask, Task, TaskFilter, TaskService, TaskServiceError, TaskUpdate};
use crate::web::MarketState;
use crate::web::api::v1::{ApiError, ApiJson, ApiPath, ApiQuery, ErrorResponse};
use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskJson {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget_cents: i64,
    pub location: Option<String>,
    pub status: TaskStatus,
    pub poster_id: i32,
    pub assignee_id: Option<i32>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskJson {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            category: task.category,
            budget_cents: task.budget_cents,
            location: task.location,
            status: task.status,
            poster_id: task.poster_id,
            assignee_id: task.assignee_id,
            due_date: task.due_date,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TasksResponse {
    pub tasks: Vec<TaskJson>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TasksQuery {
    /// Only tasks in this status
    pub status: Option<TaskStatus>,
    pub category: Option<String>,
    pub poster_id: Option<i32>,
    pub assignee_id: Option<i32>,
    /// Substring of the title
    pub search: Option<String>,
    /// Page size, 50 by default and at most 100
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl From<TasksQuery> for TaskFilter {
    fn from(query: TasksQuery) -> Self {
        Self {
            status: query.status,
            category: query.category,
            poster_id: query.poster_id,
            assignee_id: query.assignee_id,
            search: query.search,
            limit: query.limit,
            offset: query.offset,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget_cents: i64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// Fields left out are not changed.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub budget_cents: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

impl From<TaskServiceError> for ApiError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::TaskNotFound(_) => ApiError::NotFound(err.to_string()),
            TaskServiceError::Forbidden(message) => ApiError::Forbidden(message),
            TaskServiceError::NotEditable(_, _) => {
                ApiError::Conflict("TASK_NOT_EDITABLE", err.to_string())
            }
            TaskServiceError::InvalidTransition(_) => {
                ApiError::Conflict("INVALID_TRANSITION", err.to_string())
            }
            TaskServiceError::Validation(validation) => ApiError::Validation(validation),
            TaskServiceError::Database(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Handler for GET /api/v1/tasks
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/tasks",
    params(TasksQuery),
    responses(
        (status = 200, description = "Matching tasks, newest first", body = TasksResponse),
        (status = 400, description = "Bad query", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<Arc<MarketState>>,
    ApiQuery(query): ApiQuery<TasksQuery>,
) -> Result<Json<TasksResponse>, ApiError> {
    let tasks: Vec<TaskJson> = TaskService::new(&state.db)
        .list_tasks(TaskFilter::from(query))
        .await?
        .into_iter()
        .map(TaskJson::from)
        .collect();
    let count = tasks.len();
    Ok(Json(TasksResponse { tasks, count }))
}

/// Handler for GET /api/v1/tasks/{id}
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "The task", body = TaskJson),
        (status = 404, description = "No such task", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<Arc<MarketState>>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<TaskJson>, ApiError> {
    let task = TaskService::new(&state.db).get_task(id).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for POST /api/v1/tasks
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskJson),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskJson>), ApiError> {
    let task = TaskService::new(&state.db)
        .create_task(
            current_user.id,
            NewTask {
                title: payload.title,
                description: payload.description,
                category: payload.category,
                budget_cents: payload.budget_cents,
                location: payload.location,
                due_date: payload.due_date,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(TaskJson::from(task))))
}

/// Handler for PUT /api/v1/tasks/{id}
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    put,
    path = "/api/v1/tasks/{id}",
    params(("id" = i32, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated", body = TaskJson),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 404, description = "No such task", body = ErrorResponse),
        (status = 409, description = "Task is no longer open", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
    ApiJson(payload): ApiJson<UpdateTaskRequest>,
) -> Result<Json<TaskJson>, ApiError> {
    let task = TaskService::new(&state.db)
        .update_task(
            id,
            current_user.id,
            TaskUpdate {
                title: payload.title,
                description: payload.description,
                category: payload.category,
                budget_cents: payload.budget_cents,
                location: payload.location,
                due_date: payload.due_date,
            },
        )
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for DELETE /api/v1/tasks/{id}
#[tracing::instrument(skip(state))]
#[utoipa::path(
    delete,
    path = "/api/v1/tasks/{id}",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 404, description = "No such task", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
) -> Result<StatusCode, ApiError> {
    TaskService::new(&state.db)
        .delete_task(id, current_user.id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/v1/tasks/{id}/accept
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/accept",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task is now in progress", body = TaskJson),
        (status = 403, description = "Posters cannot accept their own task", body = ErrorResponse),
        (status = 409, description = "Task is not open", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn accept_task_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<TaskJson>, ApiError> {
    let task = TaskService::new(&state.db)
        .accept_task(id, current_user.id)
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for POST /api/v1/tasks/{id}/complete
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/complete",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task completed", body = TaskJson),
        (status = 403, description = "Not part of this task", body = ErrorResponse),
        (status = 409, description = "Task is not in progress", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn complete_task_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<TaskJson>, ApiError> {
    let task = TaskService::new(&state.db)
        .complete_task(id, current_user.id)
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for POST /api/v1/tasks/{id}/cancel
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/cancel",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task cancelled", body = TaskJson),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 409, description = "Task already finished", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Tasks"
)]
pub async fn cancel_task_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<TaskJson>, ApiError> {
    let task = TaskService::new(&state.db)
        .cancel_task(id, current_user.id)
        .await?;
    Ok(Json(TaskJson::from(task)))
}

pub fn public_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks_handler))
        .route("/tasks/{id}", get(get_task_handler))
        .with_state(state)
}

pub fn protected_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/tasks", post(create_task_handler))
        .route(
            "/tasks/{id}",
            axum::routing::put(update_task_handler).delete(delete_task_handler),
        )
        .route("/tasks/{id}/accept", post(accept_task_handler))
        .route("/tasks/{id}/complete", post(complete_task_handler))
        .route("/tasks/{id}/cancel", post(cancel_task_handler))
        .with_state(state)
}
