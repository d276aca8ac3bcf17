use askama::Template;
use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware::from_fn,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use sea_orm::{ActiveEnum, Iterable};
use serde::Deserialize;
use std::sync::Arc;

use crate::auth::{CurrentUser, login_redirect_middleware};
use crate::entities::task::TaskStatus;
use crate::task::{Task, TaskFilter, TaskService, TaskServiceError};
use crate::user::{UserService, UserServiceError};
use crate::web::{MarketState, NotFoundTemplate};

/// Formats an amount of cents as dollars, e.g. `$12.50`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}${}.{:02}", cents / 100, cents % 100)
}

#[derive(Debug, Default, Deserialize)]
pub struct BoardQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    search: Option<String>,
}

impl BoardQuery {
    /// The board shows open tasks unless another status is picked. Unknown values fall back to open.
    fn status(&self) -> TaskStatus {
        self.status
            .as_deref()
            .and_then(|raw| TaskStatus::iter().find(|status| status.to_value() == raw))
            .unwrap_or(TaskStatus::Open)
    }
}

struct TaskCard {
    id: i32,
    title: String,
    category: String,
    budget: String,
    status: &'static str,
    location: Option<String>,
}

impl From<Task> for TaskCard {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            title: task.title,
            category: task.category,
            budget: format_cents(task.budget_cents),
            status: task.status.label(),
            location: task.location,
        }
    }
}

struct StatusOption {
    value: String,
    label: &'static str,
    selected: bool,
}

#[derive(Debug, thiserror::Error)]
enum TaskPageError {
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    #[error("Task lookup failed")]
    Task(#[from] TaskServiceError),
    #[error("User lookup failed")]
    User(#[from] UserServiceError),
}

impl IntoResponse for TaskPageError {
    fn into_response(self) -> Response {
        if let TaskPageError::Task(TaskServiceError::TaskNotFound(id)) = &self {
            let template = NotFoundTemplate {
                username: None,
                message: format!("Task {id} does not exist."),
            };
            return match template.render() {
                Ok(html) => (StatusCode::NOT_FOUND, Html(html)).into_response(),
                Err(_) => StatusCode::NOT_FOUND.into_response(),
            };
        }

        tracing::error!(error = %self, "Task page failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(
                "<h1>Internal Server Error</h1><p>An unexpected error occurred while processing your request. Please try again later.</p>"
                    .to_string(),
            ),
        )
            .into_response()
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct BoardTemplate {
    username: Option<String>,
    tasks: Vec<TaskCard>,
    statuses: Vec<StatusOption>,
    search: String,
}

#[derive(Template)]
#[template(path = "task.html")]
struct TaskDetailTemplate {
    username: Option<String>,
    task: TaskCard,
    description: String,
    poster_name: String,
    assignee_name: Option<String>,
    due_date: Option<String>,
    posted_on: String,
}

#[derive(Template)]
#[template(path = "my_tasks.html")]
struct MyTasksTemplate {
    username: Option<String>,
    posted: Vec<TaskCard>,
    assigned: Vec<TaskCard>,
}

fn username_of(current_user: Option<Extension<CurrentUser>>) -> Option<String> {
    current_user.map(|Extension(user)| user.username)
}

/// Task board: the newest tasks of one status, optionally narrowed by a title search.
#[tracing::instrument(skip(state))]
async fn board_handler(
    State(state): State<Arc<MarketState>>,
    current_user: Option<Extension<CurrentUser>>,
    Query(query): Query<BoardQuery>,
) -> Result<Html<String>, TaskPageError> {
    let status = query.status();
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty())
        .map(str::to_string);

    let tasks = TaskService::new(&state.db)
        .list_tasks(TaskFilter {
            status: Some(status),
            search: search.clone(),
            ..Default::default()
        })
        .await?;

    let template = BoardTemplate {
        username: username_of(current_user),
        tasks: tasks.into_iter().map(TaskCard::from).collect(),
        statuses: TaskStatus::iter()
            .map(|option| StatusOption {
                value: option.to_value(),
                label: option.label(),
                selected: option == status,
            })
            .collect(),
        search: search.unwrap_or_default(),
    };
    Ok(Html(template.render()?))
}

#[tracing::instrument(skip(state))]
async fn task_detail_handler(
    State(state): State<Arc<MarketState>>,
    current_user: Option<Extension<CurrentUser>>,
    Path(id): Path<i32>,
) -> Result<Html<String>, TaskPageError> {
    let task = TaskService::new(&state.db).get_task(id).await?;
    let users = UserService::new(&state.db);
    let poster_name = users.get_user_by_id(task.poster_id).await?.display_name;
    let assignee_name = match task.assignee_id {
        Some(assignee_id) => Some(users.get_user_by_id(assignee_id).await?.display_name),
        None => None,
    };

    let template = TaskDetailTemplate {
        username: username_of(current_user),
        description: task.description.clone(),
        poster_name,
        assignee_name,
        due_date: task.due_date.map(|due| due.format("%Y-%m-%d").to_string()),
        posted_on: task.created_at.format("%Y-%m-%d").to_string(),
        task: TaskCard::from(task),
    };
    Ok(Html(template.render()?))
}

/// The logged-in user's tasks: the ones they posted and the ones they work on.
#[tracing::instrument(skip(state))]
async fn my_tasks_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Html<String>, TaskPageError> {
    let service = TaskService::new(&state.db);
    let posted = service
        .list_tasks(TaskFilter {
            poster_id: Some(current_user.id),
            ..Default::default()
        })
        .await?;
    let assigned = service
        .list_tasks(TaskFilter {
            assignee_id: Some(current_user.id),
            ..Default::default()
        })
        .await?;

    let template = MyTasksTemplate {
        username: Some(current_user.username),
        posted: posted.into_iter().map(TaskCard::from).collect(),
        assigned: assigned.into_iter().map(TaskCard::from).collect(),
    };
    Ok(Html(template.render()?))
}

/// HTML pages for browsing tasks. Expects `auth_user_middleware` to run first.
pub fn create_task_web_router(state: Arc<MarketState>) -> Router {
    let protected = Router::new()
        .route("/my/tasks", get(my_tasks_handler))
        .layer(from_fn(login_redirect_middleware));

    Router::new()
        .route("/", get(board_handler))
        .route("/tasks/{id}", get(task_detail_handler))
        .merge(protected)
        .with_state(state)
}
