use crate::entities::task::TaskStatus;
use crate::entities::*;
use crate::validation::{ValidationError, optional_text, positive_cents, required_text};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;

pub mod api;
pub mod status;
pub mod web;

pub use status::{InvalidTransition, TaskAction};

const MAX_TITLE_LEN: usize = 120;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_CATEGORY_LEN: usize = 40;
const MAX_LOCATION_LEN: usize = 120;
pub const DEFAULT_PAGE_SIZE: u64 = 50;
pub const MAX_PAGE_SIZE: u64 = 100;

/// A marketplace listing.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Task {
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

impl Task {
    /// Whether `user_id` posted or was assigned this task.
    pub fn involves(&self, user_id: i32) -> bool {
        self.poster_id == user_id || self.assignee_id == Some(user_id)
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            category: model.category,
            budget_cents: model.budget_cents,
            location: model.location,
            status: model.status,
            poster_id: model.poster_id,
            assignee_id: model.assignee_id,
            due_date: model.due_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Input for [`TaskService::create_task`].
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget_cents: i64,
    pub location: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Partial update of an open task. `None` keeps the current value; a blank
/// location clears it.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub budget_cents: Option<i64>,
    pub location: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Filters for [`TaskService::list_tasks`].
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub category: Option<String>,
    pub poster_id: Option<i32>,
    pub assignee_id: Option<i32>,
    pub search: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    #[error("{0}")]
    Forbidden(String),
    #[error("Task {} can no longer be changed because it is {}", .0, .1.phrase())]
    NotEditable(i32, TaskStatus),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct TaskService<'a> {
    db: &'a DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &DatabaseConnection) -> TaskService<'_> {
        TaskService { db }
    }

    /// Creates a new open task owned by `poster_id`.
    #[tracing::instrument(skip(self, new_task))]
    pub async fn create_task(
        &self,
        poster_id: i32,
        new_task: NewTask,
    ) -> Result<Task, TaskServiceError> {
        let now = Utc::now();
        let active_model = task::ActiveModel {
            title: ActiveValue::Set(required_text("title", &new_task.title, 1, MAX_TITLE_LEN)?),
            description: ActiveValue::Set(required_text(
                "description",
                &new_task.description,
                1,
                MAX_DESCRIPTION_LEN,
            )?),
            category: ActiveValue::Set(required_text(
                "category",
                &new_task.category,
                1,
                MAX_CATEGORY_LEN,
            )?),
            budget_cents: ActiveValue::Set(positive_cents("budget_cents", new_task.budget_cents)?),
            location: ActiveValue::Set(optional_text(
                "location",
                new_task.location.as_deref(),
                MAX_LOCATION_LEN,
            )?),
            due_date: ActiveValue::Set(validate_due_date(new_task.due_date, now)?),
            status: ActiveValue::Set(TaskStatus::Open),
            poster_id: ActiveValue::Set(poster_id),
            assignee_id: ActiveValue::Set(None),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let created = active_model.insert(self.db).await?;
        tracing::info!(task_id = created.id, "Created task");
        Ok(Task::from(created))
    }

    /// Retrieves a task by its ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, id: i32) -> Result<Task, TaskServiceError> {
        find_task(self.db, id).await.map(Task::from)
    }

    /// Lists tasks matching `filter`, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_tasks(&self, filter: TaskFilter) -> Result<Vec<Task>, TaskServiceError> {
        let mut query = task::Entity::find();
        if let Some(status) = filter.status {
            query = query.filter(task::Column::Status.eq(status));
        }
        if let Some(category) = filter.category.as_deref() {
            query = query.filter(task::Column::Category.eq(category.trim()));
        }
        if let Some(poster_id) = filter.poster_id {
            query = query.filter(task::Column::PosterId.eq(poster_id));
        }
        if let Some(assignee_id) = filter.assignee_id {
            query = query.filter(task::Column::AssigneeId.eq(assignee_id));
        }
        if let Some(search) = filter.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                query = query.filter(task::Column::Title.contains(search));
            }
        }

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let tasks = query
            .order_by_desc(task::Column::Id)
            .limit(limit)
            .offset(filter.offset.unwrap_or(0))
            .all(self.db)
            .await?
            .into_iter()
            .map(Task::from)
            .collect();
        Ok(tasks)
    }

    /// Edits an open task. Only the poster may do this.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_task(
        &self,
        id: i32,
        user_id: i32,
        update: TaskUpdate,
    ) -> Result<Task, TaskServiceError> {
        let existing = find_task(self.db, id).await?;
        if existing.poster_id != user_id {
            return Err(TaskServiceError::Forbidden(
                "Only the poster can edit this task".to_string(),
            ));
        }
        if existing.status != TaskStatus::Open {
            return Err(TaskServiceError::NotEditable(id, existing.status));
        }

        let updated = update_open_task(self.db, &existing, update, Utc::now()).await?;
        Ok(Task::from(updated))
    }

    /// Deletes a task together with its offers, chats and messages.
    /// Tasks that are in progress or completed are kept for the record.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, id: i32, user_id: i32) -> Result<Task, TaskServiceError> {
        let txn = self.db.begin().await?;
        let existing = find_task(&txn, id).await?;
        if existing.poster_id != user_id {
            return Err(TaskServiceError::Forbidden(
                "Only the poster can delete this task".to_string(),
            ));
        }
        if matches!(
            existing.status,
            TaskStatus::InProgress | TaskStatus::Completed
        ) {
            return Err(TaskServiceError::NotEditable(id, existing.status));
        }

        let chat_ids: Vec<i32> = chat::Entity::find()
            .filter(chat::Column::TaskId.eq(id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|chat| chat.id)
            .collect();
        if !chat_ids.is_empty() {
            message::Entity::delete_many()
                .filter(message::Column::ChatId.is_in(chat_ids))
                .exec(&txn)
                .await?;
        }
        chat::Entity::delete_many()
            .filter(chat::Column::TaskId.eq(id))
            .exec(&txn)
            .await?;
        offer::Entity::delete_many()
            .filter(offer::Column::TaskId.eq(id))
            .exec(&txn)
            .await?;
        review::Entity::delete_many()
            .filter(review::Column::TaskId.eq(id))
            .exec(&txn)
            .await?;
        let result = task::Entity::delete_many()
            .filter(task::Column::Id.eq(id))
            .filter(task::Column::Status.is_in([TaskStatus::Open, TaskStatus::Cancelled]))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            let fresh = find_task(&txn, id).await?;
            return Err(TaskServiceError::NotEditable(id, fresh.status));
        }
        txn.commit().await?;

        tracing::info!(task_id = id, "Deleted task");
        Ok(Task::from(existing))
    }

    /// Takes an open task directly. The acceptor becomes the assignee; their
    /// pending offer, if any, is accepted and every other pending offer is rejected.
    #[tracing::instrument(skip(self))]
    pub async fn accept_task(&self, id: i32, user_id: i32) -> Result<Task, TaskServiceError> {
        let txn = self.db.begin().await?;
        let existing = find_task(&txn, id).await?;
        if existing.poster_id == user_id {
            return Err(TaskServiceError::Forbidden(
                "You cannot accept your own task".to_string(),
            ));
        }

        let updated = transition_task(&txn, &existing, TaskAction::Accept, Some(user_id)).await?;
        crate::offer::settle_pending_offers(&txn, id, Some(user_id)).await?;
        crate::chat::ensure_chat(&txn, id, existing.poster_id, user_id).await?;
        txn.commit().await?;

        tracing::info!(task_id = id, assignee_id = user_id, "Task accepted");
        Ok(Task::from(updated))
    }

    /// Marks an in-progress task as completed. The poster or the assignee may do this.
    #[tracing::instrument(skip(self))]
    pub async fn complete_task(&self, id: i32, user_id: i32) -> Result<Task, TaskServiceError> {
        let txn = self.db.begin().await?;
        let existing = find_task(&txn, id).await?;
        if !Task::from(existing.clone()).involves(user_id) {
            return Err(TaskServiceError::Forbidden(
                "Only the poster or the assignee can complete this task".to_string(),
            ));
        }

        let updated = transition_task(&txn, &existing, TaskAction::Complete, None).await?;
        txn.commit().await?;

        tracing::info!(task_id = id, "Task completed");
        Ok(Task::from(updated))
    }

    /// Cancels an open or in-progress task and rejects its pending offers.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_task(&self, id: i32, user_id: i32) -> Result<Task, TaskServiceError> {
        let txn = self.db.begin().await?;
        let existing = find_task(&txn, id).await?;
        if existing.poster_id != user_id {
            return Err(TaskServiceError::Forbidden(
                "Only the poster can cancel this task".to_string(),
            ));
        }

        let updated = transition_task(&txn, &existing, TaskAction::Cancel, None).await?;
        crate::offer::settle_pending_offers(&txn, id, None).await?;
        txn.commit().await?;

        tracing::info!(task_id = id, "Task cancelled");
        Ok(Task::from(updated))
    }
}

pub(crate) async fn find_task<C: ConnectionTrait>(
    conn: &C,
    id: i32,
) -> Result<task::Model, TaskServiceError> {
    task::Entity::find_by_id(id)
        .one(conn)
        .await?
        .ok_or(TaskServiceError::TaskNotFound(id))
}

/// Moves `task` to the status reached by `action` with a conditional update, so
/// a concurrent change makes this call fail instead of being overwritten.
pub(crate) async fn transition_task<C: ConnectionTrait>(
    conn: &C,
    task: &task::Model,
    action: TaskAction,
    assignee_id: Option<i32>,
) -> Result<task::Model, TaskServiceError> {
    let next = task.status.apply(action)?;

    let mut update = task::Entity::update_many()
        .col_expr(task::Column::Status, Expr::value(next))
        .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(task::Column::Id.eq(task.id))
        .filter(task::Column::Status.eq(task.status));
    if let Some(assignee_id) = assignee_id {
        update = update.col_expr(task::Column::AssigneeId, Expr::value(assignee_id));
    }
    let result = update.exec(conn).await?;

    let fresh = find_task(conn, task.id).await?;
    if result.rows_affected == 0 {
        tracing::warn!(task_id = task.id, %action, "Lost a race on task status");
        return Err(InvalidTransition {
            from: fresh.status,
            action,
        }
        .into());
    }
    Ok(fresh)
}

/// Writes `update` to `task` only while the task is still Open. A task that
/// left Open since it was read reports `NotEditable` with its fresh status.
pub(crate) async fn update_open_task<C: ConnectionTrait>(
    conn: &C,
    task: &task::Model,
    update: TaskUpdate,
    now: DateTime<Utc>,
) -> Result<task::Model, TaskServiceError> {
    let mut query = task::Entity::update_many()
        .col_expr(task::Column::UpdatedAt, Expr::value(now))
        .filter(task::Column::Id.eq(task.id))
        .filter(task::Column::Status.eq(TaskStatus::Open));
    if let Some(title) = update.title.as_deref() {
        let title = required_text("title", title, 1, MAX_TITLE_LEN)?;
        query = query.col_expr(task::Column::Title, Expr::value(title));
    }
    if let Some(description) = update.description.as_deref() {
        let description = required_text("description", description, 1, MAX_DESCRIPTION_LEN)?;
        query = query.col_expr(task::Column::Description, Expr::value(description));
    }
    if let Some(category) = update.category.as_deref() {
        let category = required_text("category", category, 1, MAX_CATEGORY_LEN)?;
        query = query.col_expr(task::Column::Category, Expr::value(category));
    }
    if let Some(budget_cents) = update.budget_cents {
        let budget_cents = positive_cents("budget_cents", budget_cents)?;
        query = query.col_expr(task::Column::BudgetCents, Expr::value(budget_cents));
    }
    if let Some(location) = update.location.as_deref() {
        let location = optional_text("location", Some(location), MAX_LOCATION_LEN)?;
        query = query.col_expr(task::Column::Location, Expr::value(location));
    }
    if update.due_date.is_some() {
        let due_date = validate_due_date(update.due_date, now)?;
        query = query.col_expr(task::Column::DueDate, Expr::value(due_date));
    }
    let result = query.exec(conn).await?;

    let fresh = find_task(conn, task.id).await?;
    if result.rows_affected == 0 {
        tracing::warn!(
            task_id = task.id,
            status = fresh.status.phrase(),
            "Task left Open before the edit"
        );
        return Err(TaskServiceError::NotEditable(task.id, fresh.status));
    }
    Ok(fresh)
}

fn validate_due_date(
    due_date: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    match due_date {
        Some(due) if due < now => Err(ValidationError::new("due_date", "must not be in the past")),
        other => Ok(other),
    }
}
