use crate::entities::task::TaskStatus;
use crate::entities::*;
use crate::validation::{ValidationError, required_text};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::*;

pub mod api;

const MAX_BODY_LEN: usize = 2000;

/// A conversation about a task between its poster and one other user.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Chat {
    pub id: i32,
    pub task_id: i32,
    pub poster_id: i32,
    pub participant_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_member(&self, user_id: i32) -> bool {
        self.poster_id == user_id || self.participant_id == user_id
    }
}

impl From<chat::Model> for Chat {
    fn from(model: chat::Model) -> Self {
        Self {
            id: model.id,
            task_id: model.task_id,
            poster_id: model.poster_id,
            participant_id: model.participant_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// A chat as seen by one of its members.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct ChatSummary {
    pub chat: Chat,
    pub unread_count: u64,
}

#[derive(Debug, PartialEq, Clone, Eq)]
pub struct Message {
    pub id: i32,
    pub chat_id: i32,
    pub sender_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<message::Model> for Message {
    fn from(model: message::Model) -> Self {
        Self {
            id: model.id,
            chat_id: model.chat_id,
            sender_id: model.sender_id,
            body: model.body,
            created_at: model.created_at,
            read_at: model.read_at,
        }
    }
}

/// Error type for ChatService operations.
#[derive(Debug, thiserror::Error)]
pub enum ChatServiceError {
    #[error("Chat with ID {0} not found")]
    ChatNotFound(i32),
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    #[error("Task {0} is cancelled")]
    TaskCancelled(i32),
    #[error("You are not a member of chat {0}")]
    NotAMember(i32),
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub struct ChatService<'a> {
    db: &'a DatabaseConnection,
}

impl ChatService<'_> {
    pub fn new(db: &DatabaseConnection) -> ChatService<'_> {
        ChatService { db }
    }

    /// Opens (or returns the existing) chat about a task. A non-poster always
    /// talks to the poster; the poster has to say who they want to talk to.
    /// The flag is `true` when a new chat was created.
    #[tracing::instrument(skip(self))]
    pub async fn start_chat(
        &self,
        task_id: i32,
        user_id: i32,
        with_user: Option<i32>,
    ) -> Result<(Chat, bool), ChatServiceError> {
        let task = task::Entity::find_by_id(task_id)
            .one(self.db)
            .await?
            .ok_or(ChatServiceError::TaskNotFound(task_id))?;
        if task.status == TaskStatus::Cancelled {
            return Err(ChatServiceError::TaskCancelled(task_id));
        }

        let participant_id = if user_id == task.poster_id {
            with_user.ok_or_else(|| {
                ValidationError::new("with_user", "is required when the poster starts a chat")
            })?
        } else {
            user_id
        };
        if participant_id == task.poster_id {
            return Err(ValidationError::new("with_user", "cannot be yourself").into());
        }
        if user::Entity::find_by_id(participant_id)
            .one(self.db)
            .await?
            .is_none()
        {
            return Err(ChatServiceError::UserNotFound(participant_id));
        }

        let (chat, created) = ensure_chat(self.db, task_id, task.poster_id, participant_id).await?;
        Ok((Chat::from(chat), created))
    }

    /// Lists the user's chats, most recently active first, with unread counts.
    #[tracing::instrument(skip(self))]
    pub async fn list_chats(&self, user_id: i32) -> Result<Vec<ChatSummary>, ChatServiceError> {
        let chats = chat::Entity::find()
            .filter(
                Condition::any()
                    .add(chat::Column::PosterId.eq(user_id))
                    .add(chat::Column::ParticipantId.eq(user_id)),
            )
            .order_by_desc(chat::Column::UpdatedAt)
            .order_by_desc(chat::Column::Id)
            .all(self.db)
            .await?;

        let mut summaries = Vec::with_capacity(chats.len());
        for chat in chats {
            let unread_count = unread_messages(chat.id, user_id).count(self.db).await?;
            summaries.push(ChatSummary {
                chat: Chat::from(chat),
                unread_count,
            });
        }
        Ok(summaries)
    }

    /// Returns the messages of a chat in sending order. With `after_id` only
    /// messages newer than that ID are returned.
    #[tracing::instrument(skip(self))]
    pub async fn get_messages(
        &self,
        chat_id: i32,
        user_id: i32,
        after_id: Option<i32>,
    ) -> Result<Vec<Message>, ChatServiceError> {
        self.member_chat(chat_id, user_id).await?;

        let mut query = message::Entity::find().filter(message::Column::ChatId.eq(chat_id));
        if let Some(after_id) = after_id {
            query = query.filter(message::Column::Id.gt(after_id));
        }
        let messages = query
            .order_by_asc(message::Column::Id)
            .all(self.db)
            .await?
            .into_iter()
            .map(Message::from)
            .collect();
        Ok(messages)
    }

    /// Sends a message and bumps the chat's activity time.
    #[tracing::instrument(skip(self, body))]
    pub async fn send_message(
        &self,
        chat_id: i32,
        sender_id: i32,
        body: &str,
    ) -> Result<Message, ChatServiceError> {
        let body = required_text("body", body, 1, MAX_BODY_LEN)?;
        let chat = self.member_chat(chat_id, sender_id).await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let created = message::ActiveModel {
            chat_id: ActiveValue::Set(chat_id),
            sender_id: ActiveValue::Set(sender_id),
            body: ActiveValue::Set(body),
            created_at: ActiveValue::Set(now),
            read_at: ActiveValue::Set(None),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        let mut active_chat: chat::ActiveModel = chat.into();
        active_chat.updated_at = ActiveValue::Set(now);
        active_chat.update(&txn).await?;
        txn.commit().await?;

        Ok(Message::from(created))
    }

    /// Marks every message from the other side as read. Returns how many changed.
    #[tracing::instrument(skip(self))]
    pub async fn mark_read(&self, chat_id: i32, user_id: i32) -> Result<u64, ChatServiceError> {
        self.member_chat(chat_id, user_id).await?;

        let result = message::Entity::update_many()
            .col_expr(message::Column::ReadAt, Expr::value(Utc::now()))
            .filter(message::Column::ChatId.eq(chat_id))
            .filter(message::Column::SenderId.ne(user_id))
            .filter(message::Column::ReadAt.is_null())
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn member_chat(
        &self,
        chat_id: i32,
        user_id: i32,
    ) -> Result<chat::Model, ChatServiceError> {
        let chat = chat::Entity::find_by_id(chat_id)
            .one(self.db)
            .await?
            .ok_or(ChatServiceError::ChatNotFound(chat_id))?;
        if chat.poster_id != user_id && chat.participant_id != user_id {
            return Err(ChatServiceError::NotAMember(chat_id));
        }
        Ok(chat)
    }
}

fn unread_messages(chat_id: i32, reader_id: i32) -> Select<message::Entity> {
    message::Entity::find()
        .filter(message::Column::ChatId.eq(chat_id))
        .filter(message::Column::SenderId.ne(reader_id))
        .filter(message::Column::ReadAt.is_null())
}

/// Returns the chat between the poster and `participant_id` for a task,
/// creating it when missing. The flag is `true` for a new chat. The insert
/// skips rows that hit the `(task_id, participant_id)` key, so two racing
/// callers end up with the same chat.
pub(crate) async fn ensure_chat<C: ConnectionTrait>(
    conn: &C,
    task_id: i32,
    poster_id: i32,
    participant_id: i32,
) -> Result<(chat::Model, bool), DbErr> {
    let now = Utc::now();
    let inserted = chat::Entity::insert(chat::ActiveModel {
        task_id: ActiveValue::Set(task_id),
        poster_id: ActiveValue::Set(poster_id),
        participant_id: ActiveValue::Set(participant_id),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::columns([chat::Column::TaskId, chat::Column::ParticipantId])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(conn)
    .await?;

    let chat = chat::Entity::find()
        .filter(chat::Column::TaskId.eq(task_id))
        .filter(chat::Column::ParticipantId.eq(participant_id))
        .one(conn)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("chat for task {task_id}")))?;
    let created = inserted > 0;
    if created {
        tracing::info!(chat_id = chat.id, task_id, "Opened chat");
    }
    Ok((chat, created))
}
