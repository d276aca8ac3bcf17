use crate::auth::CurrentUser;
use crate::chat::{Chat, ChatService, ChatServiceError, ChatSummary, Message};
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
pub struct ChatJson {
    pub id: i32,
    pub task_id: i32,
    pub poster_id: i32,
    pub participant_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Messages from the other side the caller has not read yet
    pub unread_count: u64,
}

impl ChatJson {
    fn new(chat: Chat, unread_count: u64) -> Self {
        Self {
            id: chat.id,
            task_id: chat.task_id,
            poster_id: chat.poster_id,
            participant_id: chat.participant_id,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
            unread_count,
        }
    }
}

impl From<ChatSummary> for ChatJson {
    fn from(summary: ChatSummary) -> Self {
        ChatJson::new(summary.chat, summary.unread_count)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatsResponse {
    pub chats: Vec<ChatJson>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageJson {
    pub id: i32,
    pub chat_id: i32,
    pub sender_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl From<Message> for MessageJson {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            body: message.body,
            created_at: message.created_at,
            read_at: message.read_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessagesResponse {
    pub messages: Vec<MessageJson>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MessagesQuery {
    /// Only return messages with a greater ID
    pub after_id: Option<i32>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartChatRequest {
    /// Required when the poster starts the chat
    #[serde(default)]
    pub with_user: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkReadResponse {
    pub marked: u64,
}

impl From<ChatServiceError> for ApiError {
    fn from(err: ChatServiceError) -> Self {
        match err {
            ChatServiceError::ChatNotFound(_)
            | ChatServiceError::TaskNotFound(_)
            | ChatServiceError::UserNotFound(_) => ApiError::NotFound(err.to_string()),
            ChatServiceError::TaskCancelled(_) => {
                ApiError::Conflict("TASK_CANCELLED", err.to_string())
            }
            ChatServiceError::NotAMember(_) => ApiError::Forbidden(err.to_string()),
            ChatServiceError::Validation(validation) => ApiError::Validation(validation),
            ChatServiceError::Database(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Handler for GET /api/v1/chats
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/chats",
    responses(
        (status = 200, description = "The caller's chats, most recent first", body = ChatsResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Chats"
)]
pub async fn list_chats_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<ChatsResponse>, ApiError> {
    let chats: Vec<ChatJson> = ChatService::new(&state.db)
        .list_chats(current_user.id)
        .await?
        .into_iter()
        .map(ChatJson::from)
        .collect();
    let count = chats.len();
    Ok(Json(ChatsResponse { chats, count }))
}

/// Handler for POST /api/v1/tasks/{id}/chats
///
/// Answers 201 when a chat was opened and 200 when it already existed.
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/chats",
    params(("id" = i32, Path, description = "Task ID")),
    request_body = StartChatRequest,
    responses(
        (status = 201, description = "Chat opened", body = ChatJson),
        (status = 200, description = "Chat already existed", body = ChatJson),
        (status = 404, description = "No such task or user", body = ErrorResponse),
        (status = 409, description = "Task was cancelled", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Chats"
)]
pub async fn start_chat_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(task_id): ApiPath<i32>,
    ApiJson(payload): ApiJson<StartChatRequest>,
) -> Result<(StatusCode, Json<ChatJson>), ApiError> {
    let (chat, created) = ChatService::new(&state.db)
        .start_chat(task_id, current_user.id, payload.with_user)
        .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ChatJson::new(chat, 0))))
}

/// Handler for GET /api/v1/chats/{id}/messages
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/chats/{id}/messages",
    params(("id" = i32, Path, description = "Chat ID"), MessagesQuery),
    responses(
        (status = 200, description = "Messages in sending order", body = MessagesResponse),
        (status = 403, description = "Not a member of the chat", body = ErrorResponse),
        (status = 404, description = "No such chat", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Chats"
)]
pub async fn get_messages_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(chat_id): ApiPath<i32>,
    ApiQuery(query): ApiQuery<MessagesQuery>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let messages: Vec<MessageJson> = ChatService::new(&state.db)
        .get_messages(chat_id, current_user.id, query.after_id)
        .await?
        .into_iter()
        .map(MessageJson::from)
        .collect();
    let count = messages.len();
    Ok(Json(MessagesResponse { messages, count }))
}

/// Handler for POST /api/v1/chats/{id}/messages
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/chats/{id}/messages",
    params(("id" = i32, Path, description = "Chat ID")),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = MessageJson),
        (status = 400, description = "Empty or oversized body", body = ErrorResponse),
        (status = 403, description = "Not a member of the chat", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Chats"
)]
pub async fn send_message_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(chat_id): ApiPath<i32>,
    ApiJson(payload): ApiJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageJson>), ApiError> {
    let message = ChatService::new(&state.db)
        .send_message(chat_id, current_user.id, &payload.body)
        .await?;
    Ok((StatusCode::CREATED, Json(MessageJson::from(message))))
}

/// Handler for POST /api/v1/chats/{id}/read
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/chats/{id}/read",
    params(("id" = i32, Path, description = "Chat ID")),
    responses(
        (status = 200, description = "Number of messages marked read", body = MarkReadResponse),
        (status = 403, description = "Not a member of the chat", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Chats"
)]
pub async fn mark_read_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(chat_id): ApiPath<i32>,
) -> Result<Json<MarkReadResponse>, ApiError> {
    let marked = ChatService::new(&state.db)
        .mark_read(chat_id, current_user.id)
        .await?;
    Ok(Json(MarkReadResponse { marked }))
}

pub fn protected_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/chats", get(list_chats_handler))
        .route("/tasks/{id}/chats", post(start_chat_handler))
        .route(
            "/chats/{id}/messages",
            get(get_messages_handler).post(send_message_handler),
        )
        .route("/chats/{id}/read", post(mark_read_handler))
        .with_state(state)
}
