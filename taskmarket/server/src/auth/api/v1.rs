use crate::auth::{AuthState, CurrentUser, decode_jwt};
use crate::user::api::v1::UserJson;
use crate::user::{NewUser, UserService, UserServiceError};
use crate::web::api::v1::{ApiError, ApiJson, ErrorResponse};
use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// JSON request payload for API login
#[derive(Deserialize, Debug, ToSchema)]
pub struct JsonLoginRequest {
    pub username: String,
    pub password: String,
}

/// JSON request payload for registration
#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// JSON response for successful registration or login
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct AuthResponse {
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub user: UserJson,
}

/// Creates a JSON API router for authentication endpoints.
pub fn create_api_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/login", axum::routing::post(json_login_handler))
        .route("/register", axum::routing::post(register_handler))
        .with_state(state)
}

/// API authentication middleware that extracts the current user from Authorization Bearer header.
/// Sets the CurrentUser extension if a valid JWT token is found in the Authorization header.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if let Some(token) = token {
        match decode_jwt(token.trim(), &state.jwt_secret) {
            Ok(claims) => {
                request
                    .extensions_mut()
                    .insert(CurrentUser::new(claims.sub, claims.username));
            }
            Err(err) => tracing::debug!(error = %err, "Ignoring invalid bearer token"),
        }
    }

    next.run(request).await
}

/// Middleware that ensures the current user is authenticated.
/// Returns UNAUTHORIZED if the CurrentUser extension is not found in the request.
/// This middleware should be applied after auth_user_middleware.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_none() {
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::DuplicateUsername(_) => {
                ApiError::Conflict("DUPLICATE_USERNAME", err.to_string())
            }
            UserServiceError::DuplicateEmail(_) => {
                ApiError::Conflict("DUPLICATE_EMAIL", err.to_string())
            }
            UserServiceError::InvalidCredentials => ApiError::InvalidCredentials,
            UserServiceError::UserNotFound(_) => ApiError::NotFound(err.to_string()),
            UserServiceError::Validation(validation) => ApiError::Validation(validation),
            UserServiceError::PasswordHashing(_) | UserServiceError::Database(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

/// Handles JSON login requests and returns a JWT token.
#[tracing::instrument(skip(state, payload), fields(username = %payload.username))]
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = JsonLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid username or password", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn json_login_handler(
    State(state): State<Arc<AuthState>>,
    ApiJson(payload): ApiJson<JsonLoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let service = UserService::new(&state.db);
    let user = service
        .authenticate(&payload.username, &payload.password)
        .await?;
    let token = state
        .issue_token(user.id, &user.username)
        .map_err(|e| ApiError::Internal(format!("Failed to generate authentication token: {e}")))?;

    Ok(Json(AuthResponse {
        token,
        user: UserJson::from(user),
    }))
}

/// Registers a new account and logs it in.
#[tracing::instrument(skip(state, payload), fields(username = %payload.username))]
#[utoipa::path(
    post,
    path = "/api/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register_handler(
    State(state): State<Arc<AuthState>>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let service = UserService::new(&state.db);
    let user = service
        .register(NewUser {
            username: payload.username,
            email: payload.email,
            password: payload.password,
            display_name: payload.display_name,
        })
        .await?;
    let token = state
        .issue_token(user.id, &user.username)
        .map_err(|e| ApiError::Internal(format!("Failed to generate authentication token: {e}")))?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: UserJson::from(user),
        }),
    ))
}
