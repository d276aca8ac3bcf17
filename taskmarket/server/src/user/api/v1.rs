use crate::auth::CurrentUser;
use crate::review::ReviewService;
use crate::review::api::v1::RatingJson;
use crate::user::{ProfileUpdate, User, UserService};
use crate::web::MarketState;
use crate::web::api::v1::{ApiError, ApiJson, ApiPath, ErrorResponse};
use axum::{
    Extension, Json, Router,
    extract::State,
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Private view of the logged-in user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserJson {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserJson {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            bio: user.bio,
            created_at: user.created_at,
        }
    }
}

/// Public profile, shown to everyone.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PublicUserJson {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub rating: RatingJson,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    /// An empty string clears the bio
    #[serde(default)]
    pub bio: Option<String>,
}

/// Handler for GET /api/v1/me
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "The logged-in user", body = UserJson),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
pub async fn get_me_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<UserJson>, ApiError> {
    let user = UserService::new(&state.db)
        .get_user_by_id(current_user.id)
        .await?;
    Ok(Json(UserJson::from(user)))
}

/// Handler for PUT /api/v1/me
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    put,
    path = "/api/v1/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserJson),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Users"
)]
pub async fn update_me_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<Json<UserJson>, ApiError> {
    let user = UserService::new(&state.db)
        .update_profile(
            current_user.id,
            ProfileUpdate {
                display_name: payload.display_name,
                bio: payload.bio,
            },
        )
        .await?;
    Ok(Json(UserJson::from(user)))
}

/// Handler for GET /api/v1/users/{id}
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Public profile with rating", body = PublicUserJson),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn get_user_handler(
    State(state): State<Arc<MarketState>>,
    ApiPath(id): ApiPath<i32>,
) -> Result<Json<PublicUserJson>, ApiError> {
    let user = UserService::new(&state.db).get_user_by_id(id).await?;
    let rating = ReviewService::new(&state.db).rating_summary(id).await?;
    Ok(Json(PublicUserJson {
        id: user.id,
        username: user.username,
        display_name: user.display_name,
        bio: user.bio,
        created_at: user.created_at,
        rating: RatingJson::from(rating),
    }))
}

pub fn public_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/users/{id}", get(get_user_handler))
        .with_state(state)
}

pub fn protected_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/me", get(get_me_handler).put(update_me_handler))
        .with_state(state)
}
