use crate::auth::CurrentUser;
use crate::review::{
    NewReview, RatingSummary, Review, ReviewService, ReviewServiceError,
};
use crate::user::UserService;
use crate::web::MarketState;
use crate::web::api::v1::{ApiError, ApiJson, ApiPath, ErrorResponse};
use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewJson {
    pub id: i32,
    pub task_id: i32,
    pub reviewer_id: i32,
    pub reviewee_id: i32,
    /// 1 to 5
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl From<Review> for ReviewJson {
    fn from(review: Review) -> Self {
        Self {
            id: review.id,
            task_id: review.task_id,
            reviewer_id: review.reviewer_id,
            reviewee_id: review.reviewee_id,
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RatingJson {
    pub count: u64,
    /// Mean rating, absent when the user has no reviews
    pub average: Option<f64>,
}

impl From<RatingSummary> for RatingJson {
    fn from(summary: RatingSummary) -> Self {
        Self {
            count: summary.count,
            average: summary.average,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewsResponse {
    reviews: Vec<ReviewJson>,
    count: usize,
    rating: RatingJson,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReviewRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

impl From<ReviewServiceError> for ApiError {
    fn from(err: ReviewServiceError) -> Self {
        match err {
            ReviewServiceError::TaskNotFound(_) => ApiError::NotFound(err.to_string()),
            ReviewServiceError::TaskNotCompleted(_) => {
                ApiError::Conflict("TASK_NOT_COMPLETED", err.to_string())
            }
            ReviewServiceError::DuplicateReview(_) => {
                ApiError::Conflict("DUPLICATE_REVIEW", err.to_string())
            }
            ReviewServiceError::NotAParticipant(_) => ApiError::Forbidden(err.to_string()),
            ReviewServiceError::Validation(validation) => ApiError::Validation(validation),
            ReviewServiceError::Database(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Handler for POST /api/v1/tasks/{id}/reviews
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/reviews",
    params(("id" = i32, Path, description = "Task ID")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = ReviewJson),
        (status = 403, description = "Not part of this task", body = ErrorResponse),
        (status = 409, description = "Task not completed or already reviewed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Reviews"
)]
pub async fn create_review_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(task_id): ApiPath<i32>,
    ApiJson(payload): ApiJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewJson>), ApiError> {
    let review = ReviewService::new(&state.db)
        .create_review(
            task_id,
            current_user.id,
            NewReview {
                rating: payload.rating,
                comment: payload.comment,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ReviewJson::from(review))))
}

/// Handler for GET /api/v1/users/{id}/reviews
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/reviews",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Reviews received by the user", body = ReviewsResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    tag = "Reviews"
)]
pub async fn list_user_reviews_handler(
    State(state): State<Arc<MarketState>>,
    ApiPath(user_id): ApiPath<i32>,
) -> Result<Json<ReviewsResponse>, ApiError> {
    UserService::new(&state.db).get_user_by_id(user_id).await?;

    let reviews: Vec<ReviewJson> = ReviewService::new(&state.db)
        .list_reviews_for_user(user_id)
        .await?
        .into_iter()
        .map(ReviewJson::from)
        .collect();
    let ratings: Vec<u8> = reviews.iter().map(|review| review.rating).collect();
    let count = reviews.len();

    Ok(Json(ReviewsResponse {
        reviews,
        count,
        rating: RatingJson::from(RatingSummary::from_ratings(&ratings)),
    }))
}

pub fn public_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/users/{id}/reviews", get(list_user_reviews_handler))
        .with_state(state)
}

pub fn protected_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route("/tasks/{id}/reviews", post(create_review_handler))
        .with_state(state)
}
