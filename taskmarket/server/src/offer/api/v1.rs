use crate::auth::CurrentUser;
use crate::entities::offer::OfferStatus;
use crate::offer::{NewOffer, Offer, OfferService, OfferServiceError};
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
pub struct OfferJson {
    pub id: i32,
    pub task_id: i32,
    pub bidder_id: i32,
    pub amount_cents: i64,
    pub message: String,
    pub status: OfferStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Offer> for OfferJson {
    fn from(offer: Offer) -> Self {
        Self {
            id: offer.id,
            task_id: offer.task_id,
            bidder_id: offer.bidder_id,
            amount_cents: offer.amount_cents,
            message: offer.message,
            status: offer.status,
            created_at: offer.created_at,
            updated_at: offer.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OffersResponse {
    pub offers: Vec<OfferJson>,
    pub count: usize,
}

impl OffersResponse {
    fn from_offers(offers: Vec<Offer>) -> Self {
        let offers: Vec<OfferJson> = offers.into_iter().map(OfferJson::from).collect();
        let count = offers.len();
        Self { offers, count }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOfferRequest {
    pub amount_cents: i64,
    #[serde(default)]
    pub message: Option<String>,
}

impl From<OfferServiceError> for ApiError {
    fn from(err: OfferServiceError) -> Self {
        match err {
            OfferServiceError::OfferNotFound(_) | OfferServiceError::TaskNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            OfferServiceError::TaskNotOpen(_, _) => {
                ApiError::Conflict("TASK_NOT_OPEN", err.to_string())
            }
            OfferServiceError::DuplicateOffer(_) => {
                ApiError::Conflict("DUPLICATE_OFFER", err.to_string())
            }
            OfferServiceError::OfferNotPending(_) => {
                ApiError::Conflict("OFFER_NOT_PENDING", err.to_string())
            }
            OfferServiceError::InvalidTransition(_) => {
                ApiError::Conflict("INVALID_TRANSITION", err.to_string())
            }
            OfferServiceError::Forbidden(message) => ApiError::Forbidden(message),
            OfferServiceError::Validation(validation) => ApiError::Validation(validation),
            OfferServiceError::Database(_) => ApiError::Internal(err.to_string()),
        }
    }
}

/// Handler for GET /api/v1/tasks/{id}/offers
///
/// The poster sees every offer, other users only their own.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/tasks/{id}/offers",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Offers visible to the caller", body = OffersResponse),
        (status = 404, description = "No such task", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Offers"
)]
pub async fn list_task_offers_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(task_id): ApiPath<i32>,
) -> Result<Json<OffersResponse>, ApiError> {
    let offers = OfferService::new(&state.db)
        .list_offers_for_task(task_id, current_user.id)
        .await?;
    Ok(Json(OffersResponse::from_offers(offers)))
}

/// Handler for POST /api/v1/tasks/{id}/offers
#[tracing::instrument(skip(state, payload))]
#[utoipa::path(
    post,
    path = "/api/v1/tasks/{id}/offers",
    params(("id" = i32, Path, description = "Task ID")),
    request_body = CreateOfferRequest,
    responses(
        (status = 201, description = "Offer submitted", body = OfferJson),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Offer on own task", body = ErrorResponse),
        (status = 409, description = "Task not open or offer already pending", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Offers"
)]
pub async fn create_offer_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(task_id): ApiPath<i32>,
    ApiJson(payload): ApiJson<CreateOfferRequest>,
) -> Result<(StatusCode, Json<OfferJson>), ApiError> {
    let offer = OfferService::new(&state.db)
        .submit_offer(
            task_id,
            current_user.id,
            NewOffer {
                amount_cents: payload.amount_cents,
                message: payload.message,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(OfferJson::from(offer))))
}

/// Handler for GET /api/v1/offers
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/api/v1/offers",
    responses(
        (status = 200, description = "Offers made by the caller", body = OffersResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Offers"
)]
pub async fn list_my_offers_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<OffersResponse>, ApiError> {
    let offers = OfferService::new(&state.db)
        .list_offers_by_bidder(current_user.id)
        .await?;
    Ok(Json(OffersResponse::from_offers(offers)))
}

/// Handler for POST /api/v1/offers/{id}/accept
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/offers/{id}/accept",
    params(("id" = i32, Path, description = "Offer ID")),
    responses(
        (status = 200, description = "Offer accepted, task assigned", body = OfferJson),
        (status = 403, description = "Not the poster", body = ErrorResponse),
        (status = 409, description = "Offer or task no longer available", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Offers"
)]
pub async fn accept_offer_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(offer_id): ApiPath<i32>,
) -> Result<Json<OfferJson>, ApiError> {
    let offer = OfferService::new(&state.db)
        .accept_offer(offer_id, current_user.id)
        .await?;
    Ok(Json(OfferJson::from(offer)))
}

/// Handler for POST /api/v1/offers/{id}/withdraw
#[tracing::instrument(skip(state))]
#[utoipa::path(
    post,
    path = "/api/v1/offers/{id}/withdraw",
    params(("id" = i32, Path, description = "Offer ID")),
    responses(
        (status = 200, description = "Offer withdrawn", body = OfferJson),
        (status = 403, description = "Not the bidder", body = ErrorResponse),
        (status = 409, description = "Offer is not pending", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "Offers"
)]
pub async fn withdraw_offer_handler(
    State(state): State<Arc<MarketState>>,
    Extension(current_user): Extension<CurrentUser>,
    ApiPath(offer_id): ApiPath<i32>,
) -> Result<Json<OfferJson>, ApiError> {
    let offer = OfferService::new(&state.db)
        .withdraw_offer(offer_id, current_user.id)
        .await?;
    Ok(Json(OfferJson::from(offer)))
}

pub fn protected_routes(state: Arc<MarketState>) -> Router {
    Router::new()
        .route(
            "/tasks/{id}/offers",
            get(list_task_offers_handler).post(create_offer_handler),
        )
        .route("/offers", get(list_my_offers_handler))
        .route("/offers/{id}/accept", post(accept_offer_handler))
        .route("/offers/{id}/withdraw", post(withdraw_offer_handler))
        .with_state(state)
}
