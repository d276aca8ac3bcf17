use std::sync::Arc;

use crate::auth::{self, AuthState};
use crate::web::MarketState;
use crate::web::api::v1::ApiError;

use axum::{
    Json, Router,
    middleware::{from_fn, from_fn_with_state},
};
use tower::ServiceBuilder;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub mod v1;

#[derive(OpenApi)]
#[openapi(
    info(title = "Task Marketplace API", version = "1"),
    paths(
        crate::auth::api::v1::json_login_handler,
        crate::auth::api::v1::register_handler,
        crate::user::api::v1::get_me_handler,
        crate::user::api::v1::update_me_handler,
        crate::user::api::v1::get_user_handler,
        crate::task::api::v1::list_tasks_handler,
        crate::task::api::v1::get_task_handler,
        crate::task::api::v1::create_task_handler,
        crate::task::api::v1::update_task_handler,
        crate::task::api::v1::delete_task_handler,
        crate::task::api::v1::accept_task_handler,
        crate::task::api::v1::complete_task_handler,
        crate::task::api::v1::cancel_task_handler,
        crate::offer::api::v1::list_task_offers_handler,
        crate::offer::api::v1::create_offer_handler,
        crate::offer::api::v1::list_my_offers_handler,
        crate::offer::api::v1::accept_offer_handler,
        crate::offer::api::v1::withdraw_offer_handler,
        crate::chat::api::v1::list_chats_handler,
        crate::chat::api::v1::start_chat_handler,
        crate::chat::api::v1::get_messages_handler,
        crate::chat::api::v1::send_message_handler,
        crate::chat::api::v1::mark_read_handler,
        crate::review::api::v1::create_review_handler,
        crate::review::api::v1::list_user_reviews_handler,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Registration and login"),
        (name = "Users", description = "Profiles"),
        (name = "Tasks", description = "Posting and running tasks"),
        (name = "Offers", description = "Bids on open tasks"),
        (name = "Chats", description = "Conversations between posters and helpers"),
        (name = "Reviews", description = "Ratings after completion")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serves the generated OpenAPI document.
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn api_not_found_handler() -> ApiError {
    ApiError::NotFound("No such API endpoint".to_string())
}

/// Creates the API routes for JSON API endpoints.
///
/// Public and protected routes may share a path with different methods; the
/// protected half answers 401 when no valid bearer token came with the request.
pub fn create_api_router(
    auth_state: Arc<AuthState>,
    market_state: Arc<MarketState>,
) -> axum::Router {
    let public_routes = auth::api::v1::create_api_router(auth_state.clone())
        .merge(crate::user::api::v1::public_routes(market_state.clone()))
        .merge(crate::task::api::v1::public_routes(market_state.clone()))
        .merge(crate::review::api::v1::public_routes(market_state.clone()));

    let protected_routes = Router::new()
        .merge(crate::user::api::v1::protected_routes(market_state.clone()))
        .merge(crate::task::api::v1::protected_routes(market_state.clone()))
        .merge(crate::offer::api::v1::protected_routes(market_state.clone()))
        .merge(crate::chat::api::v1::protected_routes(market_state.clone()))
        .merge(crate::review::api::v1::protected_routes(market_state))
        .layer(ServiceBuilder::new().layer(from_fn(auth::api::v1::require_auth_middleware)));

    let api_routes = public_routes
        .merge(protected_routes)
        .fallback(api_not_found_handler);
    Router::new()
        .nest("/api/v1", api_routes)
        .layer(ServiceBuilder::new().layer(from_fn_with_state(
            auth_state,
            auth::api::v1::auth_user_middleware,
        )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_every_resource() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/login",
            "/api/v1/register",
            "/api/v1/me",
            "/api/v1/tasks",
            "/api/v1/tasks/{id}/accept",
            "/api/v1/tasks/{id}/offers",
            "/api/v1/offers/{id}/withdraw",
            "/api/v1/chats/{id}/messages",
            "/api/v1/users/{id}/reviews",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn openapi_document_declares_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
