use askama::Template;
use axum::Router;
use axum::extract::Extension;
use axum::http::{Method, Request, StatusCode, header};
use axum::middleware::from_fn_with_state;
use axum::response::{Html, IntoResponse};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::{MakeSpan, TraceLayer};

use crate::auth::{AuthState, CurrentUser, auth_user_middleware, create_login_router};
use crate::config::Config;

pub mod api;

/// Shared state for the marketplace handlers.
#[derive(Clone)]
pub struct MarketState {
    pub db: Arc<DatabaseConnection>,
}

/// Custom error type for web handler operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        tracing::error!(error = %self, "Web handler failed");
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Request spans carry the method and path only. Query strings and headers
/// can hold credentials and stay out of the logs.
#[derive(Clone, Copy, Debug, Default)]
struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

/// Builds the whole application: HTML pages, the JSON API and the OpenAPI document.
pub fn build_app(config: &Config, db: DatabaseConnection) -> Router {
    let db = Arc::new(db);
    let auth_state = Arc::new(AuthState::from_config(config, db.clone()));
    let market_state = Arc::new(MarketState { db });

    let web_routes = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(crate::task::web::create_task_web_router(market_state.clone()))
        .merge(create_login_router(auth_state.clone()))
        .fallback(not_found_handler)
        .layer(from_fn_with_state(auth_state.clone(), auth_user_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .merge(web_routes)
        .merge(api::create_api_router(auth_state, market_state))
        .route(
            "/api-docs/openapi.json",
            axum::routing::get(api::openapi_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([
                    header::AUTHORIZATION,
                    header::COOKIE,
                ]))
                .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
                .layer(cors),
        )
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let db = Database::connect(&config.db_url).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");

    let app = build_app(&config, db);

    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub(crate) struct NotFoundTemplate {
    pub username: Option<String>,
    pub message: String,
}

#[tracing::instrument]
pub async fn not_found_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<impl IntoResponse, WebError> {
    let template = NotFoundTemplate {
        username: current_user.map(|Extension(user)| user.username),
        message: "There is nothing at this address.".to_string(),
    };
    Ok((StatusCode::NOT_FOUND, Html(template.render()?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn can_handle_template_error_with_internal_server_error() {
        let template_error = askama::Error::Custom("Simulated template rendering failure".into());

        let web_error = WebError::Template(template_error);
        let response = web_error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_text = std::str::from_utf8(&body).unwrap();

        assert_eq!(
            body_text,
            "<h1>Internal Server Error</h1><p>An unexpected error occurred while processing your request. Please try again later.</p>"
        );
    }
}
