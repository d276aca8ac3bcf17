use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::Config;
use crate::user::{UserService, UserServiceError};

pub mod api;
pub mod password;

pub const AUTH_COOKIE: &str = "auth_token";

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, username: String) -> Self {
        Self { id, username }
    }
}

/// Authentication state containing the JWT settings and the user store.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub db: Arc<DatabaseConnection>,
}

impl AuthState {
    /// Creates a new AuthState from the application config.
    pub fn from_config(config: &Config, db: Arc<DatabaseConnection>) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            token_ttl_hours: config.token_ttl_hours,
            db,
        }
    }

    /// Issues a token for `user_id` using this state's secret and lifetime.
    pub fn issue_token(
        &self,
        user_id: i32,
        username: &str,
    ) -> jsonwebtoken::errors::Result<String> {
        encode_jwt(user_id, username, &self.jwt_secret, self.token_ttl_hours)
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub sub: i32,         // ID of the authenticated user
    pub username: String, // Username of the authenticated user
    pub iat: usize,       // Issued at time of the token
    pub exp: usize,       // Expiry time of the token
}

pub fn encode_jwt(
    user_id: i32,
    username: &str,
    jwt_secret: &str,
    ttl_hours: i64,
) -> jsonwebtoken::errors::Result<String> {
    let now = chrono::Utc::now();
    let exp = (now + chrono::Duration::hours(ttl_hours)).timestamp() as usize;
    let iat = now.timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        iat,
        exp,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> jsonwebtoken::errors::Result<Claims> {
    let token_data = jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Creates a login router with the cookie-based authentication routes.
pub fn create_login_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route(
            "/login",
            axum::routing::get(login_page_handler).post(login_handler),
        )
        .route("/logout", axum::routing::post(logout_handler))
        .with_state(state)
}

/// Authentication middleware that checks the auth cookie and sets the CurrentUser extension.
/// This middleware only populates the CurrentUser extension and does not perform redirects.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token_cookie) = jar.get(AUTH_COOKIE) {
        if let Ok(claims) = decode_jwt(token_cookie.value(), &state.jwt_secret) {
            let current_user = CurrentUser::new(claims.sub, claims.username);
            request.extensions_mut().insert(current_user);
        }
    }

    next.run(request).await
}

/// Login redirect middleware that redirects unauthenticated users to the login page.
/// This middleware should be applied after auth_user_middleware to check for CurrentUser extension.
pub async fn login_redirect_middleware(request: Request, next: Next) -> Response {
    if request.extensions().get::<CurrentUser>().is_none() {
        return Redirect::to("/login").into_response();
    }

    next.run(request).await
}

/// Represents the login form payload.
#[derive(serde::Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Custom error type for the HTML authentication handlers.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    #[error("JWT operation failed")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("User lookup failed")]
    UserService(#[from] UserServiceError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Authentication handler failed");
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

/// Handles the login form. A valid login sets the auth cookie and redirects to the task board.
#[tracing::instrument(skip(state, jar, payload), fields(username = %payload.username))]
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    Form(payload): Form<LoginRequest>,
) -> Result<Response, AuthError> {
    let service = UserService::new(&state.db);
    let user = match service
        .authenticate(&payload.username, &payload.password)
        .await
    {
        Ok(user) => user,
        Err(UserServiceError::InvalidCredentials) => {
            let html = LoginTemplate {
                username: None,
                error: Some("Login failed. Please check your username and password.".to_string()),
            }
            .render()?;
            return Ok((StatusCode::UNAUTHORIZED, Html(html)).into_response());
        }
        Err(err) => return Err(err.into()),
    };

    let jwt_token = state.issue_token(user.id, &user.username)?;
    let cookie = Cookie::build((AUTH_COOKIE, jwt_token))
        .http_only(true)
        .secure(false) // Set to true in production with HTTPS
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(state.token_ttl_hours))
        .path("/")
        .build();

    Ok((jar.add(cookie), Redirect::to("/")).into_response())
}

/// Clears the auth cookie.
#[tracing::instrument(skip(jar))]
pub async fn logout_handler(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(AUTH_COOKIE).path("/"));
    (jar, Redirect::to("/"))
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub username: Option<String>,
    pub error: Option<String>,
}

/// Handles GET requests to display the login page.
#[tracing::instrument]
pub async fn login_page_handler(
    current_user: Option<Extension<CurrentUser>>,
) -> Result<Html<String>, AuthError> {
    let username = current_user.map(|Extension(user)| user.username);

    let template = LoginTemplate {
        username,
        error: None,
    };
    template.render().map(Html).map_err(AuthError::from)
}
