use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing_futures::Instrument;

use crate::config::ClientConfig;
use crate::model::{
    AuthResponse, Chat, ChatList, ErrorBody, Message, MessageList, NewTask, Offer, OfferList,
    Registration, Review, ReviewList, Task, TaskList, TaskQuery, UserProfile,
};
use crate::session::Session;

/// Errors returned by [`ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("No API endpoints configured")]
    NoEndpoints,
    #[error("Invalid endpoint URL {0}: {1}")]
    InvalidUrl(String, String),
    #[error("Invalid client configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Not logged in")]
    NotAuthenticated,
    /// Every endpoint failed in every round.
    #[error("All {attempts} attempts failed, last error: {last_error}")]
    AllEndpointsFailed { attempts: usize, last_error: String },
    /// The API answered with an error body.
    #[error("{status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Ordered list of base URLs that serve the same API.
#[derive(Debug, Clone)]
pub struct Endpoints {
    bases: Vec<String>,
}

impl Endpoints {
    pub fn new<I, S>(urls: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bases = Vec::new();
        for url in urls {
            let url = url.as_ref().trim();
            Url::parse(url).map_err(|e| ClientError::InvalidUrl(url.to_string(), e.to_string()))?;
            bases.push(url.trim_end_matches('/').to_string());
        }
        if bases.is_empty() {
            return Err(ClientError::NoEndpoints);
        }
        Ok(Self { bases })
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn base(&self, index: usize) -> Option<&str> {
        self.bases.get(index).map(String::as_str)
    }

    /// Full URL for `path` on endpoint `index`. The base URL's own path is kept.
    pub fn url(&self, index: usize, path: &str) -> String {
        let base = self.bases.get(index).map(String::as_str).unwrap_or_default();
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    /// The active endpoint first, then the rest in configured order.
    pub fn attempt_order(&self, active: usize) -> Vec<usize> {
        let active = if active < self.bases.len() { active } else { 0 };
        std::iter::once(active)
            .chain((0..self.bases.len()).filter(|&index| index != active))
            .collect()
    }
}

struct Call<'a> {
    method: Method,
    path: &'a str,
    query: Vec<(&'static str, String)>,
    body: Option<Vec<u8>>,
    token: Option<String>,
}

impl<'a> Call<'a> {
    fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
            token: None,
        }
    }

    fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }
}

/// HTTP client for the marketplace API that falls back across endpoints.
///
/// Cloning is cheap; clones share the connection pool and the [`Session`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: Arc<Endpoints>,
    session: Arc<Session>,
    max_rounds: u32,
    retry_backoff: Duration,
    health_path: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let endpoints = Endpoints::new(&config.api_urls)?;
        let http = reqwest::ClientBuilder::new()
            .timeout(config.request_timeout())
            .use_rustls_tls()
            .build()?;
        Ok(Self {
            http,
            endpoints: Arc::new(endpoints),
            session: Arc::new(Session::new()),
            max_rounds: config.max_rounds.max(1),
            retry_backoff: config.retry_backoff(),
            health_path: config.health_path.clone(),
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Base URL of the endpoint that answered last.
    pub async fn active_endpoint(&self) -> String {
        let index = self.session.active_endpoint().await;
        self.endpoints.base(index).unwrap_or_default().to_string()
    }

    /// Sends a request through the fallback logic. The session token is
    /// attached when there is one. Any response that is not a 5xx is returned
    /// as is, error statuses included.
    pub async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ClientError> {
        let mut call = Call::new(method, path);
        if let Some(body) = body {
            call = call.json(body)?;
        }
        call.token = self.session.token().await;
        self.send(call).await
    }

    #[tracing::instrument(skip(self, call), fields(method = %call.method, path = call.path))]
    async fn send(&self, call: Call<'_>) -> Result<Response, ClientError> {
        let mut attempts = 0;
        let mut last_error = String::new();

        for round in 1..=self.max_rounds {
            let active = self.session.active_endpoint().await;
            for index in self.endpoints.attempt_order(active) {
                attempts += 1;
                let url = self.endpoints.url(index, call.path);
                let mut builder = self.http.request(call.method.clone(), &url);
                if !call.query.is_empty() {
                    builder = builder.query(&call.query);
                }
                if let Some(token) = &call.token {
                    builder = builder.bearer_auth(token);
                }
                if let Some(body) = &call.body {
                    builder = builder
                        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                        .body(body.clone());
                }

                let attempt = tracing::debug_span!("attempt", endpoint = index, round);
                match builder.send().instrument(attempt).await {
                    Ok(response) if response.status().is_server_error() => {
                        last_error = format!("{url} answered {}", response.status());
                        tracing::warn!(endpoint = %url, status = %response.status(), "API endpoint failed");
                    }
                    Ok(response) => {
                        if index != active {
                            tracing::info!(
                                from = self.endpoints.base(active).unwrap_or_default(),
                                to = self.endpoints.base(index).unwrap_or_default(),
                                "Switched API endpoint"
                            );
                            self.session.set_active_endpoint(index).await;
                        }
                        return Ok(response);
                    }
                    Err(err) => {
                        last_error = format!("{url}: {err}");
                        tracing::warn!(endpoint = %url, error = %err, "API endpoint unreachable");
                    }
                }
            }
            if round < self.max_rounds {
                tokio::time::sleep(self.retry_backoff * round).await;
            }
        }

        Err(ClientError::AllEndpointsFailed {
            attempts,
            last_error,
        })
    }

    async fn authed<'a>(&self, call: Call<'a>) -> Result<Call<'a>, ClientError> {
        let token = self.session.require_token().await?;
        Ok(Call {
            token: Some(token),
            ..call
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, call: Call<'_>) -> Result<T, ClientError> {
        let response = self.send(call).await?;
        decode(response).await
    }

    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self.send(Call::new(Method::GET, &self.health_path)).await?;
        expect_success(response).await
    }

    /// Creates an account and keeps its token for later calls.
    pub async fn register(&self, registration: &Registration) -> Result<AuthResponse, ClientError> {
        let call = Call::new(Method::POST, "/api/v1/register").json(registration)?;
        let auth: AuthResponse = self.fetch(call).await?;
        self.session.set_token(auth.token.clone()).await;
        Ok(auth)
    }

    /// Logs in and keeps the token for later calls.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let call = Call::new(Method::POST, "/api/v1/login")
            .json(&json!({ "username": username, "password": password }))?;
        let auth: AuthResponse = self.fetch(call).await?;
        self.session.set_token(auth.token.clone()).await;
        Ok(auth)
    }

    pub async fn logout(&self) {
        self.session.clear_token().await;
    }

    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        let call = self.authed(Call::new(Method::GET, "/api/v1/me")).await?;
        self.fetch(call).await
    }

    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<TaskList, ClientError> {
        let mut call = Call::new(Method::GET, "/api/v1/tasks");
        call.query = query.to_pairs();
        self.fetch(call).await
    }

    pub async fn get_task(&self, task_id: i32) -> Result<Task, ClientError> {
        let path = format!("/api/v1/tasks/{task_id}");
        self.fetch(Call::new(Method::GET, &path)).await
    }

    pub async fn create_task(&self, task: &NewTask) -> Result<Task, ClientError> {
        let call = self
            .authed(Call::new(Method::POST, "/api/v1/tasks").json(task)?)
            .await?;
        self.fetch(call).await
    }

    pub async fn accept_task(&self, task_id: i32) -> Result<Task, ClientError> {
        self.task_action(task_id, "accept").await
    }

    pub async fn complete_task(&self, task_id: i32) -> Result<Task, ClientError> {
        self.task_action(task_id, "complete").await
    }

    pub async fn cancel_task(&self, task_id: i32) -> Result<Task, ClientError> {
        self.task_action(task_id, "cancel").await
    }

    async fn task_action(&self, task_id: i32, action: &str) -> Result<Task, ClientError> {
        let path = format!("/api/v1/tasks/{task_id}/{action}");
        let call = self.authed(Call::new(Method::POST, &path)).await?;
        self.fetch(call).await
    }

    pub async fn submit_offer(
        &self,
        task_id: i32,
        amount_cents: i64,
        message: Option<&str>,
    ) -> Result<Offer, ClientError> {
        let path = format!("/api/v1/tasks/{task_id}/offers");
        let body = json!({ "amount_cents": amount_cents, "message": message });
        let call = self
            .authed(Call::new(Method::POST, &path).json(&body)?)
            .await?;
        self.fetch(call).await
    }

    /// Offers on a task that the caller may see.
    pub async fn list_offers(&self, task_id: i32) -> Result<OfferList, ClientError> {
        let path = format!("/api/v1/tasks/{task_id}/offers");
        let call = self.authed(Call::new(Method::GET, &path)).await?;
        self.fetch(call).await
    }

    pub async fn list_my_offers(&self) -> Result<OfferList, ClientError> {
        let call = self.authed(Call::new(Method::GET, "/api/v1/offers")).await?;
        self.fetch(call).await
    }

    pub async fn accept_offer(&self, offer_id: i32) -> Result<Offer, ClientError> {
        let path = format!("/api/v1/offers/{offer_id}/accept");
        let call = self.authed(Call::new(Method::POST, &path)).await?;
        self.fetch(call).await
    }

    pub async fn withdraw_offer(&self, offer_id: i32) -> Result<Offer, ClientError> {
        let path = format!("/api/v1/offers/{offer_id}/withdraw");
        let call = self.authed(Call::new(Method::POST, &path)).await?;
        self.fetch(call).await
    }

    pub async fn start_chat(&self, task_id: i32, with_user: Option<i32>) -> Result<Chat, ClientError> {
        let path = format!("/api/v1/tasks/{task_id}/chats");
        let call = self
            .authed(Call::new(Method::POST, &path).json(&json!({ "with_user": with_user }))?)
            .await?;
        self.fetch(call).await
    }

    pub async fn list_chats(&self) -> Result<ChatList, ClientError> {
        let call = self.authed(Call::new(Method::GET, "/api/v1/chats")).await?;
        self.fetch(call).await
    }

    /// Messages of a chat; with `after_id` only the newer ones.
    pub async fn get_messages(
        &self,
        chat_id: i32,
        after_id: Option<i32>,
    ) -> Result<MessageList, ClientError> {
        let path = format!("/api/v1/chats/{chat_id}/messages");
        let mut call = self.authed(Call::new(Method::GET, &path)).await?;
        if let Some(after_id) = after_id {
            call.query.push(("after_id", after_id.to_string()));
        }
        self.fetch(call).await
    }

    pub async fn send_message(&self, chat_id: i32, body: &str) -> Result<Message, ClientError> {
        let path = format!("/api/v1/chats/{chat_id}/messages");
        let call = self
            .authed(Call::new(Method::POST, &path).json(&json!({ "body": body }))?)
            .await?;
        self.fetch(call).await
    }

    pub async fn mark_read(&self, chat_id: i32) -> Result<u64, ClientError> {
        #[derive(serde::Deserialize)]
        struct Marked {
            marked: u64,
        }
        let path = format!("/api/v1/chats/{chat_id}/read");
        let call = self.authed(Call::new(Method::POST, &path)).await?;
        let marked: Marked = self.fetch(call).await?;
        Ok(marked.marked)
    }

    pub async fn create_review(
        &self,
        task_id: i32,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<Review, ClientError> {
        let path = format!("/api/v1/tasks/{task_id}/reviews");
        let body = json!({ "rating": rating, "comment": comment });
        let call = self
            .authed(Call::new(Method::POST, &path).json(&body)?)
            .await?;
        self.fetch(call).await
    }

    pub async fn user_reviews(&self, user_id: i32) -> Result<ReviewList, ClientError> {
        let path = format!("/api/v1/users/{user_id}/reviews");
        self.fetch(Call::new(Method::GET, &path)).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    if response.status().is_success() {
        return Ok(response.json::<T>().await?);
    }
    Err(api_error(response).await)
}

async fn expect_success(response: Response) -> Result<(), ClientError> {
    if response.status().is_success() {
        return Ok(());
    }
    Err(api_error(response).await)
}

async fn api_error(response: Response) -> ClientError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => ClientError::Api {
            status: status.as_u16(),
            code: body.error,
            message: body.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            code: fallback_code(status),
            message: text,
        },
    }
}

fn fallback_code(status: StatusCode) -> String {
    status
        .canonical_reason()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
        .replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_join_paths_onto_bases() {
        let endpoints =
            Endpoints::new(["http://a.example/", "http://b.example/prefix"]).unwrap();
        assert_eq!(endpoints.url(0, "/health"), "http://a.example/health");
        assert_eq!(
            endpoints.url(1, "api/v1/tasks"),
            "http://b.example/prefix/api/v1/tasks"
        );
    }

    #[test]
    fn tries_active_endpoint_first() {
        let endpoints =
            Endpoints::new(["http://a.example", "http://b.example", "http://c.example"]).unwrap();
        assert_eq!(endpoints.attempt_order(0), vec![0, 1, 2]);
        assert_eq!(endpoints.attempt_order(2), vec![2, 0, 1]);
        assert_eq!(endpoints.attempt_order(9), vec![0, 1, 2]);
    }

    #[test]
    fn rejects_bad_or_missing_urls() {
        assert!(matches!(
            Endpoints::new(Vec::<String>::new()),
            Err(ClientError::NoEndpoints)
        ));
        assert!(matches!(
            Endpoints::new(["not a url"]),
            Err(ClientError::InvalidUrl(_, _))
        ));
    }

    #[test]
    fn derives_code_from_status_without_body() {
        assert_eq!(fallback_code(StatusCode::NOT_FOUND), "NOT_FOUND");
        assert_eq!(
            fallback_code(StatusCode::METHOD_NOT_ALLOWED),
            "METHOD_NOT_ALLOWED"
        );
    }

    #[tokio::test]
    async fn authenticated_calls_fail_fast_without_token() {
        let client = ApiClient::new(&ClientConfig::with_urls(["http://127.0.0.1:9"])).unwrap();
        assert!(matches!(client.me().await, Err(ClientError::NotAuthenticated)));
        assert!(matches!(
            client.accept_task(1).await,
            Err(ClientError::NotAuthenticated)
        ));
    }
}
