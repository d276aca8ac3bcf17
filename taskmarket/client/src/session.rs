use tokio::sync::RwLock;

use crate::api::ClientError;

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    active_endpoint: usize,
}

/// Bearer token and the endpoint that answered last. Shared by every clone
/// of an [`crate::ApiClient`].
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn token(&self) -> Option<String> {
        self.state.read().await.token.clone()
    }

    /// The token, or `NotAuthenticated` when nobody is logged in.
    pub async fn require_token(&self) -> Result<String, ClientError> {
        self.token().await.ok_or(ClientError::NotAuthenticated)
    }

    pub async fn set_token(&self, token: String) {
        self.state.write().await.token = Some(token);
    }

    pub async fn clear_token(&self) {
        self.state.write().await.token = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.token.is_some()
    }

    pub async fn active_endpoint(&self) -> usize {
        self.state.read().await.active_endpoint
    }

    pub(crate) async fn set_active_endpoint(&self, index: usize) {
        self.state.write().await.active_endpoint = index;
    }
}
