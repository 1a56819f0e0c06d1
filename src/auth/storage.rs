use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::platform::CredentialStore;

pub const AUTH_TOKEN_KEY: &str = "authToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Typed access to the session tokens held in a [`CredentialStore`].
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn CredentialStore>,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn CredentialStore>) -> Self {
        Self { backend }
    }

    pub async fn store_token(&self, token: &str) -> Result<()> {
        debug!("Storing auth token");
        self.backend.save(AUTH_TOKEN_KEY, token).await
    }

    pub async fn get_token(&self) -> Result<Option<String>> {
        self.backend.load(AUTH_TOKEN_KEY).await
    }

    pub async fn store_refresh_token(&self, token: &str) -> Result<()> {
        self.backend.save(REFRESH_TOKEN_KEY, token).await
    }

    pub async fn get_refresh_token(&self) -> Result<Option<String>> {
        self.backend.load(REFRESH_TOKEN_KEY).await
    }

    /// Deletes both tokens. Attempts the refresh token even when the access
    /// token removal fails, then reports the first failure.
    pub async fn remove_token(&self) -> Result<()> {
        debug!("Removing stored tokens");
        let access = self.backend.remove(AUTH_TOKEN_KEY).await;
        let refresh = self.backend.remove(REFRESH_TOKEN_KEY).await;

        if let Err(e) = &refresh {
            warn!("Failed to remove refresh token: {}", e);
        }
        access.and(refresh)
    }
}
