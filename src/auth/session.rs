use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, AppleCredentials, AuthApi, DomainError, UserProfile};
use crate::auth::claims::TokenClaims;
use crate::auth::storage::TokenStore;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] DomainError),

    #[error("Credential storage failed: {0}")]
    Storage(#[from] crate::error::Error),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Signed-in state of the app: the stored tokens plus the profile fetched
/// from `/speech/me`.
pub struct AuthSession {
    api: AuthApi,
    tokens: TokenStore,
    user: RwLock<Option<UserProfile>>,
}

impl AuthSession {
    pub fn new(client: Arc<ApiClient>) -> Self {
        let tokens = client.tokens().clone();
        Self {
            api: AuthApi::new(client),
            tokens,
            user: RwLock::new(None),
        }
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.user.read().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user.read().is_some()
    }

    /// Claims of the stored access token, if any can be decoded.
    pub async fn claims(&self) -> SessionResult<Option<TokenClaims>> {
        let token = self.tokens.get_token().await?;
        Ok(token.and_then(|token| TokenClaims::decode(&token).ok()))
    }

    pub async fn sign_in(&self, credentials: &AppleCredentials) -> SessionResult<UserProfile> {
        let response = self.api.sign_in_with_apple(credentials).await?;

        self.tokens.store_token(&response.access_token).await?;
        self.tokens.store_refresh_token(&response.refresh_token).await?;

        match TokenClaims::decode(&response.access_token) {
            Ok(claims) => debug!("Signed in as subject {:?}, expires {:?}", claims.sub, claims.expires_at()),
            Err(e) => debug!("Access token is opaque: {}", e),
        }

        let profile = match self.api.current_user().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile fetch after sign in failed: {}", e);
                if let Err(remove_err) = self.tokens.remove_token().await {
                    warn!("Failed to discard tokens after sign in failure: {}", remove_err);
                }
                return Err(e.into());
            }
        };
        info!("Signed in user {}", profile.id);
        *self.user.write() = Some(profile.clone());
        Ok(profile)
    }

    /// Ends the session on the backend and drops local tokens. Tokens are
    /// removed even when the backend call fails; that failure is still
    /// returned.
    pub async fn sign_out(&self) -> SessionResult<()> {
        let remote = self.api.sign_out().await;
        if let Err(e) = &remote {
            warn!("Backend sign out failed: {}", e);
        }

        self.tokens.remove_token().await?;
        *self.user.write() = None;
        info!("Signed out");

        remote.map_err(SessionError::from)
    }

    /// Deletes the speech profile, then the local session.
    pub async fn delete_account(&self) -> SessionResult<()> {
        self.api.delete_speech_profile().await?;
        self.tokens.remove_token().await?;
        *self.user.write() = None;
        info!("Speech profile deleted");
        Ok(())
    }

    /// Re-establishes a session from a stored token. Expired or rejected
    /// tokens are discarded and `None` is returned; transport failures are
    /// returned as errors and leave the token in place.
    pub async fn restore(&self) -> SessionResult<Option<UserProfile>> {
        let Some(token) = self.tokens.get_token().await? else {
            debug!("No stored session");
            return Ok(None);
        };

        if let Ok(claims) = TokenClaims::decode(&token) {
            if claims.is_expired(Utc::now()) {
                info!("Stored token expired at {:?}, discarding", claims.expires_at());
                self.tokens.remove_token().await?;
                return Ok(None);
            }
        }

        match self.api.current_user().await {
            Ok(profile) => {
                info!("Restored session for user {}", profile.id);
                *self.user.write() = Some(profile.clone());
                Ok(Some(profile))
            }
            Err(e) if e.api_error().and_then(|cause| cause.status) == Some(401) => {
                info!("Stored token rejected by backend, discarding");
                self.tokens.remove_token().await?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use crate::api::ErrorCode;
    use crate::auth::claims::encode_test_token;
    use crate::auth::storage::{AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use crate::platform::CredentialStore;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn profile_json() -> serde_json::Value {
        json!({
            "id": 7,
            "name": "Jo",
            "email": "jo@example.com",
            "totalRecordings": 3,
            "totalPracticeTime": 420.0
        })
    }

    fn credentials() -> AppleCredentials {
        AppleCredentials {
            identity_token: "apple".to_string(),
            nonce: None,
            user: "apple-user".to_string(),
            full_name: None,
            email: None,
        }
    }

    #[tokio::test]
    async fn test_sign_in_stores_tokens_and_fetches_profile() {
        let server = MockServer::start().await;
        let access = encode_test_token(&json!({"sub": "7", "exp": Utc::now().timestamp() + 3600}));

        Mock::given(method("POST"))
            .and(path("/api/speech/auth/apple/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": access,
                "refresh_token": "refresh"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/speech/me"))
            .and(header("authorization", format!("Bearer {}", access).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_json()))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        let session = AuthSession::new(client);

        let profile = session.sign_in(&credentials()).await.unwrap();
        assert_eq!(profile.id, 7);
        assert_eq!(profile.total_recordings, 3);
        assert!(session.is_signed_in());
        assert_eq!(store.load(AUTH_TOKEN_KEY).await.unwrap(), Some(access));
        assert_eq!(store.load(REFRESH_TOKEN_KEY).await.unwrap(), Some("refresh".to_string()));
        assert_eq!(session.claims().await.unwrap().unwrap().sub.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_sign_in_discards_tokens_when_profile_fetch_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/speech/auth/apple/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a",
                "refresh_token": "r"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/speech/me"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        let session = AuthSession::new(client);

        let err = session.sign_in(&credentials()).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to get user profile");
        assert!(!session.is_signed_in());
        assert_eq!(store.load(AUTH_TOKEN_KEY).await.unwrap(), None);
        assert_eq!(store.load(REFRESH_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_out_clears_tokens_even_on_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/speech/signout"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "try later"})))
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        store.save(AUTH_TOKEN_KEY, "token").await.unwrap();
        let session = AuthSession::new(client);

        let err = session.sign_out().await.unwrap_err();
        assert_eq!(err.to_string(), "try later");
        assert_eq!(store.load(AUTH_TOKEN_KEY).await.unwrap(), None);
        assert!(!session.is_signed_in());
    }

    #[tokio::test]
    async fn test_delete_account_removes_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/speech/me"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        store.save(AUTH_TOKEN_KEY, "token").await.unwrap();
        let session = AuthSession::new(client);

        session.delete_account().await.unwrap();
        assert_eq!(store.load(AUTH_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_discards_expired_token_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_json()))
            .expect(0)
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        let expired = encode_test_token(&json!({"sub": "7", "exp": Utc::now().timestamp() - 60}));
        store.save(AUTH_TOKEN_KEY, &expired).await.unwrap();

        let session = AuthSession::new(client);
        assert_eq!(session.restore().await.unwrap(), None);
        assert_eq!(store.load(AUTH_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_with_valid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/speech/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile_json()))
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        let token = encode_test_token(&json!({"sub": "7", "exp": Utc::now().timestamp() + 600}));
        store.save(AUTH_TOKEN_KEY, &token).await.unwrap();

        let session = AuthSession::new(client);
        let profile = session.restore().await.unwrap().unwrap();
        assert_eq!(profile.email, "jo@example.com");
        assert_eq!(session.current_user(), Some(profile));
    }

    #[tokio::test]
    async fn test_restore_drops_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/speech/me"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Unauthorized"})))
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        store.save(AUTH_TOKEN_KEY, "opaque-token").await.unwrap();

        let session = AuthSession::new(client);
        assert_eq!(session.restore().await.unwrap(), None);
        assert_eq!(store.load(AUTH_TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_keeps_token_when_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/speech/me"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let (client, store) = client_for(&server);
        store.save(AUTH_TOKEN_KEY, "opaque-token").await.unwrap();

        let session = AuthSession::new(client);
        match session.restore().await.unwrap_err() {
            SessionError::Api(err) => assert_eq!(err.api_error().unwrap().code, ErrorCode::ServerError),
            other => panic!("expected api error, got {:?}", other),
        }
        assert_eq!(store.load(AUTH_TOKEN_KEY).await.unwrap(), Some("opaque-token".to_string()));
    }
}
