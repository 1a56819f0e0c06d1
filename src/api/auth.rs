use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::api::client::{ApiClient, RequestBody};
use crate::api::error::DomainError;
use crate::api::types::{AppleCredentials, AuthResponse, UserProfile};

pub struct AuthApi {
    client: Arc<ApiClient>,
}

impl AuthApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Exchanges an Apple identity token for backend tokens.
    pub async fn sign_in_with_apple(&self, credentials: &AppleCredentials) -> Result<AuthResponse, DomainError> {
        debug!("Signing in with Apple for user {}", credentials.user);

        let body = RequestBody::json(credentials).map_err(|e| DomainError::request_failed(e, "Sign in failed"))?;
        self.client
            .post::<AuthResponse>("/speech/auth/apple/signin", body)
            .await
            .map_err(|e| {
                error!("Apple sign in failed: {}", e);
                DomainError::request_failed(e, "Sign in failed")
            })
    }

    pub async fn current_user(&self) -> Result<UserProfile, DomainError> {
        self.client
            .get("/speech/me")
            .await
            .map_err(|e| DomainError::request_failed(e, "Failed to get user profile"))
    }

    pub async fn sign_out(&self) -> Result<(), DomainError> {
        self.client
            .post::<Value>("/speech/signout", RequestBody::Empty)
            .await
            .map(|_| ())
            .map_err(|e| DomainError::request_failed(e, "Failed to sign out"))
    }

    pub async fn delete_speech_profile(&self) -> Result<(), DomainError> {
        self.client
            .delete::<Value>("/speech/me")
            .await
            .map(|_| ())
            .map_err(|e| DomainError::request_failed(e, "Failed to delete speech profile"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use crate::api::ErrorCode;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sign_in_posts_apple_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/speech/auth/apple/signin"))
            .and(body_json(json!({
                "identityToken": "apple-id-token",
                "user": "001234.abcd",
                "email": "jo@example.com"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access",
                "refresh_token": "refresh"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = AuthApi::new(client_for(&server).0);
        let credentials = AppleCredentials {
            identity_token: "apple-id-token".to_string(),
            nonce: None,
            user: "001234.abcd".to_string(),
            full_name: None,
            email: Some("jo@example.com".to_string()),
        };

        let response = api.sign_in_with_apple(&credentials).await.unwrap();
        assert_eq!(response.access_token, "access");
        assert_eq!(response.refresh_token, "refresh");
    }

    #[tokio::test]
    async fn test_sign_in_failure_uses_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/speech/auth/apple/signin"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Invalid identity token"})))
            .mount(&server)
            .await;

        let api = AuthApi::new(client_for(&server).0);
        let credentials = AppleCredentials {
            identity_token: "bad".to_string(),
            nonce: None,
            user: "u".to_string(),
            full_name: None,
            email: None,
        };

        let err = api.sign_in_with_apple(&credentials).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid identity token");
        assert_eq!(err.api_error().unwrap().status, Some(401));
    }

    #[tokio::test]
    async fn test_current_user_and_default_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/speech/me"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let api = AuthApi::new(client_for(&server).0);
        let err = api.current_user().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to get user profile");
        assert_eq!(err.api_error().unwrap().code, ErrorCode::ServerError);
    }

    #[tokio::test]
    async fn test_delete_profile_and_sign_out() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/speech/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/speech/signout"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let api = AuthApi::new(client_for(&server).0);
        api.delete_speech_profile().await.unwrap();
        api.sign_out().await.unwrap();
    }
}
