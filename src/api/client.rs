use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::api::error::{ApiError, ApiResult, ErrorCode};
use crate::api::retry::RetryPolicy;
use crate::auth::TokenStore;
use crate::error::{Error, Result};
use crate::platform::{ConnectivityProbe, CredentialStore, DeviceInfo};

const DEVICE_PLATFORM_HEADER: &str = "x-device-platform";
const DEVICE_VERSION_HEADER: &str = "x-device-version";

/// Construction-time settings of the gateway. Read-only afterwards.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub user_agent: String,
    pub device: DeviceInfo,
}

/// Body of an outgoing request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(MultipartBody),
}

impl RequestBody {
    pub fn json<T: Serialize>(value: &T) -> ApiResult<Self> {
        serde_json::to_value(value)
            .map(RequestBody::Json)
            .map_err(|e| ApiError::new(ErrorCode::UnknownError, format!("Failed to encode request body: {}", e)))
    }
}

#[derive(Debug, Clone)]
enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

/// Multipart payload kept in owned form so it can be re-encoded for every
/// attempt; `reqwest::multipart::Form` cannot be cloned.
#[derive(Debug, Clone, Default)]
pub struct MultipartBody {
    fields: Vec<MultipartField>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(MultipartField::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        self.fields.push(MultipartField::File {
            name: name.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        });
        self
    }

    fn to_form(&self) -> ApiResult<Form> {
        let mut form = Form::new();
        for field in &self.fields {
            form = match field {
                MultipartField::Text { name, value } => form.text(name.clone(), value.clone()),
                MultipartField::File {
                    name,
                    file_name,
                    mime,
                    bytes,
                } => {
                    let part = Part::bytes(bytes.clone())
                        .file_name(file_name.clone())
                        .mime_str(mime)
                        .map_err(|e| {
                            ApiError::new(ErrorCode::UnknownError, format!("Invalid mime type {}: {}", mime, e))
                        })?;
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

/// Single point of egress for backend calls.
///
/// Every call goes through the same path: connectivity preflight, bearer
/// token injection, dispatch under the retry policy, and normalization of
/// the outcome into an [`ApiResult`].
pub struct ApiClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
    tokens: TokenStore,
    probe: Arc<dyn ConnectivityProbe>,
}

impl ApiClient {
    pub fn new(
        settings: ClientSettings,
        credentials: Arc<dyn CredentialStore>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(DEVICE_PLATFORM_HEADER),
            header_value(&settings.device.platform)?,
        );
        headers.insert(
            HeaderName::from_static(DEVICE_VERSION_HEADER),
            header_value(&settings.device.os_version)?,
        );

        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .build()?;

        info!(
            "API client ready: base_url={}, timeout={:?}, max_attempts={}",
            settings.base_url,
            settings.timeout,
            settings.retry.max_attempts()
        );

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: settings.retry,
            tokens: TokenStore::new(credentials),
            probe,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.request(Method::GET, path, RequestBody::Empty).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: RequestBody) -> ApiResult<T> {
        self.request(Method::POST, path, body).await
    }

    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: RequestBody) -> ApiResult<T> {
        self.request(Method::PUT, path, body).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.request(Method::DELETE, path, RequestBody::Empty).await
    }

    pub async fn request<T: DeserializeOwned>(&self, method: Method, path: &str, body: RequestBody) -> ApiResult<T> {
        let network = self.probe.fetch().await;
        if !network.is_connected {
            warn!("{} {} skipped: no connectivity", method, path);
            return Err(ApiError::no_connectivity());
        }

        let token = self.tokens.get_token().await.map_err(|e| {
            error!("Failed to read auth token: {}", e);
            ApiError::credential(format!("Failed to read auth token: {}", e))
        })?;

        let body = &body;
        let token = token.as_deref();
        let dispatch_method = method.clone();
        let result = self
            .retry
            .run(move |attempt| self.execute::<T>(dispatch_method.clone(), path, body, token, attempt))
            .await;

        match &result {
            Ok(_) => debug!("{} {} succeeded", method, path),
            Err(e) => warn!(
                "{} {} failed after {} attempt(s): {} (status {:?})",
                method, path, e.attempts, e, e.status
            ),
        }

        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &RequestBody,
        token: Option<&str>,
        attempt: u32,
    ) -> ApiResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);

        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        // Multipart requests get their boundary header from the transport.
        request = match body {
            RequestBody::Empty => request.header(CONTENT_TYPE, "application/json"),
            RequestBody::Json(value) => request.json(value),
            RequestBody::Multipart(multipart) => request.multipart(multipart.to_form()?),
        };

        debug!(attempt, %method, path, "sending API request");

        let response = request.send().await.map_err(|e| {
            debug!(attempt, %method, path, error = %e, "API request failed");
            ApiError::from_transport(&e)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::from_transport(&e))?;
        debug!(attempt, %method, path, %status, "received API response");

        if !status.is_success() {
            return Err(ApiError::from_response(status.as_u16(), &text));
        }

        decode_body(&text)
    }
}

/// Deserializes a success body; an empty body reads as JSON `null`.
fn decode_body<T: DeserializeOwned>(text: &str) -> ApiResult<T> {
    let source = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(source)
        .map_err(|e| ApiError::parse(format!("Failed to parse response: {}", e), Some(text.to_string())))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| Error::validation(format!("Invalid header value {:?}: {}", value, e)))
}
