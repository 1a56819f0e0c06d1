use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::api::{ApiClient, AudioUpload, Balance, BalanceApi, DomainError, Recording, RecordingsApi};
use crate::app::config::{AppConfig, CredentialBackend};
use crate::auth::AuthSession;
use crate::error::Result;
use crate::platform::{
    AppPaths, ConnectivityProbe, CredentialStore, KeyringStore, ManualProbe, MemoryStore, TcpProbe,
};

/// Composition root: one `ApiClient` shared by the domain wrappers and the
/// session, plus the recordings and balance the app keeps on hand.
pub struct AppState {
    config: AppConfig,
    paths: AppPaths,
    client: Arc<ApiClient>,
    session: AuthSession,
    recordings_api: RecordingsApi,
    balance_api: BalanceApi,
    recordings: RwLock<Vec<Recording>>,
    balance: RwLock<Option<Decimal>>,
}

impl AppState {
    pub fn new(config: AppConfig, paths: AppPaths) -> Result<Self> {
        info!("Initializing application state");

        let credentials: Arc<dyn CredentialStore> = match config.credentials.backend {
            CredentialBackend::Keyring => Arc::new(KeyringStore::new(config.credentials.service.clone())),
            CredentialBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let probe: Arc<dyn ConnectivityProbe> = if config.connectivity.enabled {
            Arc::new(TcpProbe::for_base_url(
                &config.active_endpoint().base_url,
                config.probe_timeout(),
            )?)
        } else {
            debug!("Connectivity preflight disabled");
            Arc::new(ManualProbe::new(true))
        };

        Self::from_parts(config, paths, credentials, probe)
    }

    /// Builds the state around caller-supplied credential and connectivity
    /// implementations.
    pub fn from_parts(
        config: AppConfig,
        paths: AppPaths,
        credentials: Arc<dyn CredentialStore>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Result<Self> {
        let client = Arc::new(ApiClient::new(config.client_settings(), credentials, probe)?);

        Ok(Self {
            session: AuthSession::new(client.clone()),
            recordings_api: RecordingsApi::new(client.clone()),
            balance_api: BalanceApi::new(client.clone()),
            client,
            config,
            paths,
            recordings: RwLock::new(Vec::new()),
            balance: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn recordings_api(&self) -> &RecordingsApi {
        &self.recordings_api
    }

    pub fn balance_api(&self) -> &BalanceApi {
        &self.balance_api
    }

    pub async fn load_recordings(&self) -> std::result::Result<Vec<Recording>, DomainError> {
        let recordings = self.recordings_api.get_recordings().await?;
        debug!("Loaded {} recordings", recordings.len());
        *self.recordings.write() = recordings.clone();
        Ok(recordings)
    }

    /// Newest first.
    pub fn add_recording(&self, recording: Recording) {
        let mut recordings = self.recordings.write();
        recordings.retain(|existing| existing.id != recording.id);
        recordings.insert(0, recording);
    }

    pub fn remove_recording(&self, id: i64) -> Option<Recording> {
        let mut recordings = self.recordings.write();
        let index = recordings.iter().position(|recording| recording.id == id)?;
        Some(recordings.remove(index))
    }

    pub fn recordings(&self) -> Vec<Recording> {
        self.recordings.read().clone()
    }

    /// Uploads audio for analysis and caches the resulting recording.
    pub async fn analyze(&self, audio: AudioUpload, duration: f64) -> std::result::Result<Recording, DomainError> {
        let recording = self.recordings_api.analyze_recording(audio, duration).await?;
        info!("Recording {} analyzed", recording.id);
        self.add_recording(recording.clone());
        Ok(recording)
    }

    pub async fn delete_recording(&self, id: i64) -> std::result::Result<(), DomainError> {
        self.recordings_api.delete_recording(&id.to_string()).await?;
        self.remove_recording(id);
        Ok(())
    }

    pub async fn load_balance(&self) -> std::result::Result<Balance, DomainError> {
        let balance = self.balance_api.get_balance().await?;
        debug!("Balance is {}", balance.balance);
        *self.balance.write() = Some(balance.balance);
        Ok(balance)
    }

    pub fn update_balance(&self, balance: Decimal) {
        *self.balance.write() = Some(balance);
    }

    pub fn balance(&self) -> Option<Decimal> {
        *self.balance.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::EndpointConfig;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recording_json(id: i64) -> serde_json::Value {
        json!({
            "id": id,
            "title": format!("Recording {}", id),
            "duration": 12.5,
            "created_at": "2024-05-01T10:00:00Z",
            "analysis": {
                "id": id,
                "recording_id": id,
                "transcript": "hello",
                "clarity_score": 8.0,
                "pace_score": 7.5,
                "filler_word_count": 2,
                "tone_analysis": {"confidence": 7.0, "enthusiasm": 6.0, "professionalism": 8.0},
                "content_structure": {"keyPoints": ["intro"], "organization": 7.0, "coherence": 8.0},
                "feedback": "Good pace",
                "created_at": "2024-05-01T10:00:00Z"
            }
        })
    }

    fn recording(id: i64) -> Recording {
        serde_json::from_value(recording_json(id)).unwrap()
    }

    fn state_for(server: &MockServer, dir: &TempDir) -> AppState {
        let mut config = AppConfig::default();
        config.endpoints.development = EndpointConfig {
            base_url: format!("{}/api", server.uri()),
            timeout_seconds: 2,
        };
        config.retry.base_delay_ms = 5;
        config.credentials.backend = CredentialBackend::Memory;
        config.connectivity.enabled = false;

        AppState::new(config, AppPaths::with_root(dir.path())).unwrap()
    }

    #[tokio::test]
    async fn test_recordings_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/speech/recordings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([recording_json(1), recording_json(2)])))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/speech/recordings/1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let state = state_for(&server, &dir);
        assert!(state.recordings().is_empty());

        state.load_recordings().await.unwrap();
        assert_eq!(state.recordings().len(), 2);

        state.add_recording(recording(3));
        state.add_recording(recording(2));
        let ids: Vec<i64> = state.recordings().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        assert_eq!(state.remove_recording(3).map(|r| r.id), Some(3));
        assert!(state.remove_recording(42).is_none());

        state.delete_recording(1).await.unwrap();
        let ids: Vec<i64> = state.recordings().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn test_balance_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/billing/balance"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balance": 4.5,
                "updated_at": "2024-05-01T10:00:00Z"
            })))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let state = state_for(&server, &dir);
        assert_eq!(state.balance(), None);

        state.load_balance().await.unwrap();
        assert_eq!(state.balance(), Some(Decimal::new(45, 1)));

        state.update_balance(Decimal::new(3, 0));
        assert_eq!(state.balance(), Some(Decimal::new(3, 0)));
    }

    #[tokio::test]
    async fn test_failed_load_keeps_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/speech/recordings"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let state = state_for(&server, &dir);
        state.add_recording(recording(9));

        let err = state.load_recordings().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch recordings");
        assert_eq!(state.recordings().len(), 1);
    }
}
