use std::sync::Arc;
use std::time::Duration;

use wiremock::MockServer;

use crate::api::{ApiClient, ClientSettings, RetryPolicy};
use crate::platform::{DeviceInfo, ManualProbe, MemoryStore};

/// Client pointed at `{server}/api` with fast retries and an in-memory store.
pub(crate) fn client_for(server: &MockServer) -> (Arc<ApiClient>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let settings = ClientSettings {
        base_url: format!("{}/api", server.uri()),
        timeout: Duration::from_secs(2),
        retry: RetryPolicy::new(3, Duration::from_millis(5)),
        user_agent: "SpeechCoach/test (linux; test)".to_string(),
        device: DeviceInfo {
            platform: "linux".to_string(),
            os_version: "test".to_string(),
        },
    };

    let client = ApiClient::new(settings, store.clone(), Arc::new(ManualProbe::new(true)))
        .expect("test client");
    (Arc::new(client), store)
}
