use serde::{Deserialize, Serialize};

/// Identity of the device the client runs on, sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceInfo {
    pub platform: String,
    pub os_version: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            os_version: "unknown".to_string(),
        }
    }
}

impl DeviceInfo {
    pub fn user_agent(&self, app_name: &str, app_version: &str) -> String {
        format!("{}/{} ({}; {})", app_name, app_version, self.platform, self.os_version)
    }
}
