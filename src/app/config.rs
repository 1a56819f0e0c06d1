use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;
use url::Url;

use crate::api::{ClientSettings, RetryPolicy};
use crate::error::{Error, Result};
use crate::platform::{AppPaths, DeviceInfo};

const ENV_PREFIX: &str = "SPEECHCOACH";
const DEPLOYMENT_VAR: &str = "SPEECHCOACH_ENV";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    #[default]
    Development,
    Production,
}

impl std::str::FromStr for Deployment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Deployment::Development),
            "production" | "prod" => Ok(Deployment::Production),
            other => Err(Error::validation(format!("Unknown deployment environment: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub environment: Deployment,
    pub endpoints: EndpointsConfig,
    pub retry: RetryConfig,
    pub app: AppInfoConfig,
    pub device: DeviceInfo,
    pub credentials: CredentialsConfig,
    pub connectivity: ConnectivityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub development: EndpointConfig,
    pub production: EndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfoConfig {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    Keyring,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub backend: CredentialBackend,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// When disabled the preflight always reports a connection.
    pub enabled: bool,
    pub probe_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Deployment::Development,
            endpoints: EndpointsConfig::default(),
            retry: RetryConfig::default(),
            app: AppInfoConfig::default(),
            device: DeviceInfo::default(),
            credentials: CredentialsConfig::default(),
            connectivity: ConnectivityConfig::default(),
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            development: EndpointConfig {
                base_url: "http://10.0.0.2:5002/api".to_string(),
                timeout_seconds: default_timeout_seconds(),
            },
            production: EndpointConfig {
                base_url: "https://api.landonkleinbrodt.com/api".to_string(),
                timeout_seconds: default_timeout_seconds(),
            },
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

impl Default for AppInfoConfig {
    fn default() -> Self {
        Self {
            name: "SpeechCoach".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            backend: CredentialBackend::Keyring,
            service: "com.speechcoach.credentials".to_string(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            probe_timeout_ms: 3000,
        }
    }
}

impl AppConfig {
    pub async fn load(paths: &AppPaths) -> Result<Self> {
        let config_file = paths.config_file();

        if !config_file.exists() {
            info!("Config file not found, creating default configuration");
            Self::default().save(paths).await?;
        }

        info!("Loading configuration from: {:?}", config_file);
        let config = Self::from_sources(&config_file, None)?;
        config.validate()?;

        info!("Configuration loaded for {:?} environment", config.environment);
        Ok(config)
    }

    /// Loads an explicitly named config file, which must exist.
    pub fn from_file(config_file: &Path) -> Result<Self> {
        if !config_file.is_file() {
            return Err(Error::validation(format!(
                "Config file not found: {}",
                config_file.display()
            )));
        }

        info!("Loading configuration from: {:?}", config_file);
        let config = Self::from_sources(config_file, None)?;
        config.validate()?;
        Ok(config)
    }

    /// Layers the config file (optional) under `SPEECHCOACH_*` variables.
    /// `env_vars` replaces the process environment when given.
    pub fn from_sources(config_file: &Path, env_vars: Option<HashMap<String, String>>) -> Result<Self> {
        let deployment = match &env_vars {
            Some(vars) => vars.get(DEPLOYMENT_VAR).cloned(),
            None => std::env::var(DEPLOYMENT_VAR).ok(),
        };

        let mut builder = Config::builder()
            .add_source(File::from(config_file).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .source(env_vars),
            );

        if let Some(deployment) = deployment {
            let deployment: Deployment = deployment.parse()?;
            let value = match deployment {
                Deployment::Development => "development",
                Deployment::Production => "production",
            };
            builder = builder.set_override("environment", value)?;
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    pub async fn save(&self, paths: &AppPaths) -> Result<()> {
        let config_file = paths.config_file();

        info!("Saving configuration to: {:?}", config_file);

        let config_content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(config::ConfigError::Message(e.to_string())))?;

        fs::create_dir_all(paths.config_dir()).await?;
        fs::write(&config_file, config_content).await?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, endpoint) in [
            ("development", &self.endpoints.development),
            ("production", &self.endpoints.production),
        ] {
            let url = Url::parse(&endpoint.base_url)
                .map_err(|e| Error::validation(format!("Endpoint {} has invalid base_url: {}", name, e)))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(Error::validation(format!(
                    "Endpoint {} must use http or https, got {}",
                    name,
                    url.scheme()
                )));
            }
            if endpoint.timeout_seconds == 0 {
                return Err(Error::validation(format!("Endpoint {} has zero timeout", name)));
            }
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(Error::validation("Retry max_attempts must be between 1 and 10"));
        }

        if self.app.name.trim().is_empty() {
            return Err(Error::validation("App name must not be empty"));
        }

        if self.credentials.service.trim().is_empty() {
            return Err(Error::validation("Credential service name must not be empty"));
        }

        Ok(())
    }

    pub fn active_endpoint(&self) -> &EndpointConfig {
        match self.environment {
            Deployment::Development => &self.endpoints.development,
            Deployment::Production => &self.endpoints.production,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_attempts, Duration::from_millis(self.retry.base_delay_ms))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity.probe_timeout_ms)
    }

    pub fn client_settings(&self) -> ClientSettings {
        let endpoint = self.active_endpoint();
        ClientSettings {
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(endpoint.timeout_seconds),
            retry: self.retry_policy(),
            user_agent: self.device.user_agent(&self.app.name, &self.app.version),
            device: self.device.clone(),
        }
    }
}
