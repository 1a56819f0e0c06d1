pub mod config;
pub mod state;

pub use config::{AppConfig, CredentialBackend, Deployment};
pub use state::AppState;
