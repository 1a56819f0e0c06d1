pub mod api;
pub mod app;
pub mod auth;
pub mod error;
pub mod platform;

pub use error::{Error, Result};
