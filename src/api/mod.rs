pub mod auth;
pub mod balance;
pub mod client;
pub mod error;
pub mod recordings;
pub mod retry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth::AuthApi;
pub use balance::BalanceApi;
pub use client::{ApiClient, ClientSettings, MultipartBody, RequestBody};
pub use error::{ApiError, ApiResult, DomainError, ErrorCode};
pub use recordings::{AudioUpload, RecordingsApi};
pub use retry::RetryPolicy;
pub use types::{
    AppleCredentials, Analysis, AuthResponse, Balance, ContentStructure, FullName, PaymentIntent,
    PaymentSheetParams, Recording, ToneAnalysis, Transaction, UserProfile,
};
