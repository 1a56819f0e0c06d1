pub mod claims;
pub mod session;
pub mod storage;

pub use claims::TokenClaims;
pub use session::{AuthSession, SessionError, SessionResult};
pub use storage::{TokenStore, AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY};
