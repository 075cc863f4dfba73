//! API key authentication for downstream consumers of the cached token.

mod auth;

pub use auth::{ApiKeyAuth, API_KEY_HEADER};
