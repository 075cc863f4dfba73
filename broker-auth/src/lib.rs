//! # broker-auth
//!
//! Authentication core of the token broker:
//! - PKCE verifier/challenge generation and the per-session flow store
//! - The provider client that performs authorization code and refresh grants
//! - The token cache with pluggable storage (memory or a JSON file)
//! - API key verification for consumers of the cached token
//!
//! ## Usage
//!
//! ```rust,ignore
//! use broker_auth::{
//!     api_key::ApiKeyAuth,
//!     oauth::{FlowStore, Provider, providers::mercado_libre, token::{Cache, MemoryStorage}},
//! };
//! ```

pub mod api_key;
pub mod error;
pub mod oauth;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
