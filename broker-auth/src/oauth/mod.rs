//! OAuth 2.0 authorization code flow with PKCE.
//!
//! Covers the verifier/challenge pair, the per-session flow store, the
//! provider client that performs the token grants, and the token cache.

mod flow;
mod pkce;
mod provider;

pub mod providers;
pub mod token;

pub use flow::{FlowState, FlowStore};
pub use pkce::{generate_state, PkceChallenge, PkcePair, PkceVerifier, CHALLENGE_METHOD};
pub use provider::{Provider, UserInfo};
