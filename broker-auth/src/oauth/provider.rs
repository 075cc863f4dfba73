//! OAuth provider trait and types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::pkce::{PkceChallenge, PkceVerifier};
use super::token::Record;
use crate::error::Error;

/// Account details returned by the provider's `/users/me` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Provider's unique user identifier.
    pub id: i64,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub site_id: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
}

/// Client for the provider's authorization and token endpoints.
///
/// This is the one code path for every grant: login, callback and refresh all
/// go through it, and all failures come back in the same error taxonomy.
/// Nothing is retried internally.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Build the authorization URL the browser is redirected to.
    ///
    /// # Arguments
    ///
    /// * `challenge` - PKCE challenge derived from the flow's verifier
    /// * `state` - CSRF state parameter for validation
    /// * `redirect_uri` - Where the provider sends the browser back to
    fn authorization_url(&self, challenge: &PkceChallenge, state: &str, redirect_uri: &str)
        -> String;

    /// Exchange an authorization code for a token record.
    ///
    /// `expires_at` on the returned record is the exchange time plus `expires_in`.
    async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
        redirect_uri: &str,
    ) -> Result<Record, Error>;

    /// Refresh an access token.
    ///
    /// If the provider does not rotate the refresh token, the one passed in is
    /// kept on the returned record.
    async fn refresh(&self, refresh_token: &str) -> Result<Record, Error>;

    /// Get the account the access token belongs to.
    async fn user_info(&self, access_token: &str) -> Result<UserInfo, Error>;
}
