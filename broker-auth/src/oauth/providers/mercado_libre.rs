//! Mercado Libre OAuth provider implementation.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{oauth_error, provider_error, Error, ErrorKind, HttpErrorKind, OAuthErrorKind};
use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
use crate::oauth::token::{Clock, Record, SystemClock, BEARER};
use crate::oauth::UserInfo;

/// Endpoints used by the provider, as configured.
#[derive(Debug, Clone)]
pub struct Urls {
    pub auth_url: String,
    pub token_url: String,
    pub api_base_url: String,
}

/// Form body for both grants sent to the token endpoint.
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code_verifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// Successful token endpoint payload. Every field is optional here so that a
/// missing one is reported as a malformed response instead of a decode error.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    user_id: Option<i64>,
}

/// Error payload, e.g. `{"message": "...", "error": "invalid_grant", "status": 400}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_record(
        self,
        issued_at: DateTime<Utc>,
        previous_refresh_token: Option<&str>,
    ) -> Result<Record, Error> {
        let access_token = self.access_token.ok_or_else(|| {
            oauth_error(
                OAuthErrorKind::MalformedResponse,
                "Token response is missing access_token",
            )
        })?;
        let expires_in = self.expires_in.ok_or_else(|| {
            oauth_error(
                OAuthErrorKind::MalformedResponse,
                "Token response is missing expires_in",
            )
        })?;
        let expires_at = Some(expires_in)
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| {
                oauth_error(
                    OAuthErrorKind::MalformedResponse,
                    "Token response has an out of range expires_in",
                )
            })?;

        let refresh_token = self
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string));

        Ok(Record {
            access_token: SecretString::from(access_token),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at,
            token_type: self.token_type.unwrap_or_else(|| BEARER.to_string()),
            scope: self.scope,
            user_id: self.user_id,
        })
    }
}

/// Mercado Libre OAuth provider.
///
/// Handles the authorization code grant with PKCE, refresh grants and the
/// `/users/me` lookup. The client secret is only sent when configured, so the
/// same client works as a public or a confidential client.
pub struct Provider {
    client_id: String,
    client_secret: Option<SecretString>,
    auth_url: Url,
    urls: Urls,
    http_client: reqwest::Client,
    clock: Arc<dyn Clock>,
}

impl Provider {
    /// Create a new Mercado Libre provider.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Application ID
    /// * `client_secret` - Secret key, if the application is a confidential client
    /// * `urls` - Provider endpoints
    /// * `timeout` - Timeout applied to every outbound request
    pub fn new(
        client_id: &str,
        client_secret: Option<SecretString>,
        urls: Urls,
        timeout: StdDuration,
    ) -> Result<Self, Error> {
        let auth_url = Url::parse(&urls.auth_url).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Http(HttpErrorKind::BuilderFailed),
        })?;
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client_id: client_id.to_string(),
            client_secret,
            auth_url,
            urls,
            http_client,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn client_secret(&self) -> Option<&str> {
        self.client_secret
            .as_ref()
            .map(|secret| secret.expose_secret().as_str())
    }

    async fn request_token(
        &self,
        request: &TokenRequest<'_>,
        previous_refresh_token: Option<&str>,
    ) -> Result<Record, Error> {
        let issued_at = self.clock.now();

        let response = self
            .http_client
            .post(&self.urls.token_url)
            .header(ACCEPT, "application/json")
            .form(request)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach token endpoint for {} grant: {:?}", request.grant_type, e);
                Error::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        let payload: serde_json::Value = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(e) if status.is_success() => {
                warn!("Token endpoint returned a non-JSON body");
                return Err(Error {
                    source: Some(Box::new(e)),
                    error_kind: ErrorKind::OAuth(OAuthErrorKind::MalformedResponse),
                });
            }
            Err(_) => return Err(status_error(status, &body)),
        };

        let has_error_field = payload.get("error").is_some_and(|e| !e.is_null());
        if !status.is_success() || has_error_field {
            let err = error_from_payload(status, payload);
            warn!("{} grant rejected by provider: {}", request.grant_type, err);
            return Err(err);
        }

        let tokens: TokenResponse = serde_json::from_value(payload).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::OAuth(OAuthErrorKind::MalformedResponse),
        })?;

        tokens.into_record(issued_at, previous_refresh_token)
    }
}

#[async_trait]
impl crate::oauth::Provider for Provider {
    fn authorization_url(
        &self,
        challenge: &PkceChallenge,
        state: &str,
        redirect_uri: &str,
    ) -> String {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", challenge.method())
            .append_pair("state", state);
        url.into()
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &PkceVerifier,
        redirect_uri: &str,
    ) -> Result<Record, Error> {
        let request = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.client_id,
            client_secret: self.client_secret(),
            code: Some(code),
            redirect_uri: Some(redirect_uri),
            code_verifier: Some(verifier.as_str()),
            refresh_token: None,
        };

        debug!("Exchanging authorization code for tokens");
        let record = self.request_token(&request, None).await?;
        info!("Successfully exchanged authorization code for tokens");

        Ok(record)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Record, Error> {
        let request = TokenRequest {
            grant_type: "refresh_token",
            client_id: &self.client_id,
            client_secret: self.client_secret(),
            code: None,
            redirect_uri: None,
            code_verifier: None,
            refresh_token: Some(refresh_token),
        };

        debug!("Refreshing access token");
        self.request_token(&request, Some(refresh_token)).await
    }

    async fn user_info(&self, access_token: &str) -> Result<UserInfo, Error> {
        let url = format!("{}/users/me", self.urls.api_base_url.trim_end_matches('/'));

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to get user info: {:?}", e);
                Error::from(e)
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(response.json::<UserInfo>().await?)
    }
}

/// Build a provider error from a JSON error payload.
fn error_from_payload(status: StatusCode, payload: serde_json::Value) -> Error {
    let body: ErrorResponse = serde_json::from_value(payload).unwrap_or_default();
    let code = body
        .error
        .unwrap_or_else(|| status.as_str().to_string());
    let message = body
        .message
        .or(body.error_description)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    provider_error(&code, &message)
}

/// Build a provider error from a non-JSON failure body.
fn status_error(status: StatusCode, body: &str) -> Error {
    let message = match body.trim() {
        "" => status.canonical_reason().unwrap_or("unknown error"),
        text => text,
    };
    provider_error(status.as_str(), message)
}

async fn error_from_response(response: Response) -> Error {
    let status = response.status();
    match response.text().await {
        Ok(body) => match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(payload) => error_from_payload(status, payload),
            Err(_) => status_error(status, &body),
        },
        Err(e) => Error::from(e),
    }
}
