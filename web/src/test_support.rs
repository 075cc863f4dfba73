//! Fakes and request helpers shared by the router tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use broker_auth::error::{provider_error, Error as AuthError};
use broker_auth::oauth::token::{MemoryStorage, Record, BEARER};
use broker_auth::oauth::{PkceChallenge, PkceVerifier, Provider, UserInfo, CHALLENGE_METHOD};
use chrono::{Duration, Utc};
use clap::Parser;
use secrecy::SecretString;
use service::config::Config;
use tower::ServiceExt;

use crate::{app, AppState};

pub(crate) const TEST_API_KEY: &str = "scraper-test-key";

/// Exchange client that answers from memory and counts its calls.
#[derive(Default)]
pub(crate) struct FakeProvider {
    reject: bool,
    pub(crate) exchange_calls: AtomicUsize,
    pub(crate) refresh_calls: AtomicUsize,
}

impl FakeProvider {
    /// A provider that answers every grant with `invalid_grant`.
    pub(crate) fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    fn grant(&self, access_token: &str) -> Result<Record, AuthError> {
        if self.reject {
            return Err(provider_error("invalid_grant", "Error validating grant"));
        }
        Ok(valid_record(access_token))
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn authorization_url(
        &self,
        challenge: &PkceChallenge,
        state: &str,
        redirect_uri: &str,
    ) -> String {
        format!(
            "https://auth.example.test/authorization?response_type=code&client_id=app-123\
             &redirect_uri={redirect_uri}&code_challenge={}&code_challenge_method={CHALLENGE_METHOD}\
             &state={state}",
            challenge.as_str()
        )
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _verifier: &PkceVerifier,
        _redirect_uri: &str,
    ) -> Result<Record, AuthError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.grant("APP_USR-exchanged")
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<Record, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.grant("APP_USR-refreshed")
    }

    async fn user_info(&self, _access_token: &str) -> Result<UserInfo, AuthError> {
        Ok(UserInfo {
            id: 123456,
            nickname: Some("TESTSELLER".to_string()),
            first_name: None,
            last_name: None,
            email: Some("seller@example.test".to_string()),
            site_id: Some("MLA".to_string()),
            permalink: None,
        })
    }
}

pub(crate) fn valid_record(access_token: &str) -> Record {
    Record {
        access_token: SecretString::from(access_token.to_string()),
        refresh_token: Some(SecretString::from("TG-refresh".to_string())),
        expires_at: Utc::now() + Duration::hours(6),
        token_type: BEARER.to_string(),
        scope: Some("offline_access read".to_string()),
        user_id: Some(123456),
    }
}

/// App state over in-memory storage and `provider`, with the provider handle
/// returned for inspecting call counts.
pub(crate) fn test_state(provider: FakeProvider) -> (AppState, Arc<FakeProvider>) {
    let config = Config::parse_from([
        "token_broker",
        "--client-id",
        "app-123",
        "--api-key",
        TEST_API_KEY,
        "--session-secret",
        "test-session-secret",
        "--port",
        "3000",
        "--runtime-env",
        "development",
        "--redirect-uri",
        "http://localhost:3000/callback",
    ]);
    let provider = Arc::new(provider);
    let state = AppState::new(config, provider.clone(), Box::new(MemoryStorage::new()));
    (state, provider)
}

pub(crate) fn app_with(state: AppState) -> Router {
    app(state)
}

pub(crate) async fn get(app: Router, uri: &str, headers: &[(&str, &str)]) -> Response {
    let mut request = Request::builder().uri(uri);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    app.oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub(crate) async fn get_with_cookie(app: Router, uri: &str, cookie: &str) -> Response {
    get(app, uri, &[(header::COOKIE.as_str(), cookie)]).await
}

pub(crate) async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// The `name=value` pair of the session cookie set on `response`.
pub(crate) fn session_cookie(response: &Response) -> Option<String> {
    let set_cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
    set_cookie.split(';').next().map(str::to_string)
}

/// The `state` query parameter of an authorization URL.
pub(crate) fn state_param(url: &str) -> String {
    url.split(['?', '&'])
        .find_map(|pair| pair.strip_prefix("state="))
        .unwrap_or_default()
        .to_string()
}
