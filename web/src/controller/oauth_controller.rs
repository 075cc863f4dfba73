//! Controller for the Mercado Libre authorization flow.
//!
//! These endpoints are driven by browser redirects, so failures that the
//! person at the browser can act on are rendered as pages rather than bare
//! status codes.

use crate::error::WebErrorKind;
use crate::extractors::flow_session::FlowSession;
use crate::{view, AppState, Error};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use broker_auth::error::{flow_error, ErrorKind, FlowErrorKind, TokenErrorKind};
use chrono::Utc;
use log::*;
use serde::Deserialize;

/// Query parameters the provider sends back to the redirect URI.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the user denied access.
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /login
///
/// Starts an authorization flow for the caller's session and redirects the
/// browser to the provider's authorization endpoint.
#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 307, description = "Redirect to the provider's authorization endpoint"),
        (status = 500, description = "Session store failure"),
    )
)]
pub async fn login(
    State(app_state): State<AppState>,
    flow_session: FlowSession,
) -> Result<impl IntoResponse, Error> {
    let flow_key = flow_session.ensure_key().await?;
    let flow = app_state.flows.begin_flow(&flow_key);

    let url = app_state.provider.authorization_url(
        &flow.challenge(),
        &flow.csrf_state,
        &app_state.config.redirect_uri(),
    );

    info!("Starting authorization flow, redirecting to the provider");
    Ok(Redirect::temporary(&url))
}

/// GET /callback
///
/// Completes the flow started at `/login`: checks `state`, exchanges `code`
/// for a token and caches it.
#[utoipa::path(
    get,
    path = "/callback",
    params(
        ("code" = String, Query, description = "Authorization code from the provider"),
        ("state" = String, Query, description = "State issued at /login"),
    ),
    responses(
        (status = 200, description = "Token obtained and cached"),
        (status = 400, description = "Missing parameters, no flow in progress, or the provider rejected the code"),
        (status = 403, description = "State does not match the one issued to this session"),
        (status = 502, description = "The provider could not be reached or answered unexpectedly"),
    )
)]
pub async fn callback(
    State(app_state): State<AppState>,
    flow_session: FlowSession,
    Query(params): Query<CallbackParams>,
) -> Result<Response, Error> {
    if let Some(error) = params.error {
        warn!("Provider redirected back with error {error}");
        let description = params.error_description.unwrap_or(error);
        return Ok(failure_page(&description));
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or(Error::Web(WebErrorKind::Input))?;
    let state = params
        .state
        .filter(|state| !state.is_empty())
        .ok_or(Error::Web(WebErrorKind::Input))?;

    let flow_key = flow_session.key().await?.ok_or_else(|| {
        flow_error(
            FlowErrorKind::NoActiveFlow,
            "Session has never started an authorization flow",
        )
    })?;
    let verifier = app_state.flows.complete_flow(&flow_key, &state)?;

    let record = match app_state
        .provider
        .exchange_code(&code, &verifier, &app_state.config.redirect_uri())
        .await
    {
        Ok(record) => record,
        Err(e) if e.is_provider_error() => {
            warn!("Authorization code exchange rejected: {e}");
            return Ok(failure_page(&e.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "Authorization complete, access token valid until {}",
        record.expires_at.to_rfc3339()
    );
    app_state.token_cache.store(record.clone()).await?;

    let fresh = app_state.token_cache.is_fresh(&record);
    let body = format!(
        "{}\n{}",
        view::message("The access token was obtained and cached."),
        view::token_status(Some(&record), fresh, Utc::now())
    );
    Ok(view::page("Authorization complete", &body).into_response())
}

/// GET /refresh
///
/// Forces a refresh of the cached token and redirects to the status page.
#[utoipa::path(
    get,
    path = "/refresh",
    responses(
        (status = 303, description = "Token refreshed, redirect to the status page"),
        (status = 400, description = "No refresh token cached, or the provider rejected it"),
        (status = 502, description = "The provider could not be reached or answered unexpectedly"),
    )
)]
pub async fn refresh(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    app_state
        .token_cache
        .refresh_now(app_state.provider.as_ref())
        .await
        .map_err(|e| match e.error_kind {
            ErrorKind::Token(TokenErrorKind::NoCachedToken) => {
                Error::Web(WebErrorKind::NoRefreshToken)
            }
            _ => Error::Auth(e),
        })?;

    Ok(Redirect::to("/"))
}

fn failure_page(message: &str) -> Response {
    let body = format!(
        "{}\n<p><a href=\"/login\">Try again</a></p>",
        view::message(message)
    );
    (
        StatusCode::BAD_REQUEST,
        view::page("Authorization failed", &body),
    )
        .into_response()
}
