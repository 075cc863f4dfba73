use crate::{view, AppState, Error};

use axum::extract::State;
use axum::response::IntoResponse;
use chrono::Utc;
use secrecy::ExposeSecret;

/// GET /
///
/// Status of the cached token.
pub async fn index(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let record = app_state.token_cache.current().await?;
    let fresh = record
        .as_ref()
        .is_some_and(|record| app_state.token_cache.is_fresh(record));

    let body = view::token_status(record.as_ref(), fresh, Utc::now());
    Ok(view::page("Mercado Libre token broker", &body))
}

/// GET /permissions
///
/// Shows the account the cached token belongs to, as reported by `/users/me`.
pub async fn permissions(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let record = app_state
        .token_cache
        .get_valid_token(app_state.provider.as_ref())
        .await?;
    let user = app_state
        .provider
        .user_info(record.access_token.expose_secret())
        .await?;

    let body = format!(
        "{}\n{}",
        view::user_info(&user),
        view::token_status(Some(&record), true, Utc::now())
    );
    Ok(view::page("Authorized account", &body))
}

pub async fn privacy() -> impl IntoResponse {
    view::page(
        "Privacy policy",
        &[
            view::message(
                "This service stores a single Mercado Libre access token and its refresh token \
                 so that an internal scraper can call the Mercado Libre API on behalf of the \
                 authorizing account.",
            ),
            view::message(
                "No personal data is collected from visitors. The session cookie only links \
                 a browser to an authorization in progress and expires shortly after.",
            ),
            view::message(
                "Account details shown on the account page are fetched live from Mercado Libre \
                 and are not stored.",
            ),
        ]
        .join("\n"),
    )
}

pub async fn terms() -> impl IntoResponse {
    view::page(
        "Terms of use",
        &[
            view::message(
                "This service is operated for internal use. Access to the token endpoint \
                 requires an API key issued by the operator.",
            ),
            view::message(
                "Authorizing grants the operator's tools the permissions shown on the \
                 Mercado Libre consent screen. Access can be revoked at any time from the \
                 Mercado Libre account settings.",
            ),
        ]
        .join("\n"),
    )
}
