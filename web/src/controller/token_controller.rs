use crate::{AppState, Error};

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use broker_auth::error::{token_error, TokenErrorKind};
use broker_auth::oauth::token::Record;
use chrono::Utc;
use log::*;
use secrecy::ExposeSecret;
use serde::Serialize;
use utoipa::ToSchema;

/// The cached access token as handed to API consumers.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Expiry as milliseconds since the Unix epoch.
    pub expires_at: i64,
    /// Seconds left until expiry at the time of the response.
    pub expires_in: i64,
    pub scope: Option<String>,
    pub user_id: Option<i64>,
}

impl From<&Record> for TokenResponse {
    fn from(record: &Record) -> Self {
        Self {
            access_token: record.access_token.expose_secret().to_string(),
            token_type: record.token_type.clone(),
            expires_at: record.expires_at.timestamp_millis(),
            expires_in: record.time_until_expiry(Utc::now()).num_seconds().max(0),
            scope: record.scope.clone(),
            user_id: record.user_id,
        }
    }
}

/// GET the current valid access token
///
/// Refreshes the cached token first when it is about to expire.
#[utoipa::path(
    get,
    path = "/api/token",
    responses(
        (status = 200, description = "A valid access token", body = TokenResponse),
        (status = 403, description = "Missing or invalid x-api-key header"),
        (status = 404, description = "No token can be obtained; authorize at /login"),
        (status = 502, description = "The provider could not be reached during refresh"),
    ),
    security(
        ("api_key" = [])
    )
)]
pub async fn read(State(app_state): State<AppState>) -> Result<impl IntoResponse, Error> {
    let record = app_state
        .token_cache
        .get_valid_token(app_state.provider.as_ref())
        .await
        .map_err(|e| {
            if e.is_provider_error() {
                // A rejected refresh means a new authorization is needed.
                warn!("Refresh rejected, no token can be handed out: {e}");
                token_error(TokenErrorKind::NoCachedToken, "Refresh rejected by provider")
            } else {
                e
            }
        })?;

    debug!("Handing out access token for user {:?}", record.user_id);
    Ok(Json(TokenResponse::from(&record)))
}
