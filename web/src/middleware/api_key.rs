use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use broker_auth::api_key::API_KEY_HEADER;

use crate::{AppState, Error};

/// Rejects requests whose `x-api-key` header does not match the configured key.
///
/// A missing header, a value that is not valid UTF-8 and a wrong key all get
/// the same `403` with no body beyond the status text.
pub async fn require_api_key(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match app_state.api_key_auth.verify(presented) {
        Ok(()) => next.run(request).await,
        Err(e) => Error::from(e).into_response(),
    }
}
