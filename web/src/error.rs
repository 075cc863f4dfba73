use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use broker_auth::error::{
    ApiKeyErrorKind, Error as BrokerAuthError, ErrorKind as AuthErrorKind, FlowErrorKind,
    HttpErrorKind, OAuthErrorKind, TokenErrorKind,
};
use log::*;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Auth(BrokerAuthError),
    Web(WebErrorKind),
}

/// Failures that originate in the HTTP layer itself.
#[derive(Debug, PartialEq)]
pub enum WebErrorKind {
    /// Missing or unusable request parameters.
    Input,
    /// A forced refresh was requested but no refresh token is cached.
    NoRefreshToken,
    /// The session store could not be read or written.
    Session,
}

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        match self {
            Error::Auth(err) => write!(fmt, "{err}"),
            Error::Web(kind) => write!(fmt, "Web error: {kind:?}"),
        }
    }
}

impl Error {
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            Error::Web(WebErrorKind::Input) | Error::Web(WebErrorKind::NoRefreshToken) => {
                StatusCode::BAD_REQUEST
            }
            Error::Web(WebErrorKind::Session) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Auth(err) => match &err.error_kind {
                AuthErrorKind::Flow(FlowErrorKind::CsrfMismatch) => StatusCode::FORBIDDEN,
                AuthErrorKind::Flow(FlowErrorKind::NoActiveFlow) => StatusCode::BAD_REQUEST,
                AuthErrorKind::OAuth(OAuthErrorKind::Provider { .. }) => StatusCode::BAD_REQUEST,
                AuthErrorKind::OAuth(OAuthErrorKind::MalformedResponse) => StatusCode::BAD_GATEWAY,
                AuthErrorKind::Http(HttpErrorKind::Network) => StatusCode::BAD_GATEWAY,
                AuthErrorKind::Http(HttpErrorKind::BuilderFailed) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                AuthErrorKind::Token(TokenErrorKind::NoCachedToken) => StatusCode::NOT_FOUND,
                AuthErrorKind::Token(TokenErrorKind::Storage) => StatusCode::INTERNAL_SERVER_ERROR,
                AuthErrorKind::ApiKey(ApiKeyErrorKind::Invalid) => StatusCode::FORBIDDEN,
            },
        }
    }

    fn body(&self) -> String {
        match self {
            Error::Web(WebErrorKind::NoRefreshToken) => "NO REFRESH TOKEN CACHED".to_string(),
            Error::Auth(BrokerAuthError {
                error_kind: AuthErrorKind::OAuth(OAuthErrorKind::Provider { code, message }),
                ..
            }) => format!("PROVIDER ERROR ({code}): {message}"),
            Error::Auth(BrokerAuthError {
                error_kind: AuthErrorKind::Token(TokenErrorKind::NoCachedToken),
                ..
            }) => "NO TOKEN AVAILABLE".to_string(),
            Error::Auth(BrokerAuthError {
                error_kind: AuthErrorKind::Flow(FlowErrorKind::NoActiveFlow),
                ..
            }) => "NO AUTHORIZATION FLOW IN PROGRESS".to_string(),
            _ => self
                .status_code()
                .canonical_reason()
                .unwrap_or("ERROR")
                .to_uppercase(),
        }
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {self} (source: {:?})", self.source_chain());
        } else {
            warn!("Request rejected with {status}: {self}");
        }
        (status, self.body()).into_response()
    }
}

impl Error {
    fn source_chain(&self) -> Option<String> {
        match self {
            Error::Auth(err) => err.source().map(|source| source.to_string()),
            Error::Web(_) => None,
        }
    }
}

impl From<BrokerAuthError> for Error {
    fn from(err: BrokerAuthError) -> Self {
        Error::Auth(err)
    }
}

impl From<tower_sessions::session::Error> for Error {
    fn from(err: tower_sessions::session::Error) -> Self {
        error!("Session store error: {err}");
        Error::Web(WebErrorKind::Session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_auth::error::{api_key_error, flow_error, provider_error, token_error};

    #[test]
    fn test_csrf_mismatch_and_api_key_are_forbidden() {
        let csrf = Error::from(flow_error(FlowErrorKind::CsrfMismatch, "mismatch"));
        assert_eq!(csrf.status_code(), StatusCode::FORBIDDEN);

        let api_key = Error::from(api_key_error(ApiKeyErrorKind::Invalid, "bad key"));
        assert_eq!(api_key.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_provider_error_body_carries_provider_message() {
        let err = Error::from(provider_error("invalid_grant", "Error validating grant"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.body(),
            "PROVIDER ERROR (invalid_grant): Error validating grant"
        );
    }

    #[test]
    fn test_no_cached_token_is_not_found() {
        let err = Error::from(token_error(TokenErrorKind::NoCachedToken, "none"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_transport_failures_are_bad_gateway() {
        let network = Error::Auth(BrokerAuthError {
            source: None,
            error_kind: AuthErrorKind::Http(HttpErrorKind::Network),
        });
        assert_eq!(network.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(network.body(), "BAD GATEWAY");

        let malformed = Error::Auth(BrokerAuthError {
            source: None,
            error_kind: AuthErrorKind::OAuth(OAuthErrorKind::MalformedResponse),
        });
        assert_eq!(malformed.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_web_errors() {
        assert_eq!(
            Error::Web(WebErrorKind::Input).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Web(WebErrorKind::NoRefreshToken).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::Web(WebErrorKind::Session).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
