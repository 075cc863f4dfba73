//! Error types for the `broker-auth` crate.
//!
//! Follows the same pattern as `web::error` with a root Error struct and error kind enums.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for broker-auth crate.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in broker-auth.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Flow(FlowErrorKind),
    OAuth(OAuthErrorKind),
    Token(TokenErrorKind),
    ApiKey(ApiKeyErrorKind),
    Http(HttpErrorKind),
}

/// Errors from completing an in-flight authorization flow.
#[derive(Debug, PartialEq)]
pub enum FlowErrorKind {
    /// The `state` returned by the provider does not match the one issued at login.
    CsrfMismatch,
    /// No flow is in flight for this session (never started, consumed, or expired).
    NoActiveFlow,
}

/// Errors reported by, or while talking to, the provider's token endpoint.
#[derive(Debug, PartialEq)]
pub enum OAuthErrorKind {
    /// The provider answered with an error payload.
    Provider { code: String, message: String },
    /// The provider answered successfully but required fields are missing.
    MalformedResponse,
}

/// Errors from token cache operations.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    NoCachedToken,
    Storage,
}

/// Errors from API key verification.
#[derive(Debug, PartialEq)]
pub enum ApiKeyErrorKind {
    Invalid,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    Network,
}

impl Error {
    /// True when the error came from the provider rejecting a grant.
    pub fn is_provider_error(&self) -> bool {
        matches!(self.error_kind, ErrorKind::OAuth(OAuthErrorKind::Provider { .. }))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Flow(kind) => write!(f, "Flow error: {:?}", kind),
            ErrorKind::OAuth(OAuthErrorKind::Provider { code, message }) => {
                write!(f, "Provider error ({}): {}", code, message)
            }
            ErrorKind::OAuth(kind) => write!(f, "OAuth error: {:?}", kind),
            ErrorKind::Token(kind) => write!(f, "Token error: {:?}", kind),
            ErrorKind::ApiKey(kind) => write!(f, "API key error: {:?}", kind),
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_decode() {
            ErrorKind::OAuth(OAuthErrorKind::MalformedResponse)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create flow errors.
pub fn flow_error(kind: FlowErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Flow(kind),
    }
}

/// Helper function to create OAuth errors.
pub fn oauth_error(kind: OAuthErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::OAuth(kind),
    }
}

/// Helper function to create a provider error from the provider's own code and message.
pub fn provider_error(code: &str, message: &str) -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::OAuth(OAuthErrorKind::Provider {
            code: code.to_string(),
            message: message.to_string(),
        }),
    }
}

/// Helper function to create token errors.
pub fn token_error(kind: TokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(kind),
    }
}

/// Helper function to create storage errors.
pub fn storage_error<E>(err: E) -> Error
where
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    Error {
        source: Some(err.into()),
        error_kind: ErrorKind::Token(TokenErrorKind::Storage),
    }
}

/// Helper function to create API key errors.
pub fn api_key_error(kind: ApiKeyErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::ApiKey(kind),
    }
}
