//! Shared-secret API key verification.

use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::error::{api_key_error, ApiKeyErrorKind, Error};

/// Header the consumer sends its key in.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Verifies the key presented by a consumer against the configured secret.
///
/// # Examples
///
/// ```rust
/// use broker_auth::api_key::ApiKeyAuth;
/// use secrecy::SecretString;
///
/// let auth = ApiKeyAuth::new(SecretString::from("scraper-key".to_string()));
/// assert!(auth.verify(Some("scraper-key")).is_ok());
/// assert!(auth.verify(Some("guess")).is_err());
/// ```
#[derive(Clone)]
pub struct ApiKeyAuth {
    api_key: SecretString,
}

impl ApiKeyAuth {
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }

    /// Check a presented key. A missing key, an empty configured key, or any
    /// mismatch is rejected with the same error.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), Error> {
        let expected = self.api_key.expose_secret().as_bytes();
        let presented = presented.unwrap_or_default().as_bytes();

        let matches: bool = expected.ct_eq(presented).into();
        if expected.is_empty() || !matches {
            return Err(api_key_error(ApiKeyErrorKind::Invalid, "Invalid API key"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn auth(key: &str) -> ApiKeyAuth {
        ApiKeyAuth::new(SecretString::from(key.to_string()))
    }

    #[test]
    fn test_matching_key_is_accepted() {
        assert!(auth("scraper-key").verify(Some("scraper-key")).is_ok());
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let err = auth("scraper-key").verify(Some("scraper-kez")).unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::ApiKey(ApiKeyErrorKind::Invalid));
    }

    #[test]
    fn test_prefix_of_key_is_rejected() {
        assert!(auth("scraper-key").verify(Some("scraper")).is_err());
    }

    #[test]
    fn test_missing_key_is_rejected() {
        assert!(auth("scraper-key").verify(None).is_err());
    }

    #[test]
    fn test_empty_configured_key_rejects_everything() {
        assert!(auth("").verify(Some("")).is_err());
        assert!(auth("").verify(None).is_err());
    }
}
