//! OAuth token record.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

/// Default token type when the provider does not send one.
pub const BEARER: &str = "Bearer";

/// The cached access/refresh token and its validity metadata.
#[derive(Debug, Clone)]
pub struct Record {
    /// Access token for API requests.
    pub access_token: SecretString,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: Option<SecretString>,
    /// When the access token expires (issuance time + `expires_in`).
    pub expires_at: DateTime<Utc>,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Granted scopes, space separated as the provider returns them.
    pub scope: Option<String>,
    /// Provider account the token belongs to.
    pub user_id: Option<i64>,
}

impl Record {
    /// True while `now` is earlier than `expires_at - skew`.
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now < self.expires_at - skew
    }

    /// Get the remaining time until expiration (negative once expired).
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_expiring_at(expires_at: DateTime<Utc>) -> Record {
        Record {
            access_token: SecretString::from("test".to_string()),
            refresh_token: None,
            expires_at,
            token_type: BEARER.to_string(),
            scope: None,
            user_id: None,
        }
    }

    #[test]
    fn test_token_valid_outside_skew_window() {
        let now = Utc::now();
        let record = record_expiring_at(now + Duration::hours(1));

        assert!(record.is_valid_at(now, Duration::seconds(60)));
        assert!(!record.can_refresh());
    }

    #[test]
    fn test_token_expired() {
        let now = Utc::now();
        let record = record_expiring_at(now - Duration::hours(1));

        assert!(!record.is_valid_at(now, Duration::zero()));
        assert!(record.time_until_expiry(now) < Duration::zero());
    }

    #[test]
    fn test_token_inside_skew_window_is_not_valid() {
        let now = Utc::now();
        let record = record_expiring_at(now + Duration::seconds(30));

        assert!(record.is_valid_at(now, Duration::zero()));
        assert!(!record.is_valid_at(now, Duration::seconds(60)));
    }

    #[test]
    fn test_skew_boundary_is_exclusive() {
        let now = Utc::now();
        let record = record_expiring_at(now + Duration::seconds(60));

        assert!(!record.is_valid_at(now, Duration::seconds(60)));
        assert!(record.is_valid_at(now - Duration::milliseconds(1), Duration::seconds(60)));
    }
}
