//! Token cache with a single refresh lock.

use std::sync::Arc;

use chrono::Duration;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Clock, Record, Storage, SystemClock};
use crate::error::{token_error, Error, TokenErrorKind};
use crate::oauth::Provider;

/// Default margin before `expires_at` at which a token is treated as expired.
pub const DEFAULT_EXPIRY_SKEW_SECS: i64 = 60;

/// Token cache that hands out a valid access token, refreshing when needed.
///
/// The refresh lock serializes the read-check-refresh-store sequence. Without
/// it, two requests arriving just after expiry would both refresh, and the
/// provider may invalidate the refresh token used by the first one.
pub struct Cache<S: Storage> {
    storage: S,
    clock: Arc<dyn Clock>,
    skew: Duration,
    refresh_lock: Mutex<()>,
}

impl<S: Storage> Cache<S> {
    /// Create a cache over `storage` using the wall clock and a 60 second skew.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            skew: Duration::seconds(DEFAULT_EXPIRY_SKEW_SECS),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Whether `record` can be handed out as-is right now.
    pub fn is_fresh(&self, record: &Record) -> bool {
        record.is_valid_at(self.clock.now(), self.skew)
    }

    /// Get a valid token record, refreshing it through `provider` if needed.
    ///
    /// This method:
    /// 1. Retrieves the stored record
    /// 2. Returns it if `now < expires_at - skew`
    /// 3. Otherwise takes the refresh lock and checks again
    /// 4. Refreshes, stores and returns the new record
    ///
    /// A failed refresh leaves the stored record untouched.
    pub async fn get_valid_token<P: Provider + ?Sized>(
        &self,
        provider: &P,
    ) -> Result<Record, Error> {
        let record = self.stored_record().await?;
        if self.is_fresh(&record) {
            return Ok(record);
        }

        debug!("Cached access token is expired or about to expire, refreshing");

        let _guard = self.refresh_lock.lock().await;

        // Double-check, another request might have refreshed while we waited
        let record = self.stored_record().await?;
        if self.is_fresh(&record) {
            debug!("Token was refreshed by another request");
            return Ok(record);
        }

        self.refresh_record(provider, &record).await
    }

    /// Refresh the stored record now, whatever its expiry.
    pub async fn refresh_now<P: Provider + ?Sized>(&self, provider: &P) -> Result<Record, Error> {
        let _guard = self.refresh_lock.lock().await;
        let record = self.stored_record().await?;
        self.refresh_record(provider, &record).await
    }

    /// Replace the cached record.
    pub async fn store(&self, record: Record) -> Result<(), Error> {
        let _guard = self.refresh_lock.lock().await;
        self.storage.store(record).await
    }

    /// The stored record, valid or not.
    pub async fn current(&self) -> Result<Option<Record>, Error> {
        self.storage.get().await
    }

    async fn stored_record(&self) -> Result<Record, Error> {
        self.storage
            .get()
            .await?
            .ok_or_else(|| token_error(TokenErrorKind::NoCachedToken, "No token has been obtained"))
    }

    // Must be called with the refresh lock held.
    async fn refresh_record<P: Provider + ?Sized>(
        &self,
        provider: &P,
        record: &Record,
    ) -> Result<Record, Error> {
        let refresh_token = record.refresh_token.as_ref().ok_or_else(|| {
            token_error(
                TokenErrorKind::NoCachedToken,
                "Cached token has no refresh token",
            )
        })?;

        let refreshed = provider
            .refresh(refresh_token.expose_secret())
            .await
            .map_err(|e| {
                warn!("Token refresh failed, keeping the cached record: {}", e);
                e
            })?;

        self.storage.store(refreshed.clone()).await?;
        info!(
            "Access token refreshed, valid until {}",
            refreshed.expires_at.to_rfc3339()
        );

        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{provider_error, ErrorKind};
    use crate::oauth::pkce::{PkceChallenge, PkceVerifier};
    use crate::oauth::token::clock::testing::ManualClock;
    use crate::oauth::token::record::BEARER;
    use crate::oauth::token::MemoryStorage;
    use crate::oauth::UserInfo;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Provider double that counts refresh calls.
    struct MockProvider {
        clock: Arc<ManualClock>,
        refresh_calls: AtomicUsize,
        fail_refresh: bool,
        delay_ms: u64,
    }

    impl MockProvider {
        fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                refresh_calls: AtomicUsize::new(0),
                fail_refresh: false,
                delay_ms: 0,
            }
        }

        fn calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn authorization_url(&self, _: &PkceChallenge, _: &str, _: &str) -> String {
            String::new()
        }

        async fn exchange_code(
            &self,
            _code: &str,
            _verifier: &PkceVerifier,
            _redirect_uri: &str,
        ) -> Result<Record, Error> {
            unreachable!("not used by the cache")
        }

        async fn refresh(&self, refresh_token: &str) -> Result<Record, Error> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail_refresh {
                return Err(provider_error("invalid_grant", "Error validating grant"));
            }
            Ok(Record {
                access_token: SecretString::from(format!("A{}", n)),
                refresh_token: Some(SecretString::from(refresh_token.to_string())),
                expires_at: self.clock.now() + Duration::seconds(3600),
                token_type: BEARER.to_string(),
                scope: None,
                user_id: Some(1),
            })
        }

        async fn user_info(&self, _access_token: &str) -> Result<UserInfo, Error> {
            unreachable!("not used by the cache")
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 3, 14, 0, 0).unwrap()
    }

    fn record(access: &str, expires_at: DateTime<Utc>, refresh: Option<&str>) -> Record {
        Record {
            access_token: SecretString::from(access.to_string()),
            refresh_token: refresh.map(|r| SecretString::from(r.to_string())),
            expires_at,
            token_type: BEARER.to_string(),
            scope: None,
            user_id: None,
        }
    }

    fn cache(clock: &Arc<ManualClock>) -> Cache<MemoryStorage> {
        Cache::new(MemoryStorage::new()).with_clock(clock.clone())
    }

    #[tokio::test]
    async fn test_no_cached_token() {
        let clock = Arc::new(ManualClock::new(t0()));
        let provider = MockProvider::new(clock.clone());

        let err = cache(&clock).get_valid_token(&provider).await.unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Token(TokenErrorKind::NoCachedToken)
        );
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let clock = Arc::new(ManualClock::new(t0()));
        let provider = MockProvider::new(clock.clone());
        let cache = cache(&clock);
        cache
            .store(record("A", t0() + Duration::seconds(3600), Some("R")))
            .await
            .unwrap();

        clock.set(t0() + Duration::seconds(3600 - 61));
        let token = cache.get_valid_token(&provider).await.unwrap();

        assert_eq!(token.access_token.expose_secret(), "A");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_one_millisecond_past_skew_boundary() {
        let clock = Arc::new(ManualClock::new(t0()));
        let provider = MockProvider::new(clock.clone());
        let cache = cache(&clock);
        let expires_at = t0() + Duration::seconds(3600);
        cache
            .store(record("A", expires_at, Some("R")))
            .await
            .unwrap();

        clock.set(expires_at - Duration::seconds(60) + Duration::milliseconds(1));
        let token = cache.get_valid_token(&provider).await.unwrap();

        assert_eq!(token.access_token.expose_secret(), "A1");
        assert_eq!(provider.calls(), 1);

        // The refreshed record is now cached.
        let again = cache.get_valid_token(&provider).await.unwrap();
        assert_eq!(again.access_token.expose_secret(), "A1");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_exchange_scenario_with_zero_skew() {
        let clock = Arc::new(ManualClock::new(t0()));
        let provider = MockProvider::new(clock.clone());
        let cache = cache(&clock).with_skew(Duration::zero());
        cache
            .store(record("A", t0() + Duration::milliseconds(3_600_000), Some("R")))
            .await
            .unwrap();

        clock.set(t0() + Duration::milliseconds(3_590_000));
        let token = cache.get_valid_token(&provider).await.unwrap();
        assert_eq!(token.access_token.expose_secret(), "A");
        assert_eq!(provider.calls(), 0);

        clock.set(t0() + Duration::milliseconds(3_600_001));
        let token = cache.get_valid_token(&provider).await.unwrap();
        assert_eq!(token.access_token.expose_secret(), "A1");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_cached_record() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut provider = MockProvider::new(clock.clone());
        provider.fail_refresh = true;
        let cache = cache(&clock);
        cache
            .store(record("A", t0() + Duration::seconds(10), Some("R")))
            .await
            .unwrap();

        clock.advance(Duration::hours(1));
        let err = cache.get_valid_token(&provider).await.unwrap_err();

        assert!(err.is_provider_error());
        let stored = cache.current().await.unwrap().unwrap();
        assert_eq!(stored.access_token.expose_secret(), "A");
        assert_eq!(stored.refresh_token.unwrap().expose_secret(), "R");
        assert_eq!(stored.expires_at, t0() + Duration::seconds(10));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let clock = Arc::new(ManualClock::new(t0()));
        let provider = MockProvider::new(clock.clone());
        let cache = cache(&clock);
        cache
            .store(record("A", t0() - Duration::seconds(1), None))
            .await
            .unwrap();

        let err = cache.get_valid_token(&provider).await.unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Token(TokenErrorKind::NoCachedToken)
        );
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_now_forces_refresh_of_valid_token() {
        let clock = Arc::new(ManualClock::new(t0()));
        let provider = MockProvider::new(clock.clone());
        let cache = cache(&clock);
        cache
            .store(record("A", t0() + Duration::hours(6), Some("R")))
            .await
            .unwrap();

        let token = cache.refresh_now(&provider).await.unwrap();
        assert_eq!(token.access_token.expose_secret(), "A1");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_now_without_cached_token() {
        let clock = Arc::new(ManualClock::new(t0()));
        let provider = MockProvider::new(clock.clone());

        let err = cache(&clock).refresh_now(&provider).await.unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Token(TokenErrorKind::NoCachedToken)
        );
    }

    #[tokio::test]
    async fn test_concurrent_expiry_triggers_single_refresh() {
        let clock = Arc::new(ManualClock::new(t0()));
        let mut provider = MockProvider::new(clock.clone());
        provider.delay_ms = 50;
        let provider = Arc::new(provider);
        let cache = Arc::new(cache(&clock));
        cache
            .store(record("A", t0() + Duration::seconds(30), Some("R")))
            .await
            .unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let cache = cache.clone();
                let provider = provider.clone();
                tokio::spawn(async move { cache.get_valid_token(provider.as_ref()).await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.access_token.expose_secret(), "A1");
        }
        assert_eq!(provider.calls(), 1);
    }
}
