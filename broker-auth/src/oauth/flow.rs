//! In-flight authorization flows keyed by browser session.
//!
//! A flow is created at login and consumed exactly once by the callback. The
//! remove-then-compare in [`FlowStore::complete_flow`] is a single atomic
//! operation on the map, so two racing callbacks cannot both obtain a verifier.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::pkce::{generate_state, PkceChallenge, PkcePair, PkceVerifier};
use crate::error::{flow_error, Error, FlowErrorKind};

/// Verifier and anti-CSRF state for one authorization attempt.
#[derive(Debug, Clone)]
pub struct FlowState {
    pub verifier: PkceVerifier,
    pub csrf_state: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FlowState {
    /// The challenge sent to the provider, always derived from the verifier.
    pub fn challenge(&self) -> PkceChallenge {
        self.verifier.challenge()
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Store of in-flight flows, one per session key, with expiration.
#[derive(Clone)]
pub struct FlowStore {
    flows: Arc<DashMap<String, FlowState>>,
    ttl: Duration,
}

impl FlowStore {
    /// Create a new flow store with default TTL of 10 minutes.
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(10))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            flows: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Start a new flow for `session_key`, replacing any flow already in flight for it.
    pub fn begin_flow(&self, session_key: &str) -> FlowState {
        let pair = PkcePair::generate();
        let created_at = Utc::now();
        let flow = FlowState {
            verifier: pair.verifier,
            csrf_state: generate_state(),
            created_at,
            expires_at: created_at + self.ttl,
        };

        if self
            .flows
            .insert(session_key.to_string(), flow.clone())
            .is_some()
        {
            debug!("Replaced an unfinished authorization flow for this session");
        }

        flow
    }

    /// Consume the flow for `session_key` and return its verifier.
    ///
    /// The flow is removed whatever the outcome.
    pub fn complete_flow(
        &self,
        session_key: &str,
        received_state: &str,
    ) -> Result<PkceVerifier, Error> {
        let (_, flow) = self.flows.remove(session_key).ok_or_else(|| {
            flow_error(
                FlowErrorKind::NoActiveFlow,
                "No authorization flow in flight for this session",
            )
        })?;

        if flow.is_expired(Utc::now()) {
            return Err(flow_error(
                FlowErrorKind::NoActiveFlow,
                "Authorization flow expired",
            ));
        }

        let matches: bool = flow
            .csrf_state
            .as_bytes()
            .ct_eq(received_state.as_bytes())
            .into();
        if !matches {
            warn!("OAuth callback state does not match the state issued at login");
            return Err(flow_error(
                FlowErrorKind::CsrfMismatch,
                "State parameter mismatch",
            ));
        }

        Ok(flow.verifier)
    }

    /// Evict expired flows. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.flows.len();
        self.flows.retain(|_, flow| !flow.is_expired(now));
        before.saturating_sub(self.flows.len())
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

impl Default for FlowStore {
    fn default() -> Self {
        Self::new()
    }
}
