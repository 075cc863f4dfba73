use crate::extractors::RejectionType;
use crate::Error;
use axum::{extract::FromRequestParts, http::request::Parts};
use broker_auth::oauth::generate_state;
use log::*;
use tower_sessions::Session;

/// Session key under which the browser's flow key is kept.
const FLOW_KEY: &str = "oauth.flow_key";

/// The caller's session, used only to find its authorization flow.
///
/// The session holds a random flow key; the verifier and CSRF state stay
/// server-side in the flow store under that key.
pub(crate) struct FlowSession(Session);

impl<S> FromRequestParts<S> for FlowSession
where
    S: Send + Sync,
{
    type Rejection = RejectionType;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(status, msg)| (status, msg.to_string()))?;
        Ok(FlowSession(session))
    }
}

impl FlowSession {
    /// The flow key for this session, if one was ever issued.
    pub(crate) async fn key(&self) -> Result<Option<String>, Error> {
        Ok(self.0.get::<String>(FLOW_KEY).await?)
    }

    /// The flow key for this session, issuing a new one when absent.
    pub(crate) async fn ensure_key(&self) -> Result<String, Error> {
        if let Some(key) = self.key().await? {
            return Ok(key);
        }

        let key = generate_state();
        self.0.insert(FLOW_KEY, &key).await?;
        trace!("Issued a new flow key for this session");
        Ok(key)
    }
}
