use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::Router;
use broker_auth::api_key::ApiKeyAuth;
use broker_auth::oauth::providers::mercado_libre;
use broker_auth::oauth::token::{Cache, FileStorage, MemoryStorage, Storage};
use broker_auth::oauth::{FlowStore, Provider};
use log::*;
use secrecy::SecretString;
use service::config::Config;
use sha2::{Digest, Sha512};
use tokio::net::TcpListener;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::service::SignedCookie;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

mod controller;
mod error;
mod extractors;
mod middleware;
mod router;
mod view;

pub use error::{Error, Result, WebErrorKind};

/// How often expired authorization flows are evicted.
const FLOW_CLEANUP_INTERVAL: StdDuration = StdDuration::from_secs(60);

pub type TokenCache = Cache<Box<dyn Storage>>;

// Needs to implement Clone to be able to be passed into Router as State
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub flows: FlowStore,
    pub token_cache: Arc<TokenCache>,
    pub provider: Arc<dyn Provider>,
    pub api_key_auth: ApiKeyAuth,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn Provider>, storage: Box<dyn Storage>) -> Self {
        let token_cache = Cache::new(storage)
            .with_skew(chrono::Duration::seconds(config.token_expiry_skew_secs));
        let flows = FlowStore::with_ttl(chrono::Duration::seconds(config.flow_ttl_secs));
        let api_key_auth = ApiKeyAuth::new(SecretString::from(config.api_key().to_string()));

        Self {
            config,
            flows,
            token_cache: Arc::new(token_cache),
            provider,
            api_key_auth,
        }
    }

    /// Builds the state the server runs with: the Mercado Libre client and the
    /// storage selected by configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let urls = mercado_libre::Urls {
            auth_url: config.auth_url().to_string(),
            token_url: config.token_url().to_string(),
            api_base_url: config.api_base_url().to_string(),
        };
        let provider = mercado_libre::Provider::new(
            config.client_id(),
            config.client_secret().map(SecretString::from),
            urls,
            StdDuration::from_secs(config.http_timeout_secs),
        )?;

        let storage: Box<dyn Storage> = match config.token_file() {
            Some(path) => {
                info!("Persisting the cached token to {}", path.display());
                Box::new(FileStorage::new(path))
            }
            None => {
                info!("Keeping the cached token in memory only");
                Box::new(MemoryStorage::new())
            }
        };

        Ok(Self::new(config, Arc::new(provider), storage))
    }
}

/// Session cookie layer. The session only carries the key of the caller's
/// authorization flow, so an in-memory store is enough.
pub fn session_layer(config: &Config) -> SessionManagerLayer<MemoryStore, SignedCookie> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.is_production())
        // Lax so the cookie comes back on the provider's top-level redirect to /callback.
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            config.flow_ttl_secs,
        )))
        .with_signed(session_key(config.session_secret()))
}

// Key requires 64 bytes of material, which a SHA-512 digest provides for any secret length.
fn session_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

/// The full application: routes plus the session layer.
pub fn app(app_state: AppState) -> Router {
    let session_layer = session_layer(&app_state.config);
    router::define_routes(app_state).layer(session_layer)
}

pub async fn init_server(app_state: AppState) -> std::io::Result<()> {
    let interface = app_state
        .config
        .interface
        .clone()
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let listen_addr = format!("{}:{}", interface, app_state.config.port);

    info!(
        "Server starting... listening for connections on http://{} ({} environment, redirect URI {})",
        listen_addr,
        app_state.config.runtime_env(),
        app_state.config.redirect_uri()
    );

    spawn_flow_cleanup(app_state.flows.clone());

    let listener = TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app(app_state)).await
}

fn spawn_flow_cleanup(flows: FlowStore) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLOW_CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let evicted = flows.cleanup_expired();
            if evicted > 0 {
                debug!("Evicted {} expired authorization flows", evicted);
            }
        }
    });
}

#[cfg(test)]
pub(crate) mod test_support;
