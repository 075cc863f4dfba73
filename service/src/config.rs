use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::LevelFilter;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default Mercado Libre authorization endpoint used when `AUTH_URL` is not set.
pub const DEFAULT_AUTH_URL: &str = "https://auth.mercadolibre.com.ar/authorization";
/// Default Mercado Libre token endpoint used when `TOKEN_URL` is not set.
pub const DEFAULT_TOKEN_URL: &str = "https://api.mercadolibre.com/oauth/token";
/// Default Mercado Libre API base URL used when `API_BASE_URL` is not set.
pub const DEFAULT_API_BASE_URL: &str = "https://api.mercadolibre.com";
/// Smallest accepted `TOKEN_EXPIRY_SKEW_SECS`.
pub const MIN_TOKEN_EXPIRY_SKEW_SECS: i64 = 60;
/// Callback URL registered for the deployed application.
pub const DEFAULT_PRODUCTION_REDIRECT_URI: &str = "https://justo-scraper.onrender.com/callback";

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The application (client) ID registered with the OAuth provider.
    #[arg(long, env, default_value = "")]
    client_id: String,

    /// The application secret. Only sent when the provider treats the
    /// application as a confidential client.
    #[arg(long, env)]
    client_secret: Option<String>,

    /// Explicit OAuth redirect URI. When unset, it is chosen from the runtime
    /// environment: `production_redirect_uri` in production, the local
    /// listener otherwise.
    #[arg(long, env)]
    redirect_uri: Option<String>,

    /// The redirect URI registered for the deployed application.
    #[arg(long, env, default_value = DEFAULT_PRODUCTION_REDIRECT_URI)]
    production_redirect_uri: String,

    /// The provider's authorization endpoint the browser is sent to at login.
    #[arg(long, env, default_value = DEFAULT_AUTH_URL)]
    auth_url: String,

    /// The provider's token endpoint.
    #[arg(long, env, default_value = DEFAULT_TOKEN_URL)]
    token_url: String,

    /// The provider's API base URL (used for `/users/me`).
    #[arg(long, env, default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// The key consumers must send in the `x-api-key` header to read the token.
    #[arg(long, env, default_value = "")]
    api_key: String,

    /// Secret used to sign the session cookie.
    #[arg(long, env, default_value = "")]
    session_secret: String,

    /// Persist the cached token to this JSON file. Kept in memory when unset.
    #[arg(long, env)]
    token_file: Option<PathBuf>,

    /// Seconds before expiry at which the cached access token is refreshed.
    /// Must be at least 60.
    #[arg(
        long,
        env,
        default_value_t = 60,
        value_parser = clap::value_parser!(i64).range(MIN_TOKEN_EXPIRY_SKEW_SECS..)
    )]
    pub token_expiry_skew_secs: i64,

    /// Seconds an authorization flow started at /login stays valid.
    #[arg(long, env, default_value_t = 600, value_parser = clap::value_parser!(i64).range(1..))]
    pub flow_ttl_secs: i64,

    /// Timeout in seconds for every outbound call to the provider.
    #[arg(long, env, default_value_t = 10)]
    pub http_timeout_secs: u64,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 3000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns the client secret, if configured and non-empty.
    pub fn client_secret(&self) -> Option<String> {
        self.client_secret.clone().filter(|s| !s.is_empty())
    }

    /// The redirect URI sent in the authorization request and the code exchange.
    pub fn redirect_uri(&self) -> String {
        match self.redirect_uri.as_ref().filter(|uri| !uri.is_empty()) {
            Some(uri) => uri.clone(),
            None if self.is_production() => self.production_redirect_uri.clone(),
            None => format!("http://localhost:{}/callback", self.port),
        }
    }

    pub fn set_redirect_uri(mut self, redirect_uri: String) -> Self {
        self.redirect_uri = Some(redirect_uri);
        self
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn session_secret(&self) -> &str {
        &self.session_secret
    }

    pub fn token_file(&self) -> Option<PathBuf> {
        self.token_file.clone()
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }

    /// Lists the required settings that are missing. Empty when the server can start.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_empty() {
            missing.push("CLIENT_ID");
        }
        if self.api_key.is_empty() {
            missing.push("API_KEY");
        }
        if self.session_secret.is_empty() {
            missing.push("SESSION_SECRET");
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["token_broker"];
        argv.extend_from_slice(args);
        Config::parse_from(argv)
    }

    #[test]
    fn test_runtime_env_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("prod".parse::<RustEnv>(), Err(RustEnvParseError));
    }

    #[test]
    fn test_local_redirect_uri_follows_port() {
        let config = parse(&["--port", "4100", "--runtime-env", "development"]);
        assert_eq!(config.redirect_uri(), "http://localhost:4100/callback");
    }

    #[test]
    fn test_production_redirect_uri() {
        let config = parse(&["--runtime-env", "production"]);
        assert!(config.is_production());
        assert_eq!(config.redirect_uri(), DEFAULT_PRODUCTION_REDIRECT_URI);
    }

    #[test]
    fn test_explicit_redirect_uri_wins() {
        let config = parse(&["--runtime-env", "production"])
            .set_redirect_uri("https://broker.example.com/callback".to_string());
        assert_eq!(config.redirect_uri(), "https://broker.example.com/callback");
    }

    #[test]
    fn test_empty_client_secret_is_treated_as_absent() {
        let config = parse(&["--client-secret", ""]);
        assert_eq!(config.client_secret(), None);
        let config = parse(&["--client-secret", "s3cret"]);
        assert_eq!(config.client_secret().as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_missing_settings() {
        let config = parse(&[
            "--client-id",
            "",
            "--api-key",
            "",
            "--session-secret",
            "",
        ]);
        assert_eq!(
            config.missing_settings(),
            vec!["CLIENT_ID", "API_KEY", "SESSION_SECRET"]
        );

        let config = parse(&[
            "--client-id",
            "app-123",
            "--api-key",
            "k",
            "--session-secret",
            "s",
        ]);
        assert!(config.missing_settings().is_empty());
    }

    #[test]
    fn test_expiry_skew_below_minimum_is_rejected() {
        for skew in ["0", "59", "-5"] {
            let result = Config::try_parse_from([
                "token_broker",
                "--token-expiry-skew-secs",
                skew,
            ]);
            assert!(result.is_err(), "skew {skew} should be rejected");
        }

        let config = parse(&["--token-expiry-skew-secs", "60"]);
        assert_eq!(config.token_expiry_skew_secs, MIN_TOKEN_EXPIRY_SKEW_SECS);
    }

    #[test]
    fn test_flow_ttl_must_be_positive() {
        for ttl in ["0", "-600"] {
            let result = Config::try_parse_from(["token_broker", "--flow-ttl-secs", ttl]);
            assert!(result.is_err(), "flow ttl {ttl} should be rejected");
        }
        assert_eq!(parse(&["--flow-ttl-secs", "1"]).flow_ttl_secs, 1);
    }
}
