//! PKCE (Proof Key for Code Exchange) support for OAuth 2.0.
//!
//! Implements the S256 method of RFC 7636 for the authorization code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Method tag sent as `code_challenge_method`.
pub const CHALLENGE_METHOD: &str = "S256";

/// PKCE code verifier (random string).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    /// Generate a new random PKCE verifier.
    ///
    /// 32 random bytes, base64url-encoded without padding (43 characters).
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        Self(URL_SAFE_NO_PAD.encode(random_bytes))
    }

    /// Create a PKCE verifier from an existing string.
    pub fn from_string(verifier: String) -> Self {
        Self(verifier)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Generate the corresponding code challenge.
    pub fn challenge(&self) -> PkceChallenge {
        PkceChallenge::from_verifier(self)
    }
}

/// PKCE code challenge (SHA256 hash of verifier).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceChallenge(String);

impl PkceChallenge {
    /// `BASE64URL(SHA256(verifier))`, hashing the verifier's string bytes.
    pub fn from_verifier(verifier: &PkceVerifier) -> Self {
        let hash = Sha256::digest(verifier.as_str().as_bytes());
        Self(URL_SAFE_NO_PAD.encode(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn method(&self) -> &'static str {
        CHALLENGE_METHOD
    }
}

/// A verifier together with the challenge derived from it.
#[derive(Debug, Clone)]
pub struct PkcePair {
    pub verifier: PkceVerifier,
    pub challenge: PkceChallenge,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier = PkceVerifier::generate();
        let challenge = verifier.challenge();
        Self {
            verifier,
            challenge,
        }
    }
}

/// Generate a cryptographically random anti-CSRF state token (64 hex characters).
pub fn generate_state() -> String {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(random_bytes)
}
