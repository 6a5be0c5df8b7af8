//! Login Authentication
//!
//! The registry only enforces the LOGIN handshake; deciding whether a
//! player's access key is good is delegated to an [`Authenticator`].
//! Two ship here: JWT access keys issued by an external provider, and a
//! static `player -> key` table for local tournaments.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::protocol::LoginMessage;

/// Decides whether a login may proceed.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok` admits the peer; the error text is sent back otherwise.
    async fn authenticate(&self, login: &LoginMessage) -> Result<(), AuthError>;
}

/// Authentication errors. `Display` is what a rejected peer reads.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No authentication configured on server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
    /// Token subject is another player.
    #[error("token does not belong to player {0}")]
    SubjectMismatch(String),
    /// Player not in the key table.
    #[error("unknown player {0}")]
    UnknownPlayer(String),
    /// Key does not match the table.
    #[error("wrong access key")]
    WrongKey,
    /// Same player and AI already logged in elsewhere.
    #[error("{0} is already connected")]
    AlreadyConnected(String),
}

// =============================================================================
// JWT
// =============================================================================

/// JWT validation settings.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 secret.
    pub secret: Option<String>,
    /// Skip expiry validation (testing only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Check if authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Claims expected in an access key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject; must equal the login's player name.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

/// Validate a JWT and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else {
        Algorithm::HS256
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = if let Some(ref pem) = config.public_key_pem {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else if let Some(ref secret) = config.secret {
        let key = DecodingKey::from_secret(secret.as_bytes());
        decode(token, &key, &validation).map_err(map_jwt_error)?
    } else {
        return Err(AuthError::NotConfigured);
    };

    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // jsonwebtoken applies leeway; enforce the exact expiry too
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

/// Access key is a JWT whose subject is the player name.
#[derive(Clone, Debug)]
pub struct JwtAuthenticator {
    config: AuthConfig,
}

impl JwtAuthenticator {
    /// Create with the given validation settings.
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, login: &LoginMessage) -> Result<(), AuthError> {
        let claims = validate_token(&login.access_key, &self.config)?;
        if claims.sub != login.player_name {
            return Err(AuthError::SubjectMismatch(login.player_name.clone()));
        }
        Ok(())
    }
}

// =============================================================================
// STATIC KEYS
// =============================================================================

/// Fixed table of player access keys.
#[derive(Clone, Debug, Default)]
pub struct StaticKeyAuthenticator {
    keys: HashMap<String, String>,
}

impl StaticKeyAuthenticator {
    /// Create from `(player, key)` pairs.
    pub fn new<I, P, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, K)>,
        P: Into<String>,
        K: Into<String>,
    {
        Self {
            keys: entries.into_iter().map(|(p, k)| (p.into(), k.into())).collect(),
        }
    }

    /// Parse `player=key,player=key`. Entries without `=` are ignored.
    pub fn parse(entries: &str) -> Self {
        Self::new(
            entries.split(',')
                .filter_map(|entry| entry.trim().split_once('='))
                .map(|(p, k)| (p.trim().to_string(), k.trim().to_string()))
                .filter(|(p, k)| !p.is_empty() && !k.is_empty()),
        )
    }

    /// Read `ACCESS_KEYS`.
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("ACCESS_KEYS").unwrap_or_default())
    }

    /// Number of known players.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no player can log in.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticKeyAuthenticator {
    async fn authenticate(&self, login: &LoginMessage) -> Result<(), AuthError> {
        match self.keys.get(&login.player_name) {
            None => Err(AuthError::UnknownPlayer(login.player_name.clone())),
            Some(key) if *key == login.access_key => Ok(()),
            Some(_) => Err(AuthError::WrongKey),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
