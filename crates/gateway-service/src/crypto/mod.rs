//! Token signing and verification.
//!
//! Tokens are compact HS256 JWTs. Access tokens carry `userId` and `role`
//! claims; refresh tokens carry only the subject, so a refresh token can never
//! assert a role. Every token names its signing key in the `kid` header.
//!
//! Claims are only reachable through [`VerifiedToken`], which is produced by a
//! successful [`TokenCodec::verify`].

use crate::config::{
    Config, DEFAULT_ACCESS_TOKEN_TTL_MS, DEFAULT_CLOCK_SKEW_SECONDS, DEFAULT_REFRESH_TOKEN_TTL_MS,
};
use crate::errors::GatewayError;
use crate::models::Principal;
use crate::observability::metrics::{record_token_issuance, record_token_validation};
use crate::services::key_manager::KeyManager;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use ring::rand::{SecureRandom, SystemRandom};
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// Maximum accepted token size. Checked before any decoding.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

/// Minimum signing key length (256 bits).
pub const MIN_KEY_BYTES: usize = 32;

/// Length of generated signing keys (512 bits).
pub const GENERATED_KEY_BYTES: usize = 64;

/// Bearer scheme prefix on the Authorization header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Reasons a token fails validation. All of them leave the request anonymous.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token malformed")]
    Malformed,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token type or algorithm unsupported")]
    Unsupported,
}

impl TokenError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenError::Expired => "expired",
            TokenError::Malformed => "malformed",
            TokenError::BadSignature => "bad_signature",
            TokenError::Unsupported => "unsupported",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm
            | ErrorKind::ImmatureSignature => TokenError::Unsupported,
            _ => TokenError::Malformed,
        }
    }
}

/// HMAC signing key.
///
/// The secret is held in a `SecretBox` and redacted in Debug output.
pub struct SigningKey {
    key_id: String,
    secret: SecretBox<Vec<u8>>,
    created_at_ms: i64,
}

impl SigningKey {
    /// Generate a fresh 512-bit key from the system CSPRNG.
    #[instrument(skip_all)]
    pub fn generate() -> Result<Self, GatewayError> {
        let rng = SystemRandom::new();
        let mut bytes = vec![0u8; GENERATED_KEY_BYTES];
        rng.fill(&mut bytes)
            .map_err(|e| GatewayError::Crypto(format!("Key generation failed: {}", e)))?;

        Ok(Self {
            key_id: format!("key-{}", uuid::Uuid::new_v4().simple()),
            secret: SecretBox::new(Box::new(bytes)),
            created_at_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Rebuild a key from stored parts. Rejects secrets shorter than 256 bits.
    pub fn from_parts(
        key_id: String,
        secret: Vec<u8>,
        created_at_ms: i64,
    ) -> Result<Self, GatewayError> {
        if secret.len() < MIN_KEY_BYTES {
            return Err(GatewayError::Crypto(format!(
                "Signing key too short: {} bytes (minimum {})",
                secret.len(),
                MIN_KEY_BYTES
            )));
        }

        if key_id.is_empty() {
            return Err(GatewayError::Crypto("Signing key id is empty".to_string()));
        }

        Ok(Self {
            key_id,
            secret: SecretBox::new(Box::new(secret)),
            created_at_ms,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    /// Raw secret bytes. Only for signing, verifying and persisting.
    pub fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("secret", &"[REDACTED]")
            .field("created_at_ms", &self.created_at_ms)
            .finish()
    }
}

/// Wire claims. `iat` and `exp` are seconds since epoch; `exp` is rounded up
/// so standard JWT consumers never see a token outlive its real expiry.
/// `expMs` carries the exact expiry in milliseconds and is authoritative
/// when present.
///
/// The `sub` field is redacted in Debug output.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "expMs", default, skip_serializing_if = "Option::is_none")]
    pub exp_ms: Option<i64>,
}

impl Claims {
    /// Expiry in milliseconds since epoch.
    pub fn expires_at_ms(&self) -> i64 {
        self.exp_ms.unwrap_or_else(|| self.exp.saturating_mul(1000))
    }

    pub fn is_refresh(&self) -> bool {
        self.user_id.is_none() && self.role.is_none()
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("sub", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("role", &self.role)
            .field("iat", &self.iat)
            .field("exp", &self.exp)
            .field("exp_ms", &self.exp_ms)
            .finish()
    }
}

/// A token whose signature, expiry and shape have been checked.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    claims: Claims,
    key_id: String,
}

impl VerifiedToken {
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Id of the key that verified the signature.
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn issued_at_ms(&self) -> i64 {
        self.claims.iat.saturating_mul(1000)
    }

    pub fn expires_at_ms(&self) -> i64 {
        self.claims.expires_at_ms()
    }

    /// Principal carried by an access token.
    pub fn principal(&self) -> Result<Principal, TokenError> {
        let (Some(user_id), Some(role)) = (self.claims.user_id, self.claims.role.as_deref())
        else {
            return Err(TokenError::Unsupported);
        };

        let role_mask: u32 = role.trim().parse().map_err(|_| TokenError::Malformed)?;

        Ok(Principal {
            user_id,
            username: self.claims.sub.clone(),
            role_mask,
        })
    }
}

/// Sign claims with the given key, naming it in the `kid` header.
#[instrument(skip_all)]
pub fn sign_token(claims: &Claims, key: &SigningKey) -> Result<String, GatewayError> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".to_string());
    header.kid = Some(key.key_id().to_string());

    encode(
        &header,
        claims,
        &EncodingKey::from_secret(key.secret_bytes()),
    )
    .map_err(|e| GatewayError::Crypto(format!("Token signing failed: {}", e)))
}

/// Header fields read before verification. Only used for key lookup and
/// rejecting foreign algorithms early.
struct UnverifiedHeader {
    alg: Option<String>,
    kid: Option<String>,
}

fn read_header(token: &str) -> Result<UnverifiedHeader, TokenError> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| TokenError::Malformed)?;
    let header: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;

    Ok(UnverifiedHeader {
        alg: header.get("alg").and_then(|v| v.as_str()).map(str::to_string),
        kid: header.get("kid").and_then(|v| v.as_str()).map(str::to_string),
    })
}

/// Verify a token against a single key.
///
/// Checks size, algorithm, signature, expiry (strictly after the millisecond
/// expiry is expired, no leeway) and rejects `iat` more than
/// `clock_skew_seconds` in the future.
#[instrument(skip_all)]
pub fn verify_token(
    token: &str,
    key: &SigningKey,
    clock_skew_seconds: i64,
) -> Result<Claims, TokenError> {
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "gw.crypto",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(TokenError::Malformed);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.set_required_spec_claims(&["exp", "sub"]);

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(key.secret_bytes()),
        &validation,
    )?;

    let now_ms = chrono::Utc::now().timestamp_millis();
    if now_ms > data.claims.expires_at_ms() {
        return Err(TokenError::Expired);
    }

    let now = now_ms / 1000;
    if data.claims.iat > now.saturating_add(clock_skew_seconds) {
        tracing::debug!(
            target: "gw.crypto",
            iat = data.claims.iat,
            now = now,
            clock_skew_seconds = clock_skew_seconds,
            "Token rejected: iat too far in the future"
        );
        return Err(TokenError::Malformed);
    }

    if data.claims.exp <= data.claims.iat {
        return Err(TokenError::Malformed);
    }

    Ok(data.claims)
}

/// Strip the `Bearer ` scheme from an Authorization header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Token lifetimes and validation tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access_ttl_ms: u64,
    pub refresh_ttl_ms: u64,
    pub clock_skew_seconds: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_ttl_ms: DEFAULT_ACCESS_TOKEN_TTL_MS,
            refresh_ttl_ms: DEFAULT_REFRESH_TOKEN_TTL_MS,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
        }
    }
}

impl From<&Config> for TokenLifetimes {
    fn from(config: &Config) -> Self {
        Self {
            access_ttl_ms: config.access_token_ttl_ms,
            refresh_ttl_ms: config.refresh_token_ttl_ms,
            clock_skew_seconds: config.jwt_clock_skew_seconds,
        }
    }
}

/// Issues and validates tokens using the keys held by a [`KeyManager`].
#[derive(Clone)]
pub struct TokenCodec {
    keys: Arc<KeyManager>,
    lifetimes: TokenLifetimes,
}

impl TokenCodec {
    pub fn new(keys: Arc<KeyManager>, lifetimes: TokenLifetimes) -> Self {
        Self { keys, lifetimes }
    }

    /// Issue an access token for an authenticated user.
    #[instrument(skip_all)]
    pub fn issue_access_token(
        &self,
        user_id: i64,
        username: &str,
        role_mask: u32,
    ) -> Result<String, GatewayError> {
        let claims = self.claims_for(
            username,
            Some(user_id),
            Some(role_mask.to_string()),
            self.lifetimes.access_ttl_ms,
        );
        let result = sign_token(&claims, &self.keys.active_key());
        record_token_issuance("access", if result.is_ok() { "success" } else { "error" });
        result
    }

    /// Issue a refresh token. It carries no role.
    #[instrument(skip_all)]
    pub fn issue_refresh_token(&self, username: &str) -> Result<String, GatewayError> {
        let claims = self.claims_for(username, None, None, self.lifetimes.refresh_ttl_ms);
        let result = sign_token(&claims, &self.keys.active_key());
        record_token_issuance("refresh", if result.is_ok() { "success" } else { "error" });
        result
    }

    fn claims_for(
        &self,
        username: &str,
        user_id: Option<i64>,
        role: Option<String>,
        ttl_ms: u64,
    ) -> Claims {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl_ms).unwrap_or(i64::MAX);
        let exp_ms = now_ms.saturating_add(ttl_ms);
        Claims {
            sub: username.to_string(),
            user_id,
            role,
            iat: now_ms.div_euclid(1000),
            exp: exp_ms.saturating_add(999).div_euclid(1000),
            exp_ms: Some(exp_ms),
        }
    }

    /// Verify a token against the active key and then the previous one.
    ///
    /// The key named by `kid` is tried first. Only a signature mismatch moves
    /// on to the other generation; any other failure is final.
    #[instrument(skip_all)]
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            return Err(TokenError::Malformed);
        }

        let header = read_header(token)?;
        if header.alg.as_deref() != Some("HS256") {
            return Err(TokenError::Unsupported);
        }

        let ring = self.keys.key_ring();
        let mut candidates: Vec<&Arc<SigningKey>> =
            std::iter::once(&ring.active).chain(ring.previous.iter()).collect();
        if let Some(kid) = header.kid.as_deref() {
            candidates.sort_by_key(|k| k.key_id() != kid);
        }

        let mut last_err = TokenError::BadSignature;
        for key in candidates {
            match verify_token(token, key, self.lifetimes.clock_skew_seconds) {
                Ok(claims) => {
                    return Ok(VerifiedToken {
                        claims,
                        key_id: key.key_id().to_string(),
                    })
                }
                Err(TokenError::BadSignature) => last_err = TokenError::BadSignature,
                Err(e) => return Err(e),
            }
        }

        Err(last_err)
    }

    /// Validate an access token and return its principal.
    #[instrument(skip_all)]
    pub fn validate(&self, token: &str) -> Result<Principal, TokenError> {
        let result = self.verify(token).and_then(|verified| verified.principal());
        match &result {
            Ok(_) => record_token_validation("success", None),
            Err(e) => record_token_validation("error", Some(e.as_str())),
        }
        result
    }

    /// Validate a refresh token and return its subject.
    #[instrument(skip_all)]
    pub fn validate_refresh(&self, token: &str) -> Result<String, TokenError> {
        let result = self.verify(token).and_then(|verified| {
            if verified.claims().is_refresh() {
                Ok(verified.claims().sub.clone())
            } else {
                Err(TokenError::Unsupported)
            }
        });
        match &result {
            Ok(_) => record_token_validation("success", None),
            Err(e) => record_token_validation("error", Some(e.as_str())),
        }
        result
    }
}
