//! Gateway configuration.
//!
//! Configuration is loaded from environment variables. Every variable has a
//! default, so an empty environment yields a runnable in-memory gateway with an
//! ephemeral signing key. The database URL is redacted in Debug output.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default access token lifetime (15 minutes).
pub const DEFAULT_ACCESS_TOKEN_TTL_MS: u64 = 15 * 60 * 1000;

/// Shortest accepted token lifetime. Below one second the whole-second `exp`
/// claim cannot sit after `iat`.
pub const MIN_TOKEN_TTL_MS: u64 = 1000;

/// Default refresh token lifetime (1 day).
pub const DEFAULT_REFRESH_TOKEN_TTL_MS: u64 = 24 * 60 * 60 * 1000;

/// Default signing key rotation interval (1 day).
pub const DEFAULT_KEY_ROTATION_INTERVAL_SECONDS: u64 = 24 * 60 * 60;

/// Default tolerance for `iat` values in the future.
pub const DEFAULT_CLOCK_SKEW_SECONDS: i64 = 300;

/// Upper bound for the `iat` future tolerance.
pub const MAX_CLOCK_SKEW_SECONDS: i64 = 600;

/// Default upstream forwarding timeout.
pub const DEFAULT_FORWARD_TIMEOUT_SECONDS: u64 = 30;

pub const DEFAULT_PUBLIC_API_PREFIX: &str = "/api/";
pub const DEFAULT_INTERNAL_API_PREFIX: &str = "/server/";

/// Security response headers. An empty value means the header is not sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeadersConfig {
    pub content_security_policy: String,
    pub strict_transport_security: String,
    pub x_frame_options: String,
    pub x_content_type_options: String,
    pub x_xss_protection: String,
    pub referrer_policy: String,
    pub cache_control: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            content_security_policy: "default-src 'self'".to_string(),
            strict_transport_security: "max-age=31536000; includeSubDomains".to_string(),
            x_frame_options: "DENY".to_string(),
            x_content_type_options: "nosniff".to_string(),
            x_xss_protection: "1; mode=block".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
            cache_control: "no-cache, no-store, must-revalidate".to_string(),
        }
    }
}

/// CORS response settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allowed_methods: split_list("GET,POST,PUT,DELETE,OPTIONS"),
            allowed_headers: split_list("Authorization,Content-Type"),
            allow_credentials: false,
        }
    }
}

/// Gateway configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// PostgreSQL connection URL. When unset, routes live in memory.
    pub database_url: Option<String>,

    /// JSON file of route rules seeded at startup.
    pub routes_file: Option<PathBuf>,

    /// Signing key file. When unset, keys are ephemeral.
    pub jwt_key_path: Option<PathBuf>,

    pub access_token_ttl_ms: u64,
    pub refresh_token_ttl_ms: u64,

    /// Interval between signing key rotations. Always longer than the
    /// access token lifetime, so the one-generation grace window covers
    /// every live access token.
    pub key_rotation_interval_seconds: u64,

    /// Tolerance for tokens whose `iat` lies in the future.
    pub jwt_clock_skew_seconds: i64,

    pub public_api_prefix: String,
    pub internal_api_prefix: String,

    /// Path prefixes where anonymous requests are rejected even without a rule.
    pub protected_prefixes: Vec<String>,

    /// Extra exact paths treated as public.
    pub public_paths: Vec<String>,

    pub forward_timeout_seconds: u64,

    pub cors: CorsConfig,
    pub security_headers: SecurityHeadersConfig,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("routes_file", &self.routes_file)
            .field("jwt_key_path", &self.jwt_key_path)
            .field("access_token_ttl_ms", &self.access_token_ttl_ms)
            .field("refresh_token_ttl_ms", &self.refresh_token_ttl_ms)
            .field(
                "key_rotation_interval_seconds",
                &self.key_rotation_interval_seconds,
            )
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("public_api_prefix", &self.public_api_prefix)
            .field("internal_api_prefix", &self.internal_api_prefix)
            .field("protected_prefixes", &self.protected_prefixes)
            .field("public_paths", &self.public_paths)
            .field("forward_timeout_seconds", &self.forward_timeout_seconds)
            .field("cors", &self.cors)
            .field("security_headers", &self.security_headers)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid key rotation configuration: {0}")]
    InvalidKeyRotation(String),

    #[error("Invalid API prefix configuration: {0}")]
    InvalidPrefix(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let database_url = non_empty(vars, "DATABASE_URL");
        let routes_file = non_empty(vars, "ROUTES_FILE").map(PathBuf::from);
        let jwt_key_path = non_empty(vars, "JWT_KEY_PATH").map(PathBuf::from);

        let access_token_ttl_ms =
            parse_ttl_ms(vars, "JWT_ACCESS_TOKEN_TTL_MS", DEFAULT_ACCESS_TOKEN_TTL_MS)?;
        let refresh_token_ttl_ms =
            parse_ttl_ms(vars, "JWT_REFRESH_TOKEN_TTL_MS", DEFAULT_REFRESH_TOKEN_TTL_MS)?;
        let key_rotation_interval_seconds = parse_positive(
            vars,
            "JWT_KEY_ROTATION_INTERVAL_SECONDS",
            DEFAULT_KEY_ROTATION_INTERVAL_SECONDS,
        )?;

        if key_rotation_interval_seconds.saturating_mul(1000) <= access_token_ttl_ms {
            return Err(ConfigError::InvalidKeyRotation(format!(
                "JWT_KEY_ROTATION_INTERVAL_SECONDS ({}s) must exceed the access token lifetime ({}ms)",
                key_rotation_interval_seconds, access_token_ttl_ms
            )));
        }

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value < 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not be negative, got {}",
                    value
                )));
            }

            if value > MAX_CLOCK_SKEW_SECONDS {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW_SECONDS, value
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW_SECONDS
        };

        let public_api_prefix = parse_prefix(vars, "PUBLIC_API_PREFIX", DEFAULT_PUBLIC_API_PREFIX)?;
        let internal_api_prefix =
            parse_prefix(vars, "INTERNAL_API_PREFIX", DEFAULT_INTERNAL_API_PREFIX)?;

        let protected_prefixes = vars
            .get("PROTECTED_PREFIXES")
            .map(|v| split_list(v))
            .unwrap_or_else(|| vec![internal_api_prefix.clone()]);

        let public_paths = vars
            .get("PUBLIC_PATHS")
            .map(|v| split_list(v))
            .unwrap_or_default();

        let forward_timeout_seconds = parse_positive(
            vars,
            "FORWARD_TIMEOUT_SECONDS",
            DEFAULT_FORWARD_TIMEOUT_SECONDS,
        )?;

        let cors_defaults = CorsConfig::default();
        let cors = CorsConfig {
            allowed_origins: vars
                .get("CORS_ALLOWED_ORIGINS")
                .map(|v| split_list(v))
                .unwrap_or(cors_defaults.allowed_origins),
            allowed_methods: vars
                .get("CORS_ALLOWED_METHODS")
                .map(|v| split_list(v))
                .unwrap_or(cors_defaults.allowed_methods),
            allowed_headers: vars
                .get("CORS_ALLOWED_HEADERS")
                .map(|v| split_list(v))
                .unwrap_or(cors_defaults.allowed_headers),
            allow_credentials: parse_bool(
                vars,
                "CORS_ALLOW_CREDENTIALS",
                cors_defaults.allow_credentials,
            )?,
        };

        let header_defaults = SecurityHeadersConfig::default();
        let header = |name: &str, default: String| vars.get(name).cloned().unwrap_or(default);
        let security_headers = SecurityHeadersConfig {
            content_security_policy: header(
                "SECURITY_HEADER_CONTENT_SECURITY_POLICY",
                header_defaults.content_security_policy,
            ),
            strict_transport_security: header(
                "SECURITY_HEADER_STRICT_TRANSPORT_SECURITY",
                header_defaults.strict_transport_security,
            ),
            x_frame_options: header(
                "SECURITY_HEADER_X_FRAME_OPTIONS",
                header_defaults.x_frame_options,
            ),
            x_content_type_options: header(
                "SECURITY_HEADER_X_CONTENT_TYPE_OPTIONS",
                header_defaults.x_content_type_options,
            ),
            x_xss_protection: header(
                "SECURITY_HEADER_X_XSS_PROTECTION",
                header_defaults.x_xss_protection,
            ),
            referrer_policy: header(
                "SECURITY_HEADER_REFERRER_POLICY",
                header_defaults.referrer_policy,
            ),
            cache_control: header(
                "SECURITY_HEADER_CACHE_CONTROL",
                header_defaults.cache_control,
            ),
        };

        Ok(Config {
            bind_address,
            database_url,
            routes_file,
            jwt_key_path,
            access_token_ttl_ms,
            refresh_token_ttl_ms,
            key_rotation_interval_seconds,
            jwt_clock_skew_seconds,
            public_api_prefix,
            internal_api_prefix,
            protected_prefixes,
            public_paths,
            forward_timeout_seconds,
            cors,
            security_headers,
        })
    }
}

fn non_empty(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid positive integer, got '{}': {}", value_str, e),
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(value)
}

fn parse_ttl_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = parse_positive(vars, name, default)?;
    if value < MIN_TOKEN_TTL_MS {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be at least {}ms, got {}", MIN_TOKEN_TTL_MS, value),
        });
    }
    Ok(value)
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("expected true or false, got '{}'", v),
        }),
    }
}

fn parse_prefix(
    vars: &HashMap<String, String>,
    name: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = vars
        .get(name)
        .cloned()
        .unwrap_or_else(|| default.to_string());

    if !value.starts_with('/') || !value.ends_with('/') || value.len() < 2 {
        return Err(ConfigError::InvalidPrefix(format!(
            "{} must start and end with '/', got '{}'",
            name, value
        )));
    }

    Ok(value)
}

/// Splits a comma separated list, dropping blank entries.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
