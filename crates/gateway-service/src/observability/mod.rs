//! Observability for the gateway.
//!
//! # Privacy by Default
//!
//! All instrumentation uses `#[instrument(skip_all)]` and explicit safe field
//! allow-listing. Fields are categorized as:
//! - **SAFE**: Can be logged in plaintext (methods, outcomes, route paths)
//! - **HASHED**: Must be SHA-256 hashed for correlation (usernames)
//! - **NEVER**: Must never appear in logs (tokens, key material)

pub mod metrics;

use crate::errors::GatewayError;
use crate::models::Principal;
use sha2::{Digest, Sha256};

/// Hash a field value for correlation in logs (SHA-256, first 8 hex chars)
///
/// This is a one-way hash for correlation only, not protection for secrets.
pub fn hash_for_correlation(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    hex::encode(result.get(..4).unwrap_or_default())
}

/// Kinds of request-level events reported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Request rejected by the pipeline.
    Denied,
    /// Request forwarded to an upstream target.
    Forwarded,
    /// Upstream forward failed.
    ForwardFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Denied => "denied",
            EventKind::Forwarded => "forwarded",
            EventKind::ForwardFailed => "forward_failed",
        }
    }
}

/// Report a gateway event. Fire and forget: never fails the request.
///
/// The principal is logged as a correlation hash, or `anonymous`.
pub fn record_gateway_event(
    kind: EventKind,
    method: &str,
    path: &str,
    principal: Option<&Principal>,
    outcome: &str,
) {
    let principal_label = principal
        .map(|p| hash_for_correlation(&p.username))
        .unwrap_or_else(|| "anonymous".to_string());

    match kind {
        EventKind::Denied | EventKind::ForwardFailed => tracing::warn!(
            target: "gw.audit",
            event = kind.as_str(),
            method = %method,
            path = %path,
            principal = %principal_label,
            outcome = %outcome,
            "Gateway event"
        ),
        EventKind::Forwarded => tracing::info!(
            target: "gw.audit",
            event = kind.as_str(),
            method = %method,
            path = %path,
            principal = %principal_label,
            outcome = %outcome,
            "Gateway event"
        ),
    }

    self::metrics::record_gateway_decision(outcome);
}

/// Error categories for metrics labels (bounded cardinality)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid credentials
    Authentication,
    /// Role mask does not intersect the route
    Authorization,
    /// Bad admin input or unknown resource
    Client,
    /// Upstream unreachable or slow
    Upstream,
    /// Database, key persistence, crypto
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Client => "client",
            ErrorCategory::Upstream => "upstream",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<&GatewayError> for ErrorCategory {
    fn from(err: &GatewayError) -> Self {
        match err {
            GatewayError::Unauthenticated => ErrorCategory::Authentication,
            GatewayError::PermissionDenied { .. } => ErrorCategory::Authorization,
            GatewayError::Validation(_)
            | GatewayError::NotFound(_)
            | GatewayError::PayloadTooLarge { .. } => ErrorCategory::Client,
            GatewayError::ForwardTimeout(_) | GatewayError::ForwardUnreachable(_) => {
                ErrorCategory::Upstream
            }
            GatewayError::Database(_)
            | GatewayError::Crypto(_)
            | GatewayError::KeyPersistence(_)
            | GatewayError::Internal => ErrorCategory::Internal,
        }
    }
}
