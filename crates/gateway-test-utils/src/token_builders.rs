//! Builder patterns for test data construction
//!
//! Provides fluent APIs for creating test tokens and route rules.

use chrono::{Duration, Utc};
use gateway_service::crypto::{sign_token, Claims, SigningKey};
use gateway_service::errors::GatewayError;
use gateway_service::models::RouteRule;

pub const ROLE_USER: u32 = 1;
pub const ROLE_ADMIN: u32 = 2;
pub const ROLE_TECHNICAL: u32 = 4;
pub const ROLE_SUPPORT: u32 = 8;

/// Builder for creating test tokens
///
/// Defaults to a USER access token for `test-user` (id 1) valid for one hour.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_roles(ROLE_ADMIN)
///     .expires_in(-60)
///     .sign(&key)?;
/// ```
pub struct TestTokenBuilder {
    sub: String,
    user_id: Option<i64>,
    role: Option<String>,
    exp: i64,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-user".to_string(),
            user_id: Some(1),
            role: Some(ROLE_USER.to_string()),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Set the subject (username)
    pub fn for_user(mut self, username: &str) -> Self {
        self.sub = username.to_string();
        self
    }

    pub fn with_user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set the role mask
    pub fn with_roles(mut self, mask: u32) -> Self {
        self.role = Some(mask.to_string());
        self
    }

    /// Set a raw role claim, for malformed-claim tests
    pub fn with_raw_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    /// Make this a refresh token: no user id, no role
    pub fn refresh(mut self) -> Self {
        self.user_id = None;
        self.role = None;
        self
    }

    /// Set expiration in seconds from now (negative for already expired)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp (seconds)
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    pub fn build(self) -> Claims {
        Claims {
            sub: self.sub,
            user_id: self.user_id,
            role: self.role,
            iat: self.iat,
            exp: self.exp,
            exp_ms: None,
        }
    }

    /// Build and sign with `key`
    pub fn sign(self, key: &SigningKey) -> Result<String, GatewayError> {
        sign_token(&self.build(), key)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for route rules
///
/// # Example
/// ```rust,ignore
/// let rule = TestRouteBuilder::new("/server/orders")
///     .method("POST")
///     .target(&format!("{}/orders", upstream.uri()))
///     .access_mask(ROLE_USER)
///     .build();
/// ```
pub struct TestRouteBuilder {
    rule: RouteRule,
}

impl TestRouteBuilder {
    /// GET rule for `path`, USER role, no target
    pub fn new(path: &str) -> Self {
        Self {
            rule: RouteRule {
                request_path: path.to_string(),
                method: "GET".to_string(),
                target_url: None,
                service: None,
                description: None,
                access_mask: ROLE_USER,
                permit_all: false,
                request_encrypted: false,
                allow_user_edit: false,
            },
        }
    }

    pub fn method(mut self, method: &str) -> Self {
        self.rule.method = method.to_string();
        self
    }

    pub fn target(mut self, url: &str) -> Self {
        self.rule.target_url = Some(url.to_string());
        self
    }

    pub fn service(mut self, service: &str) -> Self {
        self.rule.service = Some(service.to_string());
        self
    }

    pub fn access_mask(mut self, mask: u32) -> Self {
        self.rule.access_mask = mask;
        self
    }

    pub fn permit_all(mut self) -> Self {
        self.rule.permit_all = true;
        self
    }

    pub fn build(self) -> RouteRule {
        self.rule
    }
}
