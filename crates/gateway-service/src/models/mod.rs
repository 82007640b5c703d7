use serde::{Deserialize, Serialize};
use std::fmt;

/// Role bits. Membership is `(mask & role.bit()) != 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
    Technical,
    Support,
}

impl Role {
    /// All roles in declaration order.
    pub const ALL: [Role; 4] = [Role::User, Role::Admin, Role::Technical, Role::Support];

    /// Union of every defined role bit.
    pub const ALL_BITS: u32 = 1 | 2 | 4 | 8;

    pub fn bit(&self) -> u32 {
        match self {
            Role::User => 1,
            Role::Admin => 2,
            Role::Technical => 4,
            Role::Support => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
            Role::Technical => "TECHNICAL",
            Role::Support => "SUPPORT",
        }
    }

    pub fn is_present_in(&self, mask: u32) -> bool {
        (mask & self.bit()) != 0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity reconstructed from a validated access token. Never persisted.
///
/// The username is redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub role_mask: u32,
}

impl Principal {
    pub fn has_role(&self, role: Role) -> bool {
        role.is_present_in(self.role_mask)
    }
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("user_id", &self.user_id)
            .field("username", &"[REDACTED]")
            .field("role_mask", &self.role_mask)
            .finish()
    }
}

/// A forwarding rule keyed by `(request_path, method)`.
///
/// `request_encrypted` and `allow_user_edit` are carried for the services
/// behind the gateway; the gateway itself does not act on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    pub request_path: String,
    pub method: String,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub access_mask: u32,
    #[serde(default)]
    pub permit_all: bool,
    #[serde(default)]
    pub request_encrypted: bool,
    #[serde(default)]
    pub allow_user_edit: bool,
}

impl RouteRule {
    /// Store key for this rule: path verbatim, method trimmed and uppercased.
    pub fn key(&self) -> (String, String) {
        (self.request_path.clone(), self.method.trim().to_ascii_uppercase())
    }
}

/// Query parameters for the route admin endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RouteQuery {
    pub path: Option<String>,
    pub method: Option<String>,
}

/// Response body for `POST /server/admin/keys/rotate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateKeyResponse {
    pub key_id: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_bits() {
        assert_eq!(Role::User.bit(), 1);
        assert_eq!(Role::Admin.bit(), 2);
        assert_eq!(Role::Technical.bit(), 4);
        assert_eq!(Role::Support.bit(), 8);
        assert_eq!(Role::ALL_BITS, 15);
    }

    #[test]
    fn test_role_membership() {
        assert!(Role::Admin.is_present_in(6));
        assert!(Role::Technical.is_present_in(6));
        assert!(!Role::User.is_present_in(6));
        assert!(!Role::Support.is_present_in(0));
    }

    #[test]
    fn test_principal_debug_redacts_username() {
        let principal = Principal {
            user_id: 7,
            username: "alice@example.com".to_string(),
            role_mask: 1,
        };
        let debug = format!("{:?}", principal);
        assert!(!debug.contains("alice"));
        assert!(debug.contains("user_id: 7"));
    }

    #[test]
    fn test_route_rule_deserializes_camel_case() {
        let rule: RouteRule = serde_json::from_str(
            r#"{
                "requestPath": "/server/orders",
                "method": "get",
                "targetUrl": "http://orders:8080/orders",
                "accessMask": 3
            }"#,
        )
        .unwrap();

        assert_eq!(rule.request_path, "/server/orders");
        assert_eq!(rule.access_mask, 3);
        assert!(!rule.permit_all);
        assert_eq!(rule.key(), ("/server/orders".to_string(), "GET".to_string()));
    }
}
