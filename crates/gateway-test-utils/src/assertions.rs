//! Custom test assertions for expressive tests
//!
//! Provides trait-based assertions for tokens and helpers for gateway error bodies.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use gateway_service::errors::ErrorBody;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct JwtHeader {
    pub alg: String,
    pub typ: String,
    #[serde(default)]
    pub kid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwtClaims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "userId", default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub role: Option<String>,
}

fn decode_part<T: for<'de> Deserialize<'de>>(token: &str, index: usize, what: &str) -> T {
    let part = token
        .split('.')
        .nth(index)
        .unwrap_or_else(|| panic!("JWT has no {} part", what));
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .unwrap_or_else(|e| panic!("Failed to base64 decode JWT {}: {:?}", what, e));
    serde_json::from_slice(&bytes)
        .unwrap_or_else(|e| panic!("Failed to parse JWT {} JSON: {:?}", what, e))
}

/// Custom assertions for issued tokens
///
/// # Example
/// ```rust,ignore
/// token
///     .assert_valid_jwt()
///     .assert_has_roles(ROLE_ADMIN)
///     .assert_signed_by("test-key-1");
/// ```
pub trait TokenAssertions {
    /// Assert that the token is a three-part HS256 JWT
    fn assert_valid_jwt(&self) -> &Self;

    /// Assert that the token carries exactly this role mask
    fn assert_has_roles(&self, mask: u32) -> &Self;

    /// Assert that the token header names this key id
    fn assert_signed_by(&self, key_id: &str) -> &Self;

    /// Assert that the token expires within the specified seconds (5s tolerance)
    fn assert_expires_in(&self, seconds: u64) -> &Self;

    /// Assert that the token is for the specified subject
    fn assert_for_subject(&self, subject: &str) -> &Self;

    /// Assert that the token has no user id and no role
    fn assert_is_refresh(&self) -> &Self;
}

impl TokenAssertions for String {
    fn assert_valid_jwt(&self) -> &Self {
        let parts = self.split('.').count();
        assert_eq!(
            parts, 3,
            "JWT must have 3 parts (header.payload.signature), got {}",
            parts
        );

        let header: JwtHeader = decode_part(self, 0, "header");
        assert_eq!(header.alg, "HS256", "Expected HS256 algorithm");
        assert_eq!(header.typ, "JWT", "Expected JWT type");

        let claims: JwtClaims = decode_part(self, 1, "payload");
        assert!(
            claims.exp > claims.iat,
            "Expected exp ({}) after iat ({})",
            claims.exp,
            claims.iat
        );

        self
    }

    fn assert_has_roles(&self, mask: u32) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");
        let expected = mask.to_string();
        assert_eq!(
            claims.role.as_deref(),
            Some(expected.as_str()),
            "Expected role mask {}, got {:?}",
            mask,
            claims.role
        );

        self
    }

    fn assert_signed_by(&self, key_id: &str) -> &Self {
        let header: JwtHeader = decode_part(self, 0, "header");
        assert_eq!(
            header.kid.as_deref(),
            Some(key_id),
            "Expected key_id '{}', got {:?}",
            key_id,
            header.kid
        );

        self
    }

    fn assert_expires_in(&self, seconds: u64) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");
        let expires_in = claims.exp - chrono::Utc::now().timestamp();

        assert!(
            (expires_in - seconds as i64).abs() <= 5,
            "Expected token to expire in {} seconds, but expires in {} seconds",
            seconds,
            expires_in
        );

        self
    }

    fn assert_for_subject(&self, subject: &str) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");
        assert_eq!(
            claims.sub, subject,
            "Expected subject '{}', got '{}'",
            subject, claims.sub
        );

        self
    }

    fn assert_is_refresh(&self) -> &Self {
        let claims: JwtClaims = decode_part(self, 1, "payload");
        assert!(
            claims.user_id.is_none() && claims.role.is_none(),
            "Expected a refresh token, got userId {:?} role {:?}",
            claims.user_id,
            claims.role
        );

        self
    }
}

/// Read a gateway error response and check its status and `error` kind.
///
/// Returns the parsed body for further checks.
pub async fn assert_error_response(
    response: reqwest::Response,
    status: u16,
    kind: &str,
) -> ErrorBody {
    assert_eq!(
        response.status().as_u16(),
        status,
        "Unexpected status for {}",
        response.url()
    );
    let body: ErrorBody = response
        .json()
        .await
        .expect("error response should be JSON");
    assert_eq!(body.error, kind, "Unexpected error kind: {:?}", body);
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(header: &str, payload: &str) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(header.as_bytes()),
            URL_SAFE_NO_PAD.encode(payload.as_bytes())
        )
    }

    #[test]
    fn test_assert_valid_jwt_with_valid_token() {
        token(
            r#"{"alg":"HS256","typ":"JWT","kid":"test-key-1"}"#,
            r#"{"sub":"alice","userId":7,"role":"3","exp":9999999999,"iat":1234567890}"#,
        )
        .assert_valid_jwt()
        .assert_has_roles(3)
        .assert_signed_by("test-key-1")
        .assert_for_subject("alice");
    }

    #[test]
    #[should_panic(expected = "JWT must have 3 parts")]
    fn test_assert_valid_jwt_with_invalid_structure() {
        "invalid.token".to_string().assert_valid_jwt();
    }

    #[test]
    #[should_panic(expected = "Expected HS256 algorithm")]
    fn test_assert_valid_jwt_rejects_other_algorithm() {
        token(
            r#"{"alg":"none","typ":"JWT"}"#,
            r#"{"sub":"alice","exp":9999999999,"iat":1234567890}"#,
        )
        .assert_valid_jwt();
    }

    #[test]
    #[should_panic(expected = "Expected role mask")]
    fn test_assert_has_roles_mismatch() {
        token(
            r#"{"alg":"HS256","typ":"JWT"}"#,
            r#"{"sub":"alice","role":"1","exp":9999999999,"iat":1234567890}"#,
        )
        .assert_has_roles(2);
    }

    #[test]
    fn test_assert_is_refresh() {
        token(
            r#"{"alg":"HS256","typ":"JWT"}"#,
            r#"{"sub":"alice","exp":9999999999,"iat":1234567890}"#,
        )
        .assert_is_refresh();
    }
}
