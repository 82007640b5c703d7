//! Integration tests for the request pipeline: public bypass, authentication,
//! authorization and CORS preflight, exercised over real HTTP.

use chrono::Utc;
use gateway_test_utils::{
    assert_error_response, test_signing_key, TestGateway, TestRouteBuilder, TestTokenBuilder,
    ROLE_ADMIN, ROLE_USER,
};
use reqwest::StatusCode;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn upstream_with(method_name: &str, route: &str, expected_calls: u64) -> MockServer {
    let upstream = MockServer::start().await;
    Mock::given(method(method_name))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string("upstream reached"))
        .expect(expected_calls)
        .mount(&upstream)
        .await;
    upstream
}

// ============================================================================
// Public bypass
// ============================================================================

/// Login is on the public allow-list and needs no Authorization header.
#[tokio::test]
async fn test_login_without_authorization_reaches_handler() -> Result<(), anyhow::Error> {
    let upstream = upstream_with("POST", "/login", 1).await;
    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/auth/login")
                .method("POST")
                .target(&format!("{}/login", upstream.uri()))
                .permit_all()
                .build(),
        )
        .await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/auth/login", server.url()))
        .json(&serde_json::json!({"username": "alice", "password": "secret"}))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "upstream reached");

    Ok(())
}

/// Without a rule, login falls through to the local router instead of
/// being rejected as anonymous.
#[tokio::test]
async fn test_unregistered_login_is_not_rejected() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;

    let response = reqwest::Client::new()
        .post(format!("{}/server/auth/login", server.url()))
        .send()
        .await?;

    assert_error_response(response, 404, "NotFound").await;

    Ok(())
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_admin_route_with_user_token_is_forbidden() -> Result<(), anyhow::Error> {
    let upstream = upstream_with("GET", "/reports", 0).await;
    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/reports")
                .target(&format!("{}/reports", upstream.uri()))
                .access_mask(ROLE_ADMIN)
                .build(),
        )
        .await?;
    let token = server.access_token(7, "alice", ROLE_USER)?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/reports", server.url()))
        .bearer_auth(token)
        .send()
        .await?;

    assert_eq!(
        response
            .headers()
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
    let body = assert_error_response(response, 403, "Forbidden").await;
    assert_eq!(body.message, "Access denied");

    Ok(())
}

#[tokio::test]
async fn test_admin_route_with_admin_token_is_forwarded() -> Result<(), anyhow::Error> {
    let upstream = upstream_with("GET", "/reports", 1).await;
    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/reports")
                .target(&format!("{}/reports", upstream.uri()))
                .access_mask(ROLE_ADMIN)
                .build(),
        )
        .await?;
    let token = server.access_token(1, "root", ROLE_USER | ROLE_ADMIN)?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/reports", server.url()))
        .bearer_auth(token)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);

    Ok(())
}

/// An expired token makes the request anonymous, so the answer is 401, not 403.
#[tokio::test]
async fn test_expired_token_on_protected_route_is_unauthorized() -> Result<(), anyhow::Error> {
    let upstream = upstream_with("GET", "/orders", 0).await;
    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/orders")
                .target(&format!("{}/orders", upstream.uri()))
                .access_mask(ROLE_USER)
                .build(),
        )
        .await?;
    let expired = TestTokenBuilder::new()
        .for_user("alice")
        .with_roles(ROLE_USER)
        .issued_at(Utc::now().timestamp() - 3600)
        .expires_in(-60)
        .sign(&server.keys().active_key())?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/orders", server.url()))
        .bearer_auth(expired)
        .send()
        .await?;

    assert!(response.headers().contains_key("www-authenticate"));
    let body = assert_error_response(response, 401, "Unauthorized").await;
    assert_eq!(body.message, "Please login");

    Ok(())
}

#[tokio::test]
async fn test_foreign_signature_is_unauthorized() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    server
        .add_route(TestRouteBuilder::new("/server/orders").build())
        .await?;
    let foreign = TestTokenBuilder::new()
        .with_roles(ROLE_USER)
        .sign(&test_signing_key(99)?)?;

    let response = reqwest::Client::new()
        .get(format!("{}/server/orders", server.url()))
        .bearer_auth(foreign)
        .send()
        .await?;

    assert_error_response(response, 401, "Unauthorized").await;

    Ok(())
}

#[tokio::test]
async fn test_refresh_token_does_not_authenticate() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    server
        .add_route(TestRouteBuilder::new("/server/orders").build())
        .await?;
    let refresh = server.codec().issue_refresh_token("alice")?;

    let response = reqwest::Client::new()
        .get(format!("{}/server/orders", server.url()))
        .bearer_auth(refresh)
        .send()
        .await?;

    assert_error_response(response, 401, "Unauthorized").await;

    Ok(())
}

/// Under the internal prefix an anonymous request is rejected even without
/// a rule; an authenticated one falls through to the local router.
#[tokio::test]
async fn test_protected_prefix_without_rule() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    let client = reqwest::Client::new();

    let anonymous = client
        .get(format!("{}/api/unknown", server.url()))
        .send()
        .await?;
    assert_error_response(anonymous, 401, "Unauthorized").await;

    let authenticated = client
        .get(format!("{}/api/unknown", server.url()))
        .bearer_auth(server.access_token(1, "alice", ROLE_USER)?)
        .send()
        .await?;
    assert_error_response(authenticated, 404, "NotFound").await;

    Ok(())
}

// ============================================================================
// CORS
// ============================================================================

#[tokio::test]
async fn test_options_preflight_skips_authorization() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/reports")
                .access_mask(ROLE_ADMIN)
                .build(),
        )
        .await?;

    let response = reqwest::Client::new()
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/api/reports", server.url()),
        )
        .header("Origin", "https://shop.example.com")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    assert!(response
        .headers()
        .contains_key("access-control-allow-methods"));

    Ok(())
}

#[tokio::test]
async fn test_configured_origin_is_echoed() -> Result<(), anyhow::Error> {
    let server = TestGateway::builder()
        .with_var("CORS_ALLOWED_ORIGINS", "https://shop.example.com")
        .spawn()
        .await?;

    let response = reqwest::Client::new()
        .get(format!("{}/health", server.url()))
        .header("Origin", "https://shop.example.com")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://shop.example.com")
    );

    Ok(())
}

#[tokio::test]
async fn test_unlisted_origin_gets_no_cors_headers() -> Result<(), anyhow::Error> {
    let server = TestGateway::builder()
        .with_var("CORS_ALLOWED_ORIGINS", "https://shop.example.com")
        .with_var("CORS_ALLOW_CREDENTIALS", "true")
        .spawn()
        .await?;

    let response = reqwest::Client::new()
        .get(format!("{}/health", server.url()))
        .header("Origin", "https://evil.example.net")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response
        .headers()
        .contains_key("access-control-allow-origin"));
    assert!(response.headers().contains_key("x-frame-options"));

    Ok(())
}
