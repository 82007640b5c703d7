//! Integration tests for upstream forwarding.

use gateway_test_utils::{assert_error_response, TestGateway, TestRouteBuilder, ROLE_USER};
use reqwest::StatusCode;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Identity headers are derived from the token; spoofed inbound values are
/// replaced. The query string survives the path rewrite.
#[tokio::test]
async fn test_forward_carries_identity_and_query() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(query_param("page", "2"))
        .and(header("x-user-id", "42"))
        .and(header("x-username", "alice"))
        .and(header("x-user-roles", "USER"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"orders": []})))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/orders")
                .target(&format!("{}/orders", upstream.uri()))
                .access_mask(ROLE_USER)
                .build(),
        )
        .await?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/orders?page=2", server.url()))
        .bearer_auth(server.access_token(42, "alice", ROLE_USER)?)
        .header("X-User-Roles", "ADMIN")
        .header("X-User-Id", "1")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body, serde_json::json!({"orders": []}));

    Ok(())
}

#[tokio::test]
async fn test_request_body_is_forwarded() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_json(serde_json::json!({"garmentId": 12, "quantity": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/orders")
                .method("POST")
                .target(&format!("{}/orders", upstream.uri()))
                .build(),
        )
        .await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/orders", server.url()))
        .bearer_auth(server.access_token(42, "alice", ROLE_USER)?)
        .json(&serde_json::json!({"garmentId": 12, "quantity": 2}))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.text().await?, "created");

    Ok(())
}

/// Upstream statuses and bodies come back unmodified, plus security headers.
#[tokio::test]
async fn test_upstream_error_status_passes_through() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/9"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("x-upstream", "orders")
                .set_body_string("no such order"),
        )
        .mount(&upstream)
        .await;

    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/orders/9")
                .target(&format!("{}/orders/9", upstream.uri()))
                .build(),
        )
        .await?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/orders/9", server.url()))
        .bearer_auth(server.access_token(42, "alice", ROLE_USER)?)
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response
            .headers()
            .get("x-upstream")
            .and_then(|v| v.to_str().ok()),
        Some("orders")
    );
    assert!(response.headers().contains_key("x-frame-options"));
    assert_eq!(response.text().await?, "no such order");

    Ok(())
}

#[tokio::test]
async fn test_slow_upstream_returns_gateway_timeout() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&upstream)
        .await;

    let server = TestGateway::builder()
        .forward_timeout(Duration::from_millis(300))
        .spawn()
        .await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/slow")
                .target(&format!("{}/slow", upstream.uri()))
                .permit_all()
                .build(),
        )
        .await?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/slow", server.url()))
        .send()
        .await?;

    assert_error_response(response, 504, "GatewayTimeout").await;

    Ok(())
}

#[tokio::test]
async fn test_unreachable_upstream_returns_bad_gateway() -> Result<(), anyhow::Error> {
    // Reserve a port, then release it so nothing is listening
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let closed = listener.local_addr()?;
    drop(listener);

    let server = TestGateway::spawn().await?;
    server
        .add_route(
            TestRouteBuilder::new("/server/gone")
                .target(&format!("http://{}/gone", closed))
                .permit_all()
                .build(),
        )
        .await?;

    let response = reqwest::Client::new()
        .get(format!("{}/api/gone", server.url()))
        .send()
        .await?;

    assert_error_response(response, 502, "BadGateway").await;

    Ok(())
}

/// A granted rule without a target URL is served by the local router.
#[tokio::test]
async fn test_rule_without_target_is_served_locally() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    server
        .add_route(TestRouteBuilder::new("/health").permit_all().build())
        .await?;

    let response = reqwest::Client::new()
        .get(format!("{}/health", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "OK");

    Ok(())
}
