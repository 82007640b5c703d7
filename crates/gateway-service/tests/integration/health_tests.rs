//! Integration tests for the operational endpoints.

use gateway_test_utils::TestGateway;
use reqwest::StatusCode;

/// The liveness probe is public and carries the security headers.
#[tokio::test]
async fn test_health_endpoint_returns_ok() -> Result<(), anyhow::Error> {
    // Arrange
    let server = TestGateway::spawn().await?;

    // Act
    let response = reqwest::Client::new()
        .get(format!("{}/health", server.url()))
        .send()
        .await?;

    // Assert
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("x-frame-options")
            .and_then(|v| v.to_str().ok()),
        Some("DENY")
    );
    assert!(response.headers().contains_key("strict-transport-security"));
    assert_eq!(response.text().await?, "OK");

    Ok(())
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_gateway_metrics() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    let client = reqwest::Client::new();

    client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;
    let response = client
        .get(format!("{}/metrics", server.url()))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await?;
    assert!(
        body.contains("gw_http_requests_total"),
        "metrics output should contain HTTP request counter"
    );

    Ok(())
}

#[tokio::test]
async fn test_unknown_public_path_returns_not_found() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;

    let response = reqwest::Client::new()
        .get(format!("{}/does-not-exist", server.url()))
        .send()
        .await?;

    gateway_test_utils::assert_error_response(response, 404, "NotFound").await;

    Ok(())
}
