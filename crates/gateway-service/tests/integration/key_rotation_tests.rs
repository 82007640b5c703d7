//! Integration tests for signing key rotation and token issuance.

use gateway_service::models::RotateKeyResponse;
use gateway_test_utils::{
    assert_error_response, FailingKeyStore, TestGateway, TestRouteBuilder, TokenAssertions,
    ROLE_ADMIN, ROLE_USER,
};
use reqwest::StatusCode;
use std::sync::Arc;

#[tokio::test]
async fn test_issued_token_shape() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;

    let token = server.access_token(42, "alice", ROLE_USER | ROLE_ADMIN)?;

    token
        .assert_valid_jwt()
        .assert_signed_by("test-key-1")
        .assert_for_subject("alice")
        .assert_has_roles(ROLE_USER | ROLE_ADMIN)
        .assert_expires_in(900);

    server
        .codec()
        .issue_refresh_token("alice")?
        .assert_valid_jwt()
        .assert_is_refresh();

    Ok(())
}

/// Tokens signed by the previous key stay valid for one rotation only.
#[tokio::test]
async fn test_token_survives_one_rotation_only() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    server
        .add_route(TestRouteBuilder::new("/health").access_mask(ROLE_USER).build())
        .await?;
    let token = server.access_token(7, "alice", ROLE_USER)?;
    let client = reqwest::Client::new();

    server.keys().rotate().await?;
    let after_one = client
        .get(format!("{}/health", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(after_one.status(), StatusCode::OK);

    server.keys().rotate().await?;
    let after_two = client
        .get(format!("{}/health", server.url()))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_error_response(after_two, 401, "Unauthorized").await;

    Ok(())
}

#[tokio::test]
async fn test_rotate_endpoint_requires_admin() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    let client = reqwest::Client::new();
    let url = format!("{}/server/admin/keys/rotate", server.url());

    let as_user = client
        .post(&url)
        .bearer_auth(server.access_token(7, "alice", ROLE_USER)?)
        .send()
        .await?;
    assert_error_response(as_user, 403, "Forbidden").await;
    assert_eq!(server.keys().active_key().key_id(), "test-key-1");

    let admin_token = server.access_token(1, "root", ROLE_USER | ROLE_ADMIN)?;
    let as_admin = client.post(&url).bearer_auth(&admin_token).send().await?;
    assert_eq!(as_admin.status(), StatusCode::OK);
    let rotated: RotateKeyResponse = as_admin.json().await?;
    assert_ne!(rotated.key_id, "test-key-1");
    assert_eq!(server.keys().active_key().key_id(), rotated.key_id);

    // The token used for the call was signed by the now-previous key
    let list = client
        .get(format!("{}/server/admin/routes", server.url()))
        .bearer_auth(&admin_token)
        .send()
        .await?;
    assert_eq!(list.status(), StatusCode::OK);

    server
        .access_token(1, "root", ROLE_ADMIN)?
        .assert_signed_by(&rotated.key_id);

    Ok(())
}

#[tokio::test]
async fn test_rotation_keeps_key_when_persistence_fails() -> Result<(), anyhow::Error> {
    let store = Arc::new(FailingKeyStore::new());
    let server = TestGateway::builder()
        .key_store(store.clone())
        .spawn()
        .await?;

    let response = reqwest::Client::new()
        .post(format!("{}/server/admin/keys/rotate", server.url()))
        .bearer_auth(server.access_token(1, "root", ROLE_ADMIN)?)
        .send()
        .await?;

    assert_error_response(response, 500, "InternalError").await;
    assert_eq!(store.save_attempts(), 1);
    assert_eq!(server.keys().active_key().key_id(), "test-key-1");
    assert!(server.keys().key_ring().previous.is_none());

    Ok(())
}
