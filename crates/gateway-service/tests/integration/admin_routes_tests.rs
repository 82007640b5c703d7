//! Integration tests for the route admin endpoints.

use gateway_service::models::RouteRule;
use gateway_test_utils::{assert_error_response, TestGateway, ROLE_ADMIN, ROLE_USER};
use reqwest::StatusCode;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn admin_url(server: &TestGateway) -> String {
    format!("{}/server/admin/routes", server.url())
}

#[tokio::test]
async fn test_registered_route_is_forwarded() -> Result<(), anyhow::Error> {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/garments"))
        .respond_with(ResponseTemplate::new(200).set_body_string("garments"))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = TestGateway::spawn().await?;
    let client = reqwest::Client::new();
    let admin = server.access_token(1, "root", ROLE_ADMIN)?;

    let created = client
        .post(admin_url(&server))
        .bearer_auth(&admin)
        .json(&serde_json::json!({
            "requestPath": "/server/garments",
            "method": "get",
            "targetUrl": format!("{}/garments", upstream.uri()),
            "service": "catalog",
            "accessMask": ROLE_USER,
        }))
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::OK);
    let saved: RouteRule = created.json().await?;
    assert_eq!(saved.method, "GET");
    assert_eq!(saved.service.as_deref(), Some("catalog"));

    let response = client
        .get(format!("{}/api/garments", server.url()))
        .bearer_auth(server.access_token(7, "alice", ROLE_USER)?)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await?, "garments");

    Ok(())
}

#[tokio::test]
async fn test_rule_without_roles_is_rejected() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;

    let response = reqwest::Client::new()
        .post(admin_url(&server))
        .bearer_auth(server.access_token(1, "root", ROLE_ADMIN)?)
        .json(&serde_json::json!({
            "requestPath": "/server/garments",
            "method": "GET",
            "accessMask": 0,
        }))
        .send()
        .await?;

    assert_error_response(response, 400, "BadRequest").await;
    assert!(server.routes().list().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_get_list_and_delete() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    let client = reqwest::Client::new();
    let admin = server.access_token(1, "root", ROLE_ADMIN)?;

    for (route_path, mask) in [("/server/orders", ROLE_USER), ("/server/reports", ROLE_ADMIN)] {
        let response = client
            .post(admin_url(&server))
            .bearer_auth(&admin)
            .json(&serde_json::json!({
                "requestPath": route_path,
                "method": "GET",
                "accessMask": mask,
            }))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let all: Vec<RouteRule> = client
        .get(admin_url(&server))
        .bearer_auth(&admin)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(all.len(), 2);

    let one: RouteRule = client
        .get(admin_url(&server))
        .query(&[("path", "/server/reports"), ("method", "GET")])
        .bearer_auth(&admin)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(one.access_mask, ROLE_ADMIN);

    let deleted = client
        .delete(admin_url(&server))
        .query(&[("path", "/server/reports"), ("method", "GET")])
        .bearer_auth(&admin)
        .send()
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let missing = client
        .get(admin_url(&server))
        .query(&[("path", "/server/reports"), ("method", "GET")])
        .bearer_auth(&admin)
        .send()
        .await?;
    assert_error_response(missing, 404, "NotFound").await;

    let partial = client
        .get(admin_url(&server))
        .query(&[("path", "/server/orders")])
        .bearer_auth(&admin)
        .send()
        .await?;
    assert_error_response(partial, 400, "BadRequest").await;

    Ok(())
}

#[tokio::test]
async fn test_admin_routes_require_admin() -> Result<(), anyhow::Error> {
    let server = TestGateway::spawn().await?;
    let client = reqwest::Client::new();

    let anonymous = client.get(admin_url(&server)).send().await?;
    assert_error_response(anonymous, 401, "Unauthorized").await;

    let as_user = client
        .get(admin_url(&server))
        .bearer_auth(server.access_token(7, "alice", ROLE_USER)?)
        .send()
        .await?;
    assert_error_response(as_user, 403, "Forbidden").await;

    Ok(())
}
