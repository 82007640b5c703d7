//! Admin handlers.
//!
//! - `POST /server/admin/routes` - Create or replace a route rule
//! - `GET /server/admin/routes?path=&method=` - One rule, or all rules without a query
//! - `DELETE /server/admin/routes?path=&method=` - Remove a rule
//! - `POST /server/admin/keys/rotate` - Rotate the signing key now
//!
//! All endpoints require the ADMIN role. The gateway middleware has already
//! rejected anonymous requests under the internal prefix; the role check here
//! covers deployments that mark these paths public.

use crate::errors::GatewayError;
use crate::models::{Principal, Role, RotateKeyResponse, RouteQuery, RouteRule};
use crate::observability::metrics::{record_admin_operation, record_error};
use crate::observability::{hash_for_correlation, ErrorCategory};
use crate::routes::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;
use tracing::instrument;

fn require_admin(principal: Option<&Principal>) -> Result<&Principal, GatewayError> {
    let principal = principal.ok_or(GatewayError::Unauthenticated)?;
    if !principal.has_role(Role::Admin) {
        return Err(GatewayError::PermissionDenied {
            required: Role::Admin.bit(),
            provided: principal.role_mask,
        });
    }
    Ok(principal)
}

fn record_outcome<T>(operation: &str, result: &Result<T, GatewayError>) {
    match result {
        Ok(_) => record_admin_operation(operation, "success"),
        Err(e) => {
            record_admin_operation(operation, "error");
            record_error(operation, ErrorCategory::from(e).as_str(), e.status_code());
        }
    }
}

fn query_key(query: &RouteQuery) -> Result<(&str, &str), GatewayError> {
    match (query.path.as_deref(), query.method.as_deref()) {
        (Some(path), Some(method)) => Ok((path, method)),
        _ => Err(GatewayError::Validation(
            "Both path and method are required".to_string(),
        )),
    }
}

// ============================================================================
// Routes
// ============================================================================

/// Handler for POST /server/admin/routes
#[instrument(skip_all, name = "gw.admin.upsert_route")]
pub async fn upsert_route(
    State(state): State<Arc<AppState>>,
    principal: Option<Extension<Principal>>,
    Json(rule): Json<RouteRule>,
) -> Result<Json<RouteRule>, GatewayError> {
    let result: Result<RouteRule, GatewayError> = async {
        let admin = require_admin(principal.as_deref())?;
        let saved = state.routes.upsert(rule).await?;
        tracing::info!(
            target: "gw.admin",
            path = %saved.request_path,
            method = %saved.method,
            admin = %hash_for_correlation(&admin.username),
            "Route rule saved"
        );
        Ok(saved)
    }
    .await;

    record_outcome("upsert_route", &result);
    result.map(Json)
}

/// Handler for GET /server/admin/routes
#[instrument(skip_all, name = "gw.admin.get_routes")]
pub async fn get_routes(
    State(state): State<Arc<AppState>>,
    principal: Option<Extension<Principal>>,
    Query(query): Query<RouteQuery>,
) -> Result<Response, GatewayError> {
    let result: Result<Response, GatewayError> = async {
        require_admin(principal.as_deref())?;
        if query.path.is_none() && query.method.is_none() {
            return Ok(Json(state.routes.list().await?).into_response());
        }
        let (path, method) = query_key(&query)?;
        Ok(Json(state.routes.find(path, method).await?).into_response())
    }
    .await;

    record_outcome("get_routes", &result);
    result
}

/// Handler for DELETE /server/admin/routes
#[instrument(skip_all, name = "gw.admin.delete_route")]
pub async fn delete_route(
    State(state): State<Arc<AppState>>,
    principal: Option<Extension<Principal>>,
    Query(query): Query<RouteQuery>,
) -> Result<StatusCode, GatewayError> {
    let result: Result<StatusCode, GatewayError> = async {
        let admin = require_admin(principal.as_deref())?;
        let (path, method) = query_key(&query)?;
        state.routes.remove(path, method).await?;
        tracing::info!(
            target: "gw.admin",
            path = %path,
            method = %method,
            admin = %hash_for_correlation(&admin.username),
            "Route rule removed"
        );
        Ok(StatusCode::NO_CONTENT)
    }
    .await;

    record_outcome("delete_route", &result);
    result
}

// ============================================================================
// Keys
// ============================================================================

/// Handler for POST /server/admin/keys/rotate
///
/// On a persistence failure the previous key stays active and 500 is returned.
#[instrument(skip_all, name = "gw.admin.rotate_keys")]
pub async fn rotate_keys(
    State(state): State<Arc<AppState>>,
    principal: Option<Extension<Principal>>,
) -> Result<Json<RotateKeyResponse>, GatewayError> {
    let result: Result<RotateKeyResponse, GatewayError> = async {
        require_admin(principal.as_deref())?;
        let key_id = state.keys.rotate().await?;
        Ok(RotateKeyResponse { key_id })
    }
    .await;

    record_outcome("rotate_keys", &result);
    result.map(Json)
}
