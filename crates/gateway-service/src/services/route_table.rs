//! Validating facade over a [`RouteStore`].

use crate::errors::GatewayError;
use crate::models::{Role, RouteRule};
use crate::repositories::routes::RouteStore;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone)]
pub struct RouteTable {
    store: Arc<dyn RouteStore>,
}

impl RouteTable {
    pub fn new(store: Arc<dyn RouteStore>) -> Self {
        Self { store }
    }

    /// Exact path match, case-insensitive method.
    #[instrument(skip_all)]
    pub async fn find(&self, path: &str, method: &str) -> Result<RouteRule, GatewayError> {
        let method = normalize_method(method);
        self.store
            .load(path, &method)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("No route for {} {}", method, path)))
    }

    /// Insert or replace a rule after validating it.
    #[instrument(skip_all)]
    pub async fn upsert(&self, mut rule: RouteRule) -> Result<RouteRule, GatewayError> {
        rule.method = normalize_method(&rule.method);
        validate_rule(&rule)?;
        self.store.save(&rule).await?;

        tracing::info!(
            target: "gw.routes",
            path = %rule.request_path,
            method = %rule.method,
            access_mask = rule.access_mask,
            permit_all = rule.permit_all,
            "Route rule saved"
        );

        Ok(rule)
    }

    #[instrument(skip_all)]
    pub async fn remove(&self, path: &str, method: &str) -> Result<(), GatewayError> {
        let method = normalize_method(method);
        if self.store.delete(path, &method).await? {
            tracing::info!(target: "gw.routes", path = %path, method = %method, "Route rule removed");
            Ok(())
        } else {
            Err(GatewayError::NotFound(format!(
                "No route for {} {}",
                method, path
            )))
        }
    }

    pub async fn list(&self) -> Result<Vec<RouteRule>, GatewayError> {
        self.store.list().await
    }

    /// Upsert every rule in a JSON array. Stops at the first invalid rule;
    /// rules before it stay saved.
    #[instrument(skip_all)]
    pub async fn seed_from_json(&self, json: &str) -> Result<usize, GatewayError> {
        let rules: Vec<RouteRule> = serde_json::from_str(json)
            .map_err(|e| GatewayError::Validation(format!("Invalid route seed file: {}", e)))?;

        let count = rules.len();
        for rule in rules {
            self.upsert(rule).await?;
        }
        Ok(count)
    }
}

/// Stored methods are trimmed and upper case; lookups go through the same form.
fn normalize_method(method: &str) -> String {
    method.trim().to_ascii_uppercase()
}

/// Check a rule as [`RouteTable::upsert`] would, after method normalization.
///
/// Request paths are matched byte for byte, so whitespace anywhere in them is
/// rejected rather than trimmed.
pub fn validate_rule(rule: &RouteRule) -> Result<(), GatewayError> {
    if !rule.request_path.starts_with('/') {
        return Err(GatewayError::Validation(format!(
            "requestPath must start with '/', got '{}'",
            rule.request_path
        )));
    }
    if rule.request_path.chars().any(char::is_whitespace) {
        return Err(GatewayError::Validation(format!(
            "requestPath must not contain whitespace, got '{}'",
            rule.request_path
        )));
    }

    let method = rule.method.as_str();
    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(GatewayError::Validation(format!(
            "method must be an HTTP method token, got '{}'",
            rule.method
        )));
    }

    if (rule.access_mask & Role::ALL_BITS) == 0 && !rule.permit_all {
        return Err(GatewayError::Validation(
            "accessMask must include at least one role unless permitAll is set".to_string(),
        ));
    }

    if let Some(target) = rule.target_url.as_deref() {
        if !(target.starts_with("http://") || target.starts_with("https://")) {
            return Err(GatewayError::Validation(format!(
                "targetUrl must be an http(s) URL, got '{}'",
                target
            )));
        }
    }

    Ok(())
}
