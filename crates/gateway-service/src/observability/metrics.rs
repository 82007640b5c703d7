//! Metrics definitions for the gateway.
//!
//! All metrics follow Prometheus naming conventions:
//! - `gw_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `kind`: 2 values (access, refresh)
//! - `status`: 2 values (success, error)
//! - `reason`: 5 values (expired, malformed, bad_signature, unsupported, none)
//! - `decision`: bounded by [`crate::pipeline::Decision`]
//! - `outcome`: 3 values (success, timeout, unreachable)
//! - `path`: normalized, dynamic segments collapsed and depth capped

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Path segments kept in the `path` label.
const MAX_LABEL_PATH_SEGMENTS: usize = 3;

/// Install the global Prometheus recorder.
///
/// Must be called once, before any metric is recorded. The returned handle
/// renders the `/metrics` endpoint.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Upstream calls are bounded by the forward timeout (30s default)
        .set_buckets_for_metric(
            Matcher::Prefix("gw_forward".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
                30.000,
            ],
        )
        .map_err(|e| format!("Failed to set forward buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record token issuance outcome
///
/// Metric: `gw_token_issuance_total`
/// Labels: `kind`, `status`
pub fn record_token_issuance(kind: &str, status: &str) {
    counter!("gw_token_issuance_total", "kind" => kind.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record token validation result
///
/// Metric: `gw_token_validations_total`
/// Labels: `status`, `reason`
pub fn record_token_validation(status: &str, reason: Option<&str>) {
    let reason = reason.unwrap_or("none");
    counter!("gw_token_validations_total", "status" => status.to_string(), "reason" => reason.to_string())
        .increment(1);
}

// ============================================================================
// Key Management Metrics
// ============================================================================

/// Record key rotation event
///
/// Metric: `gw_key_rotation_total`
/// Labels: `status`
pub fn record_key_rotation(status: &str) {
    counter!("gw_key_rotation_total", "status" => status.to_string()).increment(1);
}

/// Record key rotation last success timestamp
///
/// Metric: `gw_key_rotation_last_success_timestamp`
pub fn set_key_rotation_last_success(timestamp_secs: f64) {
    gauge!("gw_key_rotation_last_success_timestamp").set(timestamp_secs);
}

/// Update active signing key age gauge
///
/// Metric: `gw_signing_key_age_seconds`
pub fn set_signing_key_age_seconds(age_seconds: f64) {
    gauge!("gw_signing_key_age_seconds").set(age_seconds);
}

// ============================================================================
// Gateway Decision Metrics
// ============================================================================

/// Record a pipeline decision
///
/// Metric: `gw_gateway_decisions_total`
/// Labels: `decision`
pub fn record_gateway_decision(decision: &str) {
    counter!("gw_gateway_decisions_total", "decision" => decision.to_string()).increment(1);
}

/// Record an upstream forward
///
/// Metric: `gw_forward_duration_seconds`, `gw_forwards_total`
/// Labels: `outcome`
pub fn record_forward(outcome: &str, duration: Duration) {
    histogram!("gw_forward_duration_seconds", "outcome" => outcome.to_string())
        .record(duration.as_secs_f64());

    counter!("gw_forwards_total", "outcome" => outcome.to_string()).increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record error by category
///
/// Metric: `gw_errors_total`
/// Labels: `operation`, `error_category`, `status_code`
pub fn record_error(operation: &str, error_category: &str, status_code: u16) {
    counter!("gw_errors_total",
        "operation" => operation.to_string(),
        "error_category" => error_category.to_string(),
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

// ============================================================================
// Admin Operations Metrics
// ============================================================================

/// Record route table / key admin operation
///
/// Metric: `gw_admin_operations_total`
/// Labels: `operation`, `status`
///
/// Operations: upsert_route, get_route, delete_route, list_routes, rotate_key
pub fn record_admin_operation(operation: &str, status: &str) {
    counter!("gw_admin_operations_total", "operation" => operation.to_string(), "status" => status.to_string())
        .increment(1);
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `path`, `status_code`
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let normalized_path = normalize_path(path);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => normalized_path.clone(),
        "status_code" => status_code.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "path" => normalized_path,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Normalize path to bound label cardinality.
///
/// Numeric and UUID segments become `{id}` and anything past
/// `MAX_LABEL_PATH_SEGMENTS` collapses into `/*`.
fn normalize_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut normalized = String::new();
    for segment in segments.iter().take(MAX_LABEL_PATH_SEGMENTS) {
        normalized.push('/');
        if is_dynamic_segment(segment) {
            normalized.push_str("{id}");
        } else {
            normalized.push_str(segment);
        }
    }

    if segments.len() > MAX_LABEL_PATH_SEGMENTS {
        normalized.push_str("/*");
    }

    normalized
}

fn is_dynamic_segment(segment: &str) -> bool {
    segment.bytes().all(|b| b.is_ascii_digit()) || is_uuid(segment)
}

/// Check if a string matches UUID format (8-4-4-4-12 hex digits with dashes)
fn is_uuid(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }

    s.bytes().enumerate().all(|(i, byte)| match i {
        8 | 13 | 18 | 23 => byte == b'-',
        _ => byte.is_ascii_hexdigit(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests execute the recording functions against the global no-op
    // recorder; values are not asserted.

    #[test]
    fn test_record_token_metrics() {
        record_token_issuance("access", "success");
        record_token_issuance("refresh", "error");
        record_token_validation("success", None);
        record_token_validation("error", Some("expired"));
    }

    #[test]
    fn test_record_key_metrics() {
        record_key_rotation("success");
        record_key_rotation("error");
        set_key_rotation_last_success(1_700_000_000.0);
        set_signing_key_age_seconds(42.0);
    }

    #[test]
    fn test_record_gateway_metrics() {
        record_gateway_decision("permit");
        record_gateway_decision("forbidden");
        record_forward("success", Duration::from_millis(12));
        record_forward("timeout", Duration::from_secs(30));
        record_admin_operation("upsert_route", "success");
        record_error("upsert_route", "client", 400);
        record_http_request("GET", "/server/orders/42", 200, Duration::from_millis(5));
    }

    #[test]
    fn test_normalize_path_known_shapes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/server/orders"), "/server/orders");
        assert_eq!(normalize_path("/server/orders/42"), "/server/orders/{id}");
    }

    #[test]
    fn test_normalize_path_uuid_segment() {
        assert_eq!(
            normalize_path("/server/tickets/550e8400-e29b-41d4-a716-446655440000"),
            "/server/tickets/{id}"
        );
    }

    #[test]
    fn test_normalize_path_caps_depth() {
        assert_eq!(
            normalize_path("/server/admin/routes/extra/deep"),
            "/server/admin/routes/*"
        );
    }

    #[test]
    fn test_normalize_path_drops_query() {
        assert_eq!(normalize_path("/server/orders?page=2"), "/server/orders");
    }

    #[test]
    fn test_is_uuid() {
        assert!(is_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid("550e8400e29b41d4a716446655440000"));
        assert!(!is_uuid("not-a-uuid"));
        assert!(!is_uuid("550e8400-e29b-41d4-a716-44665544000g"));
    }
}
