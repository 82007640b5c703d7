use crate::config::{CorsConfig, SecurityHeadersConfig};
use axum::{
    extract::{Request, State},
    http::{
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
        },
        HeaderMap, HeaderName, HeaderValue, Method,
    },
    middleware::{self, Next},
    response::Response,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Add the configured security headers. Empty values are skipped, and headers
/// already set by the upstream service are left alone.
pub fn apply_security_headers(config: &SecurityHeadersConfig, headers: &mut HeaderMap) {
    let pairs: [(HeaderName, &str); 7] = [
        (CONTENT_SECURITY_POLICY, config.content_security_policy.as_str()),
        (STRICT_TRANSPORT_SECURITY, config.strict_transport_security.as_str()),
        (X_FRAME_OPTIONS, config.x_frame_options.as_str()),
        (X_CONTENT_TYPE_OPTIONS, config.x_content_type_options.as_str()),
        (X_XSS_PROTECTION, config.x_xss_protection.as_str()),
        (CACHE_CONTROL, config.cache_control.as_str()),
        (REFERRER_POLICY, config.referrer_policy.as_str()),
    ];

    for (name, value) in pairs {
        let value = value.trim();
        if value.is_empty() || headers.contains_key(&name) {
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(v) => {
                headers.insert(name, v);
            }
            Err(_) => {
                tracing::warn!(target: "gw.pipeline", header = %name, "Invalid security header value skipped");
            }
        }
    }
}

pub async fn security_headers_middleware(
    State(config): State<Arc<SecurityHeadersConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    apply_security_headers(&config, response.headers_mut());
    response
}

/// Build the CORS layer from configuration.
///
/// A `*` entry allows anything. Combined with credentials, the request's origin,
/// method or headers are mirrored instead, since browsers reject a wildcard on
/// credentialed requests. Unparseable entries are logged and dropped.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let credentials = config.allow_credentials;
    let wildcard = |list: &[String]| list.iter().any(|v| v.trim() == "*");

    let origin = if wildcard(&config.allowed_origins) {
        if credentials {
            AllowOrigin::mirror_request()
        } else {
            AllowOrigin::any()
        }
    } else {
        AllowOrigin::list(parse_entries(&config.allowed_origins, "origin", |v| {
            HeaderValue::from_str(v).ok()
        }))
    };

    let methods = if wildcard(&config.allowed_methods) {
        if credentials {
            AllowMethods::mirror_request()
        } else {
            AllowMethods::any()
        }
    } else {
        AllowMethods::list(parse_entries(&config.allowed_methods, "method", |v| {
            Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
        }))
    };

    let headers = if wildcard(&config.allowed_headers) {
        if credentials {
            AllowHeaders::mirror_request()
        } else {
            AllowHeaders::any()
        }
    } else {
        AllowHeaders::list(parse_entries(&config.allowed_headers, "header", |v| {
            HeaderName::from_bytes(v.as_bytes()).ok()
        }))
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(credentials)
}

fn parse_entries<T>(values: &[String], kind: &str, parse: impl Fn(&str) -> Option<T>) -> Vec<T> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .filter_map(|v| {
            let parsed = parse(v);
            if parsed.is_none() {
                tracing::warn!(target: "gw.pipeline", kind = kind, value = %v, "Invalid CORS entry skipped");
            }
            parsed
        })
        .collect()
}

/// Wrap `router` in the response decorators. CORS sits inside the security
/// headers, so preflight answers produced by the CORS layer carry them too.
pub fn with_response_decorators(
    router: Router,
    cors: &CorsConfig,
    security_headers: &SecurityHeadersConfig,
) -> Router {
    router.layer(cors_layer(cors)).layer(middleware::from_fn_with_state(
        Arc::new(security_headers.clone()),
        security_headers_middleware,
    ))
}
