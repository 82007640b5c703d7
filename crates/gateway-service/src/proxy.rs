//! Upstream forwarding.
//!
//! Forwards a granted request to the rule's target URL and streams the upstream
//! response back. The forward timeout bounds the whole exchange, from connect
//! until the last body chunk; a body still streaming when it fires ends with an
//! error and the client connection is closed. Dropping the returned future
//! (client disconnect) drops the in-flight upstream request. Nothing is retried.

use crate::errors::GatewayError;
use crate::models::Principal;
use crate::observability::metrics::record_forward;
use crate::services::access_policy::roles_from_mask;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::Response;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use std::time::{Duration, Instant};
use tracing::instrument;

/// Largest request body buffered for forwarding.
pub const MAX_FORWARD_BODY_BYTES: usize = 10 * 1024 * 1024;

pub const X_USER_ID: &str = "x-user-id";
pub const X_USERNAME: &str = "x-username";
pub const X_USER_ROLES: &str = "x-user-roles";

/// Connection-level headers that never cross the proxy.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// A request leaving the gateway.
pub struct ForwardRequest<'a> {
    pub method: Method,
    pub target_url: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub principal: Option<&'a Principal>,
    pub body: Body,
}

#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                tracing::error!(target: "gw.proxy", error = %e, "Failed to build HTTP client");
                GatewayError::Internal
            })?;

        Ok(Self { client, timeout })
    }

    #[instrument(skip_all)]
    pub async fn forward(&self, request: ForwardRequest<'_>) -> Result<Response, GatewayError> {
        let url = target_with_query(request.target_url, request.query);
        let headers = outbound_headers(request.headers, request.principal);

        let body = Limited::new(request.body, MAX_FORWARD_BODY_BYTES)
            .collect()
            .await
            .map_err(|e| {
                if e.is::<LengthLimitError>() {
                    GatewayError::PayloadTooLarge {
                        limit: MAX_FORWARD_BODY_BYTES,
                    }
                } else {
                    tracing::debug!(target: "gw.proxy", error = %e, "Request body unreadable");
                    GatewayError::Validation("Request body unreadable".to_string())
                }
            })?
            .to_bytes();

        // Unlike the client-wide connect timeout, this one also covers the body.
        let mut outbound = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .timeout(self.timeout);
        if !body.is_empty() {
            outbound = outbound.body(body);
        }

        let started = Instant::now();
        let upstream = match outbound.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                record_forward("timeout", started.elapsed());
                return Err(GatewayError::ForwardTimeout(request.target_url.to_string()));
            }
            Err(e) => {
                record_forward("unreachable", started.elapsed());
                tracing::debug!(target: "gw.proxy", error = %e, "Upstream request failed");
                return Err(GatewayError::ForwardUnreachable(
                    request.target_url.to_string(),
                ));
            }
        };

        record_forward("success", started.elapsed());
        tracing::debug!(
            target: "gw.proxy",
            status = upstream.status().as_u16(),
            "Upstream responded"
        );

        let status = upstream.status();
        let mut response_headers = upstream.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        let target = request.target_url.to_string();
        let body = Body::from_stream(upstream.bytes_stream()).map_err(move |e| {
            if is_timeout(&e) {
                record_forward("body_timeout", started.elapsed());
                tracing::warn!(
                    target: "gw.proxy",
                    upstream = %target,
                    "Upstream body timed out mid-stream"
                );
            }
            e
        });

        let mut response = Response::new(Body::new(body));
        *response.status_mut() = status;
        *response.headers_mut() = response_headers;
        Ok(response)
    }
}

/// True when a reqwest timeout sits anywhere in the error chain.
fn is_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e
            .downcast_ref::<reqwest::Error>()
            .is_some_and(reqwest::Error::is_timeout)
        {
            return true;
        }
        current = e.source();
    }
    false
}

fn target_with_query(target: &str, query: Option<&str>) -> String {
    match query.filter(|q| !q.is_empty()) {
        Some(q) if target.contains('?') => format!("{}&{}", target, q),
        Some(q) => format!("{}?{}", target, q),
        None => target.to_string(),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in Connection are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(axum::http::header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Inbound headers minus host, length, hop-by-hop and identity headers,
/// plus identity headers derived from the principal.
fn outbound_headers(inbound: &HeaderMap, principal: Option<&Principal>) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    for name in ["host", "content-length", X_USER_ID, X_USERNAME, X_USER_ROLES] {
        headers.remove(name);
    }

    if let Some(principal) = principal {
        headers.insert(
            HeaderName::from_static(X_USER_ID),
            HeaderValue::from(principal.user_id),
        );
        match HeaderValue::from_str(&principal.username) {
            Ok(value) => {
                headers.insert(HeaderName::from_static(X_USERNAME), value);
            }
            Err(_) => {
                tracing::debug!(target: "gw.proxy", "Username not representable as a header, omitted");
            }
        }
        if let Ok(value) = HeaderValue::from_str(&roles_from_mask(principal.role_mask)) {
            headers.insert(HeaderName::from_static(X_USER_ROLES), value);
        }
    }

    headers
}
