//! Middleware for the gateway.
//!
//! # Components
//!
//! - `gateway` - Runs the request pipeline, forwards granted routes, decorates responses
//! - `http_metrics` - HTTP request metrics middleware

pub mod gateway;
pub mod http_metrics;

pub use gateway::{gateway_layer, GatewayState};
pub use http_metrics::http_metrics_middleware;

use crate::models::Principal;

/// Extension trait for reading the authenticated principal from a request.
pub trait PrincipalExt {
    /// Returns `None` for anonymous requests.
    fn principal(&self) -> Option<&Principal>;
}

impl<B> PrincipalExt for axum::extract::Request<B> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}
