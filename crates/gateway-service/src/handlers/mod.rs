//! HTTP request handlers for the gateway.

pub mod admin;
pub mod health;
pub mod metrics;

pub use admin::{delete_route, get_routes, rotate_keys, upsert_route};
pub use health::health_check;
pub use metrics::metrics_handler;
