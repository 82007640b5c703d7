//! Gateway Service Library
//!
//! Authentication, authorization and dynamic routing in front of a set of
//! backend services. Every request passes an ordered pipeline of stages; granted
//! requests that match a route rule with a target URL are forwarded upstream.
//!
//! # Modules
//!
//! - `config` - Service configuration
//! - `crypto` - Signing keys and token issuance/validation
//! - `errors` - Error types
//! - `handlers` - HTTP request handlers (health, metrics, admin)
//! - `middleware` - Gateway layer and HTTP metrics
//! - `models` - Roles, principals, route rules
//! - `observability` - Audit events and metrics
//! - `pipeline` - Request stages and response decorators
//! - `proxy` - Upstream forwarding
//! - `repositories` - Route and key persistence
//! - `routes` - Router and application state
//! - `services` - Key management, access policy, route table
//! - `tasks` - Background tasks

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod proxy;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
