//! Persistence layer: signing keys and route rules.

pub mod routes;
pub mod signing_keys;

pub use routes::{InMemoryRouteStore, PgRouteStore, RouteStore};
pub use signing_keys::{EphemeralKeyStore, FileKeyStore, KeyStore};
