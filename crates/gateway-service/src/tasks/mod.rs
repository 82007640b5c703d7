//! Background tasks for the gateway.
//!
//! # Tasks
//!
//! - `key_rotation` - Rotates the signing key on a fixed interval

pub mod key_rotation;

pub use key_rotation::start_key_rotation;
