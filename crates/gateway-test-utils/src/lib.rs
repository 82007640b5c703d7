//! # Gateway Test Utilities
//!
//! Shared test utilities for the gateway service.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (fixed signing keys for reproducible tests)
//! - Test data builders (TestTokenBuilder)
//! - Server test harness (TestGateway for E2E tests)
//! - Custom assertions (TokenAssertions trait, error body checks)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gateway_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let gateway = TestGateway::spawn().await?;
//!
//!     let token = TestTokenBuilder::new()
//!         .for_user("alice")
//!         .with_roles(ROLE_USER)
//!         .sign(&gateway.keys().active_key())?;
//!
//!     token.assert_valid_jwt().assert_for_subject("alice");
//!     Ok(())
//! }
//! ```

pub mod assertions;
pub mod crypto_fixtures;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use assertions::*;
pub use crypto_fixtures::*;
pub use server_harness::*;
pub use token_builders::*;
