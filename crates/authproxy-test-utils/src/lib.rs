//! # authproxy Test Utilities
//!
//! Shared test utilities for the authproxy service.
//!
//! This crate provides:
//! - Signing keypairs that publish themselves as JWKs (ES256, EdDSA)
//! - Claim builders (TestTokenBuilder)
//! - JWKS mocks served by wiremock
//! - Server test harness (TestAuthProxy for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use authproxy_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestKeypair::es256("key-1");
//!     let jwks = MockServer::start().await;
//!     mount_jwks(&jwks, &[&key]).await;
//!
//!     let token = key.sign(&TestTokenBuilder::new().issuer("https://issuer.test").build());
//!     Ok(())
//! }
//! ```

pub mod jwks;
pub mod keys;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use jwks::*;
pub use keys::*;
pub use server_harness::*;
pub use token_builders::*;
