//! Collaborator implementations.
//!
//! The engine consumes remote signal providers and device fingerprinters
//! through the traits in [`crate::core::traits`]. This module ships mock
//! implementations of both for tests and demos.
//!
//! ## Available Backends
//!
//! - [`mock`] - A mock remote provider and a mock fingerprinter
//!
//! ## Implementing a Custom Provider
//!
//! To integrate a vendor, implement the `RemoteRiskProvider` trait:
//!
//! ```rust,ignore
//! use riskgate::core::{RemoteProviderRequest, RemoteProviderResponse, RemoteRiskProvider, RiskError};
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! pub struct MyVendor {
//!     // Your client's configuration
//! }
//!
//! #[async_trait]
//! impl RemoteRiskProvider for MyVendor {
//!     fn name(&self) -> &str {
//!         "my-vendor"
//!     }
//!
//!     async fn fetch(
//!         &self,
//!         request: RemoteProviderRequest<'_>,
//!     ) -> Result<RemoteProviderResponse, RiskError> {
//!         // Call the vendor, watching request.cancel
//!         todo!()
//!     }
//! }
//! ```

pub mod mock;

// Re-exports
pub use mock::{MockBehavior, MockFingerprinter, MockRiskProvider};
