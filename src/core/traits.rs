//! Collaborator traits for the riskgate library.
//!
//! The decision engine does not fetch vendor signals or fingerprint devices
//! itself. It consumes these traits, implemented by the embedding service
//! (or by [`crate::backends::mock`] in tests).

use crate::core::cancel::CancellationToken;
use crate::core::error::RiskError;
use crate::core::types::{DeviceInfo, LoginAttempt, ScoringContext};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// A request to an external risk-signal provider.
#[derive(Debug, Clone)]
pub struct RemoteProviderRequest<'a> {
    /// The device being assessed.
    pub device: &'a DeviceInfo,
    /// The scoring context built so far.
    pub context: &'a ScoringContext,
    /// Cancelled when the caller gives up or the call times out.
    pub cancel: CancellationToken,
}

/// The vendor payload returned by a remote provider.
///
/// Every field is optional; vendors commonly return partial data. Values
/// are untrusted until they pass [`crate::remote::sanitize_response`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProviderResponse {
    /// VPN detected.
    pub is_vpn: Option<bool>,
    /// Tor exit node detected.
    pub is_tor: Option<bool>,
    /// Open proxy detected.
    pub is_proxy: Option<bool>,
    /// Autonomous system label.
    pub asn: Option<String>,
    /// IP reputation, 0 (worst) to 100 (best).
    pub reputation_score: Option<f64>,
    /// Velocity, 0 (calm) to 100 (burst).
    pub velocity_score: Option<f64>,
}

/// An external risk-signal provider.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync` for use in async contexts.
/// - The call is raced against a timeout and the request's cancellation
///   token; long-running implementations should watch `request.cancel`.
/// - Errors are absorbed by the remote provider stage according to its
///   failure policy, so implementations should return `RiskError` rather
///   than panic.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use riskgate::core::{RemoteProviderRequest, RemoteProviderResponse, RemoteRiskProvider, RiskError};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct IpIntel;
///
/// #[async_trait]
/// impl RemoteRiskProvider for IpIntel {
///     fn name(&self) -> &str {
///         "ip-intel"
///     }
///
///     async fn fetch(
///         &self,
///         request: RemoteProviderRequest<'_>,
///     ) -> Result<RemoteProviderResponse, RiskError> {
///         // Query the vendor...
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait RemoteRiskProvider: Send + Sync + Debug {
    /// Returns a stable, human-readable provider name.
    fn name(&self) -> &str;

    /// Fetches risk signals for the request.
    async fn fetch(
        &self,
        request: RemoteProviderRequest<'_>,
    ) -> Result<RemoteProviderResponse, RiskError>;
}

/// The device fingerprint collaborator.
#[async_trait]
pub trait FingerprintProvider: Send + Sync + Debug {
    /// Produces device information for the attempt.
    async fn collect(
        &self,
        attempt: &LoginAttempt,
        cancel: &CancellationToken,
    ) -> Result<DeviceInfo, RiskError>;
}

/// An arc-wrapped remote provider for shared ownership.
pub type ArcRemoteProvider = Arc<dyn RemoteRiskProvider>;

/// An arc-wrapped fingerprint provider for shared ownership.
pub type ArcFingerprintProvider = Arc<dyn FingerprintProvider>;
