//! Mock collaborators for testing.
//!
//! This module provides a configurable remote risk provider and a
//! fingerprinter that can be used in tests and demos to simulate vendor
//! payloads, outages and slow responses without a real integration.

use crate::core::{
    CancellationToken, DeviceInfo, DeviceType, FingerprintProvider, LoginAttempt,
    RemoteProviderRequest, RemoteProviderResponse, RemoteRiskProvider, RiskError,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// How the mock provider answers.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Return this payload.
    Respond(RemoteProviderResponse),
    /// Return `RiskError::ProviderFailed` with this message.
    Fail(String),
    /// Never answer; only cancellation or a timeout ends the call.
    Hang,
}

/// A mock remote risk provider.
///
/// # Examples
///
/// ```rust
/// use riskgate::backends::MockRiskProvider;
/// use riskgate::core::RemoteProviderResponse;
/// use std::time::Duration;
///
/// // A provider that flags every request as coming from Tor
/// let provider = MockRiskProvider::new().with_response(RemoteProviderResponse {
///     is_tor: Some(true),
///     ..Default::default()
/// });
///
/// // A provider that is down
/// let provider = MockRiskProvider::new_failing("503 service unavailable");
///
/// // A slow provider
/// let provider = MockRiskProvider::new().with_latency(Duration::from_millis(250));
/// ```
#[derive(Debug)]
pub struct MockRiskProvider {
    name: String,
    behavior: RwLock<MockBehavior>,
    latency: Option<Duration>,
    call_count: AtomicU64,
}

impl MockRiskProvider {
    /// Creates a provider that returns an empty payload.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            behavior: RwLock::new(MockBehavior::Respond(RemoteProviderResponse::default())),
            latency: None,
            call_count: AtomicU64::new(0),
        }
    }

    /// Creates a provider that always fails.
    pub fn new_failing(message: impl Into<String>) -> Self {
        Self::new().with_behavior(MockBehavior::Fail(message.into()))
    }

    /// Creates a provider that never answers.
    pub fn new_hanging() -> Self {
        Self::new().with_behavior(MockBehavior::Hang)
    }

    /// Sets the provider name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the payload to return.
    pub fn with_response(self, response: RemoteProviderResponse) -> Self {
        self.with_behavior(MockBehavior::Respond(response))
    }

    /// Sets the behavior.
    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = RwLock::new(behavior);
        self
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Changes the behavior of a shared provider.
    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self
            .behavior
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = behavior;
    }

    /// Returns the number of fetches performed.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn behavior(&self) -> MockBehavior {
        self.behavior
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Default for MockRiskProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteRiskProvider for MockRiskProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        request: RemoteProviderRequest<'_>,
    ) -> Result<RemoteProviderResponse, RiskError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = request.cancel.cancelled() => return Err(RiskError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        match self.behavior() {
            MockBehavior::Respond(response) => Ok(response),
            MockBehavior::Fail(message) => Err(RiskError::provider_failed(&self.name, message)),
            MockBehavior::Hang => {
                request.cancel.cancelled().await;
                Err(RiskError::Cancelled)
            }
        }
    }
}

/// A mock device fingerprinter.
///
/// Returns a fixed device, filling in the attempt's IP and user agent when
/// the device does not carry its own.
#[derive(Debug)]
pub struct MockFingerprinter {
    device: DeviceInfo,
    failure: Option<String>,
    latency: Option<Duration>,
    call_count: AtomicU64,
}

impl MockFingerprinter {
    /// Creates a fingerprinter that reports a known desktop browser.
    pub fn new() -> Self {
        Self::with_device(
            DeviceInfo::new("mock-device", DeviceType::Desktop)
                .with_os("linux")
                .with_browser("firefox"),
        )
    }

    /// Creates a fingerprinter that reports `device`.
    pub fn with_device(device: DeviceInfo) -> Self {
        Self {
            device,
            failure: None,
            latency: None,
            call_count: AtomicU64::new(0),
        }
    }

    /// Creates a fingerprinter that always fails.
    pub fn new_failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::new()
        }
    }

    /// Sets the simulated latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of collections performed.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }
}

impl Default for MockFingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FingerprintProvider for MockFingerprinter {
    async fn collect(
        &self,
        attempt: &LoginAttempt,
        cancel: &CancellationToken,
    ) -> Result<DeviceInfo, RiskError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RiskError::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }

        if let Some(message) = &self.failure {
            return Err(RiskError::fingerprint(message.clone()));
        }

        let mut device = self.device.clone();
        if device.ip.is_none() {
            device.ip = attempt.ip.clone();
        }
        if device.user_agent.is_none() {
            device.user_agent = attempt.user_agent.clone();
        }
        Ok(device)
    }
}
