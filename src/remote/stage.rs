//! The remote provider stage.

use crate::circuit_breaker::BreakerGuard;
use crate::core::{
    ArcRemoteProvider, CancellationToken, DeviceInfo, RemoteProviderRequest,
    RemoteProviderResponse, RiskError, RiskSignals, ScoringContext,
};
use crate::remote::merge::{merge_signals, AsnMergeStrategy, MergeStrategy};
use crate::remote::policy::{ExecutionPolicy, FailurePolicy, RemoteFallback};
use crate::remote::sanitize::{sanitize_response, sanitize_signals};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maps a sanitized provider payload to risk signals.
pub type ResponseMapper =
    Arc<dyn Fn(&RemoteProviderResponse) -> Result<RiskSignals, RiskError> + Send + Sync>;

/// The default mapper: a field-by-field copy.
pub fn default_response_mapper(response: &RemoteProviderResponse) -> Result<RiskSignals, RiskError> {
    Ok(RiskSignals {
        is_vpn: response.is_vpn,
        is_tor: response.is_tor,
        is_proxy: response.is_proxy,
        asn: response.asn.clone(),
        reputation_score: response.reputation_score,
        velocity_score: response.velocity_score,
        ..RiskSignals::default()
    })
}

/// The result of running the stage.
#[derive(Debug)]
pub struct RemoteStageOutput {
    /// The signals to score with.
    pub signals: RiskSignals,
    /// Set when the provider's answer was not used.
    pub fallback: Option<RemoteFallback>,
}

impl RemoteStageOutput {
    /// Returns `true` if the stage fell back.
    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Builder for creating a `RemoteProviderStage`.
pub struct RemoteProviderStageBuilder {
    provider: ArcRemoteProvider,
    execution_policy: Option<ExecutionPolicy>,
    timeout: Option<Duration>,
    failure_policy: FailurePolicy,
    fallback_signals: Option<RiskSignals>,
    merge_strategy: MergeStrategy,
    asn_merge_strategy: AsnMergeStrategy,
    response_mapper: Option<ResponseMapper>,
}

impl RemoteProviderStageBuilder {
    /// Creates a new builder for `provider`.
    pub fn new(provider: ArcRemoteProvider) -> Self {
        Self {
            provider,
            execution_policy: None,
            timeout: None,
            failure_policy: FailurePolicy::default(),
            fallback_signals: None,
            merge_strategy: MergeStrategy::default(),
            asn_merge_strategy: AsnMergeStrategy::default(),
            response_mapper: None,
        }
    }

    /// Sets the execution policy. Conflicts with [`Self::with_timeout`].
    pub fn with_execution_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.execution_policy = Some(policy);
        self
    }

    /// Puts a circuit breaker in front of the provider.
    pub fn with_circuit_breaker(self, guard: Arc<BreakerGuard>) -> Self {
        self.with_execution_policy(ExecutionPolicy::CircuitBreaker(guard))
    }

    /// Sets a plain call timeout. Conflicts with [`Self::with_execution_policy`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Sets the signals merged in under [`FailurePolicy::FailClosed`].
    pub fn with_fallback_signals(mut self, signals: RiskSignals) -> Self {
        self.fallback_signals = Some(signals);
        self
    }

    /// Sets the merge strategy.
    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.merge_strategy = strategy;
        self
    }

    /// Sets the ASN precedence.
    pub fn with_asn_merge_strategy(mut self, strategy: AsnMergeStrategy) -> Self {
        self.asn_merge_strategy = strategy;
        self
    }

    /// Replaces the default field-copy mapper.
    pub fn with_response_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&RemoteProviderResponse) -> Result<RiskSignals, RiskError> + Send + Sync + 'static,
    {
        self.response_mapper = Some(Arc::new(mapper));
        self
    }

    /// Builds the stage.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::Configuration`] if both an execution policy and
    /// a timeout are set, if the timeout is zero, or if `FailClosed` is
    /// requested without valid fallback signals.
    pub fn build(self) -> Result<RemoteProviderStage, RiskError> {
        let execution_policy = match (self.execution_policy, self.timeout) {
            (Some(_), Some(_)) => {
                return Err(RiskError::configuration(
                    "execution policy and timeout are mutually exclusive",
                ))
            }
            (Some(policy), None) => policy,
            (None, Some(timeout)) => ExecutionPolicy::Timeout(timeout),
            (None, None) => ExecutionPolicy::default(),
        };
        if execution_policy.call_timeout().is_zero() {
            return Err(RiskError::configuration(
                "remote provider timeout must be greater than zero",
            ));
        }

        let fallback_signals = match self.fallback_signals {
            Some(signals) => Some(sanitize_signals(signals).map_err(|e| {
                RiskError::configuration(format!("invalid fallback signals: {}", e))
            })?),
            None => None,
        };
        if self.failure_policy == FailurePolicy::FailClosed && fallback_signals.is_none() {
            return Err(RiskError::configuration(
                "fail-closed remote provider requires fallback signals",
            ));
        }

        Ok(RemoteProviderStage {
            provider: self.provider,
            execution_policy,
            failure_policy: self.failure_policy,
            fallback_signals,
            merge_strategy: self.merge_strategy,
            asn_merge_strategy: self.asn_merge_strategy,
            response_mapper: self
                .response_mapper
                .unwrap_or_else(|| Arc::new(default_response_mapper)),
        })
    }
}

/// Enriches local signals with an external provider.
///
/// The stage never fails: any provider error, timeout, open circuit,
/// cancellation or rejected payload is absorbed according to the
/// [`FailurePolicy`] and reported in [`RemoteStageOutput::fallback`].
///
/// # Example
///
/// ```rust,ignore
/// use riskgate::remote::{FailurePolicy, MergeStrategy, RemoteProviderStage};
///
/// let stage = RemoteProviderStage::builder(provider)
///     .with_timeout(Duration::from_millis(500))
///     .with_failure_policy(FailurePolicy::FailClosed)
///     .with_fallback_signals(RiskSignals::new().with_reputation(20.0))
///     .with_merge_strategy(MergeStrategy::MaxRisk)
///     .build()?;
///
/// let output = stage.execute(&device, &context, &cancel).await;
/// ```
#[derive(Clone)]
pub struct RemoteProviderStage {
    provider: ArcRemoteProvider,
    execution_policy: ExecutionPolicy,
    failure_policy: FailurePolicy,
    fallback_signals: Option<RiskSignals>,
    merge_strategy: MergeStrategy,
    asn_merge_strategy: AsnMergeStrategy,
    response_mapper: ResponseMapper,
}

impl RemoteProviderStage {
    /// Creates a new builder.
    pub fn builder(provider: ArcRemoteProvider) -> RemoteProviderStageBuilder {
        RemoteProviderStageBuilder::new(provider)
    }

    /// Returns the provider name.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Returns the failure policy.
    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Returns the execution policy.
    pub fn execution_policy(&self) -> &ExecutionPolicy {
        &self.execution_policy
    }

    /// Returns a copy of the stage with a different failure policy, for a
    /// single execution.
    pub fn with_failure_policy_override(&self, policy: FailurePolicy) -> Self {
        Self {
            failure_policy: policy,
            ..self.clone()
        }
    }

    /// Fetches, sanitizes, maps and merges the provider's signals.
    pub async fn execute(
        &self,
        device: &DeviceInfo,
        context: &ScoringContext,
        cancel: &CancellationToken,
    ) -> RemoteStageOutput {
        let local = context.signals.as_ref();

        match self.fetch_signals(device, context, cancel).await {
            Ok(remote) => {
                tracing::debug!(
                    provider = %self.provider.name(),
                    strategy = ?self.merge_strategy,
                    "Merging remote signals"
                );
                RemoteStageOutput {
                    signals: merge_signals(
                        local,
                        &remote,
                        self.merge_strategy,
                        self.asn_merge_strategy,
                    ),
                    fallback: None,
                }
            }
            Err(cause) => self.fall_back(local, cause),
        }
    }

    async fn fetch_signals(
        &self,
        device: &DeviceInfo,
        context: &ScoringContext,
        cancel: &CancellationToken,
    ) -> Result<RiskSignals, RiskError> {
        if cancel.is_cancelled() {
            return Err(RiskError::Cancelled);
        }
        let response = self.call_provider(device, context, cancel).await?;
        let mapped = (self.response_mapper)(&response)?;
        Ok(sanitize_signals(mapped)?)
    }

    /// One bounded provider call. The payload is sanitized inside the
    /// breaker so that a corrupt answer counts as a failure.
    async fn call_provider(
        &self,
        device: &DeviceInfo,
        context: &ScoringContext,
        cancel: &CancellationToken,
    ) -> Result<RemoteProviderResponse, RiskError> {
        let child = cancel.child_token();
        let timeout = self.execution_policy.call_timeout();
        let request = RemoteProviderRequest {
            device,
            context,
            cancel: child.clone(),
        };

        let call = async {
            let response: Result<RemoteProviderResponse, RiskError> = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(RiskError::Cancelled),
                result = tokio::time::timeout(timeout, self.provider.fetch(request)) => {
                    match result {
                        Ok(result) => result,
                        Err(_) => {
                            child.cancel();
                            Err(RiskError::timeout(self.provider.name(), timeout))
                        }
                    }
                }
            };
            response.and_then(|r| sanitize_response(r).map_err(RiskError::from))
        };

        match &self.execution_policy {
            ExecutionPolicy::Timeout(_) => call.await,
            ExecutionPolicy::CircuitBreaker(guard) => guard.call(call).await,
        }
    }

    fn fall_back(&self, local: Option<&RiskSignals>, cause: RiskError) -> RemoteStageOutput {
        let signals = match self.failure_policy {
            FailurePolicy::FailOpen => merge_signals(
                local,
                &RiskSignals::default(),
                MergeStrategy::LocalWins,
                self.asn_merge_strategy,
            ),
            FailurePolicy::FailClosed => merge_signals(
                local,
                self.fallback_signals.as_ref().unwrap_or(&RiskSignals::default()),
                MergeStrategy::MaxRisk,
                self.asn_merge_strategy,
            ),
        };

        tracing::warn!(
            provider = %self.provider.name(),
            policy = %self.failure_policy,
            error_kind = cause.kind(),
            error = %cause,
            "Remote provider unavailable; using fallback signals"
        );

        RemoteStageOutput {
            signals,
            fallback: Some(RemoteFallback {
                policy: self.failure_policy,
                cause,
            }),
        }
    }
}

impl fmt::Debug for RemoteProviderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProviderStage")
            .field("provider", &self.provider.name())
            .field("execution_policy", &self.execution_policy)
            .field("failure_policy", &self.failure_policy)
            .field("merge_strategy", &self.merge_strategy)
            .field("asn_merge_strategy", &self.asn_merge_strategy)
            .finish()
    }
}

impl fmt::Debug for RemoteProviderStageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProviderStageBuilder")
            .field("provider", &self.provider.name())
            .field("execution_policy", &self.execution_policy)
            .field("timeout", &self.timeout)
            .field("failure_policy", &self.failure_policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBehavior, MockRiskProvider};
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use crate::core::{DeviceType, ManualClock};
    use serde_json::json;

    fn device() -> DeviceInfo {
        DeviceInfo::new("dev-1", DeviceType::Desktop)
    }

    fn context(local: RiskSignals) -> ScoringContext {
        ScoringContext::new(device())
            .with_ip("203.0.113.7")
            .with_signals(local)
    }

    fn reputation(score: f64) -> RemoteProviderResponse {
        RemoteProviderResponse {
            reputation_score: Some(score),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_max_risk_reputation_scenario() {
        let provider = Arc::new(MockRiskProvider::new().with_response(reputation(5.0)));
        let stage = RemoteProviderStage::builder(provider)
            .with_merge_strategy(MergeStrategy::MaxRisk)
            .build()
            .unwrap();

        let output = stage
            .execute(
                &device(),
                &context(RiskSignals::new().with_reputation(80.0)),
                &CancellationToken::new(),
            )
            .await;

        assert!(!output.is_degraded());
        assert_eq!(output.signals.reputation_score, Some(5.0));
    }

    #[test]
    fn test_build_rejects_policy_and_timeout() {
        let err = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new()))
            .with_execution_policy(ExecutionPolicy::Timeout(Duration::from_secs(1)))
            .with_timeout(Duration::from_secs(1))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_build_rejects_fail_closed_without_fallback() {
        let err = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new()))
            .with_failure_policy(FailurePolicy::FailClosed)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");

        let err = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new()))
            .with_failure_policy(FailurePolicy::FailClosed)
            .with_fallback_signals(RiskSignals::new().with_reputation(f64::NAN))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_build_rejects_zero_timeout() {
        assert!(RemoteProviderStage::builder(Arc::new(MockRiskProvider::new()))
            .with_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[tokio::test]
    async fn test_fail_open_keeps_local_signals() {
        let stage = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new_failing("503")))
            .build()
            .unwrap();
        let local = RiskSignals::new().with_reputation(80.0).with_vpn(true);

        let output = stage
            .execute(&device(), &context(local.clone()), &CancellationToken::new())
            .await;

        assert_eq!(output.signals, local);
        let fallback = output.fallback.unwrap();
        assert_eq!(fallback.policy, FailurePolicy::FailOpen);
        assert_eq!(fallback.cause.kind(), "provider_failed");
        assert!(fallback.is_fatal(true));
        assert!(!fallback.is_fatal(false));
    }

    #[tokio::test]
    async fn test_fail_closed_merges_fallback() {
        let stage = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new_failing("503")))
            .with_failure_policy(FailurePolicy::FailClosed)
            .with_fallback_signals(RiskSignals::new().with_reputation(20.0).with_proxy(true))
            .build()
            .unwrap();

        let output = stage
            .execute(
                &device(),
                &context(RiskSignals::new().with_reputation(80.0)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(output.signals.reputation_score, Some(20.0));
        assert_eq!(output.signals.is_proxy, Some(true));
        assert!(!output.fallback.unwrap().is_fatal(true));
    }

    #[tokio::test]
    async fn test_failure_policy_override() {
        let stage = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new_failing("503")))
            .with_failure_policy(FailurePolicy::FailClosed)
            .with_fallback_signals(RiskSignals::new().with_reputation(20.0))
            .build()
            .unwrap()
            .with_failure_policy_override(FailurePolicy::FailOpen);

        let output = stage
            .execute(
                &device(),
                &context(RiskSignals::new().with_reputation(80.0)),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(output.signals.reputation_score, Some(80.0));
        assert_eq!(output.fallback.unwrap().policy, FailurePolicy::FailOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back() {
        let provider = Arc::new(MockRiskProvider::new_hanging());
        let stage = RemoteProviderStage::builder(provider.clone())
            .with_timeout(Duration::from_millis(100))
            .build()
            .unwrap();

        let output = stage
            .execute(&device(), &context(RiskSignals::new()), &CancellationToken::new())
            .await;

        let fallback = output.fallback.unwrap();
        assert_eq!(fallback.cause.kind(), "timeout");
        assert!(fallback.is_fatal(true));
        assert!(!fallback.is_fatal(false));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation() {
        let stage = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new_hanging()))
            .build()
            .unwrap();
        let token = CancellationToken::new();
        let ctx = context(RiskSignals::new());
        let dev = device();

        let (output, _) = tokio::join!(stage.execute(&dev, &ctx, &token), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let fallback = output.fallback.unwrap();
        assert!(fallback.is_cancelled());
        assert!(fallback.is_fatal(false));
    }

    #[tokio::test]
    async fn test_non_finite_payload_is_integrity_violation() {
        let provider = Arc::new(MockRiskProvider::new().with_response(reputation(f64::NAN)));
        let stage = RemoteProviderStage::builder(provider).build().unwrap();

        let output = stage
            .execute(&device(), &context(RiskSignals::new()), &CancellationToken::new())
            .await;

        let fallback = output.fallback.unwrap();
        assert!(fallback.is_integrity_violation());
        assert!(fallback.is_fatal(false));
    }

    #[tokio::test]
    async fn test_mapper_output_is_sanitized() {
        let stage = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new()))
            .with_response_mapper(|_| Ok(RiskSignals::new().with_velocity(f64::INFINITY)))
            .build()
            .unwrap();

        let output = stage
            .execute(&device(), &context(RiskSignals::new()), &CancellationToken::new())
            .await;
        assert!(output.fallback.unwrap().is_integrity_violation());
    }

    #[tokio::test]
    async fn test_custom_mapper() {
        let provider = Arc::new(MockRiskProvider::new().with_response(RemoteProviderResponse {
            is_tor: Some(true),
            asn: Some("AS64500".to_string()),
            ..Default::default()
        }));
        let stage = RemoteProviderStage::builder(provider)
            .with_response_mapper(|response| {
                let mut signals = default_response_mapper(response)?;
                signals
                    .external_signals
                    .insert("vendor".to_string(), json!("acme"));
                Ok(signals)
            })
            .build()
            .unwrap();

        let output = stage
            .execute(&device(), &context(RiskSignals::new()), &CancellationToken::new())
            .await;

        assert_eq!(output.signals.is_tor, Some(true));
        assert_eq!(output.signals.asn.as_deref(), Some("AS64500"));
        assert_eq!(output.signals.external_signals["vendor"], json!("acme"));
    }

    #[tokio::test]
    async fn test_circuit_breaker_stops_calling_provider() {
        let clock = Arc::new(ManualClock::new(0));
        let guard = Arc::new(BreakerGuard::with_clock(
            "mock",
            CircuitBreakerConfig::new()
                .with_minimum_request_count(2)
                .with_failure_rate_threshold_percent(50.0),
            clock,
        ));
        let provider = Arc::new(MockRiskProvider::new_failing("503"));
        let stage = RemoteProviderStage::builder(provider.clone())
            .with_circuit_breaker(guard.clone())
            .build()
            .unwrap();
        let ctx = context(RiskSignals::new());

        for _ in 0..2 {
            stage.execute(&device(), &ctx, &CancellationToken::new()).await;
        }
        assert_eq!(guard.state().state, CircuitState::Open);

        let output = stage.execute(&device(), &ctx, &CancellationToken::new()).await;
        assert_eq!(output.fallback.unwrap().cause.kind(), "circuit_open");
        assert_eq!(provider.call_count(), 2);

        provider.set_behavior(MockBehavior::Respond(reputation(50.0)));
        guard.reset();
        let output = stage.execute(&device(), &ctx, &CancellationToken::new()).await;
        assert!(!output.is_degraded());
    }
}
