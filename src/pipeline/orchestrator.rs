//! The security pipeline orchestrator.

use crate::audit::{ArcAuditLogger, AuditEvent, TracingAuditLogger};
use crate::core::{
    ArcFingerprintProvider, AssessmentRecord, CancellationToken, DeviceInfo, FingerprintProvider,
    LoginAttempt, PipelineError, PipelineStep, RiskAssessmentResult, RiskError, RiskLevel,
    ScoringContext, SecurityPipelineResult,
};
use crate::pipeline::overrides::{ArcOverrideSource, EnvOverrides, RuntimeOverrides};
use crate::pipeline::plugins::{
    check_plugin_assessment, check_plugin_signals, non_finite_signal, panic_message, run_hook,
    sort_plugins, validate_plugins, AssessmentContext, ContextBuilderPlugin,
};
use crate::policy::{decision_hint_for, RiskThresholds, RuleContext, RuleEngine, RuleEvaluation};
use crate::remote::{FailurePolicy, RemoteProviderStage};
use crate::scoring::{FactorConfig, RiskScoringEngine};

use chrono::Utc;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// Default limit on registered plugins.
pub const DEFAULT_MAX_PLUGINS: usize = 32;

/// Configuration for the security pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityPipelineConfig {
    /// Pipeline version. Version 2 enables remote enrichment.
    pub version: u8,

    /// Convert failures into a critical block instead of returning them.
    pub fail_closed: bool,

    /// Time budget of the fingerprint collaborator.
    pub fingerprint_timeout_ms: u64,

    /// Maximum number of plugins.
    pub max_plugins: usize,

    /// Validate every plugin hook's output as soon as it returns.
    pub development_mode: bool,

    /// Route scoring through the score caches.
    pub use_score_cache: bool,

    /// Score thresholds of the risk levels.
    pub thresholds: RiskThresholds,
}

impl Default for SecurityPipelineConfig {
    fn default() -> Self {
        Self {
            version: 2,
            fail_closed: true,
            fingerprint_timeout_ms: 3_000,
            max_plugins: DEFAULT_MAX_PLUGINS,
            development_mode: false,
            use_score_cache: true,
            thresholds: RiskThresholds::default(),
        }
    }
}

impl SecurityPipelineConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pipeline version.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Enables or disables fail-closed mode.
    pub fn with_fail_closed(mut self, enabled: bool) -> Self {
        self.fail_closed = enabled;
        self
    }

    /// Sets the fingerprint timeout.
    pub fn with_fingerprint_timeout(mut self, timeout: Duration) -> Self {
        self.fingerprint_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the plugin limit.
    pub fn with_max_plugins(mut self, max: usize) -> Self {
        self.max_plugins = max;
        self
    }

    /// Enables or disables development mode.
    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }

    /// Enables or disables the score caches.
    pub fn with_score_cache(mut self, enabled: bool) -> Self {
        self.use_score_cache = enabled;
        self
    }

    /// Sets the risk thresholds.
    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Returns the fingerprint timeout.
    pub fn fingerprint_timeout(&self) -> Duration {
        Duration::from_millis(self.fingerprint_timeout_ms)
    }
}

/// Builder for creating a `SecurityPipeline`.
pub struct SecurityPipelineBuilder {
    config: SecurityPipelineConfig,
    fingerprinter: Option<ArcFingerprintProvider>,
    scoring: Option<Arc<RiskScoringEngine>>,
    remote_stage: Option<RemoteProviderStage>,
    rules: Option<RuleEngine>,
    plugins: Vec<ContextBuilderPlugin>,
    factors: Vec<FactorConfig>,
    audit: Option<ArcAuditLogger>,
    overrides: Option<ArcOverrideSource>,
}

impl SecurityPipelineBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config: SecurityPipelineConfig::default(),
            fingerprinter: None,
            scoring: None,
            remote_stage: None,
            rules: None,
            plugins: Vec::new(),
            factors: Vec::new(),
            audit: None,
            overrides: None,
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: SecurityPipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the fingerprint collaborator.
    pub fn with_fingerprint_provider<F: FingerprintProvider + 'static>(self, provider: F) -> Self {
        self.with_arc_fingerprint_provider(Arc::new(provider))
    }

    /// Sets the fingerprint collaborator wrapped in an Arc.
    pub fn with_arc_fingerprint_provider(mut self, provider: ArcFingerprintProvider) -> Self {
        self.fingerprinter = Some(provider);
        self
    }

    /// Sets the scoring engine, which may be shared between pipelines.
    pub fn with_scoring_engine(mut self, engine: Arc<RiskScoringEngine>) -> Self {
        self.scoring = Some(engine);
        self
    }

    /// Sets the remote provider stage. Used by version 2 pipelines only.
    pub fn with_remote_stage(mut self, stage: RemoteProviderStage) -> Self {
        self.remote_stage = Some(stage);
        self
    }

    /// Sets the local rule engine. Defaults to [`RuleEngine::default_rules`].
    pub fn with_rule_engine(mut self, rules: RuleEngine) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Adds a plugin.
    pub fn add_plugin(mut self, plugin: ContextBuilderPlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Scores with these factors instead of the built-in weights.
    pub fn with_factors(mut self, factors: Vec<FactorConfig>) -> Self {
        self.factors = factors;
        self
    }

    /// Sets the audit logger. Defaults to [`TracingAuditLogger`].
    pub fn with_audit_logger(mut self, logger: ArcAuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    /// Sets the override source. Defaults to [`EnvOverrides`].
    pub fn with_override_source(mut self, source: ArcOverrideSource) -> Self {
        self.overrides = Some(source);
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::Configuration`] for an unknown version, a zero
    /// fingerprint timeout, or a plugin list that breaks the registration
    /// limits (count, id format, uniqueness, priority range).
    pub fn build(self) -> Result<SecurityPipeline, RiskError> {
        if !matches!(self.config.version, 1 | 2) {
            return Err(RiskError::configuration(format!(
                "pipeline version must be 1 or 2, got {}",
                self.config.version
            )));
        }
        if self.config.fingerprint_timeout_ms == 0 {
            return Err(RiskError::configuration(
                "fingerprint timeout must be greater than zero",
            ));
        }
        validate_plugins(&self.plugins, self.config.max_plugins)?;

        if self.config.version == 1 && self.remote_stage.is_some() {
            tracing::warn!("Remote stage configured on a version 1 pipeline; it will not be used");
        }

        let mut plugins = self.plugins;
        sort_plugins(&mut plugins);

        let config = SecurityPipelineConfig {
            thresholds: self.config.thresholds.validated(),
            ..self.config
        };

        Ok(SecurityPipeline {
            config,
            fingerprinter: self.fingerprinter,
            scoring: self
                .scoring
                .unwrap_or_else(|| Arc::new(RiskScoringEngine::new())),
            remote_stage: self.remote_stage,
            rules: self.rules.unwrap_or_else(RuleEngine::default_rules),
            plugins,
            factors: self.factors,
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditLogger)),
            overrides: self.overrides.unwrap_or_else(|| Arc::new(EnvOverrides)),
        })
    }
}

impl Default for SecurityPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// What step 2 hands to the later steps.
struct Assessment {
    context: ScoringContext,
    score: u8,
    rule_context: RuleContext,
    evaluation: RuleEvaluation,
}

/// Turns a login attempt into an allow, mfa or block decision.
///
/// One execution runs four steps:
///
/// 1. **fingerprint**: the injected device, or the fingerprint
///    collaborator under a timeout;
/// 2. **risk assessment**: scoring context plugin hooks, remote
///    enrichment (version 2), weighted scoring, rule context plugin hooks
///    and local rules;
/// 3. **plugin extension**: assessment context plugin hooks;
/// 4. **decision**: final numeric check, level and action, audit.
///
/// Any error, timeout, cancellation, panic or non-finite number fails the
/// execution closed: with `fail_closed` (the default) the caller receives
/// a score of 100, level `critical` and a `block` whose reason names the
/// failing step. Every failure and every `mfa` or `block` decision is
/// audited exactly once.
///
/// # Example
///
/// ```rust,ignore
/// use riskgate::pipeline::SecurityPipeline;
///
/// let pipeline = SecurityPipeline::builder()
///     .with_fingerprint_provider(fingerprinter)
///     .with_remote_stage(stage)
///     .build()?;
///
/// let result = pipeline.execute(&attempt).await?;
/// if result.risk_assessment.is_blocked() {
///     // deny the login
/// }
/// ```
pub struct SecurityPipeline {
    config: SecurityPipelineConfig,
    fingerprinter: Option<ArcFingerprintProvider>,
    scoring: Arc<RiskScoringEngine>,
    remote_stage: Option<RemoteProviderStage>,
    rules: RuleEngine,
    plugins: Vec<ContextBuilderPlugin>,
    factors: Vec<FactorConfig>,
    audit: ArcAuditLogger,
    overrides: ArcOverrideSource,
}

impl SecurityPipeline {
    /// Creates a new builder.
    pub fn builder() -> SecurityPipelineBuilder {
        SecurityPipelineBuilder::new()
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &SecurityPipelineConfig {
        &self.config
    }

    /// Returns the scoring engine.
    pub fn scoring_engine(&self) -> &Arc<RiskScoringEngine> {
        &self.scoring
    }

    /// Returns the plugins in execution order.
    pub fn plugins(&self) -> &[ContextBuilderPlugin] {
        &self.plugins
    }

    /// Evaluates an attempt.
    ///
    /// Only returns `Err` when fail-closed mode is off.
    pub async fn execute(
        &self,
        attempt: &LoginAttempt,
    ) -> Result<SecurityPipelineResult, PipelineError> {
        self.run(attempt, None, &CancellationToken::new()).await
    }

    /// Evaluates an attempt, giving up when `cancel` fires.
    pub async fn execute_with_cancel(
        &self,
        attempt: &LoginAttempt,
        cancel: &CancellationToken,
    ) -> Result<SecurityPipelineResult, PipelineError> {
        self.run(attempt, None, cancel).await
    }

    /// Evaluates an attempt for a known device, skipping the fingerprint
    /// collaborator.
    pub async fn execute_with_device(
        &self,
        attempt: &LoginAttempt,
        device: DeviceInfo,
        cancel: &CancellationToken,
    ) -> Result<SecurityPipelineResult, PipelineError> {
        self.run(attempt, Some(device), cancel).await
    }

    async fn run(
        &self,
        attempt: &LoginAttempt,
        injected: Option<DeviceInfo>,
        cancel: &CancellationToken,
    ) -> Result<SecurityPipelineResult, PipelineError> {
        let overrides = self.overrides.read();
        tracing::debug!(
            request_id = %attempt.request_id,
            operation = %attempt.operation,
            overrides = ?overrides,
            "Security pipeline started"
        );

        let device = match guarded(
            PipelineStep::Fingerprint,
            self.fingerprint(attempt, injected, cancel),
        )
        .await
        {
            Ok(device) => device,
            Err(error) => return self.fail(attempt, None, error),
        };

        match self.evaluate(attempt, &device, cancel, overrides).await {
            Ok(risk_assessment) => Ok(SecurityPipelineResult {
                device_info: device,
                risk_assessment,
            }),
            Err(error) => self.fail(attempt, Some(device), error),
        }
    }

    async fn evaluate(
        &self,
        attempt: &LoginAttempt,
        device: &DeviceInfo,
        cancel: &CancellationToken,
        overrides: RuntimeOverrides,
    ) -> Result<RiskAssessmentResult, PipelineError> {
        let assessment = guarded(
            PipelineStep::RiskAssessment,
            self.assess(attempt, device, cancel, overrides),
        )
        .await?;

        ensure_active(cancel, PipelineStep::PluginExtension)?;
        let extended = guarded(PipelineStep::PluginExtension, async {
            self.extend(&assessment)
                .map_err(at(PipelineStep::PluginExtension))
        })
        .await?;

        ensure_active(cancel, PipelineStep::Decision)?;
        let result = guarded(PipelineStep::Decision, async {
            self.decide(device, &assessment, extended)
                .map_err(at(PipelineStep::Decision))
        })
        .await?;

        if result.decision_hint.requires_audit() {
            self.audit.log(&AuditEvent::decision(attempt, &result));
        }
        tracing::info!(
            request_id = %attempt.request_id,
            action = result.decision_hint.action.name(),
            risk_score = result.risk_score,
            risk_level = %result.risk_level,
            triggered_rules = ?result.triggered_rules,
            "Security decision made"
        );
        Ok(result)
    }

    async fn fingerprint(
        &self,
        attempt: &LoginAttempt,
        injected: Option<DeviceInfo>,
        cancel: &CancellationToken,
    ) -> Result<DeviceInfo, PipelineError> {
        let step = PipelineStep::Fingerprint;
        ensure_active(cancel, step)?;

        if let Some(device) = injected {
            return Ok(device);
        }
        let Some(fingerprinter) = &self.fingerprinter else {
            return Err(PipelineError::new(
                step,
                RiskError::fingerprint("no fingerprint provider configured"),
            ));
        };

        let timeout = self.config.fingerprint_timeout();
        let child = cancel.child_token();
        let collected = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RiskError::Cancelled),
            result = tokio::time::timeout(timeout, fingerprinter.collect(attempt, &child)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => {
                        child.cancel();
                        Err(RiskError::timeout("fingerprint", timeout))
                    }
                }
            }
        };
        collected.map_err(at(step))
    }

    async fn assess(
        &self,
        attempt: &LoginAttempt,
        device: &DeviceInfo,
        cancel: &CancellationToken,
        overrides: RuntimeOverrides,
    ) -> Result<Assessment, PipelineError> {
        use PipelineStep::{PluginExtension, RemoteProvider, RiskAssessment};

        ensure_active(cancel, RiskAssessment)?;

        let mut context = ScoringContext {
            device: device.clone(),
            geo: attempt.geo.clone(),
            ip: attempt.ip.clone(),
            signals: attempt.signals.clone(),
        };
        for plugin in &self.plugins {
            let Some(hook) = &plugin.extend_scoring_context else {
                continue;
            };
            context = run_hook(&plugin.id, hook.as_ref(), &context).map_err(at(PluginExtension))?;
            if self.config.development_mode {
                check_plugin_signals(&plugin.id, context.signals.as_ref())
                    .map_err(at(PluginExtension))?;
            }
        }

        if let Some(stage) = self.remote_stage_for(overrides) {
            let output = stage.execute(device, &context, cancel).await;
            if let Some(fallback) = output.fallback {
                let fail_closed = self.config.fail_closed && !overrides.force_fail_open;
                if fallback.is_fatal(fail_closed) {
                    return Err(PipelineError::new(RemoteProvider, fallback.cause));
                }
                tracing::info!(
                    request_id = %attempt.request_id,
                    provider = %stage.provider_name(),
                    policy = %fallback.policy,
                    cause = %fallback.cause,
                    "Continuing on remote fallback signals"
                );
            }
            context.signals = Some(output.signals);
        }

        if let Some((field, value)) = context.signals.as_ref().and_then(non_finite_signal) {
            return Err(PipelineError::new(
                RiskAssessment,
                RiskError::invalid_numeric(field, value),
            ));
        }

        let use_cache = self.config.use_score_cache;
        let score = if !self.factors.is_empty() && overrides.custom_factors_allowed() {
            self.scoring
                .calculate_risk_score_with_async_factors_and_cache(
                    &context,
                    &self.factors,
                    use_cache,
                    cancel,
                )
                .await
                .map_err(at(RiskAssessment))?
        } else {
            self.scoring
                .calculate_risk_score_with_cache(&context, None, use_cache)
        };
        ensure_active(cancel, RiskAssessment)?;

        let mut rule_context = RuleContext {
            device: device.clone(),
            geo: context.effective_geo().cloned(),
            ip: context.effective_ip().map(str::to_string),
            signals: context.signals.clone().unwrap_or_default(),
            risk_score: score,
            operation: attempt.operation.clone(),
            attributes: BTreeMap::new(),
        };
        for plugin in &self.plugins {
            let Some(hook) = &plugin.extend_rule_context else {
                continue;
            };
            rule_context =
                run_hook(&plugin.id, hook.as_ref(), &rule_context).map_err(at(PluginExtension))?;
            if self.config.development_mode {
                check_plugin_signals(&plugin.id, Some(&rule_context.signals))
                    .map_err(at(PluginExtension))?;
            }
        }

        let evaluation = self.rules.evaluate(&rule_context);
        tracing::debug!(
            request_id = %attempt.request_id,
            risk_score = score,
            triggered_rules = ?evaluation.triggered,
            escalation = ?evaluation.escalation,
            "Risk assessed"
        );

        Ok(Assessment {
            context,
            score,
            rule_context,
            evaluation,
        })
    }

    fn extend(&self, assessment: &Assessment) -> Result<AssessmentContext, RiskError> {
        let mut context = AssessmentContext {
            risk_score: f64::from(assessment.score),
            triggered_rules: assessment.evaluation.triggered.clone(),
            minimum_level: None,
            signals: assessment.rule_context.signals.clone(),
            attributes: assessment.rule_context.attributes.clone(),
        };
        for plugin in &self.plugins {
            let Some(hook) = &plugin.extend_assessment_context else {
                continue;
            };
            context = run_hook(&plugin.id, hook.as_ref(), &context)?;
            if self.config.development_mode {
                check_plugin_assessment(&plugin.id, &context)?;
            }
        }
        Ok(context)
    }

    fn decide(
        &self,
        device: &DeviceInfo,
        assessment: &Assessment,
        extended: AssessmentContext,
    ) -> Result<RiskAssessmentResult, RiskError> {
        let raw_score = extended.risk_score;
        if !raw_score.is_finite() || !(0.0..=100.0).contains(&raw_score) {
            return Err(RiskError::invalid_numeric("risk_score", raw_score));
        }
        if let Some((field, value)) = non_finite_signal(&extended.signals) {
            return Err(RiskError::invalid_numeric(field, value));
        }

        let risk_score = raw_score.round() as u8;
        let risk_level = [
            Some(self.config.thresholds.level_for(risk_score)),
            assessment.evaluation.escalation,
            extended.minimum_level,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(RiskLevel::Low);

        Ok(RiskAssessmentResult {
            risk_score,
            risk_level,
            triggered_rules: extended.triggered_rules,
            decision_hint: decision_hint_for(risk_level),
            assessment: AssessmentRecord {
                device: device.clone(),
                timestamp: Utc::now(),
                ip: assessment.context.effective_ip().map(str::to_string),
                geo: assessment.context.effective_geo().cloned(),
                signals: Some(extended.signals),
            },
        })
    }

    /// The remote stage to run for this execution, if any.
    fn remote_stage_for(&self, overrides: RuntimeOverrides) -> Option<RemoteProviderStage> {
        let stage = self.remote_stage.as_ref()?;
        if self.config.version < 2 || !overrides.remote_allowed() {
            return None;
        }
        Some(if overrides.force_fail_open {
            stage.with_failure_policy_override(FailurePolicy::FailOpen)
        } else {
            stage.clone()
        })
    }

    fn fail(
        &self,
        attempt: &LoginAttempt,
        device: Option<DeviceInfo>,
        error: PipelineError,
    ) -> Result<SecurityPipelineResult, PipelineError> {
        let device = device.unwrap_or_else(DeviceInfo::synthetic);
        let result = RiskAssessmentResult::fail_closed(
            device.clone(),
            format!("security pipeline error: {}", error.step),
        );

        tracing::error!(
            request_id = %attempt.request_id,
            step = %error.step,
            error_kind = error.source.kind(),
            error = %error.source,
            fail_closed = self.config.fail_closed,
            "Security pipeline failed"
        );
        self.audit.log(&AuditEvent::pipeline_error(
            attempt,
            &result,
            error.step,
            &error.source,
        ));

        if self.config.fail_closed {
            Ok(SecurityPipelineResult {
                device_info: device,
                risk_assessment: result,
            })
        } else {
            Err(error)
        }
    }
}

impl fmt::Debug for SecurityPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityPipeline")
            .field("config", &self.config)
            .field("fingerprinter", &self.fingerprinter)
            .field("remote_stage", &self.remote_stage)
            .field("rule_count", &self.rules.rule_count())
            .field("plugins", &self.plugins)
            .field("factor_count", &self.factors.len())
            .field("audit", &self.audit)
            .finish()
    }
}

/// Runs a step, converting a panic into an internal error at `step`.
async fn guarded<T, F>(step: PipelineStep, step_future: F) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match AssertUnwindSafe(step_future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(PipelineError::new(
            step,
            RiskError::internal(format!("panic: {}", panic_message(payload.as_ref()))),
        )),
    }
}

fn ensure_active(cancel: &CancellationToken, step: PipelineStep) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::new(step, RiskError::Cancelled))
    } else {
        Ok(())
    }
}

fn at(step: PipelineStep) -> impl Fn(RiskError) -> PipelineError {
    move |error| PipelineError::new(step, error)
}
