//! The risk scoring engine.

use crate::core::{ArcClock, CancellationToken, RiskError, ScoringContext, SystemClock};
use crate::scoring::cache::ScoreCache;
use crate::scoring::factor::{
    CustomFactorRegistry, FactorConfig, FactorConfigJson, FactorType, ScoringFactor, SyncFactor,
};
use crate::scoring::factors;
use crate::scoring::weights::{non_negative, warn_if_unbalanced, RiskWeights};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const MAX_SCORE: f64 = 100.0;

/// Configuration for the scoring engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringEngineConfig {
    /// Maximum entries per cache.
    pub cache_max_size: usize,

    /// Cache entry lifetime in milliseconds.
    pub cache_ttl_ms: u64,

    /// Timeout for async factors that do not set their own.
    pub default_factor_timeout_ms: u64,

    /// Weights used when a call does not supply any.
    pub weights: RiskWeights,
}

impl Default for ScoringEngineConfig {
    fn default() -> Self {
        Self {
            cache_max_size: 1_000,
            cache_ttl_ms: 60_000,
            default_factor_timeout_ms: 2_000,
            weights: RiskWeights::default(),
        }
    }
}

impl ScoringEngineConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache size bound.
    pub fn with_cache_max_size(mut self, size: usize) -> Self {
        self.cache_max_size = size;
        self
    }

    /// Sets the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Sets the default async factor timeout.
    pub fn with_default_factor_timeout(mut self, timeout: Duration) -> Self {
        self.default_factor_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the default weights.
    pub fn with_weights(mut self, weights: RiskWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Returns the cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Returns the default async factor timeout.
    pub fn default_factor_timeout(&self) -> Duration {
        Duration::from_millis(self.default_factor_timeout_ms)
    }
}

/// Builder for creating a `RiskScoringEngine`.
#[derive(Debug, Default)]
pub struct RiskScoringEngineBuilder {
    config: ScoringEngineConfig,
    registry: CustomFactorRegistry,
    clock: Option<ArcClock>,
}

impl RiskScoringEngineBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: ScoringEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the registry used to resolve `custom` JSON factors.
    pub fn with_registry(mut self, registry: CustomFactorRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the clock used for cache expiry.
    pub fn with_clock(mut self, clock: ArcClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the engine.
    pub fn build(self) -> RiskScoringEngine {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ttl = self.config.cache_ttl();
        RiskScoringEngine {
            sync_cache: ScoreCache::new(self.config.cache_max_size, ttl, clock.clone()),
            async_cache: ScoreCache::new(self.config.cache_max_size, ttl, clock),
            registry: self.registry,
            config: self.config,
        }
    }
}

/// Computes bounded 0 to 100 risk scores.
///
/// The engine combines factor scores as a weighted sum. Every factor value
/// is validated before weighting: a non-finite or out-of-range value counts
/// as 0 and is logged, so a misbehaving factor can lower its own share of
/// the score but never break the computation.
///
/// Two independent caches back [`Self::calculate_risk_score_with_cache`]
/// and [`Self::calculate_risk_score_with_async_factors_and_cache`]. They
/// are the only state the engine keeps between calls.
///
/// # Example
///
/// ```rust,ignore
/// use riskgate::scoring::{RiskScoringEngine, RiskWeights};
///
/// let engine = RiskScoringEngine::new();
/// let score = engine.calculate_risk_score(&context, None);
/// let network_only = engine.calculate_risk_score(&context, Some(&RiskWeights::new(0.0, 0.0, 1.0, 0.0)));
/// ```
#[derive(Debug)]
pub struct RiskScoringEngine {
    config: ScoringEngineConfig,
    registry: CustomFactorRegistry,
    sync_cache: ScoreCache,
    async_cache: ScoreCache,
}

impl Default for RiskScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskScoringEngine {
    /// Creates an engine with default configuration and an empty registry.
    pub fn new() -> Self {
        RiskScoringEngineBuilder::new().build()
    }

    /// Creates a new builder.
    pub fn builder() -> RiskScoringEngineBuilder {
        RiskScoringEngineBuilder::new()
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ScoringEngineConfig {
        &self.config
    }

    /// Returns a reference to the custom factor registry.
    pub fn registry(&self) -> &CustomFactorRegistry {
        &self.registry
    }

    /// Scores the context with the four built-in factors.
    ///
    /// Uses the configured weights when `weights` is `None`.
    pub fn calculate_risk_score(
        &self,
        context: &ScoringContext,
        weights: Option<&RiskWeights>,
    ) -> u8 {
        let w = weights.unwrap_or(&self.config.weights).normalized();

        let total = w.device * clamp_factor(factors::device_score(context))
            + w.geo * clamp_factor(factors::geo_score(context))
            + w.network * clamp_factor(factors::network_score(context))
            + w.velocity * clamp_factor(factors::velocity_score(context));

        to_score(total)
    }

    /// Scores the context with a caller-supplied factor list.
    ///
    /// Async factors cannot run here and contribute 0.
    pub fn calculate_risk_score_with_factors(
        &self,
        context: &ScoringContext,
        factors: &[FactorConfig],
    ) -> u8 {
        let weights = normalized_factor_weights(factors);

        let total: f64 = factors
            .iter()
            .zip(weights)
            .map(|(config, weight)| {
                let value = match &config.factor {
                    ScoringFactor::Sync(factor) => sync_value(config, factor.as_ref(), context),
                    ScoringFactor::Async { .. } => {
                        tracing::warn!(
                            factor_id = %config.id,
                            "Async factor on synchronous scoring path; counting as 0"
                        );
                        0.0
                    }
                };
                value * weight
            })
            .sum();

        to_score(total)
    }

    /// Scores the context with sync and async factors.
    ///
    /// Async factors run concurrently, each under its own timeout and on
    /// its own child of `cancel`. A factor that times out, fails or returns
    /// an invalid value contributes 0. Contributions are combined in
    /// configuration order, so completion order never changes the score.
    ///
    /// Returns [`RiskError::Cancelled`] if `cancel` fires first; in-flight
    /// factors are dropped and their tokens cancelled.
    pub async fn calculate_risk_score_with_async_factors(
        &self,
        context: &ScoringContext,
        factors: &[FactorConfig],
        cancel: &CancellationToken,
    ) -> Result<u8, RiskError> {
        if cancel.is_cancelled() {
            return Err(RiskError::Cancelled);
        }

        let weights = normalized_factor_weights(factors);
        let evaluations = factors
            .iter()
            .map(|config| self.factor_value(config, context, cancel));

        let values = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Scoring cancelled; aborting in-flight factors");
                return Err(RiskError::Cancelled);
            }
            values = join_all(evaluations) => values,
        };

        if cancel.is_cancelled() {
            return Err(RiskError::Cancelled);
        }

        let total: f64 = values.iter().zip(weights).map(|(v, w)| v * w).sum();
        Ok(to_score(total))
    }

    /// [`Self::calculate_risk_score`] through the sync cache.
    ///
    /// `use_cache = false` bypasses both lookup and storage.
    pub fn calculate_risk_score_with_cache(
        &self,
        context: &ScoringContext,
        weights: Option<&RiskWeights>,
        use_cache: bool,
    ) -> u8 {
        if !use_cache {
            return self.calculate_risk_score(context, weights);
        }

        let weights = weights.copied().unwrap_or(self.config.weights);
        let key = match cache_key(context, &("builtin", &weights)) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot derive cache key; scoring uncached");
                return self.calculate_risk_score(context, Some(&weights));
            }
        };

        if let Some(score) = self.sync_cache.get(&key) {
            tracing::trace!(cache_key = %key, score, "Sync score cache hit");
            return score;
        }

        let score = self.calculate_risk_score(context, Some(&weights));
        self.sync_cache.insert(key, score);
        score
    }

    /// [`Self::calculate_risk_score_with_async_factors`] through the async
    /// cache. Cancelled runs are not cached.
    pub async fn calculate_risk_score_with_async_factors_and_cache(
        &self,
        context: &ScoringContext,
        factors: &[FactorConfig],
        use_cache: bool,
        cancel: &CancellationToken,
    ) -> Result<u8, RiskError> {
        if !use_cache {
            return self
                .calculate_risk_score_with_async_factors(context, factors, cancel)
                .await;
        }

        let descriptors: Vec<_> = factors.iter().map(FactorConfig::describe).collect();
        let key = match cache_key(context, &("factors", &descriptors)) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot derive cache key; scoring uncached");
                return self
                    .calculate_risk_score_with_async_factors(context, factors, cancel)
                    .await;
            }
        };

        if let Some(score) = self.async_cache.get(&key) {
            tracing::trace!(cache_key = %key, score, "Async score cache hit");
            return Ok(score);
        }

        let score = self
            .calculate_risk_score_with_async_factors(context, factors, cancel)
            .await?;
        self.async_cache.insert(key, score);
        Ok(score)
    }

    /// Builds a factor configuration from JSON.
    ///
    /// Expects `{"id", "type", "weight", "pluginId"?}` with a weight in
    /// `[0, 1]`. `custom` factors are looked up in the registry by
    /// `pluginId`. Anything invalid is logged and yields `None`.
    pub fn create_factor_config_from_json(&self, value: &serde_json::Value) -> Option<FactorConfig> {
        let parsed = match FactorConfigJson::deserialize(value) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid factor configuration");
                return None;
            }
        };

        if parsed.id.trim().is_empty() {
            tracing::warn!("Factor configuration has an empty id");
            return None;
        }
        if !parsed.weight.is_finite() || !(0.0..=1.0).contains(&parsed.weight) {
            tracing::warn!(
                factor_id = %parsed.id,
                weight = parsed.weight,
                "Factor weight outside [0, 1]"
            );
            return None;
        }
        let Some(factor_type) = FactorType::parse(&parsed.factor_type) else {
            tracing::warn!(
                factor_id = %parsed.id,
                factor_type = %parsed.factor_type,
                "Unknown factor type"
            );
            return None;
        };

        if factor_type != FactorType::Custom {
            return FactorConfig::builtin(parsed.id, factor_type, parsed.weight);
        }

        let Some(plugin_id) = parsed
            .plugin_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        else {
            tracing::warn!(factor_id = %parsed.id, "Custom factor without pluginId");
            return None;
        };
        let Some(factor) = self.registry.get(plugin_id) else {
            tracing::warn!(
                factor_id = %parsed.id,
                plugin_id = %plugin_id,
                "Custom factor plugin is not registered"
            );
            return None;
        };

        Some(
            FactorConfig::custom(parsed.id.clone(), parsed.weight, factor.clone())
                .with_plugin_id(plugin_id),
        )
    }

    /// Builds factor configurations from a JSON array, skipping bad entries.
    pub fn create_factor_configs_from_json(&self, value: &serde_json::Value) -> Vec<FactorConfig> {
        let Some(entries) = value.as_array() else {
            tracing::warn!("Factor configuration must be a JSON array");
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| self.create_factor_config_from_json(entry))
            .collect()
    }

    /// Scores the context with factors described in JSON.
    ///
    /// Falls back to the built-in weighted score when no entry is usable.
    pub fn calculate_risk_score_from_json(
        &self,
        context: &ScoringContext,
        value: &serde_json::Value,
    ) -> u8 {
        let factors = self.create_factor_configs_from_json(value);
        if factors.is_empty() {
            tracing::warn!("No usable factor configuration; using built-in weights");
            return self.calculate_risk_score(context, None);
        }
        self.calculate_risk_score_with_factors(context, &factors)
    }

    /// Async variant of [`Self::calculate_risk_score_from_json`] that also
    /// runs async custom factors.
    pub async fn calculate_risk_score_from_json_async(
        &self,
        context: &ScoringContext,
        value: &serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<u8, RiskError> {
        let factors = self.create_factor_configs_from_json(value);
        if factors.is_empty() {
            tracing::warn!("No usable factor configuration; using built-in weights");
            return Ok(self.calculate_risk_score(context, None));
        }
        self.calculate_risk_score_with_async_factors(context, &factors, cancel)
            .await
    }

    /// Clears the sync cache.
    pub fn clear_sync_cache(&self) {
        self.sync_cache.clear();
    }

    /// Clears the async cache.
    pub fn clear_async_cache(&self) {
        self.async_cache.clear();
    }

    /// Clears both caches.
    pub fn clear_all_caches(&self) {
        self.clear_sync_cache();
        self.clear_async_cache();
        tracing::info!("Score caches cleared");
    }

    /// Number of entries in the sync cache.
    pub fn sync_cache_size(&self) -> usize {
        self.sync_cache.len()
    }

    /// Number of entries in the async cache.
    pub fn async_cache_size(&self) -> usize {
        self.async_cache.len()
    }

    async fn factor_value(
        &self,
        config: &FactorConfig,
        context: &ScoringContext,
        cancel: &CancellationToken,
    ) -> f64 {
        let (factor, timeout) = match &config.factor {
            ScoringFactor::Sync(factor) => return sync_value(config, factor.as_ref(), context),
            ScoringFactor::Async {
                factor, timeout, ..
            } => (
                factor,
                timeout.unwrap_or_else(|| self.config.default_factor_timeout()),
            ),
        };

        let child = cancel.child_token();
        match tokio::time::timeout(timeout, factor.calculate(context, &child)).await {
            Ok(Ok(value)) => validated(config, value),
            Ok(Err(e)) => {
                tracing::warn!(
                    factor_id = %config.id,
                    error = %e,
                    "Async factor failed; counting as 0"
                );
                0.0
            }
            Err(_) => {
                child.cancel();
                tracing::warn!(
                    factor_id = %config.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Async factor timed out; counting as 0"
                );
                0.0
            }
        }
    }
}

fn sync_value(config: &FactorConfig, factor: &dyn SyncFactor, context: &ScoringContext) -> f64 {
    match factor.calculate(context) {
        Ok(value) => validated(config, value),
        Err(e) => {
            tracing::warn!(
                factor_id = %config.id,
                error = %e,
                "Factor failed; counting as 0"
            );
            0.0
        }
    }
}

fn validated(config: &FactorConfig, value: f64) -> f64 {
    let max = config.factor.max_score();
    if value.is_finite() && (0.0..=max).contains(&value) {
        value
    } else {
        tracing::warn!(
            factor_id = %config.id,
            value,
            max,
            "Factor score invalid; counting as 0"
        );
        0.0
    }
}

/// Weights scaled to sum to one. An all-zero list weighs factors equally.
fn normalized_factor_weights(factors: &[FactorConfig]) -> Vec<f64> {
    if factors.is_empty() {
        return Vec::new();
    }

    let cleaned: Vec<f64> = factors.iter().map(|f| non_negative(f.weight)).collect();
    let sum: f64 = cleaned.iter().sum();

    if sum <= 0.0 {
        tracing::warn!(
            factor_count = factors.len(),
            "All factor weights are zero; weighting factors equally"
        );
        let equal = 1.0 / factors.len() as f64;
        return vec![equal; factors.len()];
    }
    warn_if_unbalanced(sum);

    cleaned.into_iter().map(|w| w / sum).collect()
}

fn clamp_factor(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}

fn to_score(total: f64) -> u8 {
    if !total.is_finite() {
        return 0;
    }
    total.round().clamp(0.0, MAX_SCORE) as u8
}

fn cache_key<T: Serialize>(context: &ScoringContext, configuration: &T) -> Result<String, RiskError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&serde_json::to_vec(context)?);
    hasher.update(&[0]);
    hasher.update(&serde_json::to_vec(configuration)?);
    Ok(hasher.finalize().to_hex().to_string())
}
