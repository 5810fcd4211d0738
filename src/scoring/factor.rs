//! Pluggable scoring factors and their configuration.
//!
//! A scoring run is described by a list of [`FactorConfig`]s, each pairing
//! a weight with a [`ScoringFactor`]. Factors are either synchronous
//! ([`SyncFactor`]) or asynchronous ([`AsyncFactor`]); the built-in device,
//! geo, network and velocity factors are synchronous.
//!
//! Configurations can be assembled in code or from JSON:
//!
//! ```json
//! [
//!   {"id": "device", "type": "device", "weight": 0.4},
//!   {"id": "ip-intel", "type": "custom", "weight": 0.6, "pluginId": "ip-intel"}
//! ]
//! ```
//!
//! `custom` entries are resolved against a [`CustomFactorRegistry`] that
//! the caller hands to the scoring engine.

use crate::core::{CancellationToken, RiskError, ScoringContext};
use crate::scoring::factors;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

/// The default upper bound of a factor score.
pub const DEFAULT_MAX_FACTOR_SCORE: f64 = 100.0;

/// A synchronous scoring factor.
pub trait SyncFactor: Send + Sync + Debug {
    /// Scores the context. Must be finite and within `[0, 100]`.
    fn calculate(&self, context: &ScoringContext) -> Result<f64, RiskError>;
}

/// An asynchronous scoring factor, such as a lookup against a remote
/// reputation service.
///
/// The engine races each call against its own timeout. `cancel` fires
/// when the factor times out or the whole run is cancelled; long-running
/// implementations should watch it.
#[async_trait]
pub trait AsyncFactor: Send + Sync + Debug {
    /// Scores the context.
    async fn calculate(
        &self,
        context: &ScoringContext,
        cancel: &CancellationToken,
    ) -> Result<f64, RiskError>;
}

/// A scoring factor.
#[derive(Debug, Clone)]
pub enum ScoringFactor {
    /// Computed inline.
    Sync(Arc<dyn SyncFactor>),
    /// Computed concurrently under a timeout.
    Async {
        /// The factor.
        factor: Arc<dyn AsyncFactor>,
        /// Per-factor timeout; the engine default when `None`.
        timeout: Option<Duration>,
        /// Upper bound of a valid score; 100 when `None`.
        max_score: Option<f64>,
    },
}

impl ScoringFactor {
    /// Wraps a synchronous factor.
    pub fn sync<F: SyncFactor + 'static>(factor: F) -> Self {
        Self::Sync(Arc::new(factor))
    }

    /// Wraps an asynchronous factor with the engine's default timeout.
    pub fn from_async<F: AsyncFactor + 'static>(factor: F) -> Self {
        Self::Async {
            factor: Arc::new(factor),
            timeout: None,
            max_score: None,
        }
    }

    /// Sets the timeout of an asynchronous factor. No-op for sync factors.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match self {
            Self::Async {
                factor, max_score, ..
            } => Self::Async {
                factor,
                timeout: Some(timeout),
                max_score,
            },
            sync => sync,
        }
    }

    /// Sets the score bound of an asynchronous factor. No-op for sync factors.
    pub fn with_max_score(self, max: f64) -> Self {
        match self {
            Self::Async {
                factor, timeout, ..
            } => Self::Async {
                factor,
                timeout,
                max_score: Some(max),
            },
            sync => sync,
        }
    }

    /// Returns `true` for asynchronous factors.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async { .. })
    }

    /// Upper bound of a valid score.
    pub fn max_score(&self) -> f64 {
        match self {
            Self::Sync(_) => DEFAULT_MAX_FACTOR_SCORE,
            Self::Async { max_score, .. } => max_score
                .filter(|m| m.is_finite() && *m >= 0.0)
                .unwrap_or(DEFAULT_MAX_FACTOR_SCORE),
        }
    }
}

/// The kind of a configured factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorType {
    /// Built-in device factor.
    Device,
    /// Built-in geo factor.
    Geo,
    /// Built-in network factor.
    Network,
    /// Built-in velocity factor.
    Velocity,
    /// Registered plugin factor.
    Custom,
}

impl FactorType {
    /// Parses a lowercase type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "device" => Some(Self::Device),
            "geo" => Some(Self::Geo),
            "network" => Some(Self::Network),
            "velocity" => Some(Self::Velocity),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Returns the lowercase type name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Device => "device",
            Self::Geo => "geo",
            Self::Network => "network",
            Self::Velocity => "velocity",
            Self::Custom => "custom",
        }
    }
}

/// One of the four built-in factors as a [`SyncFactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFactor {
    /// See [`factors::device_score`].
    Device,
    /// See [`factors::geo_score`].
    Geo,
    /// See [`factors::network_score`].
    Network,
    /// See [`factors::velocity_score`].
    Velocity,
}

impl SyncFactor for BuiltinFactor {
    fn calculate(&self, context: &ScoringContext) -> Result<f64, RiskError> {
        Ok(match self {
            Self::Device => factors::device_score(context),
            Self::Geo => factors::geo_score(context),
            Self::Network => factors::network_score(context),
            Self::Velocity => factors::velocity_score(context),
        })
    }
}

/// A weighted factor in a scoring run.
#[derive(Debug, Clone)]
pub struct FactorConfig {
    /// Identifier, used in logs.
    pub id: String,
    /// The kind of factor.
    pub factor_type: FactorType,
    /// Relative weight, normalized across the run.
    pub weight: f64,
    /// The factor itself.
    pub factor: ScoringFactor,
    /// Plugin id for custom factors.
    pub plugin_id: Option<String>,
}

impl FactorConfig {
    /// Creates a configuration for a built-in factor type.
    ///
    /// Returns `None` for [`FactorType::Custom`], which needs a factor.
    pub fn builtin(id: impl Into<String>, factor_type: FactorType, weight: f64) -> Option<Self> {
        let builtin = match factor_type {
            FactorType::Device => BuiltinFactor::Device,
            FactorType::Geo => BuiltinFactor::Geo,
            FactorType::Network => BuiltinFactor::Network,
            FactorType::Velocity => BuiltinFactor::Velocity,
            FactorType::Custom => return None,
        };
        Some(Self {
            id: id.into(),
            factor_type,
            weight,
            factor: ScoringFactor::sync(builtin),
            plugin_id: None,
        })
    }

    /// Creates a configuration for a custom factor.
    pub fn custom(id: impl Into<String>, weight: f64, factor: ScoringFactor) -> Self {
        Self {
            id: id.into(),
            factor_type: FactorType::Custom,
            weight,
            factor,
            plugin_id: None,
        }
    }

    /// Records the plugin id the factor was resolved from.
    pub fn with_plugin_id(mut self, plugin_id: impl Into<String>) -> Self {
        self.plugin_id = Some(plugin_id.into());
        self
    }

    /// Describes everything that influences the score, for cache keys.
    ///
    /// Implementations are told apart by the address of their shared
    /// allocation: clones of one `ScoringFactor` share cache entries, two
    /// separately constructed factors under the same id do not.
    pub(crate) fn describe(&self) -> FactorDescriptor<'_> {
        let (timeout_ms, implementation) = match &self.factor {
            ScoringFactor::Async {
                factor, timeout, ..
            } => (
                timeout.map(|t| t.as_millis() as u64),
                Arc::as_ptr(factor) as *const () as usize,
            ),
            ScoringFactor::Sync(factor) => (None, Arc::as_ptr(factor) as *const () as usize),
        };
        FactorDescriptor {
            id: &self.id,
            factor_type: self.factor_type,
            weight: self.weight,
            plugin_id: self.plugin_id.as_deref(),
            is_async: self.factor.is_async(),
            timeout_ms,
            max_score: self.factor.max_score(),
            implementation,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FactorDescriptor<'a> {
    id: &'a str,
    factor_type: FactorType,
    weight: f64,
    plugin_id: Option<&'a str>,
    is_async: bool,
    timeout_ms: Option<u64>,
    max_score: f64,
    implementation: usize,
}

/// The JSON form of a factor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorConfigJson {
    /// Factor identifier.
    pub id: String,
    /// `device`, `geo`, `network`, `velocity` or `custom`.
    #[serde(rename = "type")]
    pub factor_type: String,
    /// Weight in `[0, 1]`.
    pub weight: f64,
    /// Registry key for `custom` factors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_id: Option<String>,
}

/// Custom factors available to JSON configurations.
///
/// The registry is an ordinary value owned by whoever builds the scoring
/// engine; there is no process-wide registration.
#[derive(Clone, Default)]
pub struct CustomFactorRegistry {
    factors: HashMap<String, ScoringFactor>,
}

impl CustomFactorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factor under `plugin_id`, replacing any previous one.
    pub fn register_custom_factor_plugin(
        &mut self,
        plugin_id: impl Into<String>,
        factor: ScoringFactor,
    ) -> Result<(), RiskError> {
        let plugin_id = plugin_id.into();
        if plugin_id.trim().is_empty() {
            return Err(RiskError::configuration(
                "custom factor plugin id must not be empty",
            ));
        }
        if self.factors.insert(plugin_id.clone(), factor).is_some() {
            tracing::warn!(plugin_id = %plugin_id, "Replacing registered custom factor");
        }
        Ok(())
    }

    /// Registers a factor and returns self for chaining.
    pub fn with_plugin(
        mut self,
        plugin_id: impl Into<String>,
        factor: ScoringFactor,
    ) -> Result<Self, RiskError> {
        self.register_custom_factor_plugin(plugin_id, factor)?;
        Ok(self)
    }

    /// Looks up a factor.
    pub fn get(&self, plugin_id: &str) -> Option<&ScoringFactor> {
        self.factors.get(plugin_id)
    }

    /// Returns the number of registered factors.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

impl fmt::Debug for CustomFactorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.factors.keys().collect();
        ids.sort();
        f.debug_struct("CustomFactorRegistry")
            .field("plugins", &ids)
            .finish()
    }
}
