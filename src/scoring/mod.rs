//! Weighted multi-factor risk scoring.
//!
//! The [`RiskScoringEngine`] turns a [`crate::core::ScoringContext`] into a
//! score from 0 to 100. By default it combines the four built-in factors
//! (device, geo, network, velocity) with [`RiskWeights`]; callers can
//! supply their own [`FactorConfig`] list instead, including asynchronous
//! factors and plugins resolved from a [`CustomFactorRegistry`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use riskgate::scoring::{RiskScoringEngine, ScoringEngineConfig};
//!
//! let engine = RiskScoringEngine::builder()
//!     .with_config(ScoringEngineConfig::new().with_cache_max_size(500))
//!     .with_registry(registry)
//!     .build();
//!
//! let score = engine.calculate_risk_score_with_cache(&context, None, true);
//! let score = engine
//!     .calculate_risk_score_with_async_factors(&context, &factors, &cancel)
//!     .await?;
//! ```

mod cache;
mod engine;
mod factor;
mod factors;
mod weights;

pub use cache::ScoreCache;
pub use engine::{RiskScoringEngine, RiskScoringEngineBuilder, ScoringEngineConfig};
pub use factor::{
    AsyncFactor, BuiltinFactor, CustomFactorRegistry, FactorConfig, FactorConfigJson,
    FactorType, ScoringFactor, SyncFactor, DEFAULT_MAX_FACTOR_SCORE,
};
pub use factors::{device_score, geo_score, network_score, velocity_score, HIGH_RISK_COUNTRIES};
pub use weights::RiskWeights;
