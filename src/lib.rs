//! # Riskgate
//!
//! A fail-closed, risk-based login defense engine.
//!
//! ## Overview
//!
//! Riskgate evaluates each authentication attempt and tells the caller
//! whether to allow it, require a second factor, or block it. It lets you:
//!
//! - Score attempts from device, geography, network and velocity signals
//! - Enrich local signals from a remote risk provider, bounded by a timeout
//!   or a circuit breaker
//! - Escalate risk with local rules (Tor, VPN, high-risk countries, ...)
//! - Extend every step with prioritized plugins
//! - Audit every `mfa` and `block` decision and every failure
//!
//! Any error, timeout, cancellation or non-finite number on the way turns
//! into a critical block.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use riskgate::prelude::*;
//! use riskgate::backends::{MockFingerprinter, MockRiskProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stage = RemoteProviderStage::builder(Arc::new(MockRiskProvider::new()))
//!         .with_timeout(std::time::Duration::from_millis(500))
//!         .build()?;
//!
//!     let pipeline = SecurityPipeline::builder()
//!         .with_fingerprint_provider(MockFingerprinter::new())
//!         .with_remote_stage(stage)
//!         .build()?;
//!
//!     let attempt = LoginAttempt::new()
//!         .with_user_id("alice")
//!         .with_ip("203.0.113.7");
//!     let result = pipeline.execute(&attempt).await?;
//!
//!     match result.action() {
//!         DecisionAction::Allow => println!("welcome"),
//!         DecisionAction::Mfa => println!("second factor required"),
//!         DecisionAction::Block => println!("blocked"),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several layers:
//!
//! - **Core**: Fundamental types, traits, and error handling
//! - **Backends**: Mock collaborators for tests and demos
//! - **Circuit Breaker**: Failure-rate breaker around remote calls
//! - **Scoring**: Weighted multi-factor risk scoring with caching
//! - **Remote**: Remote signal enrichment, sanitization and merging
//! - **Policy**: Local escalation rules and risk thresholds
//! - **Pipeline**: Orchestration of one attempt, plugins and overrides
//! - **Audit**: Structured logging of decisions and failures

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod backends;
pub mod circuit_breaker;
pub mod core;
pub mod pipeline;
pub mod policy;
pub mod remote;
pub mod scoring;

// Re-export commonly used types at the crate root
pub use crate::core::{
    CancellationToken, DecisionAction, DecisionHint, DeviceInfo, DeviceType, GeoInfo,
    LoginAttempt, PipelineError, PipelineStep, RiskAssessmentResult, RiskError, RiskLevel,
    RiskSignals, ScoringContext, SecurityPipelineResult,
};

pub use crate::circuit_breaker::{BreakerGuard, CircuitBreakerConfig};
pub use crate::pipeline::{SecurityPipeline, SecurityPipelineConfig};
pub use crate::policy::{RiskThresholds, RuleEngine};
pub use crate::remote::{FailurePolicy, RemoteProviderStage};
pub use crate::scoring::{RiskScoringEngine, RiskWeights};

/// Prelude module for convenient imports.
///
/// ```rust
/// use riskgate::prelude::*;
/// ```
pub mod prelude {
    pub use crate::audit::{AuditEvent, AuditLogger};
    pub use crate::circuit_breaker::{BreakerGuard, CircuitBreakerConfig};
    pub use crate::core::{
        CancellationToken, DecisionAction, DeviceInfo, DeviceType, FingerprintProvider,
        GeoInfo, LoginAttempt, RemoteRiskProvider, RiskAssessmentResult, RiskError, RiskLevel,
        RiskSignals, ScoringContext, SecurityPipelineResult,
    };
    pub use crate::pipeline::{ContextBuilderPlugin, SecurityPipeline, SecurityPipelineConfig};
    pub use crate::policy::{RiskThresholds, RuleEngine};
    pub use crate::remote::{FailurePolicy, MergeStrategy, RemoteProviderStage};
    pub use crate::scoring::{FactorConfig, RiskScoringEngine, RiskWeights};
}
