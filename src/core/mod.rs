//! Core types and traits for the riskgate library.
//!
//! This module provides the fundamental building blocks used throughout
//! the library:
//!
//! - [`types`] - Device, geo, signal and decision types
//! - [`traits`] - Remote provider and fingerprint collaborator traits
//! - [`error`] - Structured error types
//! - [`result`] - Assessment and pipeline result structures
//! - [`cancel`] - Hierarchical cancellation tokens
//! - [`clock`] - Injectable millisecond clocks

pub mod cancel;
pub mod clock;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

// Re-export commonly used types at the core level
pub use cancel::CancellationToken;
pub use clock::{ArcClock, Clock, ManualClock, SystemClock};
pub use error::{PipelineError, PipelineStep, RiskError, RiskResult, SanitizeError};
pub use result::{RiskAssessmentResult, SecurityPipelineResult, MAX_RISK_SCORE};
pub use traits::{
    ArcFingerprintProvider, ArcRemoteProvider, FingerprintProvider, RemoteProviderRequest,
    RemoteProviderResponse, RemoteRiskProvider,
};
pub use types::{
    AssessmentRecord, DecisionAction, DecisionHint, DeviceInfo, DeviceType, GeoInfo,
    LoginAttempt, RiskLevel, RiskSignals, ScoringContext,
};
