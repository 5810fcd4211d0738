//! Error types for the riskgate library.
//!
//! Errors are grouped the way the decision engine treats them:
//! configuration errors surface from builders, dependency and data-integrity
//! errors are absorbed by the component that owns a safe default, and
//! anything that reaches the pipeline boundary becomes a synthetic
//! critical-risk decision (or a [`PipelineError`] when fail-closed is off).

use crate::circuit_breaker::GateBlockReason;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The main error type for risk evaluation.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Invalid configuration detected at construction time.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An outbound call exceeded its time budget.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        /// What was being waited on (provider, factor, fingerprint).
        operation: String,
        /// The budget that was exceeded.
        elapsed: Duration,
    },

    /// The remote risk provider returned an error.
    #[error("provider '{provider}' failed: {message}")]
    ProviderFailed {
        /// Name of the provider.
        provider: String,
        /// Error message describing the failure.
        message: String,
    },

    /// The circuit breaker denied the call.
    #[error("circuit open for provider '{provider}': {reason}")]
    CircuitOpen {
        /// Name of the protected provider.
        provider: String,
        /// Why the gate denied the call.
        reason: GateBlockReason,
        /// Suggested wait before the next attempt.
        retry_after: Option<Duration>,
    },

    /// The operation was cancelled by the caller.
    #[error("operation was cancelled")]
    Cancelled,

    /// A numeric result was NaN, infinite or outside its valid range.
    #[error("invalid numeric value for '{field}': {value}")]
    InvalidNumeric {
        /// Where the value came from.
        field: String,
        /// The offending value, rendered.
        value: String,
    },

    /// Device fingerprint collection failed.
    #[error("fingerprint collection failed: {message}")]
    Fingerprint {
        /// Description of the failure.
        message: String,
    },

    /// A context builder plugin failed.
    #[error("plugin '{plugin_id}' failed: {message}")]
    Plugin {
        /// Id of the failing plugin.
        plugin_id: String,
        /// Description of the failure.
        message: String,
    },

    /// Untrusted data was rejected at the sanitization boundary.
    #[error("sanitization failed: {0}")]
    Sanitize(#[from] SanitizeError),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl RiskError {
    /// Returns `true` if this error comes from an unreliable dependency
    /// and may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ProviderFailed { .. }
                | Self::CircuitOpen { .. }
                | Self::Fingerprint { .. }
        )
    }

    /// Returns `true` if this error signals corrupted numeric or untrusted data.
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, Self::InvalidNumeric { .. } | Self::Sanitize(_))
    }

    /// Stable snake_case name of the error kind, used in audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Timeout { .. } => "timeout",
            Self::ProviderFailed { .. } => "provider_failed",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Cancelled => "cancelled",
            Self::InvalidNumeric { .. } => "invalid_numeric",
            Self::Fingerprint { .. } => "fingerprint",
            Self::Plugin { .. } => "plugin",
            Self::Sanitize(_) => "sanitize",
            Self::Serialization(_) => "serialization",
            Self::Internal { .. } => "internal",
        }
    }

    /// Creates a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    /// Creates a `ProviderFailed` error.
    pub fn provider_failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates an `InvalidNumeric` error.
    pub fn invalid_numeric(field: impl Into<String>, value: f64) -> Self {
        Self::InvalidNumeric {
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Creates a `Fingerprint` error.
    pub fn fingerprint(message: impl Into<String>) -> Self {
        Self::Fingerprint {
            message: message.into(),
        }
    }

    /// Creates a `Plugin` error.
    pub fn plugin(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Rejection reasons at the trust boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SanitizeError {
    /// A numeric field was NaN or infinite.
    #[error("field '{field}' is not a finite number")]
    NonFinite {
        /// Name of the field.
        field: &'static str,
    },
}

/// A step of the security pipeline, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Device fingerprint acquisition.
    Fingerprint,
    /// Remote provider enrichment.
    RemoteProvider,
    /// Weighted scoring and local rules.
    RiskAssessment,
    /// Plugin context extension.
    PluginExtension,
    /// Policy decision.
    Decision,
}

impl PipelineStep {
    /// Returns the snake_case name of the step.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fingerprint => "fingerprint",
            Self::RemoteProvider => "remote_provider",
            Self::RiskAssessment => "risk_assessment",
            Self::PluginExtension => "plugin_extension",
            Self::Decision => "decision",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A pipeline failure surfaced to callers that disabled fail-closed mode.
#[derive(Debug, Error)]
#[error("security pipeline error at step '{step}': {source}")]
pub struct PipelineError {
    /// The step that failed.
    pub step: PipelineStep,
    /// The underlying error.
    #[source]
    pub source: RiskError,
}

impl PipelineError {
    /// Creates a new pipeline error.
    pub fn new(step: PipelineStep, source: RiskError) -> Self {
        Self { step, source }
    }
}

/// A specialized `Result` type for risk operations.
pub type RiskResult<T> = Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_error_is_transient() {
        let timeout = RiskError::timeout("provider", Duration::from_millis(300));
        assert!(timeout.is_transient());

        let config = RiskError::configuration("bad weights");
        assert!(!config.is_transient());
    }

    #[test]
    fn test_risk_error_kind() {
        assert_eq!(RiskError::Cancelled.kind(), "cancelled");
        assert_eq!(
            RiskError::invalid_numeric("reputation_score", f64::NAN).kind(),
            "invalid_numeric"
        );
        let sanitize: RiskError = SanitizeError::NonFinite { field: "velocity_score" }.into();
        assert_eq!(sanitize.kind(), "sanitize");
        assert!(sanitize.is_data_integrity());
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::new(
            PipelineStep::RemoteProvider,
            RiskError::provider_failed("vendor", "503"),
        );
        let text = err.to_string();
        assert!(text.contains("remote_provider"));
        assert!(text.contains("503"));
    }
}
