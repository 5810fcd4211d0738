//! Audit event types and emission functions.

use crate::core::{
    DecisionAction, LoginAttempt, PipelineStep, RiskAssessmentResult, RiskError, RiskLevel,
};
use crate::policy::RuleId;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The tracing target audit events are emitted under.
pub const AUDIT_TARGET: &str = "riskgate::audit";

/// What an audit event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// An `mfa` or `block` decision.
    RiskDecision,
    /// A pipeline failure, whether it was converted to a block or returned.
    PipelineError,
}

impl AuditEventType {
    /// Returns the snake_case name of the event type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RiskDecision => "risk_decision",
            Self::PipelineError => "pipeline_error",
        }
    }
}

/// The failure behind a `pipeline_error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFailure {
    /// Stable error kind, see [`RiskError::kind`].
    pub kind: String,
    /// The step that failed.
    pub step: PipelineStep,
    /// The rendered error.
    pub message: String,
}

/// Audit event for a security pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event type.
    pub event_type: AuditEventType,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Correlation id of the attempt.
    pub request_id: String,

    /// User ID, if known.
    pub user_id: Option<String>,

    /// The attempted operation.
    pub operation: String,

    /// Device the decision applies to.
    pub device_id: String,

    /// The decided action.
    pub action: DecisionAction,

    /// Final risk score.
    pub risk_score: u8,

    /// Final risk level.
    pub risk_level: RiskLevel,

    /// Local rules that fired.
    pub triggered_rules: Vec<RuleId>,

    /// Reason for a block.
    pub block_reason: Option<String>,

    /// Set for `pipeline_error` events.
    pub failure: Option<AuditFailure>,
}

impl AuditEvent {
    /// Creates a `risk_decision` event.
    pub fn decision(attempt: &LoginAttempt, result: &RiskAssessmentResult) -> Self {
        Self {
            event_type: AuditEventType::RiskDecision,
            timestamp: Utc::now(),
            request_id: attempt.request_id.clone(),
            user_id: attempt.user_id.clone(),
            operation: attempt.operation.clone(),
            device_id: result.assessment.device.device_id.clone(),
            action: result.decision_hint.action,
            risk_score: result.risk_score,
            risk_level: result.risk_level,
            triggered_rules: result.triggered_rules.clone(),
            block_reason: result.decision_hint.block_reason.clone(),
            failure: None,
        }
    }

    /// Creates a `pipeline_error` event for the given fail-closed result.
    pub fn pipeline_error(
        attempt: &LoginAttempt,
        result: &RiskAssessmentResult,
        step: PipelineStep,
        error: &RiskError,
    ) -> Self {
        Self {
            event_type: AuditEventType::PipelineError,
            failure: Some(AuditFailure {
                kind: error.kind().to_string(),
                step,
                message: error.to_string(),
            }),
            ..Self::decision(attempt, result)
        }
    }
}

/// Emits an audit event as a `tracing` event under [`AUDIT_TARGET`].
///
/// Failures are logged at `warn`, decisions at `info`.
pub fn emit_audit_event(event: &AuditEvent) {
    match &event.failure {
        Some(failure) => tracing::warn!(
            target: AUDIT_TARGET,
            event_type = event.event_type.name(),
            request_id = %event.request_id,
            user_id = ?event.user_id,
            operation = %event.operation,
            device_id = %event.device_id,
            action = event.action.name(),
            risk_score = event.risk_score,
            risk_level = %event.risk_level,
            error_kind = %failure.kind,
            step = %failure.step,
            error = %failure.message,
            "Security pipeline failed"
        ),
        None => tracing::info!(
            target: AUDIT_TARGET,
            event_type = event.event_type.name(),
            request_id = %event.request_id,
            user_id = ?event.user_id,
            operation = %event.operation,
            device_id = %event.device_id,
            action = event.action.name(),
            risk_score = event.risk_score,
            risk_level = %event.risk_level,
            triggered_rules = ?event.triggered_rules,
            block_reason = ?event.block_reason,
            "Risk decision made"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeviceInfo;

    #[test]
    fn test_pipeline_error_event() {
        let attempt = LoginAttempt::new().with_user_id("alice");
        let result = RiskAssessmentResult::fail_closed(
            DeviceInfo::synthetic(),
            "security pipeline error: fingerprint",
        );
        let error = RiskError::fingerprint("no canvas");

        let event = AuditEvent::pipeline_error(&attempt, &result, PipelineStep::Fingerprint, &error);

        assert_eq!(event.event_type, AuditEventType::PipelineError);
        assert_eq!(event.request_id, attempt.request_id);
        assert_eq!(event.user_id.as_deref(), Some("alice"));
        assert_eq!(event.risk_score, 100);
        assert_eq!(event.action, DecisionAction::Block);
        let failure = event.failure.unwrap();
        assert_eq!(failure.kind, "fingerprint");
        assert_eq!(failure.step, PipelineStep::Fingerprint);
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let attempt = LoginAttempt::new();
        let result = RiskAssessmentResult::fail_closed(DeviceInfo::synthetic(), "x");
        let value = serde_json::to_value(AuditEvent::decision(&attempt, &result)).unwrap();

        assert_eq!(value["event_type"], "risk_decision");
        assert_eq!(value["risk_level"], "critical");
        assert_eq!(value["device_id"], "unknown");
        assert!(value["failure"].is_null());
    }
}
