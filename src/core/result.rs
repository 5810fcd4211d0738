//! Risk assessment result structures.
//!
//! `RiskAssessmentResult` is the outcome of one risk evaluation and
//! `SecurityPipelineResult` is the only externally observable output of
//! the security pipeline.

use crate::core::types::{
    AssessmentRecord, DecisionAction, DecisionHint, DeviceInfo, RiskLevel,
};
use crate::policy::RuleId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// The maximum risk score.
pub const MAX_RISK_SCORE: u8 = 100;

/// The complete outcome of a risk assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessmentResult {
    /// Bounded risk score, 0 to 100.
    pub risk_score: u8,
    /// Risk level.
    pub risk_level: RiskLevel,
    /// Local rules that fired.
    pub triggered_rules: Vec<RuleId>,
    /// Recommended action.
    pub decision_hint: DecisionHint,
    /// Echo of the evaluated inputs.
    pub assessment: AssessmentRecord,
}

impl RiskAssessmentResult {
    /// The synthetic maximum-risk result produced when the pipeline fails.
    pub fn fail_closed(device: DeviceInfo, reason: impl Into<String>) -> Self {
        Self {
            risk_score: MAX_RISK_SCORE,
            risk_level: RiskLevel::Critical,
            triggered_rules: Vec::new(),
            decision_hint: DecisionHint::block(reason),
            assessment: AssessmentRecord {
                device,
                timestamp: Utc::now(),
                ip: None,
                geo: None,
                signals: None,
            },
        }
    }

    /// Returns `true` if the request may proceed without a challenge.
    pub fn is_allowed(&self) -> bool {
        self.decision_hint.action == DecisionAction::Allow
    }

    /// Returns `true` if the request is blocked.
    pub fn is_blocked(&self) -> bool {
        self.decision_hint.action == DecisionAction::Block
    }

    /// Returns `true` if the request requires a second factor.
    pub fn requires_mfa(&self) -> bool {
        self.decision_hint.action == DecisionAction::Mfa
    }

    /// Returns `true` if the given rule fired.
    pub fn triggered(&self, rule: RuleId) -> bool {
        self.triggered_rules.contains(&rule)
    }
}

/// The result of one security pipeline execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPipelineResult {
    /// The device the decision applies to.
    pub device_info: DeviceInfo,
    /// The risk assessment.
    pub risk_assessment: RiskAssessmentResult,
}

impl SecurityPipelineResult {
    /// Returns the decided action.
    pub fn action(&self) -> DecisionAction {
        self.risk_assessment.decision_hint.action
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_closed_result() {
        let result =
            RiskAssessmentResult::fail_closed(DeviceInfo::synthetic(), "security pipeline error: fingerprint");
        assert_eq!(result.risk_score, 100);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert!(result.is_blocked());
        assert!(!result.is_allowed());
        assert_eq!(
            result.decision_hint.block_reason.as_deref(),
            Some("security pipeline error: fingerprint")
        );
        assert_eq!(result.assessment.device.device_id, "unknown");
    }

    #[test]
    fn test_pipeline_result_serializes_camel_case() {
        let result = SecurityPipelineResult {
            device_info: DeviceInfo::synthetic(),
            risk_assessment: RiskAssessmentResult::fail_closed(DeviceInfo::synthetic(), "x"),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["riskAssessment"]["riskLevel"], "critical");
        assert_eq!(value["riskAssessment"]["decisionHint"]["action"], "block");
        assert_eq!(result.action(), DecisionAction::Block);
    }
}
