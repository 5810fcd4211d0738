//! Core types used throughout the riskgate library.
//!
//! This module defines the data carried through one risk evaluation:
//! device and geo information, risk signals, the scoring context, risk
//! levels and the decision hint derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Broad class of the device attempting the login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Desktop or laptop browser.
    Desktop,
    /// Phone.
    Mobile,
    /// Tablet.
    Tablet,
    /// Embedded or IoT device.
    Iot,
    /// Device type could not be determined.
    #[default]
    Unknown,
}

impl DeviceType {
    /// Returns the lowercase name of the device type.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Iot => "iot",
            Self::Unknown => "unknown",
        }
    }
}

/// Coarse geolocation of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    /// ISO 3166-1 alpha-2 country code.
    pub country: Option<String>,
    /// Region or state.
    pub region: Option<String>,
    /// City.
    pub city: Option<String>,
    /// Latitude in degrees.
    pub lat: Option<f64>,
    /// Longitude in degrees.
    pub lng: Option<f64>,
}

impl GeoInfo {
    /// Creates geo information for a country.
    pub fn country(code: impl Into<String>) -> Self {
        Self {
            country: Some(code.into()),
            ..Self::default()
        }
    }

    /// Sets the city.
    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Returns the upper-cased, trimmed country code, if any.
    pub fn normalized_country(&self) -> Option<String> {
        self.country
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_ascii_uppercase)
    }
}

/// Information about the device, as produced by the fingerprint collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Stable device identifier.
    pub device_id: String,
    /// Device class.
    pub device_type: DeviceType,
    /// Operating system, if detected.
    pub os: Option<String>,
    /// Browser, if detected.
    pub browser: Option<String>,
    /// Raw user agent.
    pub user_agent: Option<String>,
    /// Client application version.
    pub app_version: Option<String>,
    /// Client IP as seen by the fingerprinter.
    pub ip: Option<String>,
    /// Geolocation as seen by the fingerprinter.
    pub geo: Option<GeoInfo>,
}

impl DeviceInfo {
    /// Creates a new device with the given id and type.
    pub fn new(device_id: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            device_id: device_id.into(),
            device_type,
            ..Self::default()
        }
    }

    /// The placeholder device used when the pipeline fails before a
    /// fingerprint was established.
    pub fn synthetic() -> Self {
        Self::new("unknown", DeviceType::Unknown)
    }

    /// Sets the operating system.
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    /// Sets the browser.
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets the IP address.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Sets the geolocation.
    pub fn with_geo(mut self, geo: GeoInfo) -> Self {
        self.geo = Some(geo);
        self
    }
}

/// Network and behavioural risk signals for a request.
///
/// Every field is optional: signals come partly from the local request and
/// partly from external providers, and either side may be incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSignals {
    /// The request comes through a VPN.
    pub is_vpn: Option<bool>,
    /// The request comes through Tor.
    pub is_tor: Option<bool>,
    /// The request comes through a proxy.
    pub is_proxy: Option<bool>,
    /// Autonomous system of the client IP.
    pub asn: Option<String>,
    /// IP reputation, 0 (worst) to 100 (best).
    pub reputation_score: Option<f64>,
    /// Request velocity, 0 (calm) to 100 (burst).
    pub velocity_score: Option<f64>,
    /// Geolocation of the previous session.
    pub previous_geo: Option<GeoInfo>,
    /// Additional provider- or plugin-specific signals.
    #[serde(default)]
    pub external_signals: BTreeMap<String, serde_json::Value>,
}

impl RiskSignals {
    /// Creates an empty signal set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the VPN flag.
    pub fn with_vpn(mut self, is_vpn: bool) -> Self {
        self.is_vpn = Some(is_vpn);
        self
    }

    /// Sets the Tor flag.
    pub fn with_tor(mut self, is_tor: bool) -> Self {
        self.is_tor = Some(is_tor);
        self
    }

    /// Sets the proxy flag.
    pub fn with_proxy(mut self, is_proxy: bool) -> Self {
        self.is_proxy = Some(is_proxy);
        self
    }

    /// Sets the ASN.
    pub fn with_asn(mut self, asn: impl Into<String>) -> Self {
        self.asn = Some(asn.into());
        self
    }

    /// Sets the reputation score.
    pub fn with_reputation(mut self, score: f64) -> Self {
        self.reputation_score = Some(score);
        self
    }

    /// Sets the velocity score.
    pub fn with_velocity(mut self, score: f64) -> Self {
        self.velocity_score = Some(score);
        self
    }

    /// Sets the previous session's geolocation.
    pub fn with_previous_geo(mut self, geo: GeoInfo) -> Self {
        self.previous_geo = Some(geo);
        self
    }

    /// Adds an external signal.
    pub fn with_external(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.external_signals.insert(key.into(), value);
        self
    }
}

/// Everything the scoring engine looks at for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringContext {
    /// The device attempting the operation.
    pub device: DeviceInfo,
    /// Request geolocation, overriding the device's.
    pub geo: Option<GeoInfo>,
    /// Request IP, overriding the device's.
    pub ip: Option<String>,
    /// Risk signals.
    pub signals: Option<RiskSignals>,
}

impl ScoringContext {
    /// Creates a context for the given device.
    pub fn new(device: DeviceInfo) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }

    /// Sets the geolocation.
    pub fn with_geo(mut self, geo: GeoInfo) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Sets the IP address.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Sets the risk signals.
    pub fn with_signals(mut self, signals: RiskSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// The effective geolocation: request first, then device.
    pub fn effective_geo(&self) -> Option<&GeoInfo> {
        self.geo.as_ref().or(self.device.geo.as_ref())
    }

    /// The effective IP: request first, then device.
    pub fn effective_ip(&self) -> Option<&str> {
        self.ip.as_deref().or(self.device.ip.as_deref())
    }
}

/// Risk level derived from a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Normal activity.
    Low,
    /// Unusual activity worth a second factor.
    Medium,
    /// Likely hostile.
    High,
    /// Hostile or undecidable.
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// The policy-level action recommended for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    /// Let the request through.
    Allow,
    /// Challenge with a second factor.
    Mfa,
    /// Deny the request.
    Block,
}

impl DecisionAction {
    /// Returns the lowercase name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Mfa => "mfa",
            Self::Block => "block",
        }
    }
}

/// Decision hint with an optional block reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionHint {
    /// The recommended action.
    pub action: DecisionAction,
    /// Why the request is blocked, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
}

impl DecisionHint {
    /// Creates an allow hint.
    pub fn allow() -> Self {
        Self {
            action: DecisionAction::Allow,
            block_reason: None,
        }
    }

    /// Creates an MFA hint.
    pub fn mfa() -> Self {
        Self {
            action: DecisionAction::Mfa,
            block_reason: None,
        }
    }

    /// Creates a block hint.
    pub fn block(reason: impl Into<String>) -> Self {
        Self {
            action: DecisionAction::Block,
            block_reason: Some(reason.into()),
        }
    }

    /// Returns `true` for `mfa` and `block`, the actions that are audited.
    pub fn requires_audit(&self) -> bool {
        !matches!(self.action, DecisionAction::Allow)
    }
}

/// A login or sensitive-operation attempt submitted to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    /// Correlation id for tracing and audit.
    pub request_id: String,
    /// The account being accessed, if known.
    pub user_id: Option<String>,
    /// The operation being attempted.
    pub operation: String,
    /// Client IP.
    pub ip: Option<String>,
    /// Client geolocation.
    pub geo: Option<GeoInfo>,
    /// Locally known risk signals.
    pub signals: Option<RiskSignals>,
    /// Raw user agent, for the fingerprint collaborator.
    pub user_agent: Option<String>,
}

impl Default for LoginAttempt {
    fn default() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: "login".to_string(),
            ip: None,
            geo: None,
            signals: None,
            user_agent: None,
        }
    }
}

impl LoginAttempt {
    /// Creates a login attempt with a fresh request id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user id.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the operation name.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Sets the client IP.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Sets the client geolocation.
    pub fn with_geo(mut self, geo: GeoInfo) -> Self {
        self.geo = Some(geo);
        self
    }

    /// Sets the local risk signals.
    pub fn with_signals(mut self, signals: RiskSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Sets the user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Echo of the evaluated inputs, kept with the result for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentRecord {
    /// The device that was assessed.
    pub device: DeviceInfo,
    /// When the assessment was made.
    pub timestamp: DateTime<Utc>,
    /// Effective IP.
    pub ip: Option<String>,
    /// Effective geolocation.
    pub geo: Option<GeoInfo>,
    /// Final (merged) signals.
    pub signals: Option<RiskSignals>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::Critical.to_string(), "critical");
    }

    #[test]
    fn test_scoring_context_effective_values() {
        let device = DeviceInfo::new("d1", DeviceType::Desktop)
            .with_ip("10.0.0.1")
            .with_geo(GeoInfo::country("DE"));
        let ctx = ScoringContext::new(device.clone());
        assert_eq!(ctx.effective_ip(), Some("10.0.0.1"));
        assert_eq!(
            ctx.effective_geo().and_then(GeoInfo::normalized_country),
            Some("DE".to_string())
        );

        let ctx = ScoringContext::new(device).with_ip("192.168.1.1");
        assert_eq!(ctx.effective_ip(), Some("192.168.1.1"));
    }

    #[test]
    fn test_device_type_serde() {
        let json = serde_json::to_string(&DeviceType::Iot).unwrap();
        assert_eq!(json, "\"iot\"");
        let parsed: DeviceType = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(parsed, DeviceType::Unknown);
    }

    #[test]
    fn test_decision_hint_audit() {
        assert!(!DecisionHint::allow().requires_audit());
        assert!(DecisionHint::mfa().requires_audit());
        let block = DecisionHint::block("risk level high");
        assert!(block.requires_audit());
        assert_eq!(block.block_reason.as_deref(), Some("risk level high"));
    }

    #[test]
    fn test_signals_serde_camel_case() {
        let signals = RiskSignals::new().with_tor(true).with_reputation(12.0);
        let value = serde_json::to_value(&signals).unwrap();
        assert_eq!(value["isTor"], serde_json::json!(true));
        assert_eq!(value["reputationScore"], serde_json::json!(12.0));
    }
}
