//! Built-in risk factors.
//!
//! Each factor maps a [`ScoringContext`] to a score in `[0, 100]`. The
//! penalties are additive and capped at 100.

use crate::core::{DeviceType, GeoInfo, ScoringContext};

use std::net::IpAddr;

/// Country codes that carry the high-risk geo penalty.
pub const HIGH_RISK_COUNTRIES: &[&str] = &["KP", "IR", "SY", "CU", "SD"];

const MAX_FACTOR_SCORE: f64 = 100.0;

const UNKNOWN_DEVICE_PENALTY: f64 = 40.0;
const IOT_DEVICE_PENALTY: f64 = 30.0;
const MISSING_OS_PENALTY: f64 = 20.0;
const MISSING_BROWSER_PENALTY: f64 = 15.0;

const HIGH_RISK_COUNTRY_PENALTY: f64 = 40.0;
const COUNTRY_MISMATCH_PENALTY: f64 = 60.0;

const TOR_PENALTY: f64 = 70.0;
const VPN_PENALTY: f64 = 50.0;
const PROXY_PENALTY: f64 = 40.0;

/// Device factor.
///
/// An unknown device is scored on its type alone; for known types the
/// IoT, missing-OS and missing-browser penalties add up.
pub fn device_score(context: &ScoringContext) -> f64 {
    let device = &context.device;
    if device.device_type == DeviceType::Unknown {
        return UNKNOWN_DEVICE_PENALTY;
    }

    let mut score = 0.0;
    if device.device_type == DeviceType::Iot {
        score += IOT_DEVICE_PENALTY;
    }
    if is_blank(device.os.as_deref()) {
        score += MISSING_OS_PENALTY;
    }
    if is_blank(device.browser.as_deref()) {
        score += MISSING_BROWSER_PENALTY;
    }
    score.min(MAX_FACTOR_SCORE)
}

/// Geo factor. Zero without a known country.
pub fn geo_score(context: &ScoringContext) -> f64 {
    let Some(country) = context.effective_geo().and_then(GeoInfo::normalized_country) else {
        return 0.0;
    };

    let mut score = 0.0;
    if HIGH_RISK_COUNTRIES.contains(&country.as_str()) {
        score += HIGH_RISK_COUNTRY_PENALTY;
    }

    let previous = context
        .signals
        .as_ref()
        .and_then(|s| s.previous_geo.as_ref())
        .and_then(GeoInfo::normalized_country);
    if previous.is_some_and(|previous| previous != country) {
        score += COUNTRY_MISMATCH_PENALTY;
    }
    score.min(MAX_FACTOR_SCORE)
}

/// Network factor. Zero unless the effective IP parses as IPv4 or IPv6.
pub fn network_score(context: &ScoringContext) -> f64 {
    let valid_ip = context
        .effective_ip()
        .is_some_and(|ip| ip.trim().parse::<IpAddr>().is_ok());
    if !valid_ip {
        return 0.0;
    }
    let Some(signals) = context.signals.as_ref() else {
        return 0.0;
    };

    let mut score = 0.0;
    if signals.is_tor == Some(true) {
        score += TOR_PENALTY;
    }
    if signals.is_vpn == Some(true) {
        score += VPN_PENALTY;
    }
    if signals.is_proxy == Some(true) {
        score += PROXY_PENALTY;
    }
    if let Some(reputation) = signals.reputation_score.filter(|r| r.is_finite()) {
        score += reputation_penalty(reputation);
    }
    score.min(MAX_FACTOR_SCORE)
}

/// Velocity factor: the velocity signal clamped to `[0, 100]`.
pub fn velocity_score(context: &ScoringContext) -> f64 {
    context
        .signals
        .as_ref()
        .and_then(|s| s.velocity_score)
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, MAX_FACTOR_SCORE))
        .unwrap_or(0.0)
}

fn reputation_penalty(reputation: f64) -> f64 {
    if reputation < 10.0 {
        50.0
    } else if reputation < 30.0 {
        30.0
    } else if reputation < 50.0 {
        10.0
    } else {
        0.0
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeviceInfo, RiskSignals};

    fn context(device: DeviceInfo) -> ScoringContext {
        ScoringContext::new(device)
    }

    fn desktop() -> DeviceInfo {
        DeviceInfo::new("dev-1", DeviceType::Desktop)
            .with_os("windows")
            .with_browser("edge")
    }

    #[test]
    fn test_device_factor() {
        assert_eq!(
            device_score(&context(DeviceInfo::new("d", DeviceType::Unknown))),
            40.0
        );
        assert_eq!(device_score(&context(desktop())), 0.0);
        assert_eq!(
            device_score(&context(DeviceInfo::new("d", DeviceType::Iot))),
            65.0
        );
        assert_eq!(
            device_score(&context(DeviceInfo::new("d", DeviceType::Mobile).with_os("ios"))),
            15.0
        );
    }

    #[test]
    fn test_geo_factor() {
        let ctx = context(desktop())
            .with_geo(GeoInfo::country("KP"))
            .with_signals(RiskSignals::new().with_previous_geo(GeoInfo::country("IR")));
        assert_eq!(geo_score(&ctx), 100.0);

        let ctx = context(desktop()).with_geo(GeoInfo::country("SY"));
        assert_eq!(geo_score(&ctx), 40.0);

        assert_eq!(geo_score(&context(desktop())), 0.0);
    }

    #[test]
    fn test_geo_falls_back_to_device_geo() {
        let ctx = context(desktop().with_geo(GeoInfo::country("cu")));
        assert_eq!(geo_score(&ctx), 40.0);
    }

    #[test]
    fn test_network_factor_requires_valid_ip() {
        let signals = RiskSignals::new().with_tor(true);
        let ctx = context(desktop()).with_signals(signals.clone());
        assert_eq!(network_score(&ctx), 0.0);

        let ctx = context(desktop())
            .with_ip("not-an-ip")
            .with_signals(signals.clone());
        assert_eq!(network_score(&ctx), 0.0);

        let ctx = context(desktop()).with_ip("2001:db8::1").with_signals(signals);
        assert_eq!(network_score(&ctx), 70.0);
    }

    #[test]
    fn test_network_penalties_cap() {
        let ctx = context(desktop())
            .with_ip("192.168.1.1")
            .with_signals(RiskSignals::new().with_tor(true).with_vpn(true));
        assert_eq!(network_score(&ctx), 100.0);
    }

    #[test]
    fn test_reputation_bands() {
        let score = |r: f64| {
            network_score(
                &context(desktop())
                    .with_ip("10.0.0.1")
                    .with_signals(RiskSignals::new().with_reputation(r)),
            )
        };
        assert_eq!(score(5.0), 50.0);
        assert_eq!(score(10.0), 30.0);
        assert_eq!(score(35.0), 10.0);
        assert_eq!(score(50.0), 0.0);
        assert_eq!(score(f64::NAN), 0.0);
    }

    #[test]
    fn test_velocity_factor() {
        let score = |v: f64| {
            velocity_score(&context(desktop()).with_signals(RiskSignals::new().with_velocity(v)))
        };
        assert_eq!(score(42.0), 42.0);
        assert_eq!(score(250.0), 100.0);
        assert_eq!(score(-3.0), 0.0);
        assert_eq!(score(f64::INFINITY), 0.0);
        assert_eq!(velocity_score(&context(desktop())), 0.0);
    }
}
