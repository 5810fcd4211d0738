//! Trust boundary for provider data.
//!
//! Everything a remote provider returns passes through here twice: once as
//! the raw payload, before the response mapper sees it, and once as the
//! mapped [`RiskSignals`]. Scores are clamped to `[0, 100]`, malformed ASN
//! labels are dropped, and non-finite numbers are rejected outright.

use crate::core::{GeoInfo, RemoteProviderResponse, RiskSignals, SanitizeError};

/// Longest ASN label that is kept.
pub const MAX_ASN_LEN: usize = 64;

const MAX_SCORE: f64 = 100.0;

/// Sanitizes a raw provider payload.
pub fn sanitize_response(
    response: RemoteProviderResponse,
) -> Result<RemoteProviderResponse, SanitizeError> {
    Ok(RemoteProviderResponse {
        reputation_score: score(response.reputation_score, "reputation_score")?,
        velocity_score: score(response.velocity_score, "velocity_score")?,
        asn: asn(response.asn),
        ..response
    })
}

/// Sanitizes mapped signals.
pub fn sanitize_signals(signals: RiskSignals) -> Result<RiskSignals, SanitizeError> {
    let previous_geo = match signals.previous_geo {
        Some(geo) => Some(geo_coordinates(geo)?),
        None => None,
    };
    Ok(RiskSignals {
        reputation_score: score(signals.reputation_score, "reputation_score")?,
        velocity_score: score(signals.velocity_score, "velocity_score")?,
        asn: asn(signals.asn),
        previous_geo,
        ..signals
    })
}

/// Returns `true` if `value` is an acceptable ASN label.
pub fn is_valid_asn(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ASN_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
}

fn score(value: Option<f64>, field: &'static str) -> Result<Option<f64>, SanitizeError> {
    match value {
        Some(v) if !v.is_finite() => Err(SanitizeError::NonFinite { field }),
        Some(v) => Ok(Some(v.clamp(0.0, MAX_SCORE))),
        None => Ok(None),
    }
}

fn asn(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    if is_valid_asn(trimmed) {
        Some(trimmed.to_string())
    } else {
        tracing::warn!(len = value.len(), "Dropping malformed ASN from provider data");
        None
    }
}

fn geo_coordinates(geo: GeoInfo) -> Result<GeoInfo, SanitizeError> {
    if geo.lat.is_some_and(|v| !v.is_finite()) {
        return Err(SanitizeError::NonFinite {
            field: "previous_geo.lat",
        });
    }
    if geo.lng.is_some_and(|v| !v.is_finite()) {
        return Err(SanitizeError::NonFinite {
            field: "previous_geo.lng",
        });
    }
    Ok(geo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scores_are_clamped() {
        let response = sanitize_response(RemoteProviderResponse {
            reputation_score: Some(-20.0),
            velocity_score: Some(450.0),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(response.reputation_score, Some(0.0));
        assert_eq!(response.velocity_score, Some(100.0));
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let err = sanitize_response(RemoteProviderResponse {
            reputation_score: Some(f64::NAN),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            SanitizeError::NonFinite {
                field: "reputation_score"
            }
        );

        let err = sanitize_signals(RiskSignals::new().with_velocity(f64::INFINITY)).unwrap_err();
        assert_eq!(
            err,
            SanitizeError::NonFinite {
                field: "velocity_score"
            }
        );
    }

    #[test]
    fn test_asn_rules() {
        assert!(is_valid_asn("AS13335 Cloudflare_Inc.-x"));
        assert!(!is_valid_asn(""));
        assert!(!is_valid_asn("AS1<script>"));
        assert!(!is_valid_asn(&"A".repeat(65)));
        assert!(is_valid_asn(&"A".repeat(64)));

        let signals = sanitize_signals(RiskSignals::new().with_asn("  AS15169 ")).unwrap();
        assert_eq!(signals.asn.as_deref(), Some("AS15169"));

        let signals = sanitize_signals(RiskSignals::new().with_asn("AS1; DROP TABLE")).unwrap();
        assert!(signals.asn.is_none());
    }

    #[test]
    fn test_previous_geo_coordinates() {
        let mut geo = GeoInfo::country("DE");
        geo.lat = Some(f64::NAN);
        assert!(sanitize_signals(RiskSignals::new().with_previous_geo(geo)).is_err());

        let mut geo = GeoInfo::country("DE");
        geo.lat = Some(52.5);
        geo.lng = Some(13.4);
        assert!(sanitize_signals(RiskSignals::new().with_previous_geo(geo)).is_ok());
    }

    #[test]
    fn test_flags_pass_through() {
        let response = sanitize_response(RemoteProviderResponse {
            is_tor: Some(true),
            is_vpn: Some(false),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(response.is_tor, Some(true));
        assert_eq!(response.is_vpn, Some(false));
        assert!(response.is_proxy.is_none());
    }
}
