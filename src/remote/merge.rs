//! Merging local and remote signals.

use crate::core::RiskSignals;

use serde::{Deserialize, Serialize};

/// How remote signals are combined with the locally known ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Remote values replace local ones where present.
    RemoteWins,
    /// Local values are kept where present.
    LocalWins,
    /// Each field takes the riskier value.
    #[default]
    MaxRisk,
}

/// ASN precedence under [`MergeStrategy::MaxRisk`], where "riskier" has no
/// meaning for a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsnMergeStrategy {
    /// Use the remote ASN when present.
    #[default]
    PreferRemote,
    /// Use the local ASN when present.
    PreferLocal,
}

/// Merges `remote` into `local`.
///
/// Under [`MergeStrategy::MaxRisk`] the flags are OR'd, the lower
/// reputation and the higher velocity win, and remote external signals
/// override local ones key by key.
pub fn merge_signals(
    local: Option<&RiskSignals>,
    remote: &RiskSignals,
    strategy: MergeStrategy,
    asn_strategy: AsnMergeStrategy,
) -> RiskSignals {
    let empty = RiskSignals::default();
    let local = local.unwrap_or(&empty);

    match strategy {
        MergeStrategy::RemoteWins => prefer(remote, local),
        MergeStrategy::LocalWins => prefer(local, remote),
        MergeStrategy::MaxRisk => {
            let mut external_signals = local.external_signals.clone();
            external_signals.extend(remote.external_signals.clone());

            RiskSignals {
                is_vpn: either(local.is_vpn, remote.is_vpn),
                is_tor: either(local.is_tor, remote.is_tor),
                is_proxy: either(local.is_proxy, remote.is_proxy),
                asn: match asn_strategy {
                    AsnMergeStrategy::PreferRemote => remote.asn.clone().or(local.asn.clone()),
                    AsnMergeStrategy::PreferLocal => local.asn.clone().or(remote.asn.clone()),
                },
                reputation_score: pick(local.reputation_score, remote.reputation_score, f64::min),
                velocity_score: pick(local.velocity_score, remote.velocity_score, f64::max),
                previous_geo: local.previous_geo.clone().or(remote.previous_geo.clone()),
                external_signals,
            }
        }
    }
}

/// Field-wise `first.or(second)`; external signals of `first` override.
fn prefer(first: &RiskSignals, second: &RiskSignals) -> RiskSignals {
    let mut external_signals = second.external_signals.clone();
    external_signals.extend(first.external_signals.clone());

    RiskSignals {
        is_vpn: first.is_vpn.or(second.is_vpn),
        is_tor: first.is_tor.or(second.is_tor),
        is_proxy: first.is_proxy.or(second.is_proxy),
        asn: first.asn.clone().or(second.asn.clone()),
        reputation_score: first.reputation_score.or(second.reputation_score),
        velocity_score: first.velocity_score.or(second.velocity_score),
        previous_geo: first.previous_geo.clone().or(second.previous_geo.clone()),
        external_signals,
    }
}

fn either(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
    }
}

fn pick(a: Option<f64>, b: Option<f64>, choose: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(choose(a, b)),
        (a, b) => a.or(b),
    }
}
