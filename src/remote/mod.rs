//! Remote risk signal enrichment.
//!
//! The [`RemoteProviderStage`] calls an external [`crate::core::RemoteRiskProvider`],
//! runs its answer through the sanitization boundary, maps it to
//! [`crate::core::RiskSignals`] and merges it with the locally known
//! signals. The call is bounded by an [`ExecutionPolicy`] (a timeout or a
//! circuit breaker) and every failure is absorbed according to a
//! [`FailurePolicy`].
//!
//! ```text
//! provider.fetch ──► sanitize_response ──► response mapper ──► sanitize_signals ──► merge
//!        │                   │                                        │
//!        └── error / timeout / open circuit / cancel / NaN ──────────┴──► fallback
//! ```

mod merge;
mod policy;
mod sanitize;
mod stage;

pub use merge::{merge_signals, AsnMergeStrategy, MergeStrategy};
pub use policy::{ExecutionPolicy, FailurePolicy, RemoteFallback, DEFAULT_PROVIDER_TIMEOUT};
pub use sanitize::{is_valid_asn, sanitize_response, sanitize_signals, MAX_ASN_LEN};
pub use stage::{
    default_response_mapper, RemoteProviderStage, RemoteProviderStageBuilder, RemoteStageOutput,
    ResponseMapper,
};
