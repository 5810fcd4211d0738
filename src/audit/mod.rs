//! Structured audit logging for risk decisions.
//!
//! The security pipeline reports every `mfa` and `block` decision, and
//! every failure, to an [`AuditLogger`]. The default
//! [`TracingAuditLogger`] emits them as `tracing` events under the
//! `riskgate::audit` target, so any subscriber (JSON file, OpenTelemetry,
//! etc.) can capture them for tamper-resistant storage.

mod events;
mod logger;

pub use events::{
    emit_audit_event, AuditEvent, AuditEventType, AuditFailure, AUDIT_TARGET,
};
pub use logger::{ArcAuditLogger, AuditLogger, InMemoryAuditLogger, TracingAuditLogger};
