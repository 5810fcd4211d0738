//! Audit sinks.

use crate::audit::events::{emit_audit_event, AuditEvent};

use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// A sink for audit events.
///
/// Logging must not fail: implementations swallow and report their own
/// errors rather than affect the decision being audited.
pub trait AuditLogger: Send + Sync + Debug {
    /// Records an event.
    fn log(&self, event: &AuditEvent);
}

/// An arc-wrapped audit logger for shared ownership.
pub type ArcAuditLogger = Arc<dyn AuditLogger>;

/// The default logger: emits each event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: &AuditEvent) {
        emit_audit_event(event);
    }
}

/// Keeps events in memory. Useful in tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditLogger {
    /// Creates an empty logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditLogger for InMemoryAuditLogger {
    fn log(&self, event: &AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}
