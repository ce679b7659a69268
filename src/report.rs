//! Structured events emitted by the view container.

use std::sync::Mutex;

use crate::gateway::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Loaded { table: Table, count: usize },
    FallbackActivated { table: Table, reason: String },
    WriteFailed { table: Table, op: Operation, id: i64, error: String },
    LocalOnly { table: Table, op: Operation, id: i64 },
    Orphaned { table: Table, id: i64 },
    Rejected { table: Table, error: String },
}

pub trait Reporter: Send + Sync {
    fn report(&self, event: Event);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, event: Event) {
        match event {
            Event::Loaded { table, count } => {
                tracing::debug!(%table, count, "loaded records");
            }
            Event::FallbackActivated { table, reason } => {
                tracing::warn!(%table, %reason, "showing sample data");
            }
            Event::WriteFailed { table, op, id, error } => {
                tracing::warn!(%table, op = op.as_str(), id, %error, "remote write failed");
            }
            Event::LocalOnly { table, op, id } => {
                tracing::info!(%table, op = op.as_str(), id, "sample record changed locally only");
            }
            Event::Orphaned { table, id } => {
                tracing::warn!(%table, id, "created record was removed before the store confirmed it");
            }
            Event::Rejected { table, error } => {
                tracing::info!(%table, %error, "input rejected");
            }
        }
    }
}

/// Keeps every event in memory; useful in tests and for status lines.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    events: Mutex<Vec<Event>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Event> {
        self.events.lock().ok().and_then(|e| e.last().cloned())
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
