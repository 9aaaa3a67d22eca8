use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub event_name: String,
    pub request_id: String,
    pub user_id: Option<String>,
    pub outcome: Option<String>,
    pub attributes: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            request_id: request_id.into(),
            user_id: None,
            outcome: None,
            attributes: BTreeMap::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent);
}

/// Writes audit events to the `eventhub.audit` tracing target.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        let attributes = serde_json::to_string(&event.attributes).unwrap_or_default();
        tracing::info!(
            target: "eventhub.audit",
            event_name = %event.event_name,
            request_id = %event.request_id,
            user_id = event.user_id.as_deref().unwrap_or_default(),
            outcome = event.outcome.as_deref().unwrap_or_default(),
            attributes = %attributes,
            "audit event",
        );
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        lock_or_recover(&self.events).clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn emit(&self, event: &AuditEvent) {
        lock_or_recover(&self.events).push(event.clone());
    }
}

#[derive(Clone)]
pub struct Observability {
    sink: Arc<dyn AuditSink>,
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

impl Default for Observability {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl Observability {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn audit(&self, event: AuditEvent) {
        self.sink.emit(&event);
    }

    pub fn increment_counter(&self, name: &str, request_id: &str) {
        let value = {
            let mut counters = lock_or_recover(&self.counters);
            let entry = counters.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        tracing::debug!(
            target: "eventhub.metrics",
            counter = name,
            value,
            request_id,
            "counter incremented",
        );
    }

    pub fn counter_value(&self, name: &str) -> u64 {
        lock_or_recover(&self.counters)
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
