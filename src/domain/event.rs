//! Lifecycle events emitted by the transaction engine.
//!
//! Events are fire-and-forget: emitted once, consumed by zero or more
//! listeners, with no acknowledgment flowing back to the emitter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Created,
    Confirmed,
    Cancelled,
    Expired,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Created,
        EventType::Confirmed,
        EventType::Cancelled,
        EventType::Expired,
    ];

    /// Wire name, as tenants subscribe to it.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "transaction.created",
            EventType::Confirmed => "transaction.confirmed",
            EventType::Cancelled => "transaction.cancelled",
            EventType::Expired => "transaction.expired",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable fact about a transaction's status change.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleEvent {
    pub event_type: EventType,
    pub transaction_id: Uuid,
    pub tenant_id: Uuid,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}
