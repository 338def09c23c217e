//! Tenant directory entities: the owning business and its webhook endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventType;

/// Read-only view of a tenant, as the lifecycle engine needs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    /// Key material for the QR payload MAC. Never logged, never exposed.
    pub signing_secret: String,
}

/// A tenant-registered notification target. Endpoints are never hard-deleted;
/// `active = false` is the disable mechanism.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub url: String,
    /// Event-type wire names this endpoint subscribes to.
    pub events: Vec<String>,
    pub active: bool,
    pub secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    pub fn new(
        tenant_id: Uuid,
        url: String,
        events: Vec<String>,
        secret: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            url,
            events,
            active: true,
            secret,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn subscribes_to(&self, event_type: EventType) -> bool {
        self.active && self.events.iter().any(|e| e == event_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(events: Vec<&str>, active: bool) -> WebhookEndpoint {
        let mut ep = WebhookEndpoint::new(
            Uuid::new_v4(),
            "https://example.com/hooks".to_string(),
            events.into_iter().map(String::from).collect(),
            "whsec_test".to_string(),
            Utc::now(),
        );
        ep.active = active;
        ep
    }

    #[test]
    fn subscription_requires_active_and_matching_event() {
        let ep = endpoint(vec!["transaction.created"], true);
        assert!(ep.subscribes_to(EventType::Created));
        assert!(!ep.subscribes_to(EventType::Confirmed));

        let disabled = endpoint(vec!["transaction.created"], false);
        assert!(!disabled.subscribes_to(EventType::Created));
    }
}
