//! Webhook fan-out for lifecycle events.
//!
//! Consumes the event stream asynchronously, fully decoupled from the
//! request path that produced an event: a delivery failure can never fail
//! or roll back the lifecycle operation that triggered it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::event::LifecycleEvent;
use crate::domain::tenant::WebhookEndpoint;
use crate::ports::TenantDirectory;
use crate::signing::{self, SIGNATURE_HEADER};

/// What gets POSTed to an endpoint. Canonicalized and signed as one unit;
/// the body on the wire is byte-identical to what the signature covers.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub data: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

/// Per-endpoint delivery report. `Ok` carries the 2xx status code; anything
/// else (connect error, timeout, non-2xx) is a failure.
#[derive(Debug)]
pub struct DeliveryOutcome {
    pub endpoint_id: Uuid,
    pub url: String,
    pub result: Result<u16, String>,
}

pub struct WebhookDispatcher {
    tenants: Arc<dyn TenantDirectory>,
    clock: Arc<dyn Clock>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(tenants: Arc<dyn TenantDirectory>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            tenants,
            clock,
            client,
        }
    }

    /// Deliver one event to every matching endpoint of the owning tenant,
    /// in parallel. Failures are isolated per endpoint.
    pub async fn dispatch(&self, event: &LifecycleEvent) -> Vec<DeliveryOutcome> {
        let endpoints = match self.tenants.endpoints_for(event.tenant_id).await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                error!(tenant = %event.tenant_id, error = %e, "failed to resolve webhook endpoints");
                return Vec::new();
            }
        };

        let matching: Vec<WebhookEndpoint> = endpoints
            .into_iter()
            .filter(|ep| ep.subscribes_to(event.event_type))
            .collect();

        if matching.is_empty() {
            debug!(
                tenant = %event.tenant_id,
                event = %event.event_type,
                "no matching webhook endpoints"
            );
            return Vec::new();
        }

        join_all(matching.into_iter().map(|ep| self.deliver(event, ep))).await
    }

    async fn deliver(&self, event: &LifecycleEvent, endpoint: WebhookEndpoint) -> DeliveryOutcome {
        let envelope = WebhookEnvelope {
            event: event.event_type.to_string(),
            data: event.data.clone(),
            sent_at: self.clock.now(),
        };

        let body = match signing::canonical_bytes(&envelope) {
            Ok(body) => body,
            Err(e) => {
                error!(endpoint = %endpoint.url, error = %e, "failed to serialize webhook envelope");
                return DeliveryOutcome {
                    endpoint_id: endpoint.id,
                    url: endpoint.url,
                    result: Err(format!("serialization: {}", e)),
                };
            }
        };
        let signature = signing::sign(&endpoint.secret, &body);

        let result = self
            .client
            .post(&endpoint.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        let result = match result {
            Ok(response) if response.status().is_success() => {
                debug!(
                    endpoint = %endpoint.url,
                    event = %event.event_type,
                    status = %response.status(),
                    "webhook delivered"
                );
                Ok(response.status().as_u16())
            }
            Ok(response) => {
                warn!(
                    endpoint = %endpoint.url,
                    event = %event.event_type,
                    status = %response.status(),
                    "webhook delivery rejected"
                );
                Err(format!("endpoint returned {}", response.status()))
            }
            Err(e) => {
                warn!(
                    endpoint = %endpoint.url,
                    event = %event.event_type,
                    error = %e,
                    "webhook delivery failed"
                );
                Err(e.to_string())
            }
        };

        DeliveryOutcome {
            endpoint_id: endpoint.id,
            url: endpoint.url,
            result,
        }
    }
}

/// Consume lifecycle events and fan each one out on its own task. Lagging
/// behind the channel drops the oldest events; that is logged, not fatal.
pub async fn run_dispatcher(
    mut events: broadcast::Receiver<LifecycleEvent>,
    dispatcher: Arc<WebhookDispatcher>,
) {
    info!("webhook dispatcher started");

    loop {
        match events.recv().await {
            Ok(event) => {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(&event).await;
                });
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!("webhook dispatcher lagged, {} event(s) dropped", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
