//! The transaction lifecycle engine: sole writer of status transitions.
//!
//! Every status change goes through an atomic conditional update in the
//! store; concurrent confirm/cancel/expire attempts on the same transaction
//! are linearized there, and losers observe `InvalidTransition`.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::domain::event::{EventType, LifecycleEvent};
use crate::domain::transaction::{
    transition_allowed, Transaction, TransactionStatus, DEFAULT_TTL_MINUTES,
};
use crate::error::AppError;
use crate::ports::{
    SequenceSource, StoreError, TenantDirectory, TransactionStore, TRANSACTION_NO_SEQUENCE,
};
use crate::signing::{self, QrPayload};
use crate::validation::{validate_amount, validate_reference, validate_ttl_minutes};

/// Upper bound on rows handled per sweep pass. Anything beyond it is picked
/// up by the next tick.
const SWEEP_BATCH_LIMIT: i64 = 500;

/// Result of a successful creation: the persisted transaction plus the exact
/// payload the client must round-trip at confirmation time.
#[derive(Debug, Clone)]
pub struct CreatedTransaction {
    pub transaction: Transaction,
    pub payload: QrPayload,
}

/// Outcome reported by the external settlement collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Success,
    Failed,
}

impl SettlementOutcome {
    fn status(self) -> TransactionStatus {
        match self {
            SettlementOutcome::Success => TransactionStatus::Success,
            SettlementOutcome::Failed => TransactionStatus::Failed,
        }
    }
}

pub struct TransactionLifecycle {
    store: Arc<dyn TransactionStore>,
    sequences: Arc<dyn SequenceSource>,
    tenants: Arc<dyn TenantDirectory>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<LifecycleEvent>,
}

impl TransactionLifecycle {
    pub fn new(
        store: Arc<dyn TransactionStore>,
        sequences: Arc<dyn SequenceSource>,
        tenants: Arc<dyn TenantDirectory>,
        clock: Arc<dyn Clock>,
        events: broadcast::Sender<LifecycleEvent>,
    ) -> Self {
        Self {
            store,
            sequences,
            tenants,
            clock,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Create a transaction intent: assign the next platform-wide number,
    /// sign the QR payload with the tenant's secret, persist, emit
    /// `transaction.created`.
    pub async fn create(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        reference: &str,
        amount: i64,
        ttl_minutes: Option<i64>,
    ) -> Result<CreatedTransaction, AppError> {
        let ttl_minutes = ttl_minutes.unwrap_or(DEFAULT_TTL_MINUTES);
        validate_reference(reference)?;
        validate_amount(amount)?;
        validate_ttl_minutes(ttl_minutes)?;

        let tenant = self
            .tenants
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("tenant {}", tenant_id)))?;

        if self
            .store
            .get_by_reference(tenant_id, reference)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateReference(reference.to_string()));
        }

        // Fails closed: no transaction is created without a number.
        let no = self
            .sequences
            .next(TRANSACTION_NO_SEQUENCE)
            .await
            .map_err(|e| AppError::SequenceUnavailable(e.to_string()))?;

        let now = self.clock.now();
        let id = Uuid::new_v4();
        let expires_at = now + Duration::minutes(ttl_minutes);

        let payload = QrPayload {
            id,
            reference: reference.to_string(),
            no,
            tenant_name: tenant.name.clone(),
            amount,
            expires_at: expires_at.timestamp(),
        };
        let payload_bytes = signing::canonical_bytes(&payload)
            .map_err(|e| AppError::Internal(format!("payload serialization: {}", e)))?;
        let signature = signing::sign(&tenant.signing_secret, &payload_bytes);

        let tx = Transaction::new(
            id,
            tenant_id,
            customer_id,
            reference.to_string(),
            no,
            amount,
            ttl_minutes,
            signature,
            now,
        );

        // The unique (tenant_id, reference) constraint closes the race the
        // pre-check above leaves open.
        let stored = self.store.insert(&tx).await.map_err(|e| match e {
            StoreError::Conflict(_) => AppError::DuplicateReference(reference.to_string()),
            other => AppError::Store(other),
        })?;

        self.emit(
            EventType::Created,
            &stored,
            json!({
                "id": stored.id,
                "ref": stored.reference,
                "no": stored.no,
                "amount": stored.amount,
                "expires_at": stored.expires_at,
            }),
        );

        Ok(CreatedTransaction {
            transaction: stored,
            payload,
        })
    }

    /// Confirm an intent with a card reference and the signature the client
    /// was handed at creation. Exactly one of several concurrent confirms
    /// succeeds; the rest see `InvalidTransition`.
    pub async fn confirm(
        &self,
        id: Uuid,
        card_id: Uuid,
        signature: &str,
    ) -> Result<Transaction, AppError> {
        let tx = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;

        if tx.status != TransactionStatus::New {
            return Err(AppError::InvalidTransition {
                from: tx.status,
                to: TransactionStatus::Processing,
            });
        }

        // The client must replay the exact signature it was issued.
        if !signing::signatures_match(signature, &tx.signature) {
            return Err(AppError::SignatureMismatch);
        }

        let now = self.clock.now();
        match self
            .store
            .update_status_if(
                id,
                TransactionStatus::New,
                TransactionStatus::Processing,
                Some(card_id),
                now,
            )
            .await?
        {
            Some(updated) => {
                self.emit(
                    EventType::Confirmed,
                    &updated,
                    json!({ "id": updated.id, "card_id": updated.card_id }),
                );
                Ok(updated)
            }
            None => Err(self.transition_conflict(id, TransactionStatus::Processing).await),
        }
    }

    /// Cancel an intent. Allowed from `new` and `processing` only.
    pub async fn cancel(&self, id: Uuid) -> Result<Transaction, AppError> {
        let tx = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;

        if !transition_allowed(tx.status, TransactionStatus::Cancelled) {
            return Err(AppError::InvalidTransition {
                from: tx.status,
                to: TransactionStatus::Cancelled,
            });
        }

        let now = self.clock.now();
        match self
            .store
            .update_status_if(id, tx.status, TransactionStatus::Cancelled, None, now)
            .await?
        {
            Some(updated) => {
                self.emit(
                    EventType::Cancelled,
                    &updated,
                    json!({ "id": updated.id }),
                );
                Ok(updated)
            }
            None => Err(self.transition_conflict(id, TransactionStatus::Cancelled).await),
        }
    }

    /// Accept a settlement outcome from the external collaborator. The write
    /// still goes through the transition table; no lifecycle event is
    /// emitted for settlement.
    pub async fn settle(
        &self,
        id: Uuid,
        outcome: SettlementOutcome,
    ) -> Result<Transaction, AppError> {
        let tx = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))?;

        let target = outcome.status();
        if !transition_allowed(tx.status, target) {
            return Err(AppError::InvalidTransition {
                from: tx.status,
                to: target,
            });
        }

        let now = self.clock.now();
        match self
            .store
            .update_status_if(id, tx.status, target, None, now)
            .await?
        {
            Some(updated) => Ok(updated),
            None => Err(self.transition_conflict(id, target).await),
        }
    }

    /// Force overdue unconfirmed transactions into `cancelled`. Each row is
    /// re-checked at update time, so a confirmation that slips in between
    /// scan and update wins the race. Per-row failures do not abort the
    /// batch. Returns the number of transactions transitioned.
    pub async fn expire_overdue(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let overdue = self.store.find_overdue(now, SWEEP_BATCH_LIMIT).await?;

        let mut expired = 0u64;
        for tx in overdue {
            match self
                .store
                .update_status_if(
                    tx.id,
                    TransactionStatus::New,
                    TransactionStatus::Cancelled,
                    None,
                    now,
                )
                .await
            {
                Ok(Some(updated)) => {
                    expired += 1;
                    self.emit(
                        EventType::Expired,
                        &updated,
                        json!({ "id": updated.id, "expired_at": now }),
                    );
                }
                Ok(None) => {
                    debug!(transaction = %tx.id, "status changed during sweep, skipping");
                }
                Err(e) => {
                    warn!(transaction = %tx.id, error = %e, "failed to expire transaction");
                }
            }
        }

        Ok(expired)
    }

    pub async fn find(&self, id: Uuid) -> Result<Transaction, AppError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("transaction {}", id)))
    }

    /// The conditional update lost a race; report the status that won it.
    async fn transition_conflict(&self, id: Uuid, to: TransactionStatus) -> AppError {
        match self.store.get(id).await {
            Ok(Some(current)) => AppError::InvalidTransition {
                from: current.status,
                to,
            },
            Ok(None) => AppError::NotFound(format!("transaction {}", id)),
            Err(e) => AppError::Store(e),
        }
    }

    /// Fire-and-forget publication. A send into a channel with no listeners
    /// is not an error; delivery concerns never reach the caller.
    fn emit(&self, event_type: EventType, tx: &Transaction, data: serde_json::Value) {
        let event = LifecycleEvent {
            event_type,
            transaction_id: tx.id,
            tenant_id: tx.tenant_id,
            data,
            timestamp: self.clock.now(),
        };
        let _ = self.events.send(event);
    }
}
