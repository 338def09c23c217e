//! Store-facing trait boundary. The lifecycle engine only ever talks to the
//! durable store through these interfaces; adapters live in `crate::adapters`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::tenant::{Tenant, WebhookEndpoint};
use crate::domain::transaction::{Transaction, TransactionStatus};

/// Name of the shared counter that numbers transactions platform-wide.
pub const TRANSACTION_NO_SEQUENCE: &str = "transaction_no";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
                return StoreError::Conflict(db.to_string());
            }
        }
        StoreError::Unavailable(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a new transaction. A `(tenant_id, reference)` collision
    /// surfaces as `StoreError::Conflict`.
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    async fn get_by_reference(
        &self,
        tenant_id: Uuid,
        reference: &str,
    ) -> StoreResult<Option<Transaction>>;

    /// Atomic compare-and-set on status: the update applies only while the
    /// stored status still equals `expected`. Returns the updated row, or
    /// `None` when the condition no longer holds (a concurrent writer won).
    /// `card_id` is written only when `Some`.
    async fn update_status_if(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        next: TransactionStatus,
        card_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>>;

    /// Unconfirmed transactions whose expiry window has closed, oldest first.
    async fn find_overdue(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait SequenceSource: Send + Sync {
    /// Next value of the named counter: a single atomic increment-and-fetch,
    /// creating the counter at 1 on first use. Any failure is surfaced as-is;
    /// there is no non-atomic fallback.
    async fn next(&self, name: &str) -> StoreResult<i64>;
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn get_tenant(&self, id: Uuid) -> StoreResult<Option<Tenant>>;

    /// All endpoints registered by a tenant, active or not, oldest first.
    async fn endpoints_for(&self, tenant_id: Uuid) -> StoreResult<Vec<WebhookEndpoint>>;

    async fn get_endpoint(
        &self,
        tenant_id: Uuid,
        endpoint_id: Uuid,
    ) -> StoreResult<Option<WebhookEndpoint>>;

    async fn insert_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<WebhookEndpoint>;

    async fn update_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<WebhookEndpoint>;
}
