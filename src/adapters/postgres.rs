//! Postgres implementations of the store ports.
//!
//! The conditional status update and the counter upsert are each a single
//! statement; the database linearizes them, so no in-process locking exists
//! anywhere in this adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::tenant::{Tenant, WebhookEndpoint};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::ports::{
    SequenceSource, StoreError, StoreResult, TenantDirectory, TransactionStore,
};

const TRANSACTION_COLUMNS: &str = "id, tenant_id, customer_id, reference, no, amount, status, \
     card_id, ttl_minutes, expires_at, signature, created_at, updated_at";

#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                id, tenant_id, customer_id, reference, no, amount, status,
                card_id, ttl_minutes, expires_at, signature, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, tenant_id, customer_id, reference, no, amount, status,
                card_id, ttl_minutes, expires_at, signature, created_at, updated_at
            "#,
        )
        .bind(tx.id)
        .bind(tx.tenant_id)
        .bind(tx.customer_id)
        .bind(&tx.reference)
        .bind(tx.no)
        .bind(tx.amount)
        .bind(tx.status.as_str())
        .bind(tx.card_id)
        .bind(tx.ttl_minutes)
        .bind(tx.expires_at)
        .bind(&tx.signature)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.into_domain()
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn get_by_reference(
        &self,
        tenant_id: Uuid,
        reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE tenant_id = $1 AND reference = $2",
            TRANSACTION_COLUMNS
        ))
        .bind(tenant_id)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        next: TransactionStatus,
        card_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            UPDATE transactions
            SET status = $3, card_id = COALESCE($4, card_id), updated_at = $5
            WHERE id = $1 AND status = $2
            RETURNING id, tenant_id, customer_id, reference, no, amount, status,
                card_id, ttl_minutes, expires_at, signature, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(card_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions \
             WHERE status = $1 AND expires_at <= $2 \
             ORDER BY expires_at ASC LIMIT $3",
            TRANSACTION_COLUMNS
        ))
        .bind(TransactionStatus::New.as_str())
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

/// Atomic increment-and-fetch against one shared counter row. The upsert
/// initializes the counter at 1 on first use; every later call increments in
/// the same statement that reads the value back.
#[derive(Clone)]
pub struct PostgresSequenceGenerator {
    pool: PgPool,
}

impl PostgresSequenceGenerator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceSource for PostgresSequenceGenerator {
    async fn next(&self, name: &str) -> StoreResult<i64> {
        let next_no: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequence_counters (name, next_no)
            VALUES ($1, 1)
            ON CONFLICT (name)
            DO UPDATE SET next_no = sequence_counters.next_no + 1
            RETURNING next_no
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(next_no)
    }
}

#[derive(Clone)]
pub struct PostgresTenantDirectory {
    pool: PgPool,
}

impl PostgresTenantDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantDirectory for PostgresTenantDirectory {
    async fn get_tenant(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, TenantRow>(
            "SELECT id, name, signing_secret FROM tenants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(tenant.map(TenantRow::into_domain))
    }

    async fn endpoints_for(&self, tenant_id: Uuid) -> StoreResult<Vec<WebhookEndpoint>> {
        let rows = sqlx::query_as::<_, EndpointRow>(
            "SELECT id, tenant_id, url, events, active, secret, created_at, updated_at \
             FROM webhook_endpoints WHERE tenant_id = $1 ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows.into_iter().map(EndpointRow::into_domain).collect())
    }

    async fn get_endpoint(
        &self,
        tenant_id: Uuid,
        endpoint_id: Uuid,
    ) -> StoreResult<Option<WebhookEndpoint>> {
        let row = sqlx::query_as::<_, EndpointRow>(
            "SELECT id, tenant_id, url, events, active, secret, created_at, updated_at \
             FROM webhook_endpoints WHERE tenant_id = $1 AND id = $2",
        )
        .bind(tenant_id)
        .bind(endpoint_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.map(EndpointRow::into_domain))
    }

    async fn insert_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<WebhookEndpoint> {
        let row = sqlx::query_as::<_, EndpointRow>(
            r#"
            INSERT INTO webhook_endpoints (
                id, tenant_id, url, events, active, secret, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, tenant_id, url, events, active, secret, created_at, updated_at
            "#,
        )
        .bind(endpoint.id)
        .bind(endpoint.tenant_id)
        .bind(&endpoint.url)
        .bind(&endpoint.events)
        .bind(endpoint.active)
        .bind(&endpoint.secret)
        .bind(endpoint.created_at)
        .bind(endpoint.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(row.into_domain())
    }

    async fn update_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<WebhookEndpoint> {
        let row = sqlx::query_as::<_, EndpointRow>(
            r#"
            UPDATE webhook_endpoints
            SET url = $3, events = $4, active = $5, secret = $6, updated_at = $7
            WHERE id = $1 AND tenant_id = $2
            RETURNING id, tenant_id, url, events, active, secret, created_at, updated_at
            "#,
        )
        .bind(endpoint.id)
        .bind(endpoint.tenant_id)
        .bind(&endpoint.url)
        .bind(&endpoint.events)
        .bind(endpoint.active)
        .bind(&endpoint.secret)
        .bind(endpoint.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(EndpointRow::into_domain).ok_or_else(|| {
            StoreError::Conflict(format!("endpoint {} does not exist", endpoint.id))
        })
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    tenant_id: Uuid,
    customer_id: Uuid,
    reference: String,
    no: i64,
    amount: i64,
    status: String,
    card_id: Option<Uuid>,
    ttl_minutes: i64,
    expires_at: DateTime<Utc>,
    signature: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(StoreError::Corrupt)?;

        Ok(Transaction {
            id: self.id,
            tenant_id: self.tenant_id,
            customer_id: self.customer_id,
            reference: self.reference,
            no: self.no,
            amount: self.amount,
            status,
            card_id: self.card_id,
            ttl_minutes: self.ttl_minutes,
            expires_at: self.expires_at,
            signature: self.signature,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TenantRow {
    id: Uuid,
    name: String,
    signing_secret: String,
}

impl TenantRow {
    fn into_domain(self) -> Tenant {
        Tenant {
            id: self.id,
            name: self.name,
            signing_secret: self.signing_secret,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EndpointRow {
    id: Uuid,
    tenant_id: Uuid,
    url: String,
    events: Vec<String>,
    active: bool,
    secret: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EndpointRow {
    fn into_domain(self) -> WebhookEndpoint {
        WebhookEndpoint {
            id: self.id,
            tenant_id: self.tenant_id,
            url: self.url,
            events: self.events,
            active: self.active,
            secret: self.secret,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
