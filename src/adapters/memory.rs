//! In-memory adapters for the store ports.
//!
//! Single-process only; used by tests and local experiments. The conditional
//! update holds the write lock across check and mutation, which gives the
//! same linearization the Postgres adapter gets from its conditional UPDATE.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::tenant::{Tenant, WebhookEndpoint};
use crate::domain::transaction::{Transaction, TransactionStatus};
use crate::ports::{
    SequenceSource, StoreError, StoreResult, TenantDirectory, TransactionStore,
};

#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<Uuid, Transaction>>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.id) {
            return Err(StoreError::Conflict(format!("id {}", tx.id)));
        }
        if transactions
            .values()
            .any(|t| t.tenant_id == tx.tenant_id && t.reference == tx.reference)
        {
            return Err(StoreError::Conflict(format!(
                "reference {} for tenant {}",
                tx.reference, tx.tenant_id
            )));
        }
        transactions.insert(tx.id, tx.clone());
        Ok(tx.clone())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn get_by_reference(
        &self,
        tenant_id: Uuid,
        reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .values()
            .find(|t| t.tenant_id == tenant_id && t.reference == reference)
            .cloned())
    }

    async fn update_status_if(
        &self,
        id: Uuid,
        expected: TransactionStatus,
        next: TransactionStatus,
        card_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transaction>> {
        let mut transactions = self.transactions.write().await;
        match transactions.get_mut(&id) {
            Some(tx) if tx.status == expected => {
                tx.status = next;
                if let Some(card) = card_id {
                    tx.card_id = Some(card);
                }
                tx.updated_at = now;
                Ok(Some(tx.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_overdue(&self, now: DateTime<Utc>, limit: i64) -> StoreResult<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut overdue: Vec<Transaction> = transactions
            .values()
            .filter(|t| t.status == TransactionStatus::New && t.expires_at <= now)
            .cloned()
            .collect();
        overdue.sort_by_key(|t| t.expires_at);
        overdue.truncate(limit as usize);
        Ok(overdue)
    }
}

#[derive(Default, Clone)]
pub struct InMemorySequence {
    counters: Arc<RwLock<HashMap<String, i64>>>,
}

impl InMemorySequence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceSource for InMemorySequence {
    async fn next(&self, name: &str) -> StoreResult<i64> {
        let mut counters = self.counters.write().await;
        let counter = counters.entry(name.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTenantDirectory {
    tenants: Arc<RwLock<HashMap<Uuid, Tenant>>>,
    endpoints: Arc<RwLock<HashMap<Uuid, WebhookEndpoint>>>,
}

impl InMemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_tenant(&self, tenant: Tenant) {
        let mut tenants = self.tenants.write().await;
        tenants.insert(tenant.id, tenant);
    }
}

#[async_trait]
impl TenantDirectory for InMemoryTenantDirectory {
    async fn get_tenant(&self, id: Uuid) -> StoreResult<Option<Tenant>> {
        let tenants = self.tenants.read().await;
        Ok(tenants.get(&id).cloned())
    }

    async fn endpoints_for(&self, tenant_id: Uuid) -> StoreResult<Vec<WebhookEndpoint>> {
        let endpoints = self.endpoints.read().await;
        let mut matching: Vec<WebhookEndpoint> = endpoints
            .values()
            .filter(|ep| ep.tenant_id == tenant_id)
            .cloned()
            .collect();
        matching.sort_by_key(|ep| ep.created_at);
        Ok(matching)
    }

    async fn get_endpoint(
        &self,
        tenant_id: Uuid,
        endpoint_id: Uuid,
    ) -> StoreResult<Option<WebhookEndpoint>> {
        let endpoints = self.endpoints.read().await;
        Ok(endpoints
            .get(&endpoint_id)
            .filter(|ep| ep.tenant_id == tenant_id)
            .cloned())
    }

    async fn insert_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<WebhookEndpoint> {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.contains_key(&endpoint.id) {
            return Err(StoreError::Conflict(format!("endpoint {}", endpoint.id)));
        }
        endpoints.insert(endpoint.id, endpoint.clone());
        Ok(endpoint.clone())
    }

    async fn update_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<WebhookEndpoint> {
        let mut endpoints = self.endpoints.write().await;
        match endpoints.get_mut(&endpoint.id) {
            Some(stored) => {
                *stored = endpoint.clone();
                Ok(endpoint.clone())
            }
            None => Err(StoreError::Conflict(format!(
                "endpoint {} does not exist",
                endpoint.id
            ))),
        }
    }
}
