//! Transaction domain entity and the status state machine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MIN_TTL_MINUTES: i64 = 1;
pub const MAX_TTL_MINUTES: i64 = 1440;
pub const DEFAULT_TTL_MINUTES: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    New,
    Processing,
    Success,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::New => "new",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success | TransactionStatus::Failed | TransactionStatus::Cancelled
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TransactionStatus::New),
            "processing" => Ok(TransactionStatus::Processing),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

/// The full set of legal status transitions. Everything else is rejected.
const TRANSITIONS: &[(TransactionStatus, TransactionStatus)] = &[
    (TransactionStatus::New, TransactionStatus::Processing),
    (TransactionStatus::New, TransactionStatus::Cancelled),
    (TransactionStatus::Processing, TransactionStatus::Success),
    (TransactionStatus::Processing, TransactionStatus::Failed),
    (TransactionStatus::Processing, TransactionStatus::Cancelled),
];

pub fn transition_allowed(from: TransactionStatus, to: TransactionStatus) -> bool {
    TRANSITIONS.contains(&(from, to))
}

/// Domain entity representing a payment intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub reference: String,
    pub no: i64,
    pub amount: i64,
    pub status: TransactionStatus,
    pub card_id: Option<Uuid>,
    pub ttl_minutes: i64,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// The id is passed in rather than generated here because the QR payload
    /// is signed over it before the entity exists.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        tenant_id: Uuid,
        customer_id: Uuid,
        reference: String,
        no: i64,
        amount: i64,
        ttl_minutes: i64,
        signature: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            customer_id,
            reference,
            no,
            amount,
            status: TransactionStatus::New,
            card_id: None,
            ttl_minutes,
            expires_at: now + Duration::minutes(ttl_minutes),
            signature,
            created_at: now,
            updated_at: now,
        }
    }
}
