pub mod event;
pub mod tenant;
pub mod transaction;

pub use event::{EventType, LifecycleEvent};
pub use tenant::{Tenant, WebhookEndpoint};
pub use transaction::{Transaction, TransactionStatus};
