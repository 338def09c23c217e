pub mod dispatcher;
pub mod lifecycle;
pub mod sweeper;

pub use dispatcher::{run_dispatcher, WebhookDispatcher};
pub use lifecycle::{CreatedTransaction, SettlementOutcome, TransactionLifecycle};
pub use sweeper::run_sweeper;
