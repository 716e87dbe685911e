pub mod ledger;
pub mod reconciliation;
pub mod refund;
pub mod sweeper;

pub use ledger::{CreateTransactionInput, CreateTransactionOutput, LedgerService};
pub use reconciliation::{GatewayEvent, ReconciliationOutcome, ReconciliationService};
pub use refund::{RefundInput, RefundService};
pub use sweeper::Sweeper;
