pub mod collaborators;
pub mod in_memory;
pub mod postgres_ledger_store;
pub mod postgres_wallet_store;

pub use collaborators::{HttpReferenceResolver, LogDispatcher, PermissiveResolver};
pub use in_memory::{InMemoryLedgerStore, InMemoryWalletStore};
pub use postgres_ledger_store::PostgresLedgerStore;
pub use postgres_wallet_store::PostgresWalletStore;
