pub mod transaction;

pub use transaction::{
    Rail, Reference, ReferenceModel, Transaction, TransactionStatus, TransactionType,
};
