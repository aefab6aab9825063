// Ledger module - Wallets, members and monetary events
// Durable record of wallets plus the balance maintainer that applies
// contribution/expense events atomically

mod model;
mod store;

pub use model::*;
pub use store::{LedgerError, LedgerStore, StoreError};

pub(crate) use store::with_retry;
