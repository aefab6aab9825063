// Service module - External interface consumed by the front end

mod wallet;

pub use wallet::{CategoryTotal, WalletService, WalletStatistics};
