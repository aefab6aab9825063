// splitledger - Shared wallet ledger and settlement engine
//
// Tracks shared wallets with multiple contributing members, applies
// contribution and expense events to a cached balance as one atomic unit,
// and computes who owes whom via a deterministic greedy transfer plan.

pub mod ledger;
pub mod money;
pub mod service;
pub mod settlement;
