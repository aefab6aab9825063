// Settlement module - Net positions and the transfer plan
// Pure functions over a wallet snapshot: who paid what, who owes whom

mod plan;
mod position;

pub use plan::{settle, SettlementPlan, Transfer};
pub use position::{net_positions, NetPosition};
