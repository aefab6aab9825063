// Settlement plan - greedy matching of debtors to creditors
//
// Deterministic, terminates in at most members-1 lines for a balanced
// pot, and every debtor ends at exactly zero. Transfer-count optimality
// is not guaranteed and not a goal.

use crate::ledger::{LedgerError, MemberId, WalletSnapshot};
use crate::money::Money;
use crate::settlement::position::{net_positions, NetPosition};
use serde::{Deserialize, Serialize};
use tracing::error;

/// One settlement line: `from` pays `to` the given amount
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
}

/// Per-member net positions plus the ordered list of peer transfers
/// that settles them
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementPlan {
    pub positions: Vec<NetPosition>,
    pub transfers: Vec<Transfer>,
}

/// Compute the settlement plan for a wallet snapshot.
///
/// Gate: the net total derived from events must equal the wallet's
/// cached balance. A mismatch means a prior atomicity failure upstream;
/// the engine refuses to produce a plan and reports `UnbalancedLedger`
/// rather than silently emitting a wrong one.
///
/// A wallet with a single member never produces settlement lines, and
/// exactly-balanced members are excluded before matching. Amounts are
/// integer cents, so the 0.01 rounding epsilon is exact: a party is
/// "settled" when its residual is zero cents.
pub fn settle(snapshot: &WalletSnapshot) -> Result<SettlementPlan, LedgerError> {
    let positions = net_positions(snapshot)?;

    let mut derived = Money::ZERO;
    for position in &positions {
        derived = derived
            .checked_add(position.net)
            .ok_or(LedgerError::BalanceOverflow)?;
    }
    if derived != snapshot.wallet.balance {
        error!(
            wallet_id = snapshot.wallet.id,
            cached = %snapshot.wallet.balance,
            derived = %derived,
            "cached balance disagrees with event history, refusing to settle"
        );
        return Err(LedgerError::UnbalancedLedger {
            cached: snapshot.wallet.balance,
            derived,
        });
    }

    if positions.len() <= 1 {
        return Ok(SettlementPlan {
            positions,
            transfers: Vec::new(),
        });
    }

    // positions arrive in ascending member-id order, so the secondary
    // sort key (id) is already fixed and the plan is deterministic
    let mut creditors: Vec<(MemberId, Money)> = positions
        .iter()
        .filter(|p| p.net.is_positive())
        .map(|p| (p.member_id, p.net))
        .collect();
    creditors.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut debtors: Vec<(MemberId, Money)> = positions
        .iter()
        .filter(|p| p.net.is_negative())
        .map(|p| (p.member_id, p.net))
        .collect();
    debtors.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));

    let mut transfers = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < debtors.len() && j < creditors.len() {
        let owed = debtors[i].1.abs();
        let due = creditors[j].1;
        let pay = owed.min(due);

        transfers.push(Transfer {
            from: debtors[i].0,
            to: creditors[j].0,
            amount: pay,
        });

        debtors[i].1 = debtors[i]
            .1
            .checked_add(pay)
            .ok_or(LedgerError::BalanceOverflow)?;
        creditors[j].1 = due
            .checked_sub(pay)
            .ok_or(LedgerError::BalanceOverflow)?;

        if debtors[i].1.is_zero() {
            i += 1;
        }
        if creditors[j].1.is_zero() {
            j += 1;
        }
    }

    Ok(SettlementPlan {
        positions,
        transfers,
    })
}
