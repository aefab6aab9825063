// Net positions - each member's contributions minus their share of expenses

use crate::ledger::{LedgerError, MemberId, WalletSnapshot};
use crate::money::Money;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A member's standing at a snapshot in time.
///
/// `net > 0` means the member is owed money (over-contributed relative
/// to their share); `net < 0` means they owe money.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetPosition {
    pub member_id: MemberId,
    pub name: String,
    /// Sum of the member's contributions
    pub paid: Money,
    /// Personal expenses plus the member's share of shared expenses
    pub spent: Money,
    pub net: Money,
}

/// Compute every member's net position from the snapshot.
///
/// Shared expenses are split exactly over the snapshot's member list in
/// ascending-id order; remainder cents land on the lowest ids, so the
/// result is deterministic and the shares of each expense sum to its
/// full amount.
pub fn net_positions(snapshot: &WalletSnapshot) -> Result<Vec<NetPosition>, LedgerError> {
    let members = &snapshot.members;
    let index: HashMap<MemberId, usize> = members
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id, i))
        .collect();

    let mut paid = vec![Money::ZERO; members.len()];
    let mut spent = vec![Money::ZERO; members.len()];

    for contribution in &snapshot.contributions {
        if let Some(&i) = index.get(&contribution.member_id) {
            paid[i] = paid[i]
                .checked_add(contribution.amount)
                .ok_or(LedgerError::BalanceOverflow)?;
        }
    }

    for expense in &snapshot.expenses {
        if expense.is_shared {
            let shares = expense.amount.split(members.len());
            for (i, share) in shares.into_iter().enumerate() {
                spent[i] = spent[i]
                    .checked_add(share)
                    .ok_or(LedgerError::BalanceOverflow)?;
            }
        } else if let Some(&i) = index.get(&expense.member_id) {
            spent[i] = spent[i]
                .checked_add(expense.amount)
                .ok_or(LedgerError::BalanceOverflow)?;
        }
    }

    members
        .iter()
        .enumerate()
        .map(|(i, member)| {
            let net = paid[i]
                .checked_sub(spent[i])
                .ok_or(LedgerError::BalanceOverflow)?;
            Ok(NetPosition {
                member_id: member.id,
                name: member.name.clone(),
                paid: paid[i],
                spent: spent[i],
                net,
            })
        })
        .collect()
}
