// WalletService - The operations the conversational front end consumes
//
// Thin facade over the store: permission checks, amount validation and
// the membership state machine live here; atomicity lives in the store;
// settlement math lives in the settlement module.

use crate::ledger::{
    with_retry, Contribution, EventId, EventKind, Expense, LedgerError, LedgerStore, Member,
    MemberId, RequestState, StoreError, Wallet, WalletId,
};
use crate::money::Money;
use crate::settlement::{settle, SettlementPlan};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Total spent in one expense category
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Money,
}

/// Aggregate view of a wallet's history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletStatistics {
    pub balance: Money,
    pub total_contributions: Money,
    pub total_expenses: Money,
    /// Expense totals per category, largest first
    pub by_category: Vec<CategoryTotal>,
}

/// Shared-wallet operations for the front end.
///
/// Member identity is an opaque integer id plus display name, both
/// supplied by the caller. Every method is safe to call concurrently;
/// mutations of the same wallet are serialized by the store.
pub struct WalletService {
    store: LedgerStore,
}

impl WalletService {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Ok(Self {
            store: LedgerStore::open(path)?,
        })
    }

    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Record or refresh a member's display name
    pub fn register_member(&self, id: MemberId, name: &str) -> Result<(), LedgerError> {
        let member = Member::new(id, name);
        with_retry(|| self.store.upsert_member(&member))
    }

    // ========================================================================
    // WALLET LIFECYCLE
    // ========================================================================

    pub fn create_wallet(&self, owner_id: MemberId, name: &str) -> Result<Wallet, LedgerError> {
        if self.store.member(owner_id)?.is_none() {
            self.register_member(owner_id, &format!("member-{owner_id}"))?;
        }
        let wallet = with_retry(|| self.store.create_wallet(owner_id, name.to_string()))?;
        info!(wallet_id = wallet.id, owner_id, "wallet created");
        Ok(wallet)
    }

    /// Wallets the member owns or has joined, sorted by id
    pub fn wallets_for_member(&self, member_id: MemberId) -> Result<Vec<Wallet>, LedgerError> {
        with_retry(|| self.store.wallets_for_member(member_id))
    }

    /// Destroy a wallet and everything attached to it. Owner only.
    pub fn delete_wallet(
        &self,
        wallet_id: WalletId,
        requester_id: MemberId,
    ) -> Result<(), LedgerError> {
        let wallet = self.store.require_wallet(wallet_id)?;
        if wallet.owner_id != requester_id {
            return Err(LedgerError::Forbidden);
        }
        with_retry(|| self.store.delete_wallet(wallet_id))?;
        info!(wallet_id, "wallet deleted");
        Ok(())
    }

    // ========================================================================
    // MEMBERSHIP - none -> pending -> {member, declined}
    // ========================================================================

    /// Ask to join a wallet. Idempotent while the request is pending;
    /// a declined requester may ask again.
    pub fn request_membership(
        &self,
        wallet_id: WalletId,
        requester_id: MemberId,
    ) -> Result<RequestState, LedgerError> {
        let wallet = self.store.require_wallet(wallet_id)?;
        if wallet.owner_id == requester_id
            || self.store.membership_exists(wallet_id, requester_id)?
        {
            return Err(LedgerError::MembershipAlreadyExists);
        }
        if self.store.request_state(wallet_id, requester_id)? == Some(RequestState::Pending) {
            return Ok(RequestState::Pending);
        }
        with_retry(|| {
            self.store
                .set_request_state(wallet_id, requester_id, RequestState::Pending)
        })?;
        info!(wallet_id, requester_id, "membership requested");
        Ok(RequestState::Pending)
    }

    /// Accept a pending request. Owner only; accepting an existing
    /// member is a no-op.
    pub fn accept_membership(
        &self,
        wallet_id: WalletId,
        requester_id: MemberId,
        acting_id: MemberId,
    ) -> Result<(), LedgerError> {
        let wallet = self.store.require_wallet(wallet_id)?;
        if wallet.owner_id != acting_id {
            return Err(LedgerError::Forbidden);
        }
        with_retry(|| self.store.accept_request(wallet_id, requester_id))?;
        info!(wallet_id, requester_id, "membership accepted");
        Ok(())
    }

    /// Decline a pending request. Owner only; declining an already
    /// declined request is a no-op.
    pub fn decline_membership(
        &self,
        wallet_id: WalletId,
        requester_id: MemberId,
        acting_id: MemberId,
    ) -> Result<(), LedgerError> {
        let wallet = self.store.require_wallet(wallet_id)?;
        if wallet.owner_id != acting_id {
            return Err(LedgerError::Forbidden);
        }
        if self.store.membership_exists(wallet_id, requester_id)? {
            return Err(LedgerError::MembershipAlreadyExists);
        }
        match self.store.request_state(wallet_id, requester_id)? {
            Some(RequestState::Pending) => {
                with_retry(|| {
                    self.store
                        .set_request_state(wallet_id, requester_id, RequestState::Declined)
                })?;
                info!(wallet_id, requester_id, "membership declined");
                Ok(())
            }
            Some(RequestState::Declined) => Ok(()),
            None => Err(LedgerError::NoPendingRequest),
        }
    }

    fn check_member(&self, wallet_id: WalletId, member_id: MemberId) -> Result<(), LedgerError> {
        let wallet = self.store.require_wallet(wallet_id)?;
        if wallet.owner_id == member_id || self.store.membership_exists(wallet_id, member_id)? {
            Ok(())
        } else {
            Err(LedgerError::NotAMember)
        }
    }

    fn check_amount(amount: Money) -> Result<(), LedgerError> {
        if amount.is_positive() {
            Ok(())
        } else {
            Err(LedgerError::InvalidAmount(amount.to_string()))
        }
    }

    // ========================================================================
    // MONETARY EVENTS
    // ========================================================================

    /// Credit the wallet. Returns the event and the new balance.
    pub fn record_contribution(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
        amount: Money,
        note: Option<&str>,
    ) -> Result<(Contribution, Money), LedgerError> {
        Self::check_amount(amount)?;
        self.check_member(wallet_id, member_id)?;
        with_retry(|| {
            self.store
                .record_contribution(wallet_id, member_id, amount, note.map(str::to_string))
        })
    }

    /// Debit the wallet. Returns the event and the new balance.
    pub fn record_expense(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
        category: &str,
        destination: &str,
        amount: Money,
        is_shared: bool,
    ) -> Result<(Expense, Money), LedgerError> {
        Self::check_amount(amount)?;
        self.check_member(wallet_id, member_id)?;
        with_retry(|| {
            self.store.record_expense(
                wallet_id,
                member_id,
                category.to_string(),
                destination.to_string(),
                amount,
                is_shared,
            )
        })
    }

    /// Remove a contribution; only the original acting member may.
    /// Returns the restored balance.
    pub fn delete_contribution(
        &self,
        event_id: EventId,
        requester_id: MemberId,
    ) -> Result<Money, LedgerError> {
        with_retry(|| {
            self.store
                .reverse(event_id, EventKind::Contribution, requester_id)
        })
    }

    /// Remove an expense; only the original acting member may.
    /// Returns the restored balance.
    pub fn delete_expense(
        &self,
        event_id: EventId,
        requester_id: MemberId,
    ) -> Result<Money, LedgerError> {
        with_retry(|| self.store.reverse(event_id, EventKind::Expense, requester_id))
    }

    pub fn current_balance(&self, wallet_id: WalletId) -> Result<Money, LedgerError> {
        with_retry(|| self.store.current_balance(wallet_id))
    }

    // ========================================================================
    // REPORTS
    // ========================================================================

    pub fn statistics(&self, wallet_id: WalletId) -> Result<WalletStatistics, LedgerError> {
        let snapshot = with_retry(|| self.store.snapshot(wallet_id))?;

        let mut total_contributions = Money::ZERO;
        for contribution in &snapshot.contributions {
            total_contributions = total_contributions
                .checked_add(contribution.amount)
                .ok_or(LedgerError::BalanceOverflow)?;
        }

        let mut total_expenses = Money::ZERO;
        let mut per_category: HashMap<&str, Money> = HashMap::new();
        for expense in &snapshot.expenses {
            total_expenses = total_expenses
                .checked_add(expense.amount)
                .ok_or(LedgerError::BalanceOverflow)?;
            let entry = per_category
                .entry(expense.category.as_str())
                .or_insert(Money::ZERO);
            *entry = entry
                .checked_add(expense.amount)
                .ok_or(LedgerError::BalanceOverflow)?;
        }

        let mut by_category: Vec<CategoryTotal> = per_category
            .into_iter()
            .map(|(category, total)| CategoryTotal {
                category: category.to_string(),
                total,
            })
            .collect();
        by_category.sort_by(|a, b| b.total.cmp(&a.total).then(a.category.cmp(&b.category)));

        Ok(WalletStatistics {
            balance: snapshot.wallet.balance,
            total_contributions,
            total_expenses,
            by_category,
        })
    }

    /// Net positions and the transfer plan for the wallet's current state
    pub fn settlement_plan(&self, wallet_id: WalletId) -> Result<SettlementPlan, LedgerError> {
        let snapshot = with_retry(|| self.store.snapshot(wallet_id))?;
        settle(&snapshot)
    }
}
