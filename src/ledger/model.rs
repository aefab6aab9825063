// Ledger records - wallets, members, memberships and monetary events

use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque member identity supplied by the front end
pub type MemberId = i64;

/// Wallet identifier, allocated by the store
pub type WalletId = u64;

/// Event identifier, allocated by the store
pub type EventId = u64;

/// A person known to the ledger: opaque id plus display name
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

impl Member {
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A shared account with one owner, a cached balance and a member list.
///
/// Invariant: `balance` equals the sum of applied contribution amounts
/// minus the sum of applied expense amounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    pub owner_id: MemberId,
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}

/// Credit event: increases the wallet balance by `amount`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: EventId,
    pub wallet_id: WalletId,
    pub member_id: MemberId,
    pub amount: Money,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Debit event: decreases the wallet balance by `amount`.
///
/// `is_shared = true` attributes the cost proportionally to all current
/// members for settlement; `is_shared = false` makes it a personal cost
/// of the acting member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: EventId,
    pub wallet_id: WalletId,
    pub member_id: MemberId,
    pub category: String,
    pub destination: String,
    pub amount: Money,
    pub is_shared: bool,
    pub created_at: DateTime<Utc>,
}

/// Which kind of event an id is expected to resolve to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Contribution,
    Expense,
}

/// A monetary event attached to a wallet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Contribution(Contribution),
    Expense(Expense),
}

impl LedgerEvent {
    pub fn id(&self) -> EventId {
        match self {
            LedgerEvent::Contribution(c) => c.id,
            LedgerEvent::Expense(e) => e.id,
        }
    }

    pub fn wallet_id(&self) -> WalletId {
        match self {
            LedgerEvent::Contribution(c) => c.wallet_id,
            LedgerEvent::Expense(e) => e.wallet_id,
        }
    }

    pub fn member_id(&self) -> MemberId {
        match self {
            LedgerEvent::Contribution(c) => c.member_id,
            LedgerEvent::Expense(e) => e.member_id,
        }
    }

    pub fn amount(&self) -> Money {
        match self {
            LedgerEvent::Contribution(c) => c.amount,
            LedgerEvent::Expense(e) => e.amount,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            LedgerEvent::Contribution(_) => EventKind::Contribution,
            LedgerEvent::Expense(_) => EventKind::Expense,
        }
    }
}

/// Membership of a non-owner member in a wallet.
/// Owner access is implicit via `Wallet::owner_id` and never materialized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub wallet_id: WalletId,
    pub member_id: MemberId,
    pub joined_at: DateTime<Utc>,
}

/// Membership request state: none -> Pending -> {member, Declined}.
/// A declined requester may request again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Pending,
    Declined,
}

/// Consistent view of one wallet for settlement and statistics.
///
/// `members` is the owner plus all accepted members plus every historical
/// event actor, sorted by ascending id. The sort order fixes where the
/// remainder cents of an equal split land.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalletSnapshot {
    pub wallet: Wallet,
    pub members: Vec<Member>,
    pub contributions: Vec<Contribution>,
    pub expenses: Vec<Expense>,
}
