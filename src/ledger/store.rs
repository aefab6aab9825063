// LedgerStore - Durable wallet/event storage using sled
//
// One named tree per record family. The balance read-modify-write and the
// event insert/remove always commit together in a single serializable
// sled transaction, so a crash can never leave the cached balance
// inconsistent with the set of applied events.

use crate::ledger::model::{
    Contribution, EventId, EventKind, Expense, LedgerEvent, Member, MemberId, Membership,
    RequestState, Wallet, WalletId, WalletSnapshot,
};
use crate::money::Money;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
};
use sled::Transactional;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Tree names for organizing records
mod trees {
    pub const WALLETS: &str = "wallets";
    pub const EVENTS: &str = "events";
    pub const MEMBERS: &str = "members";
    pub const MEMBERSHIPS: &str = "memberships";
    pub const REQUESTS: &str = "requests";
}

/// Errors from storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    OpenFailed(String),

    #[error("database operation failed: {0}")]
    Database(String),

    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    #[error("deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("flush failed: {0}")]
    FlushFailed(String),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Errors surfaced to the request-handler boundary.
///
/// All variants are recoverable: they reject one action and leave the
/// ledger untouched.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("wallet not found")]
    WalletNotFound,

    #[error("event not found")]
    EventNotFound,

    #[error("caller has no rights over the target")]
    Forbidden,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("membership already exists")]
    MembershipAlreadyExists,

    #[error("not a member of this wallet")]
    NotAMember,

    #[error("no pending membership request")]
    NoPendingRequest,

    #[error("balance would overflow")]
    BalanceOverflow,

    #[error("unbalanced ledger: cached balance {cached}, derived from events {derived}")]
    UnbalancedLedger { cached: Money, derived: Money },

    #[error("storage unavailable: {0}")]
    Unavailable(#[from] StoreError),
}

/// Delay before the single retry on a storage failure
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Run a storage-backed operation, retrying once after a short backoff
/// if the store reports itself unavailable. Persistent failure surfaces
/// to the caller.
pub(crate) fn with_retry<T>(op: impl Fn() -> Result<T, LedgerError>) -> Result<T, LedgerError> {
    match op() {
        Err(LedgerError::Unavailable(err)) => {
            warn!(error = %err, "storage failure, retrying once");
            std::thread::sleep(RETRY_BACKOFF);
            op()
        }
        other => other,
    }
}

fn wallet_key(id: WalletId) -> [u8; 8] {
    id.to_be_bytes()
}

fn event_key(id: EventId) -> [u8; 8] {
    id.to_be_bytes()
}

fn member_key(id: MemberId) -> [u8; 8] {
    id.to_be_bytes()
}

fn pair_key(wallet_id: WalletId, member_id: MemberId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&wallet_id.to_be_bytes());
    key[8..].copy_from_slice(&member_id.to_be_bytes());
    key
}

fn member_id_from_pair_key(key: &[u8]) -> Option<MemberId> {
    let bytes: [u8; 8] = key.get(8..16)?.try_into().ok()?;
    Some(MemberId::from_be_bytes(bytes))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    postcard::to_allocvec(value).map_err(|e| StoreError::SerializationFailed(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::DeserializationFailed(e.to_string()))
}

fn abort<T>(err: LedgerError) -> ConflictableTransactionResult<T, LedgerError> {
    Err(ConflictableTransactionError::Abort(err))
}

fn decode_in_txn<T: DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, ConflictableTransactionError<LedgerError>> {
    decode(bytes).map_err(|e| ConflictableTransactionError::Abort(LedgerError::Unavailable(e)))
}

fn encode_in_txn<T: Serialize>(
    value: &T,
) -> Result<Vec<u8>, ConflictableTransactionError<LedgerError>> {
    encode(value).map_err(|e| ConflictableTransactionError::Abort(LedgerError::Unavailable(e)))
}

fn unwrap_txn<T>(result: Result<T, TransactionError<LedgerError>>) -> Result<T, LedgerError> {
    match result {
        Ok(value) => Ok(value),
        Err(TransactionError::Abort(err)) => Err(err),
        Err(TransactionError::Storage(err)) => Err(LedgerError::Unavailable(err.into())),
    }
}

/// Persistent store for wallets, members and monetary events
pub struct LedgerStore {
    db: sled::Db,
    wallets: sled::Tree,
    events: sled::Tree,
    members: sled::Tree,
    memberships: sled::Tree,
    requests: sled::Tree,
}

impl LedgerStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::OpenFailed(e.to_string()))?;
        let wallets = db.open_tree(trees::WALLETS)?;
        let events = db.open_tree(trees::EVENTS)?;
        let members = db.open_tree(trees::MEMBERS)?;
        let memberships = db.open_tree(trees::MEMBERSHIPS)?;
        let requests = db.open_tree(trees::REQUESTS)?;
        Ok(Self {
            db,
            wallets,
            events,
            members,
            memberships,
            requests,
        })
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::FlushFailed(e.to_string()))?;
        Ok(())
    }

    // ========================================================================
    // MEMBERS
    // ========================================================================

    /// Insert or update a member's display name
    pub fn upsert_member(&self, member: &Member) -> Result<(), LedgerError> {
        let payload = encode(member)?;
        self.members
            .insert(&member_key(member.id)[..], payload)
            .map_err(StoreError::from)?;
        Ok(())
    }

    pub fn member(&self, id: MemberId) -> Result<Option<Member>, LedgerError> {
        match self.members.get(member_key(id)).map_err(StoreError::from)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // WALLETS
    // ========================================================================

    /// Create a wallet with a zero balance, owned by `owner_id`
    pub fn create_wallet(&self, owner_id: MemberId, name: String) -> Result<Wallet, LedgerError> {
        let id = self.db.generate_id().map_err(StoreError::from)?;
        let wallet = Wallet {
            id,
            name,
            owner_id,
            balance: Money::ZERO,
            created_at: Utc::now(),
        };
        let payload = encode(&wallet)?;
        self.wallets
            .insert(&wallet_key(id)[..], payload)
            .map_err(StoreError::from)?;
        Ok(wallet)
    }

    pub fn wallet(&self, id: WalletId) -> Result<Option<Wallet>, LedgerError> {
        match self.wallets.get(wallet_key(id)).map_err(StoreError::from)? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        self.wallet(id)?.ok_or(LedgerError::WalletNotFound)
    }

    /// Point-in-time balance read, consistent with the last completed
    /// apply/reverse on this wallet
    pub fn current_balance(&self, wallet_id: WalletId) -> Result<Money, LedgerError> {
        Ok(self.require_wallet(wallet_id)?.balance)
    }

    /// All wallets the member owns or has joined, sorted by id
    pub fn wallets_for_member(&self, member_id: MemberId) -> Result<Vec<Wallet>, LedgerError> {
        let mut by_id: BTreeMap<WalletId, Wallet> = BTreeMap::new();
        for entry in self.wallets.iter() {
            let (_, raw) = entry.map_err(StoreError::from)?;
            let wallet: Wallet = decode(&raw)?;
            if wallet.owner_id == member_id {
                by_id.insert(wallet.id, wallet);
            }
        }
        for entry in self.memberships.iter() {
            let (_, raw) = entry.map_err(StoreError::from)?;
            let membership: Membership = decode(&raw)?;
            if membership.member_id == member_id {
                if let Some(wallet) = self.wallet(membership.wallet_id)? {
                    by_id.insert(wallet.id, wallet);
                }
            }
        }
        Ok(by_id.into_values().collect())
    }

    /// Delete a wallet and everything attached to it.
    ///
    /// The wallet record, its events, memberships and pending requests
    /// are removed in one multi-tree transaction, so an interrupted
    /// delete never exposes a live wallet with partial history.
    pub fn delete_wallet(&self, wallet_id: WalletId) -> Result<(), LedgerError> {
        let event_keys: Vec<[u8; 8]> = self
            .events_for_wallet_raw(wallet_id)?
            .iter()
            .map(|event| event_key(event.id()))
            .collect();
        let prefix = wallet_id.to_be_bytes();
        let mut membership_keys = Vec::new();
        for entry in self.memberships.scan_prefix(prefix) {
            let (key, _) = entry.map_err(StoreError::from)?;
            membership_keys.push(key);
        }
        let mut request_keys = Vec::new();
        for entry in self.requests.scan_prefix(prefix) {
            let (key, _) = entry.map_err(StoreError::from)?;
            request_keys.push(key);
        }

        let result = (&self.wallets, &self.events, &self.memberships, &self.requests)
            .transaction(|(wallets, events, memberships, requests)| {
                wallets.remove(&wallet_key(wallet_id)[..])?;
                for key in &event_keys {
                    events.remove(&key[..])?;
                }
                for key in &membership_keys {
                    memberships.remove(key.clone())?;
                }
                for key in &request_keys {
                    requests.remove(key.clone())?;
                }
                Ok(())
            });
        unwrap_txn(result)
    }

    // ========================================================================
    // BALANCE MAINTAINER - apply / reverse
    // ========================================================================

    /// Record a contribution: balance increase and event insert commit as
    /// one atomic unit. Returns the event and the new balance.
    pub fn record_contribution(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
        amount: Money,
        note: Option<String>,
    ) -> Result<(Contribution, Money), LedgerError> {
        let id = self.db.generate_id().map_err(StoreError::from)?;
        let contribution = Contribution {
            id,
            wallet_id,
            member_id,
            amount,
            note,
            created_at: Utc::now(),
        };
        let new_balance = self.apply(&LedgerEvent::Contribution(contribution.clone()))?;
        Ok((contribution, new_balance))
    }

    /// Record an expense: balance decrease and event insert commit as
    /// one atomic unit. Returns the event and the new balance.
    pub fn record_expense(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
        category: String,
        destination: String,
        amount: Money,
        is_shared: bool,
    ) -> Result<(Expense, Money), LedgerError> {
        let id = self.db.generate_id().map_err(StoreError::from)?;
        let expense = Expense {
            id,
            wallet_id,
            member_id,
            category,
            destination,
            amount,
            is_shared,
            created_at: Utc::now(),
        };
        let new_balance = self.apply(&LedgerEvent::Expense(expense.clone()))?;
        Ok((expense, new_balance))
    }

    fn apply(&self, event: &LedgerEvent) -> Result<Money, LedgerError> {
        let wkey = wallet_key(event.wallet_id());
        let ekey = event_key(event.id());
        let payload = encode(event)?;
        let amount = event.amount();
        let kind = event.kind();

        let result = (&self.wallets, &self.events).transaction(|(wallets, events)| {
            let raw = match wallets.get(&wkey)? {
                Some(raw) => raw,
                None => return abort(LedgerError::WalletNotFound),
            };
            let mut wallet: Wallet = decode_in_txn(&raw)?;
            let updated = match kind {
                EventKind::Contribution => wallet.balance.checked_add(amount),
                EventKind::Expense => wallet.balance.checked_sub(amount),
            };
            wallet.balance = match updated {
                Some(balance) => balance,
                None => return abort(LedgerError::BalanceOverflow),
            };
            wallets.insert(&wkey[..], encode_in_txn(&wallet)?)?;
            events.insert(&ekey[..], payload.clone())?;
            Ok(wallet.balance)
        });
        unwrap_txn(result)
    }

    /// Reverse a previously applied event: the balance is restored to
    /// what it would be had the event never been applied, and the event
    /// record is removed, atomically.
    ///
    /// Fails with `EventNotFound` if the id does not resolve to a live
    /// event of the expected kind, and with `Forbidden` if the requester
    /// is not the event's acting member.
    pub fn reverse(
        &self,
        event_id: EventId,
        kind: EventKind,
        requester_id: MemberId,
    ) -> Result<Money, LedgerError> {
        let ekey = event_key(event_id);

        let result = (&self.wallets, &self.events).transaction(|(wallets, events)| {
            let raw = match events.get(&ekey)? {
                Some(raw) => raw,
                None => return abort(LedgerError::EventNotFound),
            };
            let event: LedgerEvent = decode_in_txn(&raw)?;
            if event.kind() != kind {
                return abort(LedgerError::EventNotFound);
            }
            if event.member_id() != requester_id {
                return abort(LedgerError::Forbidden);
            }

            let wkey = wallet_key(event.wallet_id());
            let raw = match wallets.get(&wkey)? {
                Some(raw) => raw,
                None => return abort(LedgerError::WalletNotFound),
            };
            let mut wallet: Wallet = decode_in_txn(&raw)?;
            let restored = match event.kind() {
                EventKind::Contribution => wallet.balance.checked_sub(event.amount()),
                EventKind::Expense => wallet.balance.checked_add(event.amount()),
            };
            wallet.balance = match restored {
                Some(balance) => balance,
                None => return abort(LedgerError::BalanceOverflow),
            };
            wallets.insert(&wkey[..], encode_in_txn(&wallet)?)?;
            events.remove(&ekey[..])?;
            Ok(wallet.balance)
        });
        unwrap_txn(result)
    }

    // ========================================================================
    // EVENT QUERIES
    // ========================================================================

    fn events_for_wallet_raw(&self, wallet_id: WalletId) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut result = Vec::new();
        for entry in self.events.iter() {
            let (_, raw) = entry.map_err(StoreError::from)?;
            let event: LedgerEvent = decode(&raw)?;
            if event.wallet_id() == wallet_id {
                result.push(event);
            }
        }
        result.sort_by_key(|e| e.id());
        Ok(result)
    }

    /// All live events of a wallet, split by kind and ordered by id
    pub fn events_for_wallet(
        &self,
        wallet_id: WalletId,
    ) -> Result<(Vec<Contribution>, Vec<Expense>), LedgerError> {
        let mut contributions = Vec::new();
        let mut expenses = Vec::new();
        for event in self.events_for_wallet_raw(wallet_id)? {
            match event {
                LedgerEvent::Contribution(c) => contributions.push(c),
                LedgerEvent::Expense(e) => expenses.push(e),
            }
        }
        Ok((contributions, expenses))
    }

    // ========================================================================
    // MEMBERSHIPS AND REQUESTS
    // ========================================================================

    pub fn membership_exists(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .memberships
            .contains_key(pair_key(wallet_id, member_id))
            .map_err(StoreError::from)?)
    }

    /// Accepted member ids of a wallet (owner not included)
    pub fn member_ids_of(&self, wallet_id: WalletId) -> Result<Vec<MemberId>, LedgerError> {
        let mut ids = Vec::new();
        for entry in self.memberships.scan_prefix(wallet_id.to_be_bytes()) {
            let (key, _) = entry.map_err(StoreError::from)?;
            if let Some(id) = member_id_from_pair_key(&key) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn request_state(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
    ) -> Result<Option<RequestState>, LedgerError> {
        match self
            .requests
            .get(pair_key(wallet_id, member_id))
            .map_err(StoreError::from)?
        {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_request_state(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
        state: RequestState,
    ) -> Result<(), LedgerError> {
        let payload = encode(&state)?;
        self.requests
            .insert(&pair_key(wallet_id, member_id)[..], payload)
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// Turn a pending request into a membership: the membership insert
    /// and the request removal commit together.
    ///
    /// Idempotent for existing members; a missing or declined request
    /// fails with `NoPendingRequest`.
    pub fn accept_request(
        &self,
        wallet_id: WalletId,
        member_id: MemberId,
    ) -> Result<(), LedgerError> {
        let key = pair_key(wallet_id, member_id);
        let membership = Membership {
            wallet_id,
            member_id,
            joined_at: Utc::now(),
        };
        let payload = encode(&membership)?;

        let result = (&self.memberships, &self.requests).transaction(|(memberships, requests)| {
            if memberships.get(&key)?.is_some() {
                return Ok(());
            }
            let raw = match requests.get(&key)? {
                Some(raw) => raw,
                None => return abort(LedgerError::NoPendingRequest),
            };
            let state: RequestState = decode_in_txn(&raw)?;
            if state != RequestState::Pending {
                return abort(LedgerError::NoPendingRequest);
            }
            memberships.insert(&key[..], payload.clone())?;
            requests.remove(&key[..])?;
            Ok(())
        });
        unwrap_txn(result)
    }

    // ========================================================================
    // SNAPSHOTS
    // ========================================================================

    /// Consistent view of a wallet for settlement and statistics.
    ///
    /// The member list is the owner plus accepted members plus every
    /// event actor, sorted ascending by id.
    pub fn snapshot(&self, wallet_id: WalletId) -> Result<WalletSnapshot, LedgerError> {
        let wallet = self.require_wallet(wallet_id)?;
        let (contributions, expenses) = self.events_for_wallet(wallet_id)?;

        let mut ids: Vec<MemberId> = vec![wallet.owner_id];
        ids.extend(self.member_ids_of(wallet_id)?);
        ids.extend(contributions.iter().map(|c| c.member_id));
        ids.extend(expenses.iter().map(|e| e.member_id));
        ids.sort_unstable();
        ids.dedup();

        let mut members = Vec::with_capacity(ids.len());
        for id in ids {
            let member = self
                .member(id)?
                .unwrap_or_else(|| Member::new(id, format!("member-{id}")));
            members.push(member);
        }

        Ok(WalletSnapshot {
            wallet,
            members,
            contributions,
            expenses,
        })
    }
}
