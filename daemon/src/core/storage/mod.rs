// Sled-backed persistent storage
//
// One tree per logical table, big-endian composite keys so prefix scans
// iterate in natural order, JSON-encoded rows. Multi-tree transactions give
// the atomicity the ledger needs: an entry, its reference-uniqueness marker
// and the account's balance snapshot commit together or not at all.

mod providers;

pub use providers::*;

use std::path::Path;

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Serialize};
use sled::{transaction::ConflictableTransactionError, Tree};
use upline_common::{time::encode_date, TaskId, UserId, WithdrawalId};

use crate::core::error::EngineError;

// Tree names
const ACCOUNTS_TREE: &str = "accounts";
const LEDGER_TREE: &str = "ledger";
const REFERENCES_TREE: &str = "ledger_references";
const CHILDREN_TREE: &str = "referral_children";
const TASKS_TREE: &str = "task_records";
const TASKS_BY_DATE_TREE: &str = "task_dates";
const BONUSES_TREE: &str = "management_bonuses";
const WITHDRAWALS_TREE: &str = "withdrawals";
const WITHDRAWALS_BY_USER_TREE: &str = "withdrawals_by_user";
const RUNS_TREE: &str = "settlement_runs";
const META_TREE: &str = "meta";

// Meta keys
pub(crate) const NEXT_WITHDRAWAL_ID_KEY: &[u8] = b"next_withdrawal_id";

#[derive(Clone)]
pub struct SledStorage {
    db: sled::Db,

    /// User id -> UserAccount
    pub(crate) accounts: Tree,
    /// User id + seq -> LedgerEntry
    pub(crate) ledger: Tree,
    /// Reference string -> ledger key (uniqueness + lookup)
    pub(crate) references: Tree,
    /// Referrer id + referee id -> ReferralBinding (A-level edges only)
    pub(crate) children: Tree,
    /// User id + date + task id -> DailyTaskRecord
    pub(crate) tasks: Tree,
    /// Date + user id -> (), settlement scan index
    pub(crate) tasks_by_date: Tree,
    /// Referrer id + subordinate id + date -> ManagementBonusEntry
    pub(crate) bonuses: Tree,
    /// Withdrawal id -> WithdrawalRequest
    pub(crate) withdrawals: Tree,
    /// User id + withdrawal id -> (), per-user index
    pub(crate) withdrawals_by_user: Tree,
    /// Date -> SettlementRun
    pub(crate) runs: Tree,
    /// Counters
    pub(crate) meta: Tree,
}

impl SledStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let db = sled::open(path)?;
        Ok(Self {
            accounts: db.open_tree(ACCOUNTS_TREE)?,
            ledger: db.open_tree(LEDGER_TREE)?,
            references: db.open_tree(REFERENCES_TREE)?,
            children: db.open_tree(CHILDREN_TREE)?,
            tasks: db.open_tree(TASKS_TREE)?,
            tasks_by_date: db.open_tree(TASKS_BY_DATE_TREE)?,
            bonuses: db.open_tree(BONUSES_TREE)?,
            withdrawals: db.open_tree(WITHDRAWALS_TREE)?,
            withdrawals_by_user: db.open_tree(WITHDRAWALS_BY_USER_TREE)?,
            runs: db.open_tree(RUNS_TREE)?,
            meta: db.open_tree(META_TREE)?,
            db,
        })
    }

    /// Flush on disk to make sure everything is saved
    pub fn flush(&self) -> Result<(), EngineError> {
        self.db.flush()?;
        Ok(())
    }

    // JSON row helpers

    pub(crate) fn load_json<T: DeserializeOwned>(
        &self,
        tree: &Tree,
        key: &[u8],
    ) -> Result<Option<T>, EngineError> {
        match tree.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub(crate) fn save_json<T: Serialize>(
        &self,
        tree: &Tree,
        key: &[u8],
        value: &T,
    ) -> Result<(), EngineError> {
        tree.insert(key, serde_json::to_vec(value)?)?;
        Ok(())
    }
}

// Transaction helpers

/// Wrap a domain error into a transaction abort.
pub(crate) fn abort<E: Into<EngineError>>(error: E) -> ConflictableTransactionError<EngineError> {
    ConflictableTransactionError::Abort(error.into())
}

/// JSON-encode inside a transaction closure.
pub(crate) fn to_json<T: Serialize>(
    value: &T,
) -> Result<Vec<u8>, ConflictableTransactionError<EngineError>> {
    serde_json::to_vec(value).map_err(abort)
}

/// JSON-decode inside a transaction closure.
pub(crate) fn from_json<T: DeserializeOwned>(
    raw: &[u8],
) -> Result<T, ConflictableTransactionError<EngineError>> {
    serde_json::from_slice(raw).map_err(abort)
}

// Key encodings
//
// All composite keys are big-endian so that per-user and per-date ranges
// are contiguous prefixes.

pub(crate) fn user_key(user: UserId) -> [u8; 8] {
    user.to_be_bytes()
}

pub(crate) fn ledger_key(user: UserId, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

pub(crate) fn task_key(user: UserId, date: NaiveDate, task: TaskId) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..12].copy_from_slice(&encode_date(date).to_be_bytes());
    key[12..].copy_from_slice(&task.to_be_bytes());
    key
}

pub(crate) fn user_date_prefix(user: UserId, date: NaiveDate) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..].copy_from_slice(&encode_date(date).to_be_bytes());
    key
}

pub(crate) fn date_user_key(date: NaiveDate, user: UserId) -> [u8; 12] {
    let mut key = [0u8; 12];
    key[..4].copy_from_slice(&encode_date(date).to_be_bytes());
    key[4..].copy_from_slice(&user.to_be_bytes());
    key
}

pub(crate) fn date_prefix(date: NaiveDate) -> [u8; 4] {
    encode_date(date).to_be_bytes()
}

pub(crate) fn bonus_key(referrer: UserId, subordinate: UserId, date: NaiveDate) -> [u8; 20] {
    let mut key = [0u8; 20];
    key[..8].copy_from_slice(&referrer.to_be_bytes());
    key[8..16].copy_from_slice(&subordinate.to_be_bytes());
    key[16..].copy_from_slice(&encode_date(date).to_be_bytes());
    key
}

pub(crate) fn withdrawal_key(id: WithdrawalId) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn user_withdrawal_key(user: UserId, id: WithdrawalId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user.to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

/// Parse the trailing 8 bytes of a composite key as an id.
pub(crate) fn trailing_id(key: &[u8]) -> Result<u64, EngineError> {
    let start = key
        .len()
        .checked_sub(8)
        .ok_or_else(|| EngineError::CorruptedKey(hex_key(key)))?;
    let bytes: [u8; 8] = key[start..]
        .try_into()
        .map_err(|_| EngineError::CorruptedKey(hex_key(key)))?;
    Ok(u64::from_be_bytes(bytes))
}

fn hex_key(key: &[u8]) -> String {
    key.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_prefix_ordered() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        let key = task_key(7, date, 42);
        assert!(key.starts_with(&user_key(7)));
        assert!(key.starts_with(&user_date_prefix(7, date)));

        let key = date_user_key(date, 7);
        assert!(key.starts_with(&date_prefix(date)));
        assert_eq!(trailing_id(&key).unwrap(), 7);

        let key = ledger_key(1, 2);
        assert!(key.starts_with(&user_key(1)));
        assert_eq!(trailing_id(&key).unwrap(), 2);
    }

    #[test]
    fn test_trailing_id_rejects_short_keys() {
        assert!(trailing_id(&[1, 2, 3]).is_err());
    }
}
