// Ledger store provider
//
// `append` is the single write path for balances: the entry row, the
// reference-uniqueness marker and the account snapshot commit in one sled
// transaction. Conflicting appends for the same user serialize at commit
// time, so the running balance sequence is always consistent.

use log::trace;
use sled::{transaction::ConflictableTransactionResult, Transactional};
use upline_common::{
    account::UserAccount,
    ledger::{EntryKind, EntryStatus, LedgerEntry, LedgerError},
    time::get_current_time_in_millis,
    UserId,
};

use crate::core::{
    error::EngineError,
    storage::{abort, from_json, ledger_key, to_json, user_key, SledStorage},
};

pub trait LedgerProvider {
    /// Fetch an account, if registered.
    fn get_account(&self, user: UserId) -> Result<Option<UserAccount>, EngineError>;

    /// Fetch an account, creating an empty one on first sight.
    fn get_or_create_account(&self, user: UserId) -> Result<UserAccount, EngineError>;

    /// Append one entry and move the account balance atomically.
    ///
    /// A duplicate `reference` is rejected with `DuplicateReference`;
    /// callers retrying a business event must treat that as already
    /// applied. Debits that would drive the balance negative are rejected
    /// without any partial write.
    fn append(
        &self,
        user: UserId,
        kind: EntryKind,
        amount: i64,
        reference: &str,
        status: EntryStatus,
    ) -> Result<LedgerEntry, EngineError>;

    /// All entries of a user, ordered by sequence.
    fn get_entries(&self, user: UserId) -> Result<Vec<LedgerEntry>, EngineError>;

    /// One entry by sequence number.
    fn get_entry(&self, user: UserId, seq: u64) -> Result<LedgerEntry, EngineError>;

    /// Look an entry up by its business reference.
    fn find_by_reference(&self, reference: &str) -> Result<Option<LedgerEntry>, EngineError>;

    /// Check whether a business reference was already applied.
    fn has_reference(&self, reference: &str) -> Result<bool, EngineError>;

    /// Move an entry's lifecycle status forward. The monetary fields are
    /// frozen at append time and never touched here.
    fn set_entry_status(
        &self,
        user: UserId,
        seq: u64,
        status: EntryStatus,
    ) -> Result<LedgerEntry, EngineError>;

    /// Replay the ledger and check it against the cached account fields.
    fn verify_account(&self, user: UserId) -> Result<(), EngineError>;
}

impl LedgerProvider for SledStorage {
    fn get_account(&self, user: UserId) -> Result<Option<UserAccount>, EngineError> {
        trace!("get account {}", user);
        self.load_json(&self.accounts, &user_key(user))
    }

    fn get_or_create_account(&self, user: UserId) -> Result<UserAccount, EngineError> {
        if let Some(account) = self.get_account(user)? {
            return Ok(account);
        }

        let fresh = UserAccount::new(user, get_current_time_in_millis());
        let encoded = serde_json::to_vec(&fresh)?;
        // Insert-if-absent: a concurrent creator wins, reread in that case
        match self.accounts.compare_and_swap(
            user_key(user),
            None as Option<&[u8]>,
            Some(encoded),
        )? {
            Ok(()) => Ok(fresh),
            Err(_) => self
                .get_account(user)?
                .ok_or_else(|| EngineError::Ledger(LedgerError::AccountNotFound(user))),
        }
    }

    fn append(
        &self,
        user: UserId,
        kind: EntryKind,
        amount: i64,
        reference: &str,
        status: EntryStatus,
    ) -> Result<LedgerEntry, EngineError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount.into());
        }

        if reference.is_empty() {
            return Err(LedgerError::EmptyReference.into());
        }

        trace!("append {} {} for user {} ({})", kind, amount, user, reference);

        let now = get_current_time_in_millis();
        let entry = (&self.accounts, &self.ledger, &self.references).transaction(
            |(accounts, ledger, references)| -> ConflictableTransactionResult<LedgerEntry, EngineError> {
                if references.get(reference.as_bytes())?.is_some() {
                    return Err(abort(LedgerError::DuplicateReference(
                        reference.to_string(),
                    )));
                }

                let account_key = user_key(user);
                let mut account = match accounts.get(account_key)? {
                    Some(raw) => from_json::<UserAccount>(&raw)?,
                    None => UserAccount::new(user, now),
                };

                let balance = if amount >= 0 {
                    account
                        .balance
                        .checked_add(amount as u64)
                        .ok_or_else(|| abort(LedgerError::BalanceOverflow { user }))?
                } else {
                    let debit = amount.unsigned_abs();
                    account.balance.checked_sub(debit).ok_or_else(|| {
                        abort(LedgerError::InsufficientFunds {
                            balance: account.balance,
                            debit,
                        })
                    })?
                };

                let seq = account.entry_count;
                let entry = LedgerEntry {
                    user,
                    seq,
                    kind,
                    amount,
                    balance,
                    reference: reference.to_string(),
                    status,
                    created_at: now,
                };

                account.balance = balance;
                account.entry_count = seq + 1;
                if amount > 0 && kind.is_earning() {
                    account.total_earned = account.total_earned.saturating_add(amount as u64);
                }

                let entry_key = ledger_key(user, seq);
                ledger.insert(&entry_key[..], to_json(&entry)?)?;
                references.insert(reference.as_bytes(), &entry_key[..])?;
                accounts.insert(&account_key[..], to_json(&account)?)?;

                Ok(entry)
            },
        )?;

        Ok(entry)
    }

    fn get_entries(&self, user: UserId) -> Result<Vec<LedgerEntry>, EngineError> {
        trace!("get entries for user {}", user);
        let mut entries = Vec::new();
        for row in self.ledger.scan_prefix(user_key(user)) {
            let (_, raw) = row?;
            entries.push(serde_json::from_slice(&raw)?);
        }

        Ok(entries)
    }

    fn get_entry(&self, user: UserId, seq: u64) -> Result<LedgerEntry, EngineError> {
        self.load_json(&self.ledger, &ledger_key(user, seq))?
            .ok_or_else(|| EngineError::Ledger(LedgerError::EntryNotFound { user, seq }))
    }

    fn find_by_reference(&self, reference: &str) -> Result<Option<LedgerEntry>, EngineError> {
        let Some(entry_key) = self.references.get(reference.as_bytes())? else {
            return Ok(None);
        };

        self.load_json(&self.ledger, &entry_key)
    }

    fn has_reference(&self, reference: &str) -> Result<bool, EngineError> {
        Ok(self.references.contains_key(reference.as_bytes())?)
    }

    fn set_entry_status(
        &self,
        user: UserId,
        seq: u64,
        status: EntryStatus,
    ) -> Result<LedgerEntry, EngineError> {
        trace!("set entry status {} for user {} seq {}", status, user, seq);

        let entry_key = ledger_key(user, seq);
        let entry = self.ledger.transaction(
            |ledger| -> ConflictableTransactionResult<LedgerEntry, EngineError> {
                let raw = ledger
                    .get(&entry_key[..])?
                    .ok_or_else(|| abort(LedgerError::EntryNotFound { user, seq }))?;
                let mut entry = from_json::<LedgerEntry>(&raw)?;

                if !entry.status.can_transition_to(status) {
                    return Err(abort(LedgerError::InvalidStatusTransition {
                        from: entry.status,
                        to: status,
                    }));
                }

                entry.status = status;
                ledger.insert(&entry_key[..], to_json(&entry)?)?;
                Ok(entry)
            },
        )?;

        Ok(entry)
    }

    fn verify_account(&self, user: UserId) -> Result<(), EngineError> {
        let account = self
            .get_account(user)?
            .ok_or_else(|| EngineError::Ledger(LedgerError::AccountNotFound(user)))?;

        let mut balance: u64 = 0;
        let mut earned: u64 = 0;
        for entry in self.get_entries(user)? {
            let next = if entry.amount >= 0 {
                balance.checked_add(entry.amount as u64)
            } else {
                balance.checked_sub(entry.amount.unsigned_abs())
            };

            match next {
                Some(next) if next == entry.balance => balance = next,
                _ => {
                    return Err(LedgerError::BrokenChain {
                        user,
                        seq: entry.seq,
                    }
                    .into())
                }
            }

            if entry.amount > 0 && entry.kind.is_earning() {
                earned = earned.saturating_add(entry.amount as u64);
            }
        }

        if balance != account.balance || earned != account.total_earned {
            return Err(LedgerError::BalanceMismatch {
                user,
                cached: account.balance,
                computed: balance,
            }
            .into());
        }

        Ok(())
    }
}
