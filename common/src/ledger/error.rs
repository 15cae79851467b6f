// Ledger error types

use thiserror::Error;

use crate::{ledger::EntryStatus, UserId};

/// Errors that can occur in the ledger store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Zero-amount entries are meaningless and rejected before any write
    #[error("Entry amount must not be zero")]
    ZeroAmount,

    /// Reference ids identify the causing event and must not be empty
    #[error("Entry reference must not be empty")]
    EmptyReference,

    /// The reference was already applied; callers retrying an event must
    /// treat this as success
    #[error("Duplicate ledger reference: {0}")]
    DuplicateReference(String),

    /// A debit would drive the running balance negative
    #[error("Insufficient funds: balance {balance}, debit {debit}")]
    InsufficientFunds { balance: u64, debit: u64 },

    /// Balance accumulation overflowed
    #[error("Balance overflow for user {user}")]
    BalanceOverflow { user: UserId },

    /// Cached account balance disagrees with the replayed ledger
    #[error("Balance mismatch for user {user}: cached {cached}, computed {computed}")]
    BalanceMismatch {
        user: UserId,
        cached: u64,
        computed: u64,
    },

    /// Running balance chain broken at an entry
    #[error("Broken balance chain for user {user} at seq {seq}")]
    BrokenChain { user: UserId, seq: u64 },

    /// Account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(UserId),

    /// Entry does not exist
    #[error("Ledger entry not found: user {user}, seq {seq}")]
    EntryNotFound { user: UserId, seq: u64 },

    /// Entries only move forward out of Pending
    #[error("Invalid entry status transition from {from} to {to}")]
    InvalidStatusTransition { from: EntryStatus, to: EntryStatus },
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::DuplicateReference("TASK_1_20250310_42".to_string());
        assert_eq!(
            err.to_string(),
            "Duplicate ledger reference: TASK_1_20250310_42"
        );

        let err = LedgerError::InsufficientFunds {
            balance: 100,
            debit: 500,
        };
        assert_eq!(err.to_string(), "Insufficient funds: balance 100, debit 500");
    }
}
