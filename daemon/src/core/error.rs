// Engine error type
//
// Aggregates the domain error enums from upline_common with the storage
// layer's failures. Business-rule rejections stay recoverable for callers;
// database and serialization errors are systemic.

use thiserror::Error;
use upline_common::{
    commission::CommissionError, ledger::LedgerError, referral::ReferralError,
    settlement::SettlementError, task::TaskError, withdrawal::WithdrawalError,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Referral(#[from] ReferralError),

    #[error(transparent)]
    Commission(#[from] CommissionError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Withdrawal(#[from] WithdrawalError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Corrupted storage key: {0}")]
    CorruptedKey(String),
}

impl EngineError {
    /// Duplicate-uniqueness violations are success-equivalent for batch
    /// callers retrying an already-applied event.
    pub fn is_already_applied(&self) -> bool {
        matches!(self, EngineError::Ledger(LedgerError::DuplicateReference(_)))
    }
}

// Unwrap sled's transaction wrapper: aborts carry our own error, anything
// else is a storage failure.
impl From<sled::transaction::TransactionError<EngineError>> for EngineError {
    fn from(error: sled::transaction::TransactionError<EngineError>) -> Self {
        match error {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(inner) => EngineError::Database(inner),
        }
    }
}
