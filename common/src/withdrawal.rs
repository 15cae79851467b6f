// Withdrawal request state machine types
//
// The balance hold happens at creation: a Pending debit is appended before
// the request row exists, and rejection or deletion reverses it with a
// compensating credit referencing the original request id. Approved and
// Processed requests are immutable.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::{time::TimestampMillis, UserId, WithdrawalId};

/// Lifecycle of a withdrawal request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// Created, balance debited, awaiting admin review
    Pending,
    /// Admin approved, awaiting external payout
    Approved,
    /// Admin rejected, debit refunded
    Rejected,
    /// Funds sent externally, terminal
    Processed,
}

impl WithdrawalStatus {
    /// Valid transitions: Pending -> Approved | Rejected, Approved -> Processed.
    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        matches!(
            (self, next),
            (WithdrawalStatus::Pending, WithdrawalStatus::Approved)
                | (WithdrawalStatus::Pending, WithdrawalStatus::Rejected)
                | (WithdrawalStatus::Approved, WithdrawalStatus::Processed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WithdrawalStatus::Rejected | WithdrawalStatus::Processed)
    }

    /// Non-rejected requests count against the weekly cap.
    pub fn counts_against_cap(&self) -> bool {
        !matches!(self, WithdrawalStatus::Rejected)
    }
}

/// A user's withdrawal request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub id: WithdrawalId,
    pub user: UserId,

    /// Requested amount in base currency units
    pub amount: u64,

    pub status: WithdrawalStatus,

    /// Payment method name (bank, mobile wallet, ...)
    pub method: String,

    /// Free-form payment details (account number, holder name, ...)
    pub details: String,

    /// Timestamp when the request was created (Unix millis)
    pub created_at: TimestampMillis,

    /// Timestamp when the payout was processed, terminal states only
    pub processed_at: Option<TimestampMillis>,
}

impl WithdrawalRequest {
    pub fn new(
        id: WithdrawalId,
        user: UserId,
        amount: u64,
        method: String,
        details: String,
        created_at: TimestampMillis,
    ) -> Self {
        Self {
            id,
            user,
            amount,
            status: WithdrawalStatus::Pending,
            method,
            details,
            created_at,
            processed_at: None,
        }
    }
}

/// Errors that can occur in the withdrawal state machine
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WithdrawalError {
    /// Zero-amount requests rejected outright
    #[error("Withdrawal amount must be positive")]
    ZeroAmount,

    /// Below the configured minimum
    #[error("Withdrawal amount {amount} is below the minimum {minimum}")]
    BelowMinimum { amount: u64, minimum: u64 },

    /// More than the user's withdrawable earnings
    #[error("Withdrawal amount {amount} exceeds available balance {available}")]
    ExceedsAvailable { amount: u64, available: u64 },

    /// Would cross the weekly cap
    #[error("Weekly cap exceeded: {withdrawn} already withdrawn this week, requested {amount}, cap {cap}")]
    WeeklyCapExceeded {
        amount: u64,
        withdrawn: u64,
        cap: u64,
    },

    /// Illegal state machine transition
    #[error("Invalid withdrawal transition from {from} to {to}")]
    InvalidTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    /// Only Pending requests may be deleted
    #[error("Withdrawal {id} is {status}, only pending requests may be deleted")]
    NotPending {
        id: WithdrawalId,
        status: WithdrawalStatus,
    },

    /// Request does not exist
    #[error("Withdrawal request not found: {0}")]
    NotFound(WithdrawalId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use WithdrawalStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Processed));

        assert!(!Pending.can_transition_to(Processed));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Processed.can_transition_to(Pending));
    }

    #[test]
    fn test_cap_accounting() {
        assert!(WithdrawalStatus::Pending.counts_against_cap());
        assert!(WithdrawalStatus::Approved.counts_against_cap());
        assert!(WithdrawalStatus::Processed.counts_against_cap());
        assert!(!WithdrawalStatus::Rejected.counts_against_cap());
    }

    #[test]
    fn test_new_request_is_pending() {
        let request = WithdrawalRequest::new(1, 7, 600, "bank".into(), "acct 42".into(), 1000);
        assert_eq!(request.status, WithdrawalStatus::Pending);
        assert!(request.processed_at.is_none());
    }
}
