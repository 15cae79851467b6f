// User account with cached balance fields
//
// The cached fields are maintained exclusively by the ledger append path:
// `balance` always equals the running balance of the newest ledger entry and
// `total_earned` the cumulative sum of the five commission-bearing kinds.

use serde::{Deserialize, Serialize};

use crate::{time::TimestampMillis, UserId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    /// The user's identifier
    pub id: UserId,

    /// Current wallet balance, mirror of the newest ledger entry
    pub balance: u64,

    /// Cumulative earnings from the five commission-bearing entry kinds
    pub total_earned: u64,

    /// Direct (A-level) referrer, write-once at registration
    pub referrer: Option<UserId>,

    /// Number of ledger entries appended for this user, also the next
    /// entry sequence number
    pub entry_count: u64,

    /// Timestamp when the account was created (Unix millis)
    pub created_at: TimestampMillis,
}

impl UserAccount {
    /// Create a fresh account with zeroed balances.
    pub fn new(id: UserId, created_at: TimestampMillis) -> Self {
        Self {
            id,
            balance: 0,
            total_earned: 0,
            referrer: None,
            entry_count: 0,
            created_at,
        }
    }

    /// Check if this user has bound a referrer
    pub fn has_referrer(&self) -> bool {
        self.referrer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_empty() {
        let account = UserAccount::new(7, 1234567890);
        assert_eq!(account.balance, 0);
        assert_eq!(account.total_earned, 0);
        assert_eq!(account.entry_count, 0);
        assert!(!account.has_referrer());
    }
}
