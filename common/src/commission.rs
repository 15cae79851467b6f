// Commission calculator
//
// Pure functions: no storage access, no clock. Given a subordinate's derived
// ancestor chain and a base amount, they produce the set of awards to commit
// through the ledger. All math is integral basis-point arithmetic with a
// u128 intermediate, truncating toward zero.
//
// Two independent computations live here:
// - one-time referral signup rewards, triggered by a referee's first
//   qualifying deposit;
// - recurring daily management bonuses, triggered by the settlement
//   scheduler for subordinates at 100% daily quota.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    config::BPS_DENOMINATOR,
    ledger::EntryKind,
    referral::{AncestorChain, ReferralLevel},
    UserId,
};

/// A single computed commission credit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionAward {
    /// Upline user receiving the credit
    pub recipient: UserId,

    /// Level of the recipient relative to the triggering subordinate
    pub level: ReferralLevel,

    /// Ledger kind to credit
    pub kind: EntryKind,

    /// Award amount in base currency units
    pub amount: u64,
}

/// Errors that can occur while computing commissions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommissionError {
    /// The same user appears at two levels of one chain. Impossible under
    /// the single-A-parent invariant, checked defensively so a corrupted
    /// index can never double-count.
    #[error("Ancestor {user} appears at levels {first} and {second}")]
    DuplicateAncestor {
        user: UserId,
        first: ReferralLevel,
        second: ReferralLevel,
    },
}

/// Result type for commission computations
pub type CommissionResult<T> = Result<T, CommissionError>;

/// Share of `amount` at `bps` basis points, truncating toward zero.
pub fn bps_share(amount: u64, bps: u16) -> u64 {
    (amount as u128 * bps as u128 / BPS_DENOMINATOR as u128) as u64
}

/// One-time referral signup rewards for the referee's existing ancestors.
///
/// Missing levels are skipped without error; zero awards (tiny qualifying
/// amounts) are dropped rather than recorded as zero rows.
pub fn referral_rewards(
    chain: &AncestorChain,
    qualifying_amount: u64,
) -> CommissionResult<Vec<CommissionAward>> {
    compute_awards(chain, qualifying_amount, |level| {
        (level.referral_reward_bps(), level.reward_kind())
    })
}

/// Daily management bonuses for the ancestors of a subordinate whose task
/// income for the day is `task_income`.
///
/// Eligibility (100% quota) is the caller's concern; a zero income yields
/// no awards, matching the "absence of a row signals not eligible" rule.
pub fn management_bonuses(
    chain: &AncestorChain,
    task_income: u64,
) -> CommissionResult<Vec<CommissionAward>> {
    compute_awards(chain, task_income, |level| {
        (level.management_bonus_bps(), level.bonus_kind())
    })
}

fn compute_awards(
    chain: &AncestorChain,
    base_amount: u64,
    table: impl Fn(ReferralLevel) -> (u16, EntryKind),
) -> CommissionResult<Vec<CommissionAward>> {
    check_distinct(chain)?;

    if base_amount == 0 {
        return Ok(Vec::new());
    }

    let mut awards = Vec::with_capacity(chain.len());
    for (level, recipient) in chain.iter() {
        let (bps, kind) = table(level);
        let amount = bps_share(base_amount, bps);
        if amount == 0 {
            continue;
        }

        awards.push(CommissionAward {
            recipient,
            level,
            kind,
            amount,
        });
    }

    Ok(awards)
}

fn check_distinct(chain: &AncestorChain) -> CommissionResult<()> {
    let ancestors: Vec<_> = chain.iter().collect();
    for (i, (first_level, user)) in ancestors.iter().enumerate() {
        for (second_level, other) in &ancestors[i + 1..] {
            if user == other {
                return Err(CommissionError::DuplicateAncestor {
                    user: *user,
                    first: *first_level,
                    second: *second_level,
                });
            }
        }
    }

    Ok(())
}
