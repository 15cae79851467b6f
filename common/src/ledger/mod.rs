// Ledger entry model
//
// Every balance mutation in the system is explained by exactly one ledger
// entry. Entries are append-only: once written, the monetary fields are
// frozen forever and corrections happen through compensating entries, never
// through updates or deletes. The only permitted mutation is the status
// lifecycle (Pending -> Completed/Failed) driven by the withdrawal machine.

mod error;

pub use error::*;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    referral::ReferralLevel,
    time::{encode_date, TimestampMillis},
    TaskId, UserId, WithdrawalId,
};

/// Closed set of transaction kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// Real-time income for a completed reward-bearing task
    TaskIncome,
    /// One-time signup reward for the direct referrer
    ReferralRewardA,
    /// One-time signup reward for the second-level referrer
    ReferralRewardB,
    /// One-time signup reward for the third-level referrer
    ReferralRewardC,
    /// Daily management bonus for the direct referrer
    ManagementBonusA,
    /// Daily management bonus for the second-level referrer
    ManagementBonusB,
    /// Daily management bonus for the third-level referrer
    ManagementBonusC,
    /// Promotional bonus granted on a topup
    TopupBonus,
    /// Manually granted commission
    SpecialCommission,
    /// Generic debit (withdrawals)
    Debit,
    /// Generic credit (topups, withdrawal refunds)
    Credit,
    /// Security deposit for a position, held, not earned
    PositionDeposit,
}

impl EntryKind {
    /// The five commission-bearing families. Only these feed `total_earned`
    /// and the withdrawable balance; topups and deposits never do.
    pub fn is_earning(&self) -> bool {
        matches!(
            self,
            EntryKind::TaskIncome
                | EntryKind::ReferralRewardA
                | EntryKind::ReferralRewardB
                | EntryKind::ReferralRewardC
                | EntryKind::ManagementBonusA
                | EntryKind::ManagementBonusB
                | EntryKind::ManagementBonusC
                | EntryKind::TopupBonus
                | EntryKind::SpecialCommission
        )
    }
}

/// Lifecycle status of a ledger entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    /// Status may only move forward out of Pending.
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Pending, EntryStatus::Completed)
                | (EntryStatus::Pending, EntryStatus::Failed)
        )
    }
}

/// An immutable row of a user's ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Owning user
    pub user: UserId,

    /// Per-user sequence number, assigned at append time
    pub seq: u64,

    /// Transaction kind
    pub kind: EntryKind,

    /// Signed amount: positive credits, negative debits
    pub amount: i64,

    /// Running balance after applying this entry
    pub balance: u64,

    /// Globally unique reference of the causing business event
    pub reference: String,

    /// Lifecycle status
    pub status: EntryStatus,

    /// Timestamp when the entry was appended (Unix millis)
    pub created_at: TimestampMillis,
}

impl LedgerEntry {
    /// Magnitude of the entry amount.
    pub fn magnitude(&self) -> u64 {
        self.amount.unsigned_abs()
    }
}

// Reference id builders
//
// The reference encodes the causing business event, one per event, so a
// retry of the same event collides on the uniqueness constraint instead of
// crediting twice.

/// Prefix shared by withdrawal debits and their compensating refunds.
pub const WITHDRAWAL_REFERENCE_PREFIX: &str = "WITHDRAW_";

pub fn task_income_reference(user: UserId, date: NaiveDate, task: TaskId) -> String {
    format!("TASK_{}_{}_{}", user, encode_date(date), task)
}

pub fn referral_reward_reference(referee: UserId, level: ReferralLevel) -> String {
    format!("REFERRAL_{}_{}", referee, level)
}

pub fn management_bonus_reference(
    referrer: UserId,
    subordinate: UserId,
    date: NaiveDate,
) -> String {
    format!(
        "MGMT_BONUS_{}_{}_{}",
        referrer,
        subordinate,
        encode_date(date)
    )
}

pub fn topup_reference(request: u64) -> String {
    format!("TOPUP_{}", request)
}

pub fn withdrawal_reference(id: WithdrawalId) -> String {
    format!("WITHDRAW_{}", id)
}

pub fn withdrawal_refund_reference(id: WithdrawalId) -> String {
    format!("WITHDRAW_REFUND_{}", id)
}
