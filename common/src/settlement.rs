// Daily settlement run model
//
// Run state is persisted per civil date instead of living in a process-wide
// flag, so crash recovery and concurrent-trigger detection survive restarts.
// The run row is informational: idempotency rests solely on the ledger
// reference and (referrer, subordinate, date) uniqueness constraints.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::{
    config::STALE_RUN_THRESHOLD_MILLIS, referral::ReferralLevel, time::TimestampMillis, UserId,
};

/// Outcome status of one settlement run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Display, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Batch in progress
    Running,
    /// Every pair committed or skipped as already settled
    Completed,
    /// Some pairs failed but the batch finished below the abort threshold
    CompletedWithErrors,
    /// Systemic error or failure rate above the abort threshold
    Failed,
}

/// One management bonus paid to an upline user for a subordinate's day.
///
/// Unique per (referrer, subordinate, date); the absence of a row means the
/// subordinate was not eligible that day, a zero row is never written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagementBonusEntry {
    pub referrer: UserId,
    pub subordinate: UserId,

    /// The subordinate's level relative to the referrer
    pub level: ReferralLevel,

    /// Civil date of the subordinate's task income
    pub date: NaiveDate,

    /// The subordinate's task income the bonus was computed from
    pub base_amount: u64,

    /// Bonus credited to the referrer
    pub bonus_amount: u64,

    /// Timestamp when the settlement committed this entry (Unix millis)
    pub created_at: TimestampMillis,
}

/// One failed (referrer, subordinate) unit of work within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementFailure {
    /// Referrer the bonus was destined for; None when the subordinate could
    /// not be evaluated at all
    pub referrer: Option<UserId>,
    pub subordinate: UserId,
    pub error: String,
}

/// Aggregate outcome of one settlement run, logged for audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementSummary {
    pub date: NaiveDate,

    /// Users with at least one task record on the date
    pub users_processed: u32,

    /// Users who reached 100% quota
    pub eligible_users: u32,

    /// Bonus entries committed by this run
    pub bonuses_paid: u32,

    /// Total amount credited by this run
    pub total_amount: u64,

    /// Pairs skipped because a previous run already settled them
    pub already_settled: u32,

    pub failures: Vec<SettlementFailure>,
}

impl SettlementSummary {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            users_processed: 0,
            eligible_users: 0,
            bonuses_paid: 0,
            total_amount: 0,
            already_settled: 0,
            failures: Vec::new(),
        }
    }

    /// Failure rate over all attempted pair commits, in basis points.
    pub fn failure_rate_bps(&self) -> u64 {
        let failures = self.failures.len() as u64;
        let attempted = self.bonuses_paid as u64 + self.already_settled as u64 + failures;
        if attempted == 0 {
            return 0;
        }

        failures * 10_000 / attempted
    }
}

/// Persisted run state row, keyed by civil date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettlementRun {
    pub date: NaiveDate,
    pub status: RunStatus,

    /// Timestamp when the run started (Unix millis)
    pub started_at: TimestampMillis,

    /// Timestamp when the run reached a terminal status
    pub finished_at: Option<TimestampMillis>,

    pub users_processed: u32,
    pub bonuses_paid: u32,
    pub total_amount: u64,
    pub failure_count: u32,
}

impl SettlementRun {
    /// Open a run in the Running state.
    pub fn begin(date: NaiveDate, now: TimestampMillis) -> Self {
        Self {
            date,
            status: RunStatus::Running,
            started_at: now,
            finished_at: None,
            users_processed: 0,
            bonuses_paid: 0,
            total_amount: 0,
            failure_count: 0,
        }
    }

    /// Close the run with its final status and summary counters.
    pub fn finish(&mut self, status: RunStatus, summary: &SettlementSummary, now: TimestampMillis) {
        self.status = status;
        self.finished_at = Some(now);
        self.users_processed = summary.users_processed;
        self.bonuses_paid = summary.bonuses_paid;
        self.total_amount = summary.total_amount;
        self.failure_count = summary.failures.len() as u32;
    }

    /// Mark the run failed before any pairs were attempted.
    pub fn fail(&mut self, now: TimestampMillis) {
        self.status = RunStatus::Failed;
        self.finished_at = Some(now);
    }

    /// A Running row older than the staleness threshold belongs to a
    /// crashed process and may be taken over.
    pub fn is_stale(&self, now: TimestampMillis) -> bool {
        self.status == RunStatus::Running
            && now.saturating_sub(self.started_at) > STALE_RUN_THRESHOLD_MILLIS
    }
}

/// Errors that can occur while driving a settlement run
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettlementError {
    /// A fresh Running row exists for this date, refuse the second trigger
    #[error("Settlement for {date} is already running")]
    AlreadyRunning { date: NaiveDate },

    /// The worker pool was closed while the batch was in flight
    #[error("Settlement worker pool closed")]
    WorkerPoolClosed,
}
