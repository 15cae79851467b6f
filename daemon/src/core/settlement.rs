// Daily Settlement Scheduler
//
// Once per civil day (or on manual trigger with an explicit date), walk
// every user who completed tasks on that date, and for those at 100% quota
// credit management bonuses to their ancestors. Each (referrer,
// subordinate, date) pair commits independently: one failure is collected
// and reported, never aborting the batch. Reruns are safe no-ops because
// the ledger reference and the bonus row key are unique per pair; a
// duplicate on either side counts as a skip.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use upline_common::{
    commission::{management_bonuses, CommissionAward},
    config::{MILLIS_PER_SECOND, SETTLEMENT_FAILURE_ABORT_BPS, SETTLEMENT_WORKERS},
    ledger::{management_bonus_reference, EntryStatus},
    settlement::{
        ManagementBonusEntry, RunStatus, SettlementError, SettlementFailure, SettlementSummary,
    },
    time::{
        civil_date_of, get_current_time_in_millis, millis_until_next_midnight, TimestampMillis,
    },
    UserId,
};

use crate::core::{
    error::EngineError,
    storage::{
        LedgerProvider, ManagementBonusProvider, ReferralProvider, SettlementRunProvider,
        TaskProvider,
    },
};

/// Everything the settlement batch needs from storage.
pub trait SettlementStorage:
    TaskProvider
    + ReferralProvider
    + LedgerProvider
    + ManagementBonusProvider
    + SettlementRunProvider
    + Send
    + Sync
    + 'static
{
}

impl<S> SettlementStorage for S where
    S: TaskProvider
        + ReferralProvider
        + LedgerProvider
        + ManagementBonusProvider
        + SettlementRunProvider
        + Send
        + Sync
        + 'static
{
}

/// Configuration for one settlement run
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Maximum subordinates settled concurrently
    pub workers: usize,
    /// Failure rate (basis points) above which the run is reported Failed
    pub failure_abort_bps: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            workers: SETTLEMENT_WORKERS,
            failure_abort_bps: SETTLEMENT_FAILURE_ABORT_BPS,
        }
    }
}

/// Per-subordinate result of one run
#[derive(Debug, Default)]
struct SubordinateOutcome {
    eligible: bool,
    bonuses_paid: u32,
    total_amount: u64,
    already_settled: u32,
    failures: Vec<SettlementFailure>,
}

enum CommitOutcome {
    Paid,
    AlreadySettled,
}

/// Run the settlement batch for one civil date.
///
/// Safe to invoke for past dates (backfill) and safe to rerun: pairs a
/// previous run already committed are skipped through the uniqueness
/// constraints. A fresh Running row for the same date refuses the trigger.
pub async fn run_settlement<S>(
    storage: Arc<S>,
    date: NaiveDate,
    config: &SettlementConfig,
) -> Result<SettlementSummary, EngineError>
where
    S: SettlementStorage,
{
    let now = get_current_time_in_millis();
    let mut run = storage.begin_run(date, now)?;

    info!(
        "Settlement for {} starting (workers: {})",
        date, config.workers
    );

    let users = match storage.get_users_with_tasks_on(date) {
        Ok(users) => users,
        Err(e) => {
            // Systemic: nothing was attempted, mark the run failed
            run.fail(get_current_time_in_millis());
            storage.put_run(&run)?;
            return Err(e);
        }
    };

    let mut summary = SettlementSummary::new(date);
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut handles = Vec::with_capacity(users.len());

    for subordinate in users {
        // Permit first, then hand the sled I/O to the blocking pool so slow
        // disks never stall the runtime workers
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Settlement(SettlementError::WorkerPoolClosed))?;
        let storage = storage.clone();
        handles.push((
            subordinate,
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                settle_subordinate(storage.as_ref(), subordinate, date, now)
            }),
        ));
    }

    let joined = futures::future::join_all(
        handles
            .into_iter()
            .map(|(subordinate, handle)| async move { (subordinate, handle.await) }),
    )
    .await;

    for (subordinate, joined) in joined {
        summary.users_processed = summary.users_processed.saturating_add(1);
        match joined {
            Ok(Ok(outcome)) => {
                if outcome.eligible {
                    summary.eligible_users = summary.eligible_users.saturating_add(1);
                }
                summary.bonuses_paid = summary.bonuses_paid.saturating_add(outcome.bonuses_paid);
                summary.total_amount = summary.total_amount.saturating_add(outcome.total_amount);
                summary.already_settled = summary
                    .already_settled
                    .saturating_add(outcome.already_settled);
                summary.failures.extend(outcome.failures);
            }
            Ok(Err(e)) => {
                warn!("settlement of subordinate {} failed: {}", subordinate, e);
                summary.failures.push(SettlementFailure {
                    referrer: None,
                    subordinate,
                    error: e.to_string(),
                });
            }
            Err(e) => {
                error!("settlement worker for {} panicked: {}", subordinate, e);
                summary.failures.push(SettlementFailure {
                    referrer: None,
                    subordinate,
                    error: e.to_string(),
                });
            }
        }
    }

    let status = if summary.failures.is_empty() {
        RunStatus::Completed
    } else if summary.failure_rate_bps() > config.failure_abort_bps {
        RunStatus::Failed
    } else {
        RunStatus::CompletedWithErrors
    };

    run.finish(status, &summary, get_current_time_in_millis());
    storage.put_run(&run)?;

    // Audit log only: the uniqueness constraints remain the sole source of
    // truth for idempotency
    info!(
        "Settlement for {} {}: {} users, {} eligible, {} bonuses paid, total {}, {} already settled, {} failures",
        date,
        status,
        summary.users_processed,
        summary.eligible_users,
        summary.bonuses_paid,
        summary.total_amount,
        summary.already_settled,
        summary.failures.len()
    );

    Ok(summary)
}

/// Settle every ancestor of one subordinate for one date.
fn settle_subordinate<S>(
    storage: &S,
    subordinate: UserId,
    date: NaiveDate,
    now: TimestampMillis,
) -> Result<SubordinateOutcome, EngineError>
where
    S: SettlementStorage,
{
    let mut outcome = SubordinateOutcome::default();

    let status = storage.get_daily_completion(subordinate, date)?;
    if !status.is_full() {
        debug!(
            "subordinate {} at {}/{} on {}, uplines not eligible",
            subordinate, status.completed, status.required, date
        );
        return Ok(outcome);
    }

    outcome.eligible = true;

    let income = storage.get_daily_total(subordinate, date)?;
    let chain = storage.get_ancestors(subordinate)?;
    let awards = management_bonuses(&chain, income)?;

    for award in awards {
        match commit_bonus(storage, &award, subordinate, date, income, now) {
            Ok(CommitOutcome::Paid) => {
                outcome.bonuses_paid = outcome.bonuses_paid.saturating_add(1);
                outcome.total_amount = outcome.total_amount.saturating_add(award.amount);
            }
            Ok(CommitOutcome::AlreadySettled) => {
                outcome.already_settled = outcome.already_settled.saturating_add(1);
            }
            Err(e) => {
                warn!(
                    "bonus commit {} -> {} on {} failed: {}",
                    subordinate, award.recipient, date, e
                );
                outcome.failures.push(SettlementFailure {
                    referrer: Some(award.recipient),
                    subordinate,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(outcome)
}

/// Commit one (referrer, subordinate, date) bonus.
///
/// The ledger append goes first: its reference is the authoritative
/// idempotency guard, and a crash between the two writes leaves a missing
/// bonus row that the next rerun repairs. Duplicates on either write are
/// skips, not failures.
fn commit_bonus<S>(
    storage: &S,
    award: &CommissionAward,
    subordinate: UserId,
    date: NaiveDate,
    base_amount: u64,
    now: TimestampMillis,
) -> Result<CommitOutcome, EngineError>
where
    S: LedgerProvider + ManagementBonusProvider,
{
    let entry = ManagementBonusEntry {
        referrer: award.recipient,
        subordinate,
        level: award.level,
        date,
        base_amount,
        bonus_amount: award.amount,
        created_at: now,
    };

    if storage
        .get_bonus_entry(award.recipient, subordinate, date)?
        .is_some()
    {
        return Ok(CommitOutcome::AlreadySettled);
    }

    let reference = management_bonus_reference(award.recipient, subordinate, date);
    match storage.append(
        award.recipient,
        award.kind,
        award.amount as i64,
        &reference,
        EntryStatus::Completed,
    ) {
        Ok(_) => {
            storage.insert_bonus_entry(&entry)?;
            Ok(CommitOutcome::Paid)
        }
        Err(e) if e.is_already_applied() => {
            // Repair the bonus row a crashed run never wrote
            storage.insert_bonus_entry(&entry)?;
            Ok(CommitOutcome::AlreadySettled)
        }
        Err(e) => Err(e),
    }
}

/// Timer-driven scheduler firing once per civil day at local midnight.
pub struct SettlementScheduler<S> {
    storage: Arc<S>,
    config: SettlementConfig,
}

impl<S> SettlementScheduler<S>
where
    S: SettlementStorage,
{
    pub fn new(storage: Arc<S>, config: SettlementConfig) -> Self {
        Self { storage, config }
    }

    /// Manual trigger for backfill and testing, with an explicit date.
    pub async fn trigger(&self, date: NaiveDate) -> Result<SettlementSummary, EngineError> {
        run_settlement(self.storage.clone(), date, &self.config).await
    }

    /// Run forever: sleep until the next local midnight, settle the civil
    /// day that just ended, repeat.
    pub async fn start(&self) {
        loop {
            let now = get_current_time_in_millis();
            let wait = millis_until_next_midnight(now);
            debug!("next settlement in {}s", wait / MILLIS_PER_SECOND);

            // Small buffer so the clock is safely on the new day
            tokio::time::sleep(Duration::from_millis(wait + MILLIS_PER_SECOND)).await;

            let today = civil_date_of(get_current_time_in_millis());
            let Some(ended) = today.pred_opt() else {
                continue;
            };

            match self.trigger(ended).await {
                Ok(_) => {}
                Err(EngineError::Settlement(SettlementError::AlreadyRunning { date })) => {
                    warn!("settlement for {} already running, skipping timer fire", date);
                }
                Err(e) => {
                    error!("settlement for {} failed: {}", ended, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SettlementConfig::default();
        assert_eq!(config.workers, SETTLEMENT_WORKERS);
        assert_eq!(config.failure_abort_bps, SETTLEMENT_FAILURE_ABORT_BPS);
    }

    #[test]
    fn test_outcome_default() {
        let outcome = SubordinateOutcome::default();
        assert!(!outcome.eligible);
        assert_eq!(outcome.bonuses_paid, 0);
        assert_eq!(outcome.total_amount, 0);
        assert!(outcome.failures.is_empty());
    }
}
