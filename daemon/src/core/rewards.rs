// Real-time commission paths
//
// Task income is the only commission credited at event time together with
// its completion record; referral signup rewards also commit directly at
// the qualifying deposit. Everything else is batched by the settlement
// scheduler.

use log::{debug, warn};
use upline_common::{
    commission::referral_rewards,
    ledger::{
        referral_reward_reference, task_income_reference, EntryKind, EntryStatus, LedgerEntry,
    },
    task::{DailyTaskRecord, TaskError},
    time::{civil_date_of, TimestampMillis},
    TaskId, UserId,
};

use crate::core::{
    error::EngineError,
    storage::{LedgerProvider, ReferralProvider, TaskProvider},
};

/// Record one completed reward-bearing task and credit its income.
///
/// The civil date is derived from `watched_at` in the settlement timezone.
/// A retry after a partial failure (record written, ledger append lost)
/// completes the missing append instead of failing.
pub fn record_task_completion<S>(
    storage: &S,
    user: UserId,
    task: TaskId,
    reward: u64,
    watched_at: TimestampMillis,
) -> Result<LedgerEntry, EngineError>
where
    S: TaskProvider + LedgerProvider,
{
    if reward == 0 {
        return Err(TaskError::ZeroReward.into());
    }

    let date = civil_date_of(watched_at);
    let reference = task_income_reference(user, date, task);
    let record = DailyTaskRecord {
        user,
        task,
        date,
        reward,
        watched_at,
        verified: true,
    };

    match storage.insert_task_record(&record) {
        Ok(()) => {}
        Err(EngineError::Task(TaskError::AlreadyRecorded { .. }))
            if !storage.has_reference(&reference)? =>
        {
            // Crash between record insert and ledger append, finish the job
            warn!(
                "completing missing task income append for user {} task {} on {}",
                user, task, date
            );
        }
        Err(e) => return Err(e),
    }

    let entry = storage.append(
        user,
        EntryKind::TaskIncome,
        reward as i64,
        &reference,
        EntryStatus::Completed,
    )?;

    debug!(
        "recorded task {} for user {} on {}: +{}",
        task, user, date, reward
    );

    Ok(entry)
}

/// Credit the one-time referral signup rewards for a referee's qualifying
/// deposit to every existing ancestor.
///
/// Levels commit independently; an already-applied level is skipped so a
/// retry completes the remaining levels. Returns only the entries actually
/// appended by this call.
pub fn grant_referral_rewards<S>(
    storage: &S,
    referee: UserId,
    qualifying_amount: u64,
) -> Result<Vec<LedgerEntry>, EngineError>
where
    S: ReferralProvider + LedgerProvider,
{
    let chain = storage.get_ancestors(referee)?;
    let awards = referral_rewards(&chain, qualifying_amount)?;

    let mut entries = Vec::with_capacity(awards.len());
    for award in awards {
        let reference = referral_reward_reference(referee, award.level);
        match storage.append(
            award.recipient,
            award.kind,
            award.amount as i64,
            &reference,
            EntryStatus::Completed,
        ) {
            Ok(entry) => entries.push(entry),
            Err(e) if e.is_already_applied() => {
                warn!(
                    "referral reward {} already granted for referee {}",
                    award.level, referee
                );
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        "granted {} referral reward entries for referee {}",
        entries.len(),
        referee
    );

    Ok(entries)
}
