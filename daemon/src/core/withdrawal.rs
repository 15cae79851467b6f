// Withdrawal state machine
//
// The balance hold is optimistic: creation appends a Pending debit before
// the request row exists, and rejection or deletion reverses it with a
// compensating credit referencing the original request id. Terminal
// transitions commit their ledger effects first and move the request row
// last, so a retry after a crash in between repairs the remainder instead
// of stranding the held amount. Withdrawable funds are earnings only: the
// five commission-bearing kinds, reduced by prior withdrawal activity;
// topup credits and position deposits sit in the wallet balance but can
// never leave through this machine.

use log::{debug, info};
use upline_common::{
    config::{MINIMUM_WITHDRAWAL, WEEKLY_WITHDRAWAL_CAP},
    ledger::{
        withdrawal_reference, withdrawal_refund_reference, EntryKind, EntryStatus,
        WITHDRAWAL_REFERENCE_PREFIX,
    },
    time::{civil_date_of, week_bounds, TimestampMillis},
    withdrawal::{WithdrawalError, WithdrawalRequest, WithdrawalStatus},
    UserId, WithdrawalId,
};

use crate::core::{
    error::EngineError,
    storage::{LedgerProvider, WithdrawalProvider},
};

/// Earnings still available for withdrawal.
///
/// Sums the positive amounts of the five commission-bearing kinds, then
/// nets out withdrawal debits and their refunds (both carry the shared
/// reference prefix). The wallet balance caps the result so held funds
/// can never be promised twice.
pub fn available_balance<S>(storage: &S, user: UserId) -> Result<u64, EngineError>
where
    S: LedgerProvider,
{
    let Some(account) = storage.get_account(user)? else {
        return Ok(0);
    };

    let mut available: i64 = 0;
    for entry in storage.get_entries(user)? {
        if entry.amount > 0 && entry.kind.is_earning() {
            available = available.saturating_add(entry.amount);
        } else if entry.reference.starts_with(WITHDRAWAL_REFERENCE_PREFIX) {
            // Debits are negative, refund credits positive
            available = available.saturating_add(entry.amount);
        }
    }

    Ok((available.max(0) as u64).min(account.balance))
}

/// Amount counted against the weekly cap: non-rejected requests created in
/// the civil week containing `now`.
pub fn weekly_withdrawn<S>(
    storage: &S,
    user: UserId,
    now: TimestampMillis,
) -> Result<u64, EngineError>
where
    S: WithdrawalProvider,
{
    let (start, end) = week_bounds(civil_date_of(now));
    let mut withdrawn: u64 = 0;
    for request in storage.get_withdrawals_for_user(user)? {
        if request.created_at >= start
            && request.created_at < end
            && request.status.counts_against_cap()
        {
            withdrawn = withdrawn.saturating_add(request.amount);
        }
    }

    Ok(withdrawn)
}

/// Validate and create a withdrawal request, debiting the balance
/// immediately. Each rejection carries its specific reason and leaves the
/// balance untouched.
pub fn create_withdrawal<S>(
    storage: &S,
    user: UserId,
    amount: u64,
    method: String,
    details: String,
    now: TimestampMillis,
) -> Result<WithdrawalRequest, EngineError>
where
    S: LedgerProvider + WithdrawalProvider,
{
    if amount == 0 {
        return Err(WithdrawalError::ZeroAmount.into());
    }

    if amount < MINIMUM_WITHDRAWAL {
        return Err(WithdrawalError::BelowMinimum {
            amount,
            minimum: MINIMUM_WITHDRAWAL,
        }
        .into());
    }

    let withdrawn = weekly_withdrawn(storage, user, now)?;
    if withdrawn.saturating_add(amount) > WEEKLY_WITHDRAWAL_CAP {
        return Err(WithdrawalError::WeeklyCapExceeded {
            amount,
            withdrawn,
            cap: WEEKLY_WITHDRAWAL_CAP,
        }
        .into());
    }

    let available = available_balance(storage, user)?;
    if amount > available {
        return Err(WithdrawalError::ExceedsAvailable { amount, available }.into());
    }

    let id = storage.next_withdrawal_id()?;
    storage.append(
        user,
        EntryKind::Debit,
        -(amount as i64),
        &withdrawal_reference(id),
        EntryStatus::Pending,
    )?;

    let request = WithdrawalRequest::new(id, user, amount, method, details, now);
    storage.put_withdrawal(&request)?;

    info!("created withdrawal {} for user {}: {}", id, user, amount);
    Ok(request)
}

/// Admin approval: Pending -> Approved. The debit already happened at
/// creation, nothing moves here.
pub fn approve_withdrawal<S>(storage: &S, id: WithdrawalId) -> Result<WithdrawalRequest, EngineError>
where
    S: WithdrawalProvider,
{
    transition(storage, id, WithdrawalStatus::Approved, None)
}

/// Funds were sent externally: Approved -> Processed, debit completed.
pub fn mark_processed<S>(
    storage: &S,
    id: WithdrawalId,
    now: TimestampMillis,
) -> Result<WithdrawalRequest, EngineError>
where
    S: LedgerProvider + WithdrawalProvider,
{
    let request = storage.expect_withdrawal(id)?;
    if request.status == WithdrawalStatus::Processed {
        // Retry after a partial failure, make sure the debit is completed
        complete_debit(storage, &request, EntryStatus::Completed)?;
        return Ok(request);
    }

    ensure_transition(&request, WithdrawalStatus::Processed)?;
    complete_debit(storage, &request, EntryStatus::Completed)?;
    transition(storage, id, WithdrawalStatus::Processed, Some(now))
}

/// Admin rejection: Pending -> Rejected, debit failed and refunded in full.
///
/// The refund commits before the row turns Rejected, and a rejected row is
/// accepted again to finish a refund a crashed earlier call never appended.
pub fn reject_withdrawal<S>(
    storage: &S,
    id: WithdrawalId,
    now: TimestampMillis,
) -> Result<WithdrawalRequest, EngineError>
where
    S: LedgerProvider + WithdrawalProvider,
{
    let request = storage.expect_withdrawal(id)?;
    if request.status == WithdrawalStatus::Rejected {
        refund(storage, &request)?;
        complete_debit(storage, &request, EntryStatus::Failed)?;
        return Ok(request);
    }

    ensure_transition(&request, WithdrawalStatus::Rejected)?;
    refund(storage, &request)?;
    complete_debit(storage, &request, EntryStatus::Failed)?;
    transition(storage, id, WithdrawalStatus::Rejected, Some(now))
}

/// Admin deletion of a Pending request: refund, then drop the row. The
/// ledger entries remain as the audit trail; the row removal comes last so
/// a retry after a partial failure still finds a Pending row to finish.
pub fn delete_withdrawal<S>(storage: &S, id: WithdrawalId) -> Result<(), EngineError>
where
    S: LedgerProvider + WithdrawalProvider,
{
    let request = storage.expect_withdrawal(id)?;
    if request.status != WithdrawalStatus::Pending {
        return Err(WithdrawalError::NotPending {
            id,
            status: request.status,
        }
        .into());
    }

    refund(storage, &request)?;
    complete_debit(storage, &request, EntryStatus::Failed)?;
    storage.remove_withdrawal(id)?;

    info!("deleted withdrawal {} for user {}", id, request.user);
    Ok(())
}

fn ensure_transition(
    request: &WithdrawalRequest,
    to: WithdrawalStatus,
) -> Result<(), EngineError> {
    if !request.status.can_transition_to(to) {
        return Err(WithdrawalError::InvalidTransition {
            from: request.status,
            to,
        }
        .into());
    }

    Ok(())
}

fn transition<S>(
    storage: &S,
    id: WithdrawalId,
    to: WithdrawalStatus,
    processed_at: Option<TimestampMillis>,
) -> Result<WithdrawalRequest, EngineError>
where
    S: WithdrawalProvider,
{
    let mut request = storage.expect_withdrawal(id)?;
    if !request.status.can_transition_to(to) {
        return Err(WithdrawalError::InvalidTransition {
            from: request.status,
            to,
        }
        .into());
    }

    request.status = to;
    if processed_at.is_some() {
        request.processed_at = processed_at;
    }

    storage.put_withdrawal(&request)?;
    debug!("withdrawal {} moved to {}", id, to);
    Ok(request)
}

fn complete_debit<S>(
    storage: &S,
    request: &WithdrawalRequest,
    status: EntryStatus,
) -> Result<(), EngineError>
where
    S: LedgerProvider,
{
    if let Some(entry) = storage.find_by_reference(&withdrawal_reference(request.id))? {
        // A retried call finds the debit already settled
        if entry.status != status {
            storage.set_entry_status(entry.user, entry.seq, status)?;
        }
    }

    Ok(())
}

fn refund<S>(storage: &S, request: &WithdrawalRequest) -> Result<(), EngineError>
where
    S: LedgerProvider,
{
    let reference = withdrawal_refund_reference(request.id);
    match storage.append(
        request.user,
        EntryKind::Credit,
        request.amount as i64,
        &reference,
        EntryStatus::Completed,
    ) {
        Ok(_) => Ok(()),
        // A crashed earlier attempt already refunded
        Err(e) if e.is_already_applied() => Ok(()),
        Err(e) => Err(e),
    }
}
