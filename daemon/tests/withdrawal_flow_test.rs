// Withdrawal state machine: validation order, balance holds, exact
// refunds on rejection and deletion, and the earnings-only rule.

use tempfile::TempDir;
use upline_common::{
    config::{MINIMUM_WITHDRAWAL, WEEKLY_WITHDRAWAL_CAP},
    ledger::{
        topup_reference, withdrawal_refund_reference, withdrawal_reference, EntryKind, EntryStatus,
    },
    time::get_current_time_in_millis,
    withdrawal::{WithdrawalError, WithdrawalStatus},
    UserId,
};
use upline_daemon::core::{
    storage::{LedgerProvider, SledStorage, WithdrawalProvider},
    withdrawal::{
        approve_withdrawal, available_balance, create_withdrawal, delete_withdrawal,
        mark_processed, reject_withdrawal, weekly_withdrawn,
    },
    EngineError,
};

fn open_storage() -> (TempDir, SledStorage) {
    let dir = TempDir::new().unwrap();
    let storage = SledStorage::open(dir.path()).unwrap();
    (dir, storage)
}

fn credit_earnings(storage: &SledStorage, user: UserId, amount: u64) {
    let reference = format!("TASK_{}_20250310_{}", user, amount);
    storage
        .append(user, EntryKind::TaskIncome, amount as i64, &reference, EntryStatus::Completed)
        .unwrap();
}

fn create(storage: &SledStorage, user: UserId, amount: u64) -> Result<u64, EngineError> {
    let request = create_withdrawal(
        storage,
        user,
        amount,
        "bank".to_string(),
        "IBAN".to_string(),
        get_current_time_in_millis(),
    )?;
    Ok(request.id)
}

#[test]
fn test_create_holds_balance() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);

    let id = create(&storage, 1, 600).unwrap();

    let request = storage.get_withdrawal(id).unwrap().unwrap();
    assert_eq!(request.status, WithdrawalStatus::Pending);
    assert_eq!(request.amount, 600);

    // debit applied immediately, held funds no longer available
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 400);
    assert_eq!(available_balance(&storage, 1).unwrap(), 400);

    let entries = storage.get_entries(1).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].kind, EntryKind::Debit);
    assert_eq!(entries[1].status, EntryStatus::Pending);
}

#[test]
fn test_below_minimum_rejected() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);

    let err = create(&storage, 1, MINIMUM_WITHDRAWAL - 1).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Withdrawal(WithdrawalError::BelowMinimum { .. })
    ));
    // nothing was held
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 1_000);
}

#[test]
fn test_exceeds_available_rejected() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);

    let err = create(&storage, 1, 2_000).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Withdrawal(WithdrawalError::ExceedsAvailable {
            amount: 2_000,
            available: 1_000
        })
    ));
}

#[test]
fn test_weekly_cap_counts_non_rejected_requests() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, WEEKLY_WITHDRAWAL_CAP * 2);

    create(&storage, 1, 30_000).unwrap();
    let err = create(&storage, 1, 25_000).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Withdrawal(WithdrawalError::WeeklyCapExceeded { .. })
    ));

    // a rejected request frees its share of the cap
    let id = create(&storage, 1, 20_000).unwrap();
    reject_withdrawal(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(
        weekly_withdrawn(&storage, 1, get_current_time_in_millis()).unwrap(),
        30_000
    );
    create(&storage, 1, 20_000).unwrap();
}

#[test]
fn test_topup_principal_is_not_withdrawable() {
    let (_dir, storage) = open_storage();
    storage
        .append(1, EntryKind::Credit, 5_000, &topup_reference(1), EntryStatus::Completed)
        .unwrap();

    assert_eq!(available_balance(&storage, 1).unwrap(), 0);
    let err = create(&storage, 1, 600).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Withdrawal(WithdrawalError::ExceedsAvailable { available: 0, .. })
    ));

    // a topup bonus is an earning and does count
    storage
        .append(1, EntryKind::TopupBonus, 600, "TOPUP_BONUS_1", EntryStatus::Completed)
        .unwrap();
    assert_eq!(available_balance(&storage, 1).unwrap(), 600);
}

#[test]
fn test_approve_then_process() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();

    let request = approve_withdrawal(&storage, id).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Approved);
    assert!(request.processed_at.is_none());

    let request = mark_processed(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Processed);
    assert!(request.processed_at.is_some());

    // debit completed, funds gone for good
    let entries = storage.get_entries(1).unwrap();
    assert_eq!(entries[1].status, EntryStatus::Completed);
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 400);
    storage.verify_account(1).unwrap();
}

#[test]
fn test_reject_refunds_exactly() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();

    let request = reject_withdrawal(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Rejected);

    // full refund, debit marked failed, audit trail intact
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 1_000);
    assert_eq!(available_balance(&storage, 1).unwrap(), 1_000);

    let entries = storage.get_entries(1).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[1].status, EntryStatus::Failed);
    assert_eq!(entries[2].kind, EntryKind::Credit);
    assert_eq!(entries[2].amount, 600);
    storage.verify_account(1).unwrap();
}

#[test]
fn test_delete_pending_refunds_and_drops_row() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();

    delete_withdrawal(&storage, id).unwrap();

    assert!(storage.get_withdrawal(id).unwrap().is_none());
    assert!(storage.get_withdrawals_for_user(1).unwrap().is_empty());

    // balance restored, ledger keeps the full history
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 1_000);
    assert_eq!(storage.get_entries(1).unwrap().len(), 3);
    storage.verify_account(1).unwrap();
}

#[test]
fn test_reject_retry_completes_missing_refund() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();

    // crash leftover: row Rejected, debit Failed, refund never appended
    let mut request = storage.get_withdrawal(id).unwrap().unwrap();
    request.status = WithdrawalStatus::Rejected;
    storage.put_withdrawal(&request).unwrap();
    let debit = storage
        .find_by_reference(&withdrawal_reference(id))
        .unwrap()
        .unwrap();
    storage
        .set_entry_status(debit.user, debit.seq, EntryStatus::Failed)
        .unwrap();
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 400);

    // retrying the rejection finishes the refund instead of failing
    let request = reject_withdrawal(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Rejected);
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 1_000);
    storage.verify_account(1).unwrap();

    // a further retry appends nothing more
    reject_withdrawal(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(storage.get_entries(1).unwrap().len(), 3);
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 1_000);
}

#[test]
fn test_reject_tolerates_already_appended_refund() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();

    // crash leftover: refund committed, row never turned Rejected
    storage
        .append(
            1,
            EntryKind::Credit,
            600,
            &withdrawal_refund_reference(id),
            EntryStatus::Completed,
        )
        .unwrap();

    let request = reject_withdrawal(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Rejected);

    // exactly one refund, debit failed
    assert_eq!(storage.get_entries(1).unwrap().len(), 3);
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 1_000);
    let debit = storage
        .find_by_reference(&withdrawal_reference(id))
        .unwrap()
        .unwrap();
    assert_eq!(debit.status, EntryStatus::Failed);
    storage.verify_account(1).unwrap();
}

#[test]
fn test_delete_retry_after_partial_failure() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();

    // crash leftover: refund and debit settled, row still Pending
    storage
        .append(
            1,
            EntryKind::Credit,
            600,
            &withdrawal_refund_reference(id),
            EntryStatus::Completed,
        )
        .unwrap();
    let debit = storage
        .find_by_reference(&withdrawal_reference(id))
        .unwrap()
        .unwrap();
    storage
        .set_entry_status(debit.user, debit.seq, EntryStatus::Failed)
        .unwrap();

    delete_withdrawal(&storage, id).unwrap();

    assert!(storage.get_withdrawal(id).unwrap().is_none());
    assert_eq!(storage.get_entries(1).unwrap().len(), 3);
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 1_000);
    storage.verify_account(1).unwrap();
}

#[test]
fn test_mark_processed_retry_after_partial_failure() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();
    approve_withdrawal(&storage, id).unwrap();

    // crash leftover: debit completed, row still Approved
    let debit = storage
        .find_by_reference(&withdrawal_reference(id))
        .unwrap()
        .unwrap();
    storage
        .set_entry_status(debit.user, debit.seq, EntryStatus::Completed)
        .unwrap();

    let request = mark_processed(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Processed);
    assert_eq!(storage.get_account(1).unwrap().unwrap().balance, 400);

    // idempotent once terminal
    let request = mark_processed(&storage, id, get_current_time_in_millis()).unwrap();
    assert_eq!(request.status, WithdrawalStatus::Processed);
    storage.verify_account(1).unwrap();
}

#[test]
fn test_delete_refuses_non_pending() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();
    approve_withdrawal(&storage, id).unwrap();

    let err = delete_withdrawal(&storage, id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Withdrawal(WithdrawalError::NotPending { .. })
    ));
}

#[test]
fn test_invalid_transitions() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 1_000);
    let id = create(&storage, 1, 600).unwrap();

    // Pending cannot go straight to Processed
    let err = mark_processed(&storage, id, get_current_time_in_millis()).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Withdrawal(WithdrawalError::InvalidTransition { .. })
    ));

    reject_withdrawal(&storage, id, get_current_time_in_millis()).unwrap();
    // Rejected is terminal
    let err = approve_withdrawal(&storage, id).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Withdrawal(WithdrawalError::InvalidTransition { .. })
    ));
}

#[test]
fn test_ids_are_sequential_per_database() {
    let (_dir, storage) = open_storage();
    credit_earnings(&storage, 1, 10_000);

    let first = create(&storage, 1, 600).unwrap();
    let second = create(&storage, 1, 600).unwrap();
    assert_eq!(second, first + 1);
}
