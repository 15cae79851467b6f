// Ledger append path: atomicity of the balance snapshot, reference
// uniqueness, status lifecycle and full-chain verification.

use tempfile::TempDir;
use upline_common::ledger::{EntryKind, EntryStatus, LedgerError};
use upline_daemon::core::{storage::SledStorage, EngineError};
use upline_daemon::core::storage::LedgerProvider;

fn open_storage() -> (TempDir, SledStorage) {
    let dir = TempDir::new().unwrap();
    let storage = SledStorage::open(dir.path()).unwrap();
    (dir, storage)
}

#[test]
fn test_append_moves_balance_and_earned() {
    let (_dir, storage) = open_storage();

    let entry = storage
        .append(1, EntryKind::TaskIncome, 500, "TASK_1_20250310_7", EntryStatus::Completed)
        .unwrap();
    assert_eq!(entry.seq, 0);
    assert_eq!(entry.balance, 500);

    let entry = storage
        .append(1, EntryKind::Credit, 200, "TOPUP_1", EntryStatus::Completed)
        .unwrap();
    assert_eq!(entry.seq, 1);
    assert_eq!(entry.balance, 700);

    let account = storage.get_account(1).unwrap().unwrap();
    assert_eq!(account.balance, 700);
    // plain credits are not earnings
    assert_eq!(account.total_earned, 500);
    assert_eq!(account.entry_count, 2);
}

#[test]
fn test_duplicate_reference_rejected_without_partial_write() {
    let (_dir, storage) = open_storage();

    storage
        .append(1, EntryKind::TaskIncome, 500, "TASK_1_20250310_7", EntryStatus::Completed)
        .unwrap();
    let err = storage
        .append(1, EntryKind::TaskIncome, 500, "TASK_1_20250310_7", EntryStatus::Completed)
        .unwrap_err();
    assert!(err.is_already_applied());

    let account = storage.get_account(1).unwrap().unwrap();
    assert_eq!(account.balance, 500);
    assert_eq!(account.entry_count, 1);
}

#[test]
fn test_overdraft_rejected() {
    let (_dir, storage) = open_storage();

    storage
        .append(1, EntryKind::Credit, 100, "TOPUP_1", EntryStatus::Completed)
        .unwrap();
    let err = storage
        .append(1, EntryKind::Debit, -200, "WITHDRAW_1", EntryStatus::Pending)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Ledger(LedgerError::InsufficientFunds { balance: 100, debit: 200 })
    ));

    // the rejected debit left no trace
    assert_eq!(storage.get_entries(1).unwrap().len(), 1);
    assert!(!storage.has_reference("WITHDRAW_1").unwrap());
}

#[test]
fn test_zero_amount_and_empty_reference_rejected() {
    let (_dir, storage) = open_storage();

    let err = storage
        .append(1, EntryKind::Credit, 0, "TOPUP_1", EntryStatus::Completed)
        .unwrap_err();
    assert!(matches!(err, EngineError::Ledger(LedgerError::ZeroAmount)));

    let err = storage
        .append(1, EntryKind::Credit, 10, "", EntryStatus::Completed)
        .unwrap_err();
    assert!(matches!(err, EngineError::Ledger(LedgerError::EmptyReference)));
}

#[test]
fn test_entries_ordered_by_sequence() {
    let (_dir, storage) = open_storage();

    for i in 0..10u64 {
        storage
            .append(1, EntryKind::Credit, 10, &format!("TOPUP_{}", i), EntryStatus::Completed)
            .unwrap();
    }
    // another user's entries must not leak into the scan
    storage
        .append(2, EntryKind::Credit, 10, "TOPUP_OTHER", EntryStatus::Completed)
        .unwrap();

    let entries = storage.get_entries(1).unwrap();
    assert_eq!(entries.len(), 10);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.seq, i as u64);
        assert_eq!(entry.balance, (i as u64 + 1) * 10);
    }
}

#[test]
fn test_find_by_reference() {
    let (_dir, storage) = open_storage();

    storage
        .append(1, EntryKind::TaskIncome, 500, "TASK_1_20250310_7", EntryStatus::Completed)
        .unwrap();

    let entry = storage.find_by_reference("TASK_1_20250310_7").unwrap().unwrap();
    assert_eq!(entry.user, 1);
    assert_eq!(entry.amount, 500);
    assert!(storage.find_by_reference("TASK_1_20250310_8").unwrap().is_none());
}

#[test]
fn test_status_moves_forward_only() {
    let (_dir, storage) = open_storage();

    storage
        .append(1, EntryKind::Credit, 500, "TOPUP_1", EntryStatus::Completed)
        .unwrap();
    let entry = storage
        .append(1, EntryKind::Debit, -100, "WITHDRAW_1", EntryStatus::Pending)
        .unwrap();

    let updated = storage
        .set_entry_status(1, entry.seq, EntryStatus::Completed)
        .unwrap();
    assert_eq!(updated.status, EntryStatus::Completed);
    // monetary fields untouched
    assert_eq!(updated.amount, -100);
    assert_eq!(updated.balance, 400);

    let err = storage
        .set_entry_status(1, entry.seq, EntryStatus::Failed)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Ledger(LedgerError::InvalidStatusTransition { .. })
    ));
}

#[test]
fn test_verify_account_replays_chain() {
    let (_dir, storage) = open_storage();

    storage
        .append(1, EntryKind::TaskIncome, 500, "TASK_1_20250310_7", EntryStatus::Completed)
        .unwrap();
    storage
        .append(1, EntryKind::Debit, -200, "WITHDRAW_1", EntryStatus::Pending)
        .unwrap();
    storage.verify_account(1).unwrap();

    let err = storage.verify_account(99).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Ledger(LedgerError::AccountNotFound(99))
    ));
}
