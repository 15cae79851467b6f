pub mod account;
pub mod commission;
pub mod config;
pub mod ledger;
pub mod referral;
pub mod settlement;
pub mod task;
pub mod time;
pub mod withdrawal;

/// Identifier of a registered user.
pub type UserId = u64;

/// Identifier of a reward-bearing task (video).
pub type TaskId = u64;

/// Identifier of a withdrawal request.
pub type WithdrawalId = u64;
