// Policy constants for the commission engine
//
// All amounts are integral units of the base currency. Percentages are
// expressed in basis points (100 bps = 1%) so that no monetary computation
// ever touches floating point.

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

// One-time referral rewards, credited to the A/B/C ancestors of a new
// referee at their first qualifying deposit: 10% / 3% / 1%
pub const REFERRAL_REWARD_BPS: [u16; 3] = [1_000, 300, 100];

// Recurring daily management bonuses, credited to the A/B/C ancestors of a
// subordinate who reached 100% of their daily task quota: 8% / 3% / 1%
pub const MANAGEMENT_BONUS_BPS: [u16; 3] = [800, 300, 100];

/// Number of reward-bearing tasks a user must complete in a civil day before
/// their uplines become eligible for management bonuses
pub const DAILY_TASK_QUOTA: u32 = 5;

// Withdrawal policy
pub const MINIMUM_WITHDRAWAL: u64 = 500;
// Applies to the sum of non-rejected requests created within one civil week
pub const WEEKLY_WITHDRAWAL_CAP: u64 = 50_000;

// The fixed settlement timezone: UTC+05:00, no DST.
// Every "day" and "week" boundary in the engine is computed in this offset,
// never in server-local time or naive UTC.
pub const SETTLEMENT_UTC_OFFSET_SECS: i32 = 5 * 3600;

// Settlement scheduler tuning

/// Maximum number of subordinates settled concurrently in one batch
pub const SETTLEMENT_WORKERS: usize = 8;

/// A run is reported Failed instead of Completed-with-errors once the
/// per-pair failure rate crosses this threshold (in basis points)
pub const SETTLEMENT_FAILURE_ABORT_BPS: u64 = 5_000;

/// A persisted Running row older than this is considered a crashed run and
/// may be taken over by a new trigger
pub const STALE_RUN_THRESHOLD_MILLIS: u64 = 6 * 60 * 60 * 1_000;

// Millis per second, it is used to prevent having random 1000 values anywhere
pub const MILLIS_PER_SECOND: u64 = 1_000;
