// Daily task completion records
//
// A record is created the moment a reward-bearing task is completed and is
// immutable afterwards. Records are scoped to a single civil day: the date
// field is derived from the watched-at instant in the settlement timezone.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{config::DAILY_TASK_QUOTA, time::TimestampMillis, TaskId, UserId};

/// Per-user, per-day record of one completed reward-bearing task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyTaskRecord {
    pub user: UserId,
    pub task: TaskId,

    /// Civil date the completion belongs to, in the settlement timezone
    pub date: NaiveDate,

    /// Task income credited for this completion
    pub reward: u64,

    /// Timestamp when the task was watched (Unix millis)
    pub watched_at: TimestampMillis,

    /// Whether the completion passed verification
    pub verified: bool,
}

/// Daily completion progress against the task quota.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionStatus {
    pub completed: u32,
    pub required: u32,
}

impl CompletionStatus {
    pub fn new(completed: u32) -> Self {
        Self {
            completed,
            required: DAILY_TASK_QUOTA,
        }
    }

    /// Management bonuses are only paid when the subordinate reached 100%
    /// of the daily quota; there is no partial bonus.
    pub fn is_full(&self) -> bool {
        self.required > 0 && self.completed >= self.required
    }
}

/// Errors that can occur in the task completion tracker
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The same task was already recorded for this user and day
    #[error("Task {task} already recorded for user {user} on {date}")]
    AlreadyRecorded {
        user: UserId,
        task: TaskId,
        date: NaiveDate,
    },

    /// Reward-bearing completions must carry a positive reward
    #[error("Task reward must be positive")]
    ZeroReward,
}
