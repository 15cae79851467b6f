// Task completion tracker provider
//
// Records are keyed (user, date, task) so duplicates collide at insert
// time, and mirrored into a (date, user) index that the settlement batch
// scans without touching every user in the system.

use chrono::NaiveDate;
use log::trace;
use upline_common::{
    task::{CompletionStatus, DailyTaskRecord, TaskError},
    UserId,
};

use crate::core::{
    error::EngineError,
    storage::{date_prefix, date_user_key, task_key, trailing_id, user_date_prefix, SledStorage},
};

pub trait TaskProvider {
    /// Insert one completion record; a duplicate (user, date, task) is
    /// rejected with `AlreadyRecorded`.
    fn insert_task_record(&self, record: &DailyTaskRecord) -> Result<(), EngineError>;

    /// All completion records of a user for one civil day.
    fn get_task_records(
        &self,
        user: UserId,
        date: NaiveDate,
    ) -> Result<Vec<DailyTaskRecord>, EngineError>;

    /// Sum of a user's task income for one civil day.
    fn get_daily_total(&self, user: UserId, date: NaiveDate) -> Result<u64, EngineError>;

    /// Progress against the daily quota.
    fn get_daily_completion(
        &self,
        user: UserId,
        date: NaiveDate,
    ) -> Result<CompletionStatus, EngineError>;

    /// Every user with at least one completion on the given civil day.
    fn get_users_with_tasks_on(&self, date: NaiveDate) -> Result<Vec<UserId>, EngineError>;
}

impl TaskProvider for SledStorage {
    fn insert_task_record(&self, record: &DailyTaskRecord) -> Result<(), EngineError> {
        trace!(
            "insert task record user {} task {} on {}",
            record.user,
            record.task,
            record.date
        );

        let key = task_key(record.user, record.date, record.task);
        let encoded = serde_json::to_vec(record)?;
        let inserted = self
            .tasks
            .compare_and_swap(key, None as Option<&[u8]>, Some(encoded))?;

        if inserted.is_err() {
            return Err(TaskError::AlreadyRecorded {
                user: record.user,
                task: record.task,
                date: record.date,
            }
            .into());
        }

        // Settlement scan index; overwriting on repeat completions is fine
        self.tasks_by_date
            .insert(date_user_key(record.date, record.user), &[][..])?;

        Ok(())
    }

    fn get_task_records(
        &self,
        user: UserId,
        date: NaiveDate,
    ) -> Result<Vec<DailyTaskRecord>, EngineError> {
        let mut records = Vec::new();
        for row in self.tasks.scan_prefix(user_date_prefix(user, date)) {
            let (_, raw) = row?;
            records.push(serde_json::from_slice(&raw)?);
        }

        Ok(records)
    }

    fn get_daily_total(&self, user: UserId, date: NaiveDate) -> Result<u64, EngineError> {
        let mut total: u64 = 0;
        for record in self.get_task_records(user, date)? {
            total = total.saturating_add(record.reward);
        }

        Ok(total)
    }

    fn get_daily_completion(
        &self,
        user: UserId,
        date: NaiveDate,
    ) -> Result<CompletionStatus, EngineError> {
        let completed = self.get_task_records(user, date)?.len() as u32;
        Ok(CompletionStatus::new(completed))
    }

    fn get_users_with_tasks_on(&self, date: NaiveDate) -> Result<Vec<UserId>, EngineError> {
        let mut users = Vec::new();
        for row in self.tasks_by_date.scan_prefix(date_prefix(date)) {
            let (key, _) = row?;
            users.push(trailing_id(&key)?);
        }

        Ok(users)
    }
}
