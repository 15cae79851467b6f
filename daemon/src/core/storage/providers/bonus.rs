// Management bonus provider
//
// Rows are keyed (referrer, subordinate, date); insert-if-absent makes the
// uniqueness constraint the scheduler relies on for idempotency.

use chrono::NaiveDate;
use log::trace;
use upline_common::{settlement::ManagementBonusEntry, UserId};

use crate::core::{
    error::EngineError,
    storage::{bonus_key, user_key, SledStorage},
};

pub trait ManagementBonusProvider {
    /// Insert-if-absent; returns false when the (referrer, subordinate,
    /// date) row already exists.
    fn insert_bonus_entry(&self, entry: &ManagementBonusEntry) -> Result<bool, EngineError>;

    /// Fetch one bonus row.
    fn get_bonus_entry(
        &self,
        referrer: UserId,
        subordinate: UserId,
        date: NaiveDate,
    ) -> Result<Option<ManagementBonusEntry>, EngineError>;

    /// Every bonus ever credited to a referrer.
    fn get_bonuses_for_referrer(
        &self,
        referrer: UserId,
    ) -> Result<Vec<ManagementBonusEntry>, EngineError>;
}

impl ManagementBonusProvider for SledStorage {
    fn insert_bonus_entry(&self, entry: &ManagementBonusEntry) -> Result<bool, EngineError> {
        trace!(
            "insert bonus {} -> {} on {}",
            entry.subordinate,
            entry.referrer,
            entry.date
        );

        let key = bonus_key(entry.referrer, entry.subordinate, entry.date);
        let encoded = serde_json::to_vec(entry)?;
        let inserted = self
            .bonuses
            .compare_and_swap(key, None as Option<&[u8]>, Some(encoded))?;

        Ok(inserted.is_ok())
    }

    fn get_bonus_entry(
        &self,
        referrer: UserId,
        subordinate: UserId,
        date: NaiveDate,
    ) -> Result<Option<ManagementBonusEntry>, EngineError> {
        self.load_json(&self.bonuses, &bonus_key(referrer, subordinate, date))
    }

    fn get_bonuses_for_referrer(
        &self,
        referrer: UserId,
    ) -> Result<Vec<ManagementBonusEntry>, EngineError> {
        let mut entries = Vec::new();
        for row in self.bonuses.scan_prefix(user_key(referrer)) {
            let (_, raw) = row?;
            entries.push(serde_json::from_slice(&raw)?);
        }

        Ok(entries)
    }
}
