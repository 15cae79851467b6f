// Settlement run-state provider
//
// One row per civil date. `begin_run` is transactional so two concurrent
// triggers for the same date race on the row and exactly one proceeds;
// a stale Running row left behind by a crashed process may be taken over.

use chrono::NaiveDate;
use log::{trace, warn};
use sled::transaction::ConflictableTransactionResult;
use upline_common::{
    settlement::{RunStatus, SettlementError, SettlementRun},
    time::TimestampMillis,
};

use crate::core::{
    error::EngineError,
    storage::{abort, date_prefix, from_json, to_json, SledStorage},
};

pub trait SettlementRunProvider {
    /// Fetch the run row for a date.
    fn get_run(&self, date: NaiveDate) -> Result<Option<SettlementRun>, EngineError>;

    /// Store a run row.
    fn put_run(&self, run: &SettlementRun) -> Result<(), EngineError>;

    /// Open a Running row for the date, refusing when a fresh Running row
    /// already exists.
    fn begin_run(
        &self,
        date: NaiveDate,
        now: TimestampMillis,
    ) -> Result<SettlementRun, EngineError>;
}

impl SettlementRunProvider for SledStorage {
    fn get_run(&self, date: NaiveDate) -> Result<Option<SettlementRun>, EngineError> {
        self.load_json(&self.runs, &date_prefix(date))
    }

    fn put_run(&self, run: &SettlementRun) -> Result<(), EngineError> {
        trace!("put settlement run for {} ({})", run.date, run.status);
        self.save_json(&self.runs, &date_prefix(run.date), run)
    }

    fn begin_run(
        &self,
        date: NaiveDate,
        now: TimestampMillis,
    ) -> Result<SettlementRun, EngineError> {
        if let Some(existing) = self.get_run(date)? {
            if existing.is_stale(now) {
                warn!(
                    "taking over stale settlement run for {} started at {}",
                    date, existing.started_at
                );
            }
        }

        let key = date_prefix(date);
        let run = self.runs.transaction(
            |runs| -> ConflictableTransactionResult<SettlementRun, EngineError> {
                if let Some(raw) = runs.get(key)? {
                    let existing = from_json::<SettlementRun>(&raw)?;
                    if existing.status == RunStatus::Running && !existing.is_stale(now) {
                        return Err(abort(SettlementError::AlreadyRunning { date }));
                    }
                }

                let run = SettlementRun::begin(date, now);
                runs.insert(&key[..], to_json(&run)?)?;
                Ok(run)
            },
        )?;

        Ok(run)
    }
}
