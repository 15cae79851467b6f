use chrono::NaiveDate;
use clap::Parser;
use log::LevelFilter;
use upline_common::config::{SETTLEMENT_FAILURE_ABORT_BPS, SETTLEMENT_WORKERS};

// Default directory for the sled database
pub const DEFAULT_DB_PATH: &str = "upline-db";

/// Commission ledger and daily settlement daemon
#[derive(Debug, Clone, Parser)]
#[clap(version, about)]
pub struct Config {
    /// Path of the database directory
    #[clap(long, default_value_t = String::from(DEFAULT_DB_PATH))]
    pub db_path: String,
    /// Log level (off, error, warn, info, debug, trace)
    #[clap(long, default_value_t = LevelFilter::Info)]
    pub log_level: LevelFilter,
    /// Settle this civil date (YYYY-MM-DD) once and exit instead of running
    /// the midnight scheduler
    #[clap(long)]
    pub settle_date: Option<NaiveDate>,
    /// Maximum subordinates settled concurrently
    #[clap(long, default_value_t = SETTLEMENT_WORKERS)]
    pub workers: usize,
    /// Failure rate (basis points) above which a run is reported failed
    #[clap(long, default_value_t = SETTLEMENT_FAILURE_ABORT_BPS)]
    pub failure_abort_bps: u64,
}
