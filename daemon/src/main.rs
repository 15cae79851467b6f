use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};
use upline_daemon::{
    config::Config,
    core::{
        settlement::{SettlementConfig, SettlementScheduler},
        storage::SledStorage,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    setup_logger(config.log_level).context("Error while initializing logger")?;

    let storage =
        Arc::new(SledStorage::open(&config.db_path).context("Error while opening database")?);
    info!("Database opened at {}", config.db_path);

    let settlement_config = SettlementConfig {
        workers: config.workers,
        failure_abort_bps: config.failure_abort_bps,
    };
    let scheduler = SettlementScheduler::new(storage.clone(), settlement_config);

    if let Some(date) = config.settle_date {
        let summary = scheduler
            .trigger(date)
            .await
            .with_context(|| format!("Error while settling {}", date))?;
        info!(
            "Settled {}: {} bonuses paid, total {}",
            date, summary.bonuses_paid, summary.total_amount
        );
        storage.flush().context("Error while flushing database")?;
        return Ok(());
    }

    info!("Settlement scheduler running, press Ctrl+C to stop");
    tokio::select! {
        _ = scheduler.start() => {},
        res = tokio::signal::ctrl_c() => {
            res.context("Error while waiting for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    storage.flush().context("Error while flushing database")?;
    info!("Database flushed, bye");
    Ok(())
}

fn setup_logger(level: LevelFilter) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::BrightBlack)
        .debug(Color::Cyan)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()?;

    Ok(())
}
