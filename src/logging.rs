//! Per-daemon logging setup.
//!
//! Every daemon appends to its own file, `server_<name>.log`, so the logs of
//! a herd running on one machine stay separable. A terminal logger is added
//! for interactive runs.

use std::fs::OpenOptions;

use anyhow::{Context, Result};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

/// Initialise the combined terminal + file logger for the daemon `name`.
pub fn init(name: &str) -> Result<()> {
    let log_path = format!("server_{name}.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening log file {log_path}"))?;

    let config = ConfigBuilder::new()
        .set_time_offset_to_local()
        .unwrap_or_else(|b| b)
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        LevelFilter::Info,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ));
    loggers.push(WriteLogger::new(LevelFilter::Debug, config, log_file));

    CombinedLogger::init(loggers).context("initialising logger")?;
    Ok(())
}
