//! Logging initialization for tracker_app.
//!
//! Appends to the configured log file and mirrors everything to the terminal.

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, SharedLogger, TermLogger, TerminalMode, WriteLogger};

/// Initialize the terminal logger plus a file logger at `log_path`.
///
/// If the log file cannot be opened, logging continues on the terminal only.
pub fn initialize(log_path: &Path) {
    let level = LevelFilter::Info;
    let config = engine_logging::shared_config();

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(file_logger) = create_file_logger(log_path, level, config) {
        loggers.push(file_logger);
    }

    let _ = CombinedLogger::init(loggers);
}

fn create_file_logger(
    log_path: &Path,
    level: LevelFilter,
    config: simplelog::Config,
) -> Option<Box<WriteLogger<File>>> {
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => Some(WriteLogger::new(level, config, file)),
        Err(err) => {
            eprintln!("Warning: Could not open log file at {:?}: {}", log_path, err);
            None
        }
    }
}
