use std::io;
use std::path::PathBuf;

use anyhow::Result;
use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;

/// Log configuration options
pub struct LogConfig {
    /// Log level for console output
    pub console_level: LevelFilter,
    /// Log level for file output
    pub file_level: LevelFilter,
    /// Path to log file (None means no file logging)
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_level: LevelFilter::Info,
            file_level: LevelFilter::Debug,
            log_file: None,
        }
    }
}

/// Initialize the logging system with the provided configuration
pub fn init(config: LogConfig) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    let base_config = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(),
                colors.color(record.level()),
                message
            ))
        })
        .level(LevelFilter::Trace)
        // sqlx logs every statement at info
        .level_for("sqlx", LevelFilter::Warn);

    // Console goes to stderr so command output stays clean
    let console_config = fern::Dispatch::new()
        .level(config.console_level)
        .chain(io::stderr());

    let mut log_config = base_config.chain(console_config);

    if let Some(log_file) = config.log_file {
        let file_config = fern::Dispatch::new()
            .level(config.file_level)
            .chain(fern::log_file(log_file)?);

        log_config = log_config.chain(file_config);
    }

    log_config.apply()?;

    Ok(())
}

/// Parse a `--log-level` value, falling back to `info` for anything unrecognized
pub fn parse_log_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}
