//! Logging setup and the per-run logging handle.
//!
//! The `simplelog` backend is installed exactly once by [`init_logging`].
//! Pipeline components never reach for global state to decide how or what to
//! log: they receive a [`RunLogger`] that stamps every line with the run id
//! and the stage that emitted it.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::sync::Arc;

use log::{Level, LevelFilter};
use serde::{Deserialize, Serialize};
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, LevelPadding, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

use crate::constants::LOG_TARGET;
use crate::error::{Result, ZipperError};
use crate::models::Stage;

/// Line layout for log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Timestamp, level and target
    #[default]
    Full,
    /// Level and message only
    Compact,
}

impl LogFormat {
    /// Map a `logging.format` setting to a layout.
    ///
    /// Besides `full` and `compact`, `%(name)s`-style format strings are
    /// understood: one that prints `asctime` gets the full layout, any
    /// other gets the compact one. Returns `None` for anything else.
    pub fn from_setting(setting: &str) -> Option<Self> {
        let setting = setting.trim();
        if setting.eq_ignore_ascii_case("full") {
            Some(LogFormat::Full)
        } else if setting.eq_ignore_ascii_case("compact") {
            Some(LogFormat::Compact)
        } else if setting.contains("%(asctime)") {
            Some(LogFormat::Full)
        } else if setting.contains("%(") {
            Some(LogFormat::Compact)
        } else {
            None
        }
    }
}

/// `logging` section of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
    /// Kept as written; see [`LogFormat::from_setting`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

impl LoggingConfig {
    /// The layout to use. Unset or unrecognized settings fall back to
    /// [`LogFormat::Full`].
    pub fn log_format(&self) -> LogFormat {
        self.format
            .as_deref()
            .and_then(LogFormat::from_setting)
            .unwrap_or_default()
    }

    /// The `format` setting, if one is given and not understood.
    fn unrecognized_format(&self) -> Option<&str> {
        self.format
            .as_deref()
            .filter(|f| LogFormat::from_setting(f).is_none())
    }
}

/// Parse a level name. Accepts the Python-style names older configs use.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    match name.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::Trace),
        "DEBUG" => Ok(LevelFilter::Debug),
        "INFO" => Ok(LevelFilter::Info),
        "WARN" | "WARNING" => Ok(LevelFilter::Warn),
        "ERROR" | "CRITICAL" => Ok(LevelFilter::Error),
        "OFF" => Ok(LevelFilter::Off),
        other => Err(ZipperError::config(format!(
            "logging.level '{}' is not one of TRACE, DEBUG, INFO, WARN, ERROR, OFF",
            other
        ))),
    }
}

fn build_config(format: LogFormat) -> Config {
    let mut builder = ConfigBuilder::new();
    builder.set_level_padding(LevelPadding::Right);
    if format == LogFormat::Compact {
        builder
            .set_time_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off);
    }
    builder.build()
}

/// Install the global logger. `verbose` forces debug output.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        match &config.level {
            Some(name) => parse_level(name)?,
            None => LevelFilter::Info,
        }
    };
    let log_config = build_config(config.log_format());

    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![TermLogger::new(
        level,
        log_config.clone(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];

    if let Some(path) = &config.file {
        let path = std::path::Path::new(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ZipperError::staging(parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ZipperError::config(format!("Cannot open log file {}: {}", path.display(), e)))?;
        loggers.push(WriteLogger::new(level, log_config, file));
    }

    CombinedLogger::init(loggers)
        .map_err(|e| ZipperError::config(format!("Failed to initialize logger: {}", e)))?;

    if let Some(format) = config.unrecognized_format() {
        log::warn!(
            "logging.format '{}' is not recognized, using the full layout",
            format
        );
    }
    Ok(())
}

/// Logging handle threaded through every pipeline component.
///
/// Cloning is cheap; [`RunLogger::for_stage`] derives a handle for the next
/// stage without touching global state.
#[derive(Debug, Clone)]
pub struct RunLogger {
    run_id: Arc<str>,
    stage: Stage,
}

impl RunLogger {
    pub fn new(run_id: impl AsRef<str>) -> Self {
        Self {
            run_id: Arc::from(run_id.as_ref()),
            stage: Stage::Init,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> Self {
        Self {
            run_id: Arc::clone(&self.run_id),
            stage,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: LOG_TARGET, level, "[{}] [{}] {}", self.run_id, self.stage, args);
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_accepts_python_names() {
        assert_eq!(parse_level("info").unwrap(), LevelFilter::Info);
        assert_eq!(parse_level("WARNING").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("Critical").unwrap(), LevelFilter::Error);
        assert_eq!(parse_level(" debug ").unwrap(), LevelFilter::Debug);
    }

    #[test]
    fn test_parse_level_rejects_unknown() {
        let err = parse_level("loud").unwrap_err();
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_logging_config_deserializes() {
        let yaml = "level: DEBUG\nformat: compact\nfile: logs/run.log\n";
        let config: LoggingConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.level.as_deref(), Some("DEBUG"));
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.file.as_deref(), Some("logs/run.log"));
    }

    #[test]
    fn test_format_strings_pass_through() {
        let yaml = "format: '%(asctime)s - %(name)s - %(levelname)s - %(message)s'\n";
        let config: LoggingConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            config.format.as_deref(),
            Some("%(asctime)s - %(name)s - %(levelname)s - %(message)s")
        );
        assert_eq!(config.log_format(), LogFormat::Full);
        assert!(config.unrecognized_format().is_none());

        assert_eq!(
            LogFormat::from_setting("%(levelname)s: %(message)s"),
            Some(LogFormat::Compact)
        );
        assert_eq!(LogFormat::from_setting(" COMPACT "), Some(LogFormat::Compact));
    }

    #[test]
    fn test_unknown_format_falls_back_to_full() {
        let config = LoggingConfig {
            format: Some("{level} {message}".to_string()),
            ..Default::default()
        };
        assert_eq!(config.log_format(), LogFormat::Full);
        assert_eq!(config.unrecognized_format(), Some("{level} {message}"));
        assert_eq!(LoggingConfig::default().log_format(), LogFormat::Full);
    }

    #[test]
    fn test_run_logger_stage_handles_share_run_id() {
        let logger = RunLogger::new("run-1");
        let listing = logger.for_stage(Stage::Listing);
        assert_eq!(listing.run_id(), "run-1");
        assert_eq!(listing.stage(), Stage::Listing);
        assert_eq!(logger.stage(), Stage::Init);
        listing.info(format_args!("listing {}", "a/"));
    }
}
