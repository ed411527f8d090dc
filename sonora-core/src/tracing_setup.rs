//! Logging for the server and CLI
//!
//! One subscriber feeds two layers. The console shows Sonora's own crates and
//! `tower_http` request traces at the level picked with `--log-level`, with
//! every other dependency held at `warn` or quieter. Setting `RUST_LOG`
//! replaces that filter. The log file of the last run keeps Sonora at `trace`
//! and dependencies at `debug`.
//!
//! Stream lifecycle events (track id, window, bytes sent, termination) are
//! emitted from modules below `sonora_core::streaming`, so
//! `RUST_LOG=sonora_core::streaming=debug` isolates them.

use std::fmt;
use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, fmt as log_fmt};

/// Name of the per-run log file inside the logs directory.
pub const LOG_FILE_NAME: &str = "sonora-last-run.log";

/// Filter for the log file.
pub const FILE_DIRECTIVES: &str =
    "debug,sonora=trace,sonora_core=trace,sonora_web=trace,tower_http=trace";

/// Targets that follow the console level instead of the dependency floor.
const CONSOLE_TARGETS: [&str; 4] = ["sonora", "sonora_core", "sonora_web", "tower_http"];

/// Errors raised while installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Cannot prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Tracing already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

/// Console filter used when `RUST_LOG` is unset.
///
/// ```
/// use sonora_core::tracing_setup::console_directives;
///
/// assert_eq!(
///     console_directives(tracing::Level::DEBUG),
///     "warn,sonora=debug,sonora_core=debug,sonora_web=debug,tower_http=debug"
/// );
/// ```
pub fn console_directives(level: Level) -> String {
    let level_name = level.as_str().to_ascii_lowercase();
    let floor = level.min(Level::WARN).as_str().to_ascii_lowercase();

    let mut directives = floor;
    for target in CONSOLE_TARGETS {
        directives.push_str(&format!(",{target}={level_name}"));
    }
    directives
}

/// Installs console and file logging for this process.
///
/// `logs_dir` defaults to `./logs`. The file is truncated on every run.
///
/// # Errors
///
/// - `TracingError::LogFile` - If the directory or file cannot be created
/// - `TracingError::Filter` - If a built-in directive fails to parse
/// - `TracingError::AlreadyInitialized` - If a global subscriber is already set
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> Result<(), TracingError> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new("logs"));
    let log_path = logs_dir.join(LOG_FILE_NAME);
    let log_file = create_dir_all(logs_dir)
        .and_then(|()| File::create(&log_path))
        .map_err(|source| TracingError::LogFile {
            path: log_path.clone(),
            source,
        })?;

    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(console_directives(console_level))?,
    };

    let console_layer = log_fmt::layer()
        .with_target(true)
        .compact()
        .with_filter(console_filter);

    let file_layer = log_fmt::layer()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .with_filter(EnvFilter::try_new(FILE_DIRECTIVES)?);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Logging to console at {} and to {}",
        console_level,
        log_path.display()
    );
    Ok(())
}

/// `--log-level` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

impl fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(value) => f.write_str(value.get_name()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_directives_keep_dependencies_quiet() {
        assert_eq!(
            console_directives(Level::INFO),
            "warn,sonora=info,sonora_core=info,sonora_web=info,tower_http=info"
        );
        assert_eq!(
            console_directives(Level::ERROR),
            "error,sonora=error,sonora_core=error,sonora_web=error,tower_http=error"
        );
        assert!(console_directives(Level::TRACE).starts_with("warn,"));
    }

    #[test]
    fn test_directives_parse() {
        for level in [
            Level::ERROR,
            Level::WARN,
            Level::INFO,
            Level::DEBUG,
            Level::TRACE,
        ] {
            let directives = console_directives(level);
            assert!(EnvFilter::try_new(&directives).is_ok(), "{directives}");
        }
        assert!(EnvFilter::try_new(FILE_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_log_level_names() {
        let level: CliLogLevel = "DEBUG".parse().unwrap();
        assert_eq!(level, CliLogLevel::Debug);
        assert_eq!(Level::from(level), Level::DEBUG);
        assert_eq!(CliLogLevel::Warn.to_string(), "warn");
        assert!("verbose".parse::<CliLogLevel>().is_err());
    }

    #[test]
    fn test_init_creates_log_file_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let logs_dir = temp_dir.path().join("logs");

        init_tracing(Level::WARN, Some(&logs_dir)).unwrap();
        assert!(logs_dir.join(LOG_FILE_NAME).is_file());

        let second = init_tracing(Level::WARN, Some(&logs_dir));
        assert!(matches!(second, Err(TracingError::AlreadyInitialized(_))));
    }
}
