//! Logging initialization
//!
//! One subscriber per process. The filter comes from `RUST_LOG` when set,
//! otherwise from the verbosity chosen on the command line.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{ExError, ExErrorKind};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output
    Development,
    /// JSON structured output
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

/// Everything `init_with` needs to build the subscriber
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub profile: Profile,
    /// `-1` quiet, `0` default, `1` verbose, `2+` trace
    pub verbosity: i8,
    /// Extra plain-text log file, appended to
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            verbosity: 0,
            log_file: None,
        }
    }

    pub fn with_verbosity(mut self, verbosity: i8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Log to `<dir>/<label>.log` in addition to the console
    pub fn with_log_dir(mut self, dir: &Path, label: &str) -> Self {
        self.log_file = Some(dir.join(format!("{}.log", label)));
        self
    }

    /// Default filter directive for the configured verbosity
    pub fn default_directive(&self) -> &'static str {
        match self.verbosity {
            i8::MIN..=-1 => "bytterfs=warn",
            0 => "bytterfs=info",
            1 => "bytterfs=debug",
            _ => "bytterfs=trace",
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility with default verbosity and no log file
pub fn init(profile: Profile) {
    // Without a log file there is nothing to open, so this cannot fail.
    init_with(&LogConfig::new(profile)).ok();
}

/// Initialize the logging facility
///
/// Later calls are no-ops.
///
/// # Errors
///
/// `ExErrorKind::Io` when the log file or its directory cannot be created.
#[allow(clippy::result_large_err)]
pub fn init_with(config: &LogConfig) -> Result<(), ExError> {
    let file = config.log_file.as_deref().map(open_log_file).transpose()?;

    INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));
        // A subscriber installed earlier (test capture) wins; ignore the clash.
        // The file layer is typed by the stack beneath it, so each arm builds its own.
        match config.profile {
            Profile::Development => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .with(file.map(plain_file_layer))
                    .try_init()
                    .ok();
            }
            Profile::Production => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .with(file.map(plain_file_layer))
                    .try_init()
                    .ok();
            }
            Profile::Test => {
                // Test capture is initialized separately via init_test_capture()
                tracing_subscriber::registry().try_init().ok();
            }
        }
    });

    Ok(())
}

/// Non-ANSI text layer appending to the per-label log file
fn plain_file_layer<S>(file: File) -> fmt::Layer<S, DefaultFields, Format, Mutex<File>> {
    fmt::layer().with_ansi(false).with_writer(Mutex::new(file))
}

#[allow(clippy::result_large_err)]
fn open_log_file(path: &Path) -> Result<File, ExError> {
    let io_err = |e: std::io::Error| {
        ExError::new(ExErrorKind::Io)
            .with_op("init_logging")
            .with_message(format!("{}: {}", path.display(), e))
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)
}
