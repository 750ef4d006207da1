//! Run configuration
//!
//! Built once per process from command-line values, optionally layered over a
//! TOML file that supplies defaults. Command-line values always win.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytterfs_core_types::Sensitive;
use serde::Deserialize;

use crate::errors::{BackupError, Result};
use crate::retention::RetentionRuleSet;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Defaults read from `--config <file>`
///
/// ```toml
/// port = 2222
/// key = "/root/.ssh/backup_ed25519"
/// keep = "5w=6,4m=3,6m=2,12m=3"
/// notify_command = "/usr/local/bin/sendmail.py"
/// transfer_timeout_secs = 21600
/// log_dir = "/var/log/bytterfs"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub port: Option<u16>,
    pub key: Option<PathBuf>,
    pub keep: Option<String>,
    pub notify_command: Option<String>,
    pub transfer_timeout_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Read and parse a TOML file
    ///
    /// # Errors
    /// `BackupError::ConfigFile` when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BackupError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text, path)
    }

    /// # Errors
    /// `BackupError::ConfigFile` on malformed TOML or unknown keys.
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| BackupError::ConfigFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Raw values as given on the command line
#[derive(Debug, Clone, Default)]
pub struct BackupArgs {
    pub label: String,
    pub source: PathBuf,
    pub dest_root: PathBuf,
    pub dest_container: PathBuf,
    pub remote_host: String,
    pub port: Option<u16>,
    pub key: Option<PathBuf>,
    pub keep: Option<String>,
    pub notify_command: Option<String>,
    pub transfer_timeout_secs: Option<u64>,
    pub log_dir: Option<PathBuf>,
    pub dry_run: bool,
}

/// Validated configuration for one source/destination pair
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub label: String,
    pub source: PathBuf,
    pub dest_root: PathBuf,
    pub dest_container: PathBuf,
    pub remote_host: String,
    pub port: u16,
    pub key: Option<Sensitive<PathBuf>>,
    pub retention: RetentionRuleSet,
    pub notify_command: Option<String>,
    pub transfer_timeout: Option<Duration>,
    pub log_dir: Option<PathBuf>,
    pub dry_run: bool,
}

impl BackupConfig {
    /// Merge `args` over `file` and validate the result
    ///
    /// # Errors
    /// Any `BackupError` configuration variant; nothing is touched on disk or
    /// over the network before this succeeds.
    pub fn resolve(args: BackupArgs, file: Option<FileConfig>) -> Result<Self> {
        let file = file.unwrap_or_default();

        validate_label(&args.label)?;
        validate_absolute(&args.source)?;
        validate_absolute(&args.dest_root)?;
        validate_absolute(&args.dest_container)?;
        validate_container(&args.dest_root, &args.dest_container)?;

        if args.remote_host.trim().is_empty() {
            return Err(BackupError::InvalidPath {
                path: args.remote_host,
                reason: "remote host is empty".to_string(),
            });
        }

        let keep = args.keep.or(file.keep).ok_or(BackupError::EmptyRetentionSpec)?;
        let retention = RetentionRuleSet::parse(&keep)?;

        let key = args.key.or(file.key);
        if let Some(key) = &key {
            validate_absolute(key)?;
        }

        Ok(Self {
            label: args.label,
            source: args.source,
            dest_root: args.dest_root,
            dest_container: args.dest_container,
            remote_host: args.remote_host,
            port: args.port.or(file.port).unwrap_or(DEFAULT_SSH_PORT),
            key: key.map(Sensitive::new),
            retention,
            notify_command: args.notify_command.or(file.notify_command),
            transfer_timeout: args
                .transfer_timeout_secs
                .or(file.transfer_timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            log_dir: args.log_dir.or(file.log_dir),
            dry_run: args.dry_run,
        })
    }
}

fn validate_label(label: &str) -> Result<()> {
    let reason = if label.is_empty() {
        "label is empty"
    } else if label.contains('/') {
        "label must not contain '/'"
    } else if label.chars().any(char::is_whitespace) {
        "label must not contain whitespace"
    } else {
        return Ok(());
    };
    Err(BackupError::InvalidLabel {
        label: label.to_string(),
        reason: reason.to_string(),
    })
}

fn validate_absolute(path: &Path) -> Result<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(BackupError::InvalidPath {
            path: path.display().to_string(),
            reason: "path must be absolute".to_string(),
        })
    }
}

fn validate_container(root: &Path, container: &Path) -> Result<()> {
    if container.starts_with(root) && container != root {
        Ok(())
    } else {
        Err(BackupError::InvalidPath {
            path: container.display().to_string(),
            reason: format!("container must lie strictly under {}", root.display()),
        })
    }
}
