//! Backup run command

use std::path::PathBuf;

use bytterfs_core::config::{BackupArgs, BackupConfig, FileConfig};
use bytterfs_core::errors::{BackupError, ExError};
use bytterfs_core::logging_facility::{init_with, LogConfig, Profile};
use bytterfs_core::notifier::{NoopNotifier, Notifier, NotifyEvent};
use bytterfs_engine::btrfs::BtrfsHost;
use bytterfs_engine::notify::CommandNotifier;
use bytterfs_engine::transfer::SendReceiveTransfer;
use bytterfs_engine::{run_backup, Collaborators, SystemClock};
use clap::{ArgAction, Args};

#[derive(Debug, Args)]
pub struct BackupCommand {
    /// Snapshot label; snapshots are named `<label>_<unix timestamp>`
    pub label: String,

    /// Source subvolume (absolute path)
    pub source: PathBuf,

    /// Mount point of the destination btrfs filesystem
    pub dest_root: PathBuf,

    /// Destination subvolume receiving the snapshots, below the root
    pub dest_container: PathBuf,

    /// Destination host, `[user@]host`
    pub remote_host: String,

    /// ssh port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// ssh identity file
    #[arg(short = 'i', long)]
    pub key: Option<PathBuf>,

    /// Retention rules, e.g. `5w=6,4m=3,6m=2,12m=3`
    #[arg(short, long)]
    pub keep: Option<String>,

    /// TOML file supplying defaults for the options above
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Program invoked as `<cmd> -e <event> -s <subject> -m <message>`
    #[arg(long)]
    pub notify_command: Option<String>,

    /// Abort a transfer after this many seconds (0 waits forever)
    #[arg(long)]
    pub transfer_timeout: Option<u64>,

    /// Directory for the per-label log file
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Inventory and decide only; change nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Emit JSON log lines
    #[arg(long)]
    pub json_logs: bool,

    /// More output (repeat for trace)
    #[arg(short, long, action = ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Less output
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,
}

impl BackupCommand {
    fn verbosity(&self) -> i8 {
        let v = i8::try_from(self.verbose).unwrap_or(i8::MAX);
        let q = i8::try_from(self.quiet).unwrap_or(i8::MAX);
        v.saturating_sub(q)
    }

    fn into_args(self) -> BackupArgs {
        BackupArgs {
            label: self.label,
            source: self.source,
            dest_root: self.dest_root,
            dest_container: self.dest_container,
            remote_host: self.remote_host,
            port: self.port,
            key: self.key,
            keep: self.keep,
            notify_command: self.notify_command,
            transfer_timeout_secs: self.transfer_timeout,
            log_dir: self.log_dir,
            dry_run: self.dry_run,
        }
    }
}

/// Configuration that failed to load or validate
struct ConfigFailure {
    error: BackupError,
    context: &'static str,
    label: String,
    /// Notification helper, as far as it could be determined
    notify_command: Option<String>,
}

impl ConfigFailure {
    /// Log the failure and send it through the helper, if one is known
    fn report(&self) {
        let err = ExError::from(self.error.clone());
        tracing::error!(err.code = err.code(), "{}: {}", self.context, err);

        let Some(program) = &self.notify_command else {
            return;
        };
        let subject = format!("bytterfs [{}]: configuration error", self.label);
        if let Err(e) = CommandNotifier::new(program.clone()).notify(
            NotifyEvent::Error,
            &subject,
            &err.to_string(),
        ) {
            tracing::warn!(err.code = e.code(), "notification not delivered: {}", e);
        }
    }
}

fn resolve_config(cmd: BackupCommand) -> Result<BackupConfig, ConfigFailure> {
    let label = cmd.label.clone();
    let file = match cmd.config.as_deref().map(FileConfig::load).transpose() {
        Ok(file) => file,
        Err(error) => {
            return Err(ConfigFailure {
                error,
                context: "loading config file",
                label,
                notify_command: cmd.notify_command,
            })
        }
    };

    let notify_command = cmd
        .notify_command
        .clone()
        .or_else(|| file.as_ref().and_then(|f| f.notify_command.clone()));
    BackupConfig::resolve(cmd.into_args(), file).map_err(|error| ConfigFailure {
        error,
        context: "invalid configuration",
        label,
        notify_command,
    })
}

/// Resolve configuration, start logging, run one backup and print the report
///
/// # Errors
/// Invalid configuration, an unwritable log file, or a fatal run failure.
pub fn execute(cmd: BackupCommand) -> anyhow::Result<()> {
    let profile = if cmd.json_logs {
        Profile::Production
    } else {
        Profile::Development
    };
    let verbosity = cmd.verbosity();

    let config = match resolve_config(cmd) {
        Ok(config) => config,
        Err(failure) => {
            init_with(&LogConfig::new(profile).with_verbosity(verbosity))?;
            failure.report();
            return Err(anyhow::Error::new(failure.error).context(failure.context));
        }
    };

    let mut log = LogConfig::new(profile).with_verbosity(verbosity);
    if let Some(dir) = &config.log_dir {
        log = log.with_log_dir(dir, &config.label);
    }
    init_with(&log)?;

    tracing::debug!(
        label = %config.label,
        source = %config.source.display(),
        container = %config.dest_container.display(),
        remote = %config.remote_host,
        port = config.port,
        "configuration resolved"
    );

    let host = BtrfsHost::from_config(&config);
    let transfer = SendReceiveTransfer::from_config(&config);
    let notifier: Box<dyn Notifier> = match &config.notify_command {
        Some(program) => Box::new(CommandNotifier::new(program.clone())),
        None => Box::new(NoopNotifier),
    };
    let clock = SystemClock;

    let collab = Collaborators {
        host: &host,
        transfer: &transfer,
        notifier: notifier.as_ref(),
        clock: &clock,
    };

    let report = run_backup(&config, &collab)?;
    print!("{}", report);
    Ok(())
}
