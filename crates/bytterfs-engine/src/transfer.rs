//! `btrfs send | ssh … btrfs receive`
//!
//! Sender and receiver run concurrently, joined by a pipe. The receiver's exit
//! status decides the outcome: a sender fault usually surfaces downstream as
//! a broken stream, while a dying receiver makes the sender fail with EPIPE.
//! The join runs under an optional timeout; on expiry both children are
//! killed (`kill_on_drop`) and `TransferTimeout` is returned.

#![allow(clippy::result_large_err)]

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use bytterfs_core::config::BackupConfig;
use bytterfs_core::errors::{ExError, ExErrorKind};
use bytterfs_core::host::{TransferCoordinator, TransferRequest};
use bytterfs_core::model::Location;

use crate::btrfs::runner::{CommandLine, CommandOutput, Endpoint, SshTarget};

/// The two halves of one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCommands {
    pub sender: CommandLine,
    pub receiver: CommandLine,
}

pub struct SendReceiveTransfer {
    source: PathBuf,
    dest_container: PathBuf,
    remote: Endpoint,
    timeout: Option<Duration>,
}

impl SendReceiveTransfer {
    pub fn from_config(config: &BackupConfig) -> Self {
        Self {
            source: config.source.clone(),
            dest_container: config.dest_container.clone(),
            remote: Endpoint::Remote(SshTarget::new(
                config.remote_host.clone(),
                config.port,
                config.key.clone(),
            )),
            timeout: config.transfer_timeout,
        }
    }

    pub fn commands(&self, request: &TransferRequest) -> TransferCommands {
        let path_of = |name: &str| self.source.join(name).display().to_string();

        let mut send = vec!["btrfs".to_string(), "send".to_string()];
        if let Some(base) = &request.base {
            send.push("-p".to_string());
            send.push(path_of(&base.name));
        }
        send.push(path_of(&request.snapshot.name));

        let receive = vec![
            "btrfs".to_string(),
            "receive".to_string(),
            self.dest_container.display().to_string(),
        ];

        TransferCommands {
            sender: Endpoint::Local.command(&send),
            receiver: self.remote.command(&receive),
        }
    }
}

impl TransferCoordinator for SendReceiveTransfer {
    fn transfer(&self, request: &TransferRequest) -> Result<(), ExError> {
        let commands = self.commands(request);
        tracing::debug!(sender = %commands.sender, receiver = %commands.receiver, "starting transfer");
        run_pipeline(&commands, self.timeout).map_err(|e| e.with_snapshot(request.snapshot.name.clone()))
    }
}

/// Run sender piped into receiver and wait for both
///
/// # Errors
/// `ExErrorKind::TransferFailure` when either side fails to start or exits
/// unsuccessfully; `ExErrorKind::TransferTimeout` when `timeout` expires.
pub fn run_pipeline(commands: &TransferCommands, timeout: Option<Duration>) -> Result<(), ExError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            ExError::new(ExErrorKind::Internal)
                .with_op("transfer")
                .with_message(format!("cannot start runtime: {}", e))
        })?;
    runtime.block_on(pipe(commands, timeout))
}

async fn pipe(commands: &TransferCommands, timeout: Option<Duration>) -> Result<(), ExError> {
    let mut sender = commands
        .sender
        .tokio_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failure(format!("cannot start `{}`: {}", commands.sender, e)))?;

    let stream: Stdio = sender
        .stdout
        .take()
        .ok_or_else(|| failure("sender has no stdout".to_string()))?
        .try_into()
        .map_err(|e: std::io::Error| failure(format!("cannot connect sender to receiver: {}", e)))?;

    let receiver = commands
        .receiver
        .tokio_command()
        .stdin(stream)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failure(format!("cannot start `{}`: {}", commands.receiver, e)))?;

    let both = async { tokio::join!(sender.wait_with_output(), receiver.wait_with_output()) };
    let (sent, received) = match timeout {
        Some(limit) => tokio::time::timeout(limit, both).await.map_err(|_| {
            ExError::new(ExErrorKind::TransferTimeout)
                .with_op("transfer")
                .with_location(Location::Destination)
                .with_message(format!("no completion within {}s; sender and receiver killed", limit.as_secs_f64()))
        })?,
        None => both.await,
    };

    let sent = collect(sent, &commands.sender)?;
    let received = collect(received, &commands.receiver)?;
    judge(&sent, &received)
}

fn collect(
    result: std::io::Result<std::process::Output>,
    command: &CommandLine,
) -> Result<CommandOutput, ExError> {
    let output = result.map_err(|e| failure(format!("waiting for `{}`: {}", command, e)))?;
    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Receiver status first; the sender is only blamed when the receiver is happy
fn judge(sender: &CommandOutput, receiver: &CommandOutput) -> Result<(), ExError> {
    if !receiver.success {
        let mut message = format!("receive failed ({})", receiver.failure_summary());
        if !sender.success {
            message.push_str(&format!("; send also failed ({})", sender.failure_summary()));
        }
        return Err(failure(message));
    }
    if !sender.success {
        return Err(failure(format!("send failed ({})", sender.failure_summary()))
            .with_location(Location::Source));
    }
    Ok(())
}

fn failure(message: String) -> ExError {
    ExError::new(ExErrorKind::TransferFailure)
        .with_op("transfer")
        .with_location(Location::Destination)
        .with_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytterfs_core::model::{Snapshot, SnapshotName};

    fn sh(script: &str) -> CommandLine {
        CommandLine::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn output(success: bool) -> CommandOutput {
        CommandOutput {
            success,
            code: Some(if success { 0 } else { 1 }),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn transfer() -> SendReceiveTransfer {
        SendReceiveTransfer {
            source: PathBuf::from("/home"),
            dest_container: PathBuf::from("/mnt/pool/alpha"),
            remote: Endpoint::Remote(SshTarget::new("backup@nas", 22, None)),
            timeout: None,
        }
    }

    fn snap(ts: i64) -> Snapshot {
        Snapshot::new(&SnapshotName::new("rootfs", ts), None, Location::Source)
    }

    #[test]
    fn test_full_send_has_no_parent() {
        let commands = transfer().commands(&TransferRequest::full(snap(200)));
        assert_eq!(commands.sender.args, ["send", "/home/rootfs_200"]);
        assert_eq!(
            commands.receiver.args.last().map(String::as_str),
            Some("sudo btrfs receive /mnt/pool/alpha")
        );
    }

    #[test]
    fn test_incremental_send_names_parent() {
        let commands = transfer().commands(&TransferRequest::incremental(snap(200), snap(100)));
        assert_eq!(
            commands.sender.args,
            ["send", "-p", "/home/rootfs_100", "/home/rootfs_200"]
        );
    }

    #[test]
    fn test_receiver_status_takes_precedence() {
        let err = judge(&output(false), &output(false)).unwrap_err();
        assert!(err.message().starts_with("receive failed"));

        let err = judge(&output(false), &output(true)).unwrap_err();
        assert!(err.message().starts_with("send failed"));
        assert_eq!(err.location(), Some(Location::Source));

        assert!(judge(&output(true), &output(true)).is_ok());
    }

    #[test]
    fn test_pipeline_streams_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("received");
        let commands = TransferCommands {
            sender: sh("printf stream-bytes"),
            receiver: sh(&format!("cat > '{}'", target.display())),
        };

        run_pipeline(&commands, Some(Duration::from_secs(30))).unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "stream-bytes");
    }

    #[test]
    fn test_pipeline_receiver_failure() {
        let commands = TransferCommands {
            sender: sh("printf x"),
            receiver: sh("cat >/dev/null; echo 'ERROR: parent not found' >&2; exit 1"),
        };
        let err = run_pipeline(&commands, None).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::TransferFailure);
        assert!(err.message().contains("parent not found"));
    }

    #[test]
    fn test_pipeline_sender_failure_with_healthy_receiver() {
        let commands = TransferCommands {
            sender: sh("echo 'ERROR: cannot open snapshot' >&2; exit 2"),
            receiver: sh("cat >/dev/null"),
        };
        let err = run_pipeline(&commands, None).unwrap_err();
        assert!(err.message().contains("send failed"));
    }

    #[test]
    fn test_pipeline_timeout_kills_both() {
        let commands = TransferCommands {
            sender: sh("sleep 30"),
            receiver: sh("cat >/dev/null"),
        };
        let started = std::time::Instant::now();
        let err = run_pipeline(&commands, Some(Duration::from_millis(200))).unwrap_err();

        assert_eq!(err.kind(), ExErrorKind::TransferTimeout);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_program_is_transfer_failure() {
        let commands = TransferCommands {
            sender: CommandLine::new("/nonexistent/btrfs", vec![]),
            receiver: sh("cat >/dev/null"),
        };
        let err = run_pipeline(&commands, None).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::TransferFailure);
    }
}
