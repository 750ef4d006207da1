//! `SnapshotHost` backed by the btrfs command line tools

#![allow(clippy::result_large_err)]

use std::path::{Path, PathBuf};

use bytterfs_core::config::BackupConfig;
use bytterfs_core::errors::{ExError, ExErrorKind};
use bytterfs_core::host::SnapshotHost;
use bytterfs_core::inventory::SubvolumeRow;
use bytterfs_core::model::{Location, Snapshot, SnapshotName};

use super::list::{parse_subvolume_list, DEST_IDENTITY, SOURCE_IDENTITY};
use super::runner::{CommandLine, CommandOutput, CommandRunner, Endpoint, ProcessRunner, SshTarget};

/// Snapshots live directly in the source subvolume and directly in the
/// destination container, both named `<label>_<timestamp>`.
pub struct BtrfsHost<R = ProcessRunner> {
    runner: R,
    local: Endpoint,
    source: PathBuf,
    dest_root: PathBuf,
    dest_container: PathBuf,
    remote: Endpoint,
}

impl BtrfsHost<ProcessRunner> {
    pub fn from_config(config: &BackupConfig) -> Self {
        Self::with_runner(ProcessRunner, config)
    }
}

impl<R: CommandRunner> BtrfsHost<R> {
    pub fn with_runner(runner: R, config: &BackupConfig) -> Self {
        Self {
            runner,
            local: Endpoint::Local,
            source: config.source.clone(),
            dest_root: config.dest_root.clone(),
            dest_container: config.dest_container.clone(),
            remote: Endpoint::Remote(SshTarget::new(
                config.remote_host.clone(),
                config.port,
                config.key.clone(),
            )),
        }
    }

    fn endpoint(&self, location: Location) -> &Endpoint {
        match location {
            Location::Source => &self.local,
            Location::Destination => &self.remote,
        }
    }

    /// Directory holding the snapshots at `location`
    fn snapshot_dir(&self, location: Location) -> &Path {
        match location {
            Location::Source => &self.source,
            Location::Destination => &self.dest_container,
        }
    }

    fn btrfs(&self, location: Location, args: &[&str]) -> CommandLine {
        let argv: Vec<String> = std::iter::once("btrfs")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect();
        self.endpoint(location).command(&argv)
    }

    /// Run and insist on a zero exit status
    fn run_checked(
        &self,
        command: &CommandLine,
        kind: ExErrorKind,
        op: &str,
        location: Location,
    ) -> Result<CommandOutput, ExError> {
        let fail = |message: String| {
            ExError::new(kind)
                .with_op(op)
                .with_location(location)
                .with_message(format!("`{}` failed: {}", command, message))
        };
        let output = self.runner.run(command).map_err(|e| fail(e.to_string()))?;
        if output.success {
            Ok(output)
        } else {
            Err(fail(output.failure_summary()))
        }
    }
}

impl<R: CommandRunner> SnapshotHost for BtrfsHost<R> {
    fn list_subvolumes(&self, location: Location) -> Result<Vec<SubvolumeRow>, ExError> {
        let dir = self.snapshot_dir(location).display().to_string();
        // a receive cut short leaves a writable subvolume behind; it must stay
        // visible on the destination so recovery can remove it
        let (flags, identity_key) = match location {
            Location::Source => (vec!["-o", "-r", "-u"], SOURCE_IDENTITY),
            Location::Destination => (vec!["-o", "-R"], DEST_IDENTITY),
        };
        let mut args = vec!["subvolume", "list"];
        args.extend(flags);
        args.push(&dir);

        let command = self.btrfs(location, &args);
        let output = self.run_checked(
            &command,
            ExErrorKind::InventoryUnreachable,
            "list_subvolumes",
            location,
        )?;
        Ok(parse_subvolume_list(&output.stdout, identity_key))
    }

    fn create_snapshot(&self, name: &SnapshotName) -> Result<Snapshot, ExError> {
        let source = self.source.display().to_string();
        let target = self.source.join(name.to_string()).display().to_string();
        let command = self.btrfs(Location::Source, &["subvolume", "snapshot", "-r", &source, &target]);
        self.run_checked(
            &command,
            ExErrorKind::SnapshotCreateFailure,
            "create_snapshot",
            Location::Source,
        )
        .map_err(|e| e.with_snapshot(name.to_string()))?;

        // identity is assigned by btrfs; read it back from a fresh listing
        let wanted = name.to_string();
        let identity = self
            .list_subvolumes(Location::Source)?
            .into_iter()
            .find(|row| row.basename() == wanted)
            .and_then(|row| row.identity);
        if identity.is_none() {
            tracing::warn!(snapshot = %wanted, "new snapshot not found in listing; matching by timestamp");
        }

        Ok(Snapshot::new(name, identity, Location::Source))
    }

    fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<(), ExError> {
        let path = self
            .snapshot_dir(snapshot.location)
            .join(&snapshot.name)
            .display()
            .to_string();
        let command = self.btrfs(snapshot.location, &["subvolume", "delete", &path]);
        self.run_checked(
            &command,
            ExErrorKind::SnapshotDeleteFailure,
            "delete_snapshot",
            snapshot.location,
        )
        .map_err(|e| e.with_snapshot(snapshot.name.clone()))?;
        Ok(())
    }

    fn container_exists(&self) -> Result<bool, ExError> {
        let root = self.dest_root.display().to_string();
        let command = self.btrfs(Location::Destination, &["subvolume", "list", "-o", &root]);
        let output = self.run_checked(
            &command,
            ExErrorKind::InventoryUnreachable,
            "check_container",
            Location::Destination,
        )?;

        let relative = self
            .dest_container
            .strip_prefix(&self.dest_root)
            .unwrap_or(&self.dest_container)
            .display()
            .to_string();
        let rows = parse_subvolume_list(&output.stdout, DEST_IDENTITY);
        Ok(rows
            .iter()
            .any(|row| row.path == relative || row.path.ends_with(&format!("/{}", relative))))
    }
}
