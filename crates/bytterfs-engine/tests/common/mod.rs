#![allow(dead_code, clippy::result_large_err)]

//! In-memory replication pair for end-to-end run tests

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::PathBuf;

use bytterfs_core::config::{BackupArgs, BackupConfig};
use bytterfs_core::errors::{ExError, ExErrorKind};
use bytterfs_core::host::{SnapshotHost, TransferCoordinator, TransferRequest};
use bytterfs_core::inventory::SubvolumeRow;
use bytterfs_core::model::{Location, Snapshot, SnapshotName};
use bytterfs_core::notifier::RecordingNotifier;
use bytterfs_engine::{run_backup, Collaborators, FixedClock, RunReport};
use tempfile::TempDir;

pub const DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeed,
    Fail,
    /// Leave a half-received snapshot behind, then fail
    PartialThenFail,
    Timeout,
}

/// Source and destination snapshot tables plus failure switches
pub struct FakeWorld {
    /// (name, uuid)
    pub source: RefCell<Vec<(String, String)>>,
    /// (name, received uuid)
    pub dest: RefCell<Vec<(String, Option<String>)>>,
    pub container_exists: Cell<bool>,
    pub unreachable: Cell<Option<Location>>,
    pub fail_delete: RefCell<HashSet<String>>,
    pub fail_create: Cell<bool>,
    pub outcome: Cell<TransferOutcome>,
    pub transfers: RefCell<Vec<TransferRequest>>,
    next_uuid: Cell<u32>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self {
            source: RefCell::new(Vec::new()),
            dest: RefCell::new(Vec::new()),
            container_exists: Cell::new(true),
            unreachable: Cell::new(None),
            fail_delete: RefCell::new(HashSet::new()),
            fail_create: Cell::new(false),
            outcome: Cell::new(TransferOutcome::Succeed),
            transfers: RefCell::new(Vec::new()),
            next_uuid: Cell::new(1),
        }
    }

    pub fn with_source(self, ts: i64, uuid: &str) -> Self {
        self.source
            .borrow_mut()
            .push((format!("rootfs_{}", ts), uuid.to_string()));
        self
    }

    pub fn with_dest(self, ts: i64, received: Option<&str>) -> Self {
        self.dest
            .borrow_mut()
            .push((format!("rootfs_{}", ts), received.map(str::to_string)));
        self
    }

    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.source.borrow().iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    pub fn dest_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dest.borrow().iter().map(|(n, _)| n.clone()).collect();
        names.sort();
        names
    }

    fn check_reachable(&self, location: Location) -> Result<(), ExError> {
        if self.unreachable.get() == Some(location) {
            Err(ExError::new(ExErrorKind::InventoryUnreachable)
                .with_op("list_subvolumes")
                .with_location(location)
                .with_message("ssh: connect to host nas port 22: Connection refused"))
        } else {
            Ok(())
        }
    }
}

impl SnapshotHost for FakeWorld {
    fn list_subvolumes(&self, location: Location) -> Result<Vec<SubvolumeRow>, ExError> {
        self.check_reachable(location)?;
        Ok(match location {
            Location::Source => self
                .source
                .borrow()
                .iter()
                .map(|(name, uuid)| SubvolumeRow::new(format!("home/{}", name), Some(uuid.clone())))
                .collect(),
            Location::Destination => self
                .dest
                .borrow()
                .iter()
                .map(|(name, received)| SubvolumeRow::new(format!("alpha/{}", name), received.clone()))
                .collect(),
        })
    }

    fn create_snapshot(&self, name: &SnapshotName) -> Result<Snapshot, ExError> {
        if self.fail_create.get() {
            return Err(ExError::new(ExErrorKind::SnapshotCreateFailure)
                .with_op("create_snapshot")
                .with_snapshot(name.to_string()));
        }
        let uuid = format!("uuid-{}", self.next_uuid.get());
        self.next_uuid.set(self.next_uuid.get() + 1);
        self.source
            .borrow_mut()
            .push((name.to_string(), uuid.clone()));
        Ok(Snapshot::new(name, Some(uuid), Location::Source))
    }

    fn delete_snapshot(&self, snapshot: &Snapshot) -> Result<(), ExError> {
        if self.fail_delete.borrow().contains(&snapshot.name) {
            return Err(ExError::new(ExErrorKind::SnapshotDeleteFailure)
                .with_op("delete_snapshot")
                .with_snapshot(snapshot.name.clone())
                .with_location(snapshot.location)
                .with_message("ERROR: Could not destroy subvolume: Device or resource busy"));
        }
        match snapshot.location {
            Location::Source => self.source.borrow_mut().retain(|(n, _)| *n != snapshot.name),
            Location::Destination => self.dest.borrow_mut().retain(|(n, _)| *n != snapshot.name),
        }
        Ok(())
    }

    fn container_exists(&self) -> Result<bool, ExError> {
        self.check_reachable(Location::Destination)?;
        Ok(self.container_exists.get())
    }
}

impl TransferCoordinator for FakeWorld {
    fn transfer(&self, request: &TransferRequest) -> Result<(), ExError> {
        self.transfers.borrow_mut().push(request.clone());

        let fail = |kind: ExErrorKind, message: &str| {
            Err(ExError::new(kind)
                .with_op("transfer")
                .with_snapshot(request.snapshot.name.clone())
                .with_message(message))
        };

        if let Some(base) = &request.base {
            let has_parent = self
                .dest
                .borrow()
                .iter()
                .any(|(_, received)| received.is_some() && *received == base.identity);
            if !has_parent {
                return fail(ExErrorKind::TransferFailure, "ERROR: cannot find parent subvolume");
            }
        }

        // btrfs receive refuses to overwrite an existing subvolume
        let exists = self
            .dest
            .borrow()
            .iter()
            .any(|(name, _)| *name == request.snapshot.name);
        if exists {
            return fail(
                ExErrorKind::TransferFailure,
                "ERROR: creating subvolume failed: File exists",
            );
        }

        match self.outcome.get() {
            TransferOutcome::Succeed => {
                self.dest
                    .borrow_mut()
                    .push((request.snapshot.name.clone(), request.snapshot.identity.clone()));
                Ok(())
            }
            TransferOutcome::Fail => fail(ExErrorKind::TransferFailure, "receive failed (exit status 1)"),
            TransferOutcome::PartialThenFail => {
                self.dest
                    .borrow_mut()
                    .push((request.snapshot.name.clone(), None));
                fail(ExErrorKind::TransferFailure, "receive failed (terminated by signal)")
            }
            TransferOutcome::Timeout => fail(ExErrorKind::TransferTimeout, "no completion within 1s"),
        }
    }
}

/// A source directory for the lock and marker files plus a valid config
pub struct Pair {
    pub dir: TempDir,
    pub config: BackupConfig,
}

impl Pair {
    pub fn new(keep: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = BackupConfig::resolve(
            BackupArgs {
                label: "rootfs".to_string(),
                source: dir.path().to_path_buf(),
                dest_root: PathBuf::from("/mnt/pool"),
                dest_container: PathBuf::from("/mnt/pool/alpha"),
                remote_host: "backup@nas".to_string(),
                keep: Some(keep.to_string()),
                ..Default::default()
            },
            None,
        )
        .unwrap();
        Self { dir, config }
    }

    pub fn dry_run(mut self) -> Self {
        self.config.dry_run = true;
        self
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.path().join(".bytterfs-rootfs.marker")
    }

    pub fn run(&self, world: &FakeWorld, notifier: &RecordingNotifier, now: i64) -> Result<RunReport, ExError> {
        let clock = FixedClock(now);
        let collab = Collaborators {
            host: world,
            transfer: world,
            notifier,
            clock: &clock,
        };
        run_backup(&self.config, &collab)
    }
}
