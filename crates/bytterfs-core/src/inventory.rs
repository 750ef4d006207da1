//! Snapshot inventory for one location
//!
//! Turns the textual rows a host reports into an ordered set of snapshots
//! belonging to the configured label. Naming failures are collected next to
//! the inventory instead of aborting the scan.

use crate::errors::BackupError;
use crate::model::{Location, Snapshot, SnapshotName};

/// One subvolume as reported by a host listing, before naming rules apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubvolumeRow {
    /// Path as printed by the listing (relative or absolute)
    pub path: String,
    /// Identity column chosen by the host for this location
    pub identity: Option<String>,
}

impl SubvolumeRow {
    pub fn new(path: impl Into<String>, identity: Option<String>) -> Self {
        Self {
            path: path.into(),
            identity,
        }
    }

    /// Last path component
    pub fn basename(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// Ordered snapshots of one label at one location, ascending by timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inventory {
    location: Location,
    snapshots: Vec<Snapshot>,
}

/// Result of scanning a listing: the inventory plus what was left out
#[derive(Debug, Clone)]
pub struct InventoryScan {
    pub inventory: Inventory,
    /// Rows carrying the label prefix whose names did not parse
    pub naming_errors: Vec<BackupError>,
    /// Timestamps shared by more than one snapshot (ordering is by name then)
    pub duplicate_timestamps: Vec<i64>,
}

impl Inventory {
    /// Empty inventory for a reachable location holding no snapshots
    pub fn empty(location: Location) -> Self {
        Self {
            location,
            snapshots: Vec::new(),
        }
    }

    /// Build an inventory from already parsed snapshots (sorted on the way in)
    pub fn from_snapshots(location: Location, mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.name.cmp(&b.name))
        });
        Self {
            location,
            snapshots,
        }
    }

    /// Scan listing rows for `label`
    ///
    /// Rows not starting with `<label>_` are unrelated and ignored, as are
    /// well-formed names of a longer label sharing the prefix
    /// (`rootfs_daily_5` for label `rootfs`). Rows with the prefix that fail to
    /// parse become naming errors.
    pub fn scan(label: &str, location: Location, rows: &[SubvolumeRow]) -> InventoryScan {
        let mut snapshots = Vec::new();
        let mut naming_errors = Vec::new();

        for row in rows {
            let basename = row.basename();
            if !SnapshotName::has_label_prefix(basename, label) {
                continue;
            }
            match SnapshotName::parse(basename) {
                Ok(name) if name.label == label => {
                    snapshots.push(Snapshot::new(&name, row.identity.clone(), location));
                }
                Ok(_) => {}
                Err(e) => naming_errors.push(e),
            }
        }

        let inventory = Self::from_snapshots(location, snapshots);
        let duplicate_timestamps = inventory.duplicate_timestamps();

        InventoryScan {
            inventory,
            naming_errors,
            duplicate_timestamps,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Snapshot with the maximum timestamp
    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    /// First snapshot here holding the same content as `other`
    pub fn find_match(&self, other: &Snapshot) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.same_content_as(other))
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.snapshots.iter().map(|s| s.timestamp).collect()
    }

    fn duplicate_timestamps(&self) -> Vec<i64> {
        let mut dups: Vec<i64> = self
            .snapshots
            .windows(2)
            .filter(|w| w[0].timestamp == w[1].timestamp)
            .map(|w| w[0].timestamp)
            .collect();
        dups.dedup();
        dups
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = &'a Snapshot;
    type IntoIter = std::slice::Iter<'a, Snapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}
