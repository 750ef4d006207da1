//! Snapshot-lifecycle decision engine
//!
//! `decide` is a pure function of the crash-marker flag and both inventories.
//! It returns a [`Plan`]: destination deletions to perform first, exactly one
//! transfer [`Action`], and informational [`Notice`]s for the operator.
//!
//! ## Normal path (no marker)
//! 1. No source snapshot: create one and send it in full (first run).
//! 2. Latest source snapshot already on the destination: create a new one and
//!    send it incrementally on top of the latest.
//! 3. Latest source snapshot missing on the destination: send it in full.
//!
//! ## Recovery path (marker present)
//! The newest destination snapshot may be a partial receive and is always
//! deleted. The transfer then continues incrementally from the newest source
//! snapshot still matched by a trusted destination snapshot, or falls back to
//! a full send when no common ancestor remains.

use crate::errors::{BackupError, Result};
use crate::inventory::Inventory;
use crate::model::Snapshot;

/// The single transfer a run performs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create a new source snapshot and send it without a base
    CreateThenFull,
    /// Send an existing source snapshot without a base
    Full { snapshot: Snapshot },
    /// Create a new source snapshot and send the delta against `base`
    CreateThenIncremental { base: Snapshot },
}

impl Action {
    pub fn creates_snapshot(&self) -> bool {
        matches!(
            self,
            Action::CreateThenFull | Action::CreateThenIncremental { .. }
        )
    }

    pub fn base(&self) -> Option<&Snapshot> {
        match self {
            Action::CreateThenIncremental { base } => Some(base),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::CreateThenFull => "create_then_full",
            Action::Full { .. } => "full",
            Action::CreateThenIncremental { .. } => "create_then_incremental",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::CreateThenFull => write!(f, "create new snapshot, full transfer"),
            Action::Full { snapshot } => write!(f, "full transfer of {}", snapshot.name),
            Action::CreateThenIncremental { base } => {
                write!(f, "create new snapshot, incremental transfer on {}", base.name)
            }
        }
    }
}

/// Non-fatal conditions worth telling the operator about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// No source snapshot exists yet; expected on the very first run
    FirstRun,
    /// More than one source snapshot; only the latest is used, the rest are
    /// trimmed after the transfer
    ExtraSourceSnapshots { count: usize },
    /// The latest source snapshot is not on the destination and is resent
    LatestMissingOnDestination { snapshot: String },
    /// A crash marker was found; `suspect` is deleted before continuing
    CrashRecovered { suspect: String },
}

impl Notice {
    pub fn subject(&self) -> &'static str {
        match self {
            Notice::FirstRun => "first run",
            Notice::ExtraSourceSnapshots { .. } => "extra source snapshots",
            Notice::LatestMissingOnDestination { .. } => "latest snapshot missing on destination",
            Notice::CrashRecovered { .. } => "interrupted run recovered",
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::FirstRun => write!(
                f,
                "No read-only snapshot found on the source; ignore this if bytterfs runs for the first time"
            ),
            Notice::ExtraSourceSnapshots { count } => write!(
                f,
                "Found {} read-only snapshots on the source where one was expected; older ones are removed after the transfer",
                count
            ),
            Notice::LatestMissingOnDestination { snapshot } => write!(
                f,
                "Latest source snapshot {} is not on the destination; sending it in full",
                snapshot
            ),
            Notice::CrashRecovered { suspect } => write!(
                f,
                "Previous run was interrupted; deleting possibly partial destination snapshot {} before continuing",
                suspect
            ),
        }
    }
}

/// Deletions to run first, then one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Destination snapshots to delete before the transfer
    pub deletions: Vec<Snapshot>,
    pub action: Action,
    pub notices: Vec<Notice>,
}

impl Plan {
    fn new(action: Action) -> Self {
        Self {
            deletions: Vec::new(),
            action,
            notices: Vec::new(),
        }
    }

    fn deleting(mut self, snapshot: Snapshot) -> Self {
        self.deletions.push(snapshot);
        self
    }

    fn noting(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }
}

/// Select the next action from the observed state
///
/// # Errors
/// `BackupError::MarkerWithEmptyDestination` when a crash marker is present
/// but the destination holds nothing: a transfer was attempted against a
/// destination that should already carry history.
pub fn decide(marker_present: bool, source: &Inventory, dest: &Inventory) -> Result<Plan> {
    if marker_present {
        decide_recovery(source, dest)
    } else {
        Ok(decide_normal(source, dest))
    }
}

fn decide_normal(source: &Inventory, dest: &Inventory) -> Plan {
    let Some(latest) = source.latest() else {
        return Plan::new(Action::CreateThenFull).noting(Notice::FirstRun);
    };

    let plan = if dest.find_match(latest).is_some() {
        Plan::new(Action::CreateThenIncremental {
            base: latest.clone(),
        })
    } else {
        Plan::new(Action::Full {
            snapshot: latest.clone(),
        })
        .noting(Notice::LatestMissingOnDestination {
            snapshot: latest.name.clone(),
        })
    };

    if source.len() > 1 {
        plan.noting(Notice::ExtraSourceSnapshots {
            count: source.len(),
        })
    } else {
        plan
    }
}

fn decide_recovery(source: &Inventory, dest: &Inventory) -> Result<Plan> {
    let suspect = dest
        .latest()
        .ok_or(BackupError::MarkerWithEmptyDestination)?;
    let trusted = &dest.snapshots()[..dest.len() - 1];

    let notice = Notice::CrashRecovered {
        suspect: suspect.name.clone(),
    };

    let Some(latest) = source.latest() else {
        return Ok(Plan::new(Action::CreateThenFull)
            .deleting(suspect.clone())
            .noting(notice));
    };

    let base = source
        .iter()
        .rev()
        .find(|s| trusted.iter().any(|d| d.same_content_as(s)));

    let action = match base {
        Some(base) => Action::CreateThenIncremental { base: base.clone() },
        None => Action::Full {
            snapshot: latest.clone(),
        },
    };

    Ok(Plan::new(action).deleting(suspect.clone()).noting(notice))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Location, SnapshotName};

    fn snap(ts: i64, id: &str, location: Location) -> Snapshot {
        Snapshot::new(
            &SnapshotName::new("rootfs", ts),
            Some(id.to_string()),
            location,
        )
    }

    fn inv(location: Location, snaps: Vec<Snapshot>) -> Inventory {
        Inventory::from_snapshots(location, snaps)
    }

    #[test]
    fn test_action_helpers() {
        let base = snap(1, "a", Location::Source);
        let inc = Action::CreateThenIncremental { base: base.clone() };
        assert!(inc.creates_snapshot());
        assert_eq!(inc.base(), Some(&base));
        assert!(!Action::Full { snapshot: base }.creates_snapshot());
        assert!(Action::CreateThenFull.base().is_none());
    }

    #[test]
    fn test_normal_extra_source_snapshots_use_latest() {
        let source = inv(
            Location::Source,
            vec![snap(100, "a", Location::Source), snap(200, "b", Location::Source)],
        );
        let dest = inv(Location::Destination, vec![snap(200, "b", Location::Destination)]);

        let plan = decide(false, &source, &dest).unwrap();
        assert_eq!(
            plan.action,
            Action::CreateThenIncremental {
                base: snap(200, "b", Location::Source)
            }
        );
        assert!(plan
            .notices
            .contains(&Notice::ExtraSourceSnapshots { count: 2 }));
        assert!(plan.deletions.is_empty());
    }

    #[test]
    fn test_recovery_without_common_ancestor_sends_latest_full() {
        let source = inv(Location::Source, vec![snap(400, "n", Location::Source)]);
        let dest = inv(
            Location::Destination,
            vec![
                snap(200, "x", Location::Destination),
                snap(300, "y", Location::Destination),
            ],
        );

        let plan = decide(true, &source, &dest).unwrap();
        assert_eq!(plan.deletions, vec![snap(300, "y", Location::Destination)]);
        assert_eq!(
            plan.action,
            Action::Full {
                snapshot: snap(400, "n", Location::Source)
            }
        );
    }

    #[test]
    fn test_recovery_never_uses_suspect_as_base() {
        // the suspect carries the latest source identity, but is untrusted
        let source = inv(Location::Source, vec![snap(300, "s", Location::Source)]);
        let dest = inv(Location::Destination, vec![snap(300, "s", Location::Destination)]);

        let plan = decide(true, &source, &dest).unwrap();
        assert_eq!(plan.deletions.len(), 1);
        assert_eq!(
            plan.action,
            Action::Full {
                snapshot: snap(300, "s", Location::Source)
            }
        );
    }

    #[test]
    fn test_recovery_picks_newest_common_ancestor() {
        let source = inv(
            Location::Source,
            vec![
                snap(100, "a", Location::Source),
                snap(200, "b", Location::Source),
                snap(400, "n", Location::Source),
            ],
        );
        let dest = inv(
            Location::Destination,
            vec![
                snap(100, "a", Location::Destination),
                snap(200, "b", Location::Destination),
                snap(300, "partial", Location::Destination),
            ],
        );

        let plan = decide(true, &source, &dest).unwrap();
        assert_eq!(plan.action.base().map(|b| b.timestamp), Some(200));
    }

    #[test]
    fn test_recovery_always_notes_crash() {
        let source = inv(Location::Source, vec![]);
        let dest = inv(Location::Destination, vec![snap(1, "d", Location::Destination)]);
        let plan = decide(true, &source, &dest).unwrap();
        assert_eq!(
            plan.notices,
            vec![Notice::CrashRecovered {
                suspect: "rootfs_1".to_string()
            }]
        );
    }
}
