//! One backup run for a source/destination pair.
//!
//! ## Pipeline (in order):
//! 1. Run lock (skipped for dry runs)
//! 2. Destination container presence check
//! 3. Crash marker read
//! 4. Inventory of both ends; naming errors reported and skipped
//! 5. Decision: destination deletions plus one transfer
//! 6. dry_run short-circuit (no changes)
//! 7. Planned destination deletions
//! 8. New source snapshot when the action asks for one
//! 9. Arm marker, transfer, clear marker
//! 10. Prune the re-listed destination
//! 11. Trim the source down to its latest snapshot
//!
//! Any failure in steps 1-10 other than a single prune deletion aborts the
//! run and leaves an armed marker in place. The operator hears about a fatal
//! failure exactly once, from `run_backup`; recovered failures and notices
//! are reported where they happen.

#![allow(clippy::result_large_err)]

use std::fmt;
use std::time::Instant;

use bytterfs_core::config::BackupConfig;
use bytterfs_core::decision::{decide, Action, Notice};
use bytterfs_core::errors::{BackupError, ExError, ExErrorKind};
use bytterfs_core::host::{SnapshotHost, TransferCoordinator, TransferRequest};
use bytterfs_core::inventory::Inventory;
use bytterfs_core::model::{Location, Snapshot, SnapshotName};
use bytterfs_core::notifier::{Notifier, NotifyEvent};
use bytterfs_core::retention::plan_prune;
use bytterfs_core::{log_op_end, log_op_error, log_op_start};
use bytterfs_core_types::RunId;
use bytterfs_store::{CrashMarker, MarkerRecord, RunLock};
use chrono::Utc;

use crate::clock::Clock;

/// Everything a run talks to besides local state files
pub struct Collaborators<'a> {
    pub host: &'a dyn SnapshotHost,
    pub transfer: &'a dyn TransferCoordinator,
    pub notifier: &'a dyn Notifier,
    pub clock: &'a dyn Clock,
}

/// What a run did (or, for a dry run, would do)
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub dry_run: bool,
    /// A crash marker from an earlier run was found
    pub recovered: bool,
    pub action: Option<Action>,
    pub transferred: Option<String>,
    pub base: Option<String>,
    pub deleted_before_transfer: Vec<String>,
    pub pruned: Vec<String>,
    pub prune_failures: Vec<String>,
    pub trimmed: Vec<String>,
    pub trim_failures: Vec<String>,
    pub naming_errors: Vec<String>,
    pub notices: Vec<Notice>,
}

impl RunReport {
    fn new(run_id: RunId, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            recovered: false,
            action: None,
            transferred: None,
            base: None,
            deleted_before_transfer: Vec::new(),
            pruned: Vec::new(),
            prune_failures: Vec::new(),
            trimmed: Vec::new(),
            trim_failures: Vec::new(),
            naming_errors: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Whether anything was recovered locally instead of succeeding outright
    pub fn has_warnings(&self) -> bool {
        !self.prune_failures.is_empty()
            || !self.trim_failures.is_empty()
            || !self.naming_errors.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would" } else { "did" };
        writeln!(f, "run {}{}", self.run_id, if self.dry_run { " (dry run)" } else { "" })?;
        if self.recovered {
            writeln!(f, "  recovered from an interrupted run")?;
        }
        if let Some(action) = &self.action {
            writeln!(f, "  action: {}", action)?;
        }
        if let Some(snapshot) = &self.transferred {
            match &self.base {
                Some(base) => writeln!(f, "  transferred: {} (parent {})", snapshot, base)?,
                None => writeln!(f, "  transferred: {} (full)", snapshot)?,
            }
        }
        let lists = [
            ("deleted before transfer", &self.deleted_before_transfer),
            ("pruned", &self.pruned),
            ("prune failures", &self.prune_failures),
            ("trimmed on source", &self.trimmed),
            ("trim failures", &self.trim_failures),
            ("naming errors", &self.naming_errors),
        ];
        for (title, items) in lists {
            if !items.is_empty() {
                writeln!(f, "  {} ({} {}): {}", title, verb, items.len(), items.join(", "))?;
            }
        }
        for notice in &self.notices {
            writeln!(f, "  note: {}", notice)?;
        }
        Ok(())
    }
}

/// Run one backup and report the outcome
///
/// # Errors
/// The first fatal `ExError`; it has already been logged and sent to the
/// notifier when this returns.
pub fn run_backup(config: &BackupConfig, collab: &Collaborators<'_>) -> Result<RunReport, ExError> {
    let run_id = RunId::new();
    let span = tracing::info_span!("backup_run", run_id = %run_id, label = %config.label);
    let _enter = span.enter();

    let start = Instant::now();
    log_op_start!("backup_run", dry_run = config.dry_run);

    match execute(config, collab, &run_id) {
        Ok(report) => {
            log_op_end!(
                "backup_run",
                duration_ms = elapsed_ms(start),
                transferred = report.transferred.as_deref().unwrap_or("-")
            );
            Ok(report)
        }
        Err(err) => {
            log_op_error!("backup_run", err.clone(), duration_ms = elapsed_ms(start));
            deliver(
                collab.notifier,
                NotifyEvent::Error,
                &subject(config, "backup failed"),
                &err.to_string(),
            );
            Err(err)
        }
    }
}

fn execute(
    config: &BackupConfig,
    collab: &Collaborators<'_>,
    run_id: &RunId,
) -> Result<RunReport, ExError> {
    let mut report = RunReport::new(run_id.clone(), config.dry_run);

    // held until this function returns, on every path
    let _lock = if config.dry_run {
        None
    } else {
        Some(RunLock::acquire(&config.source, &config.label)?)
    };

    observed("check_container", || {
        if collab.host.container_exists()? {
            Ok(())
        } else {
            Err(BackupError::DestinationContainerMissing {
                container: config.dest_container.display().to_string(),
                root: config.dest_root.display().to_string(),
            }
            .into())
        }
    })?;

    let marker = CrashMarker::for_label(&config.source, &config.label);
    let marker_present = marker.is_present()?;
    if marker_present {
        report.recovered = true;
        describe_leftover(&marker);
    }

    let source = take_inventory(config, collab, Location::Source, &mut report)?;
    let dest = take_inventory(config, collab, Location::Destination, &mut report)?;

    let plan = decide(marker_present, &source, &dest)?;
    tracing::info!(
        action = plan.action.name(),
        deletions = plan.deletions.len(),
        source_len = source.len(),
        dest_len = dest.len(),
        "{}",
        plan.action
    );
    for notice in &plan.notices {
        tracing::info!(notice = notice.subject(), "{}", notice);
        deliver(
            collab.notifier,
            NotifyEvent::Info,
            &subject(config, notice.subject()),
            &notice.to_string(),
        );
    }
    report.action = Some(plan.action.clone());
    report.notices = plan.notices.clone();

    if config.dry_run {
        report.deleted_before_transfer = names(&plan.deletions);
        let preview = plan_prune(&dest, &config.retention, collab.clock.now());
        report.pruned = preview
            .deletions
            .iter()
            .filter(|s| !plan.deletions.contains(s))
            .map(|s| s.name.clone())
            .collect();
        return Ok(report);
    }

    for snapshot in &plan.deletions {
        observed("delete_suspect", || collab.host.delete_snapshot(snapshot))?;
        report.deleted_before_transfer.push(snapshot.name.clone());
    }

    let request = match &plan.action {
        Action::CreateThenFull => TransferRequest::full(create(config, collab, &source)?),
        Action::Full { snapshot } => TransferRequest::full(snapshot.clone()),
        Action::CreateThenIncremental { base } => {
            TransferRequest::incremental(create(config, collab, &source)?, base.clone())
        }
    };

    let record = MarkerRecord {
        run_id: run_id.clone(),
        label: config.label.clone(),
        started_at: Utc::now(),
        snapshot: request.snapshot.name.clone(),
        base: request.base.as_ref().map(|b| b.name.clone()),
    };
    if marker_present {
        marker.rearm(&record)?;
    } else {
        marker.arm(&record)?;
    }

    observed("transfer", || {
        tracing::info!(
            snapshot = %request.snapshot.name,
            base = request.base.as_ref().map(|b| b.name.as_str()).unwrap_or("-"),
            "sending"
        );
        collab.transfer.transfer(&request)
    })?;
    marker.clear()?;
    report.transferred = Some(request.snapshot.name.clone());
    report.base = record.base;

    prune_destination(config, collab, &request.snapshot, &mut report)?;
    trim_source(config, collab, &mut report)?;

    Ok(report)
}

fn take_inventory(
    config: &BackupConfig,
    collab: &Collaborators<'_>,
    location: Location,
    report: &mut RunReport,
) -> Result<Inventory, ExError> {
    let rows = observed("inventory", || collab.host.list_subvolumes(location))?;
    let scan = Inventory::scan(&config.label, location, &rows);

    for err in scan.naming_errors {
        let err = ExError::from(err).with_location(location);
        recover(config, collab, &err);
        report.naming_errors.push(err.to_string());
    }
    if !scan.duplicate_timestamps.is_empty() {
        tracing::warn!(
            location = location.as_str(),
            timestamps = ?scan.duplicate_timestamps,
            "several snapshots share a timestamp; ordering them by name"
        );
    }
    tracing::debug!(location = location.as_str(), snapshots = scan.inventory.len(), "inventory taken");

    Ok(scan.inventory)
}

/// Create the new source snapshot, named after the current time
fn create(
    config: &BackupConfig,
    collab: &Collaborators<'_>,
    source: &Inventory,
) -> Result<Snapshot, ExError> {
    // names must stay unique and increasing even if the clock lags
    let floor = source.latest().map(|s| s.timestamp + 1).unwrap_or(0);
    let name = SnapshotName::new(config.label.clone(), collab.clock.now().max(floor));
    observed("create_snapshot", || collab.host.create_snapshot(&name))
}

/// Apply retention to the destination
///
/// The snapshot just transferred is the next run's incremental parent and is
/// never pruned in the run that sent it.
fn prune_destination(
    config: &BackupConfig,
    collab: &Collaborators<'_>,
    transferred: &Snapshot,
    report: &mut RunReport,
) -> Result<(), ExError> {
    let rows = observed("inventory", || collab.host.list_subvolumes(Location::Destination))?;
    let dest = Inventory::scan(&config.label, Location::Destination, &rows).inventory;

    let plan = plan_prune(&dest, &config.retention, collab.clock.now());
    for bucket in &plan.buckets {
        tracing::debug!(
            window_seconds = bucket.rule.window_seconds,
            max_keep = bucket.rule.max_keep,
            count = bucket.count,
            evicted = bucket.evicted,
            "retention bucket"
        );
    }

    for snapshot in &plan.deletions {
        if snapshot.same_content_as(transferred) {
            tracing::info!(snapshot = %snapshot.name, "keeping latest transfer despite retention");
            continue;
        }
        match collab.host.delete_snapshot(snapshot) {
            Ok(()) => {
                tracing::info!(snapshot = %snapshot.name, "pruned");
                report.pruned.push(snapshot.name.clone());
            }
            Err(e) => {
                let err = ExError::new(ExErrorKind::PruneDeleteFailure)
                    .with_op("prune")
                    .with_snapshot(snapshot.name.clone())
                    .with_location(Location::Destination)
                    .with_message("snapshot kept; pruning continues")
                    .with_source(e);
                recover(config, collab, &err);
                report.prune_failures.push(snapshot.name.clone());
            }
        }
    }
    Ok(())
}

/// Keep only the latest source snapshot; it is the next incremental parent
fn trim_source(
    config: &BackupConfig,
    collab: &Collaborators<'_>,
    report: &mut RunReport,
) -> Result<(), ExError> {
    let rows = observed("inventory", || collab.host.list_subvolumes(Location::Source))?;
    let source = Inventory::scan(&config.label, Location::Source, &rows).inventory;

    let Some((_latest, older)) = source.snapshots().split_last() else {
        return Ok(());
    };
    for snapshot in older {
        match collab.host.delete_snapshot(snapshot) {
            Ok(()) => report.trimmed.push(snapshot.name.clone()),
            Err(e) => {
                let err = e.with_op("trim_source");
                recover(config, collab, &err);
                report.trim_failures.push(snapshot.name.clone());
            }
        }
    }
    Ok(())
}

/// Log and report a failure handled locally
fn recover(config: &BackupConfig, collab: &Collaborators<'_>, err: &ExError) {
    tracing::warn!(err.kind = ?err.kind(), err.code = err.code(), "{}", err);
    deliver(
        collab.notifier,
        NotifyEvent::Warning,
        &subject(config, err.code()),
        &err.to_string(),
    );
}

fn describe_leftover(marker: &CrashMarker) {
    match marker.read() {
        Ok(Some(record)) => tracing::warn!(
            previous_run = %record.run_id,
            started_at = %record.started_at,
            snapshot = %record.snapshot,
            "crash marker found; previous transfer did not complete"
        ),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "crash marker found but unreadable"),
    }
}

/// Wrap a step with start/end/error events
fn observed<T>(op: &'static str, step: impl FnOnce() -> Result<T, ExError>) -> Result<T, ExError> {
    let start = Instant::now();
    log_op_start!(op);
    let result = step();
    match &result {
        Ok(_) => {
            log_op_end!(op, duration_ms = elapsed_ms(start));
        }
        Err(e) => {
            log_op_error!(op, e.clone(), duration_ms = elapsed_ms(start));
        }
    }
    result
}

/// A notification that fails to go out is logged, never escalated
fn deliver(notifier: &dyn Notifier, event: NotifyEvent, subject: &str, message: &str) {
    if let Err(e) = notifier.notify(event, subject, message) {
        tracing::warn!(err.code = e.code(), "notification not delivered: {}", e);
    }
}

fn subject(config: &BackupConfig, what: &str) -> String {
    format!("bytterfs [{}]: {}", config.label, what)
}

fn names(snapshots: &[Snapshot]) -> Vec<String> {
    snapshots.iter().map(|s| s.name.clone()).collect()
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
