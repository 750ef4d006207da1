//! Tiered retention for destination history
//!
//! A rule set `5w=6,4m=3` splits snapshot age into buckets
//! `[0, 5w)`, `[5w, 4m)` and keeps at most 6 and 3 snapshots in them.
//! Anything older than the last window is kept indefinitely.
//!
//! Excess snapshots are chosen by even spread across the bucket
//! (`ceil(j * count / excess)` for `j in 0..excess`) so the surviving history
//! stays roughly uniform instead of always losing the oldest entries.

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::errors::{BackupError, Result};
use crate::inventory::Inventory;
use crate::model::Snapshot;

pub const SECONDS_PER_DAY: i64 = 86_400;
pub const DAYS_PER_WEEK: i64 = 7;
pub const DAYS_PER_MONTH: i64 = 30;

/// Keep at most `max_keep` snapshots in the bucket ending at `window_seconds`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionRule {
    pub window_seconds: i64,
    pub max_keep: usize,
}

impl RetentionRule {
    pub fn new(window_seconds: i64, max_keep: usize) -> Self {
        Self {
            window_seconds,
            max_keep,
        }
    }

    /// Parse a single `<N>(w|m)=<K>` token
    fn parse_token(token: &str) -> Result<Self> {
        let invalid = |reason: &str| BackupError::InvalidRetentionToken {
            token: token.to_string(),
            reason: reason.to_string(),
        };

        let (span, keep) = token
            .split_once('=')
            .ok_or_else(|| invalid("expected <N>(w|m)=<K>"))?;

        let span = span.trim();
        let unit = span
            .chars()
            .last()
            .ok_or_else(|| invalid("missing time span"))?;
        let days_per_unit = match unit {
            'w' => DAYS_PER_WEEK,
            'm' => DAYS_PER_MONTH,
            _ => return Err(invalid("only w (weeks) and m (months) are accepted")),
        };

        let count: i64 = span[..span.len() - 1]
            .parse()
            .map_err(|_| invalid("time span is not a number"))?;
        if count <= 0 {
            return Err(invalid("time span must be positive"));
        }

        let window_seconds = count
            .checked_mul(days_per_unit * SECONDS_PER_DAY)
            .ok_or_else(|| invalid("time span too large"))?;

        let max_keep: usize = keep
            .trim()
            .parse()
            .map_err(|_| invalid("keep value is not a number"))?;

        Ok(Self::new(window_seconds, max_keep))
    }
}

/// Validated list of rules, strictly increasing in window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionRuleSet {
    rules: Vec<RetentionRule>,
}

impl RetentionRuleSet {
    /// Validate and wrap a rule list
    ///
    /// # Errors
    /// `EmptyRetentionSpec` for an empty list, `RetentionWindowsNotIncreasing`
    /// when any window is not strictly greater than its predecessor.
    pub fn new(rules: Vec<RetentionRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(BackupError::EmptyRetentionSpec);
        }
        let increasing = rules
            .windows(2)
            .all(|w| w[0].window_seconds < w[1].window_seconds);
        if !increasing || rules[0].window_seconds <= 0 {
            return Err(BackupError::RetentionWindowsNotIncreasing {
                spec: describe(&rules),
            });
        }
        Ok(Self { rules })
    }

    /// Parse a comma separated spec such as `5w=6,4m=3,6m=2,12m=3`
    ///
    /// # Errors
    /// Any malformed token, an empty spec, or non-increasing windows.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.trim().is_empty() {
            return Err(BackupError::EmptyRetentionSpec);
        }
        let rules = spec
            .split(',')
            .map(|token| RetentionRule::parse_token(token.trim()))
            .collect::<Result<Vec<_>>>()?;

        Self::new(rules).map_err(|e| match e {
            BackupError::RetentionWindowsNotIncreasing { .. } => {
                BackupError::RetentionWindowsNotIncreasing {
                    spec: spec.to_string(),
                }
            }
            other => other,
        })
    }

    pub fn rules(&self) -> &[RetentionRule] {
        &self.rules
    }

    /// Bucket index for a snapshot of the given age
    ///
    /// Negative ages (timestamps in the future) count as age zero. Returns
    /// `None` past the last window: those snapshots are never pruned.
    pub fn bucket_of(&self, age_seconds: i64) -> Option<usize> {
        let age = age_seconds.max(0);
        self.rules.iter().position(|r| age < r.window_seconds)
    }
}

impl FromStr for RetentionRuleSet {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn describe(rules: &[RetentionRule]) -> String {
    rules
        .iter()
        .map(|r| format!("{}s={}", r.window_seconds, r.max_keep))
        .collect::<Vec<_>>()
        .join(",")
}

/// Indices (into an ascending bucket of `count`) to evict `excess` entries
///
/// `idx(j) = ceil(j * count / excess)`; duplicates collapse, so fewer than
/// `excess` indices may come back. The next run picks up the remainder.
pub fn even_spread_indices(count: usize, excess: usize) -> Vec<usize> {
    if excess == 0 || count == 0 {
        return Vec::new();
    }
    let excess = excess.min(count);
    (0..excess)
        .map(|j| (j * count).div_ceil(excess))
        .filter(|idx| *idx < count)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Per-bucket outcome of a pruning pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketReport {
    pub rule: RetentionRule,
    pub count: usize,
    pub evicted: usize,
}

/// Destination snapshots to delete, plus how each bucket was judged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunePlan {
    pub buckets: Vec<BucketReport>,
    pub deletions: Vec<Snapshot>,
    /// Snapshots older than the last window, kept by policy
    pub beyond_last_window: usize,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty()
    }
}

/// Positions in `timestamps` selected for eviction at `now`
///
/// The input need not be sorted; each bucket is ordered ascending (stable)
/// before the even-spread selection.
pub fn select_evictions(timestamps: &[i64], rules: &RetentionRuleSet, now: i64) -> Vec<usize> {
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); rules.rules().len()];
    for (pos, ts) in timestamps.iter().enumerate() {
        if let Some(bucket) = rules.bucket_of(now.saturating_sub(*ts)) {
            buckets[bucket].push(pos);
        }
    }

    let mut selected = Vec::new();
    for (rule, mut members) in rules.rules().iter().zip(buckets) {
        if members.len() <= rule.max_keep {
            continue;
        }
        members.sort_by_key(|pos| timestamps[*pos]);
        let excess = members.len() - rule.max_keep;
        selected.extend(
            even_spread_indices(members.len(), excess)
                .into_iter()
                .map(|i| members[i]),
        );
    }
    selected.sort_unstable();
    selected
}

/// Compute which destination snapshots exceed their bucket's budget
pub fn plan_prune(inventory: &Inventory, rules: &RetentionRuleSet, now: i64) -> PrunePlan {
    let snapshots = inventory.snapshots();
    let timestamps = inventory.timestamps();

    let mut counts = vec![0usize; rules.rules().len()];
    let mut beyond_last_window = 0;
    for ts in &timestamps {
        match rules.bucket_of(now.saturating_sub(*ts)) {
            Some(bucket) => counts[bucket] += 1,
            None => beyond_last_window += 1,
        }
    }

    let mut buckets = rules
        .rules()
        .iter()
        .zip(counts)
        .map(|(rule, count)| BucketReport {
            rule: *rule,
            count,
            evicted: 0,
        })
        .collect::<Vec<_>>();

    let selected = select_evictions(&timestamps, rules, now);
    for pos in &selected {
        if let Some(bucket) = rules.bucket_of(now.saturating_sub(timestamps[*pos])) {
            buckets[bucket].evicted += 1;
        }
    }

    PrunePlan {
        buckets,
        deletions: selected.into_iter().map(|pos| snapshots[pos].clone()).collect(),
        beyond_last_window,
    }
}
