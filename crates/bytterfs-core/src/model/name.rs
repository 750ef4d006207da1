use crate::errors::{BackupError, Result};

/// Separator between label and timestamp in `<label>_<timestamp>`
pub const NAME_SEPARATOR: char = '_';

/// Parsed `<label>_<unixTimestamp>` snapshot name
///
/// The label itself may contain underscores; the timestamp is everything
/// after the last separator and must be a non-negative decimal integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotName {
    pub label: String,
    pub timestamp: i64,
}

impl SnapshotName {
    pub fn new(label: impl Into<String>, timestamp: i64) -> Self {
        Self {
            label: label.into(),
            timestamp,
        }
    }

    /// Parse a snapshot basename
    ///
    /// # Errors
    /// Returns `BackupError::InvalidSnapshotName` when the separator is missing,
    /// the label is empty, or the suffix is not a non-negative integer.
    pub fn parse(name: &str) -> Result<Self> {
        let invalid = |reason: &str| BackupError::InvalidSnapshotName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let (label, suffix) = name
            .rsplit_once(NAME_SEPARATOR)
            .ok_or_else(|| invalid("missing '_' separator"))?;

        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("timestamp suffix is not a non-negative integer"));
        }

        let timestamp = suffix
            .parse::<i64>()
            .map_err(|_| invalid("timestamp suffix out of range"))?;

        Ok(Self::new(label, timestamp))
    }

    /// Whether `name` belongs to `label` (starts with `<label>_`)
    ///
    /// Used to tell rows of this backup apart from unrelated subvolumes before
    /// any parsing is attempted.
    pub fn has_label_prefix(name: &str, label: &str) -> bool {
        name.strip_prefix(label)
            .map(|rest| rest.starts_with(NAME_SEPARATOR))
            .unwrap_or(false)
    }
}

impl std::fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.label, NAME_SEPARATOR, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let name = SnapshotName::parse("rootfs_1418415962").unwrap();
        assert_eq!(name.label, "rootfs");
        assert_eq!(name.timestamp, 1418415962);
    }

    #[test]
    fn test_parse_label_with_underscore() {
        let name = SnapshotName::parse("home_daily_42").unwrap();
        assert_eq!(name.label, "home_daily");
        assert_eq!(name.timestamp, 42);
    }

    #[test]
    fn test_display_matches_on_disk_form() {
        assert_eq!(SnapshotName::new("rootfs", 7).to_string(), "rootfs_7");
    }

    #[test]
    fn test_missing_separator_is_naming_error() {
        let err = SnapshotName::parse("rootfs1418415962").unwrap_err();
        assert!(matches!(err, BackupError::InvalidSnapshotName { .. }));
    }

    #[test]
    fn test_non_numeric_suffix_is_naming_error() {
        for bad in ["rootfs_abc", "rootfs_", "rootfs_-5", "rootfs_12a", "_100"] {
            assert!(
                SnapshotName::parse(bad).is_err(),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_overflowing_suffix_is_naming_error() {
        assert!(SnapshotName::parse("rootfs_99999999999999999999999").is_err());
    }

    #[test]
    fn test_label_prefix() {
        assert!(SnapshotName::has_label_prefix("root_100", "root"));
        assert!(!SnapshotName::has_label_prefix("rootfs_100", "root"));
        assert!(!SnapshotName::has_label_prefix("root", "root"));
        assert!(!SnapshotName::has_label_prefix("home_100", "root"));
    }
}
