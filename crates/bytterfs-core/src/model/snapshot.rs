use super::name::SnapshotName;

/// Which end of the replication pair a snapshot lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Source,
    Destination,
}

impl Location {
    pub fn as_str(&self) -> &'static str {
        match self {
            Location::Source => "source",
            Location::Destination => "destination",
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A read-only snapshot observed at one location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Basename on disk, `<label>_<timestamp>`
    pub name: String,

    /// Unix seconds parsed from the name
    pub timestamp: i64,

    /// Opaque identity assigned at creation time.
    ///
    /// On the source this is the subvolume UUID; on the destination it is the
    /// received UUID, i.e. the UUID of the source snapshot it was sent from.
    /// `None` when the row carries no identity (e.g. a receive that never
    /// completed).
    pub identity: Option<String>,

    pub location: Location,
}

impl Snapshot {
    pub fn new(name: &SnapshotName, identity: Option<String>, location: Location) -> Self {
        Self {
            name: name.to_string(),
            timestamp: name.timestamp,
            identity,
            location,
        }
    }

    /// Two-tier membership test between snapshots on opposite ends
    ///
    /// Identity wins when both sides carry one; otherwise the parsed
    /// timestamps are compared.
    pub fn same_content_as(&self, other: &Snapshot) -> bool {
        match (&self.identity, &other.identity) {
            (Some(a), Some(b)) => a == b,
            _ => self.timestamp == other.timestamp,
        }
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(ts: i64, identity: Option<&str>, location: Location) -> Snapshot {
        Snapshot::new(
            &SnapshotName::new("rootfs", ts),
            identity.map(str::to_string),
            location,
        )
    }

    #[test]
    fn test_identity_match_wins_over_timestamp() {
        let src = snap(100, Some("uuid-a"), Location::Source);
        let same_id_other_ts = snap(200, Some("uuid-a"), Location::Destination);
        let other_id_same_ts = snap(100, Some("uuid-b"), Location::Destination);

        assert!(src.same_content_as(&same_id_other_ts));
        assert!(!src.same_content_as(&other_id_same_ts));
    }

    #[test]
    fn test_timestamp_fallback_without_identity() {
        let src = snap(100, Some("uuid-a"), Location::Source);
        let dest = snap(100, None, Location::Destination);
        assert!(src.same_content_as(&dest));
        assert!(!src.same_content_as(&snap(101, None, Location::Destination)));
    }

    #[test]
    fn test_new_copies_parsed_fields() {
        let s = snap(42, None, Location::Source);
        assert_eq!(s.name, "rootfs_42");
        assert_eq!(s.timestamp, 42);
        assert_eq!(s.to_string(), "rootfs_42@source");
    }
}
