//! Parser for `btrfs subvolume list` output
//!
//! A row looks like
//!
//! ```text
//! ID 258 gen 12 top level 5 received_uuid 0b9f... uuid 4c1e... path snaps/rootfs_1700000000
//! ```
//!
//! Columns before `path` are whitespace separated key/value pairs (`top level`
//! is two words). The path is everything after `path ` and may contain
//! spaces.

use bytterfs_core::inventory::SubvolumeRow;

/// Identity column on the source: the subvolume's own uuid
pub const SOURCE_IDENTITY: &str = "uuid";
/// Identity column on the destination: the uuid it was received from
pub const DEST_IDENTITY: &str = "received_uuid";

const PATH_KEY: &str = "path ";

/// Parse listing output, reading identities from the `identity_key` column
///
/// Lines without a path column are skipped with a warning; `-` identities
/// (never received, or not reported) become `None`.
pub fn parse_subvolume_list(output: &str, identity_key: &str) -> Vec<SubvolumeRow> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let row = parse_row(line, identity_key);
            if row.is_none() {
                tracing::warn!(line, "skipping unrecognized subvolume list row");
            }
            row
        })
        .collect()
}

fn parse_row(line: &str, identity_key: &str) -> Option<SubvolumeRow> {
    let (columns, path) = split_path(line)?;
    if path.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = columns.split_whitespace().collect();
    let identity = tokens
        .windows(2)
        .find(|pair| pair[0] == identity_key)
        .map(|pair| pair[1])
        .filter(|value| *value != "-")
        .map(str::to_string);

    Some(SubvolumeRow::new(path, identity))
}

/// Split at the first `path ` column that starts a token
fn split_path(line: &str) -> Option<(&str, &str)> {
    if let Some(path) = line.strip_prefix(PATH_KEY) {
        return Some(("", path));
    }
    line.match_indices(PATH_KEY)
        .find(|(idx, _)| line[..*idx].ends_with(' '))
        .map(|(idx, _)| (&line[..idx], &line[idx + PATH_KEY.len()..]))
}
