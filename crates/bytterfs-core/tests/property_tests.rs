use bytterfs_core::inventory::Inventory;
use bytterfs_core::model::{Location, Snapshot, SnapshotName};
use bytterfs_core::retention::{
    even_spread_indices, plan_prune, RetentionRule, RetentionRuleSet, SECONDS_PER_DAY,
};
use proptest::prelude::*;

proptest! {
    #[test]
    fn snapshot_name_round_trips(label in "[a-z][a-z0-9_-]{0,15}", ts in 0i64..=i64::MAX) {
        let name = SnapshotName::new(label.clone(), ts);
        let parsed = SnapshotName::parse(&name.to_string()).unwrap();
        prop_assert_eq!(parsed.label, label);
        prop_assert_eq!(parsed.timestamp, ts);
    }

    #[test]
    fn malformed_names_never_panic(name in "\\PC{0,24}") {
        let _ = SnapshotName::parse(&name);
    }

    #[test]
    fn non_numeric_suffix_is_rejected(label in "[a-z]{1,8}", suffix in "[0-9]{0,4}[a-z][0-9a-z]{0,4}") {
        let name = format!("{}_{}", label, suffix);
        prop_assert!(SnapshotName::parse(&name).is_err());
    }

    #[test]
    fn even_spread_selects_exactly_excess(count in 1usize..200, keep in 0usize..200) {
        prop_assume!(keep < count);
        let excess = count - keep;
        let indices = even_spread_indices(count, excess);
        prop_assert_eq!(indices.len(), excess);
        prop_assert!(indices.iter().all(|i| *i < count));
        prop_assert!(indices.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn pruning_is_idempotent(
        ages in prop::collection::vec(0i64..400, 0..60),
        keeps in prop::collection::vec(0usize..6, 1..4),
    ) {
        let now = 1_000 * SECONDS_PER_DAY;
        let rules = RetentionRuleSet::new(
            keeps
                .iter()
                .enumerate()
                .map(|(i, k)| RetentionRule::new((i as i64 + 1) * 60 * SECONDS_PER_DAY, *k))
                .collect(),
        )
        .unwrap();

        let snapshots: Vec<Snapshot> = ages
            .iter()
            .enumerate()
            .map(|(i, age)| {
                // distinct seconds keep names unique
                let ts = now - age * SECONDS_PER_DAY - i as i64;
                Snapshot::new(&SnapshotName::new("rootfs", ts), None, Location::Destination)
            })
            .collect();
        let inventory = Inventory::from_snapshots(Location::Destination, snapshots);

        let first = plan_prune(&inventory, &rules, now);
        for bucket in &first.buckets {
            prop_assert_eq!(bucket.count - bucket.evicted, bucket.count.min(bucket.rule.max_keep));
        }

        let survivors: Vec<Snapshot> = inventory
            .iter()
            .filter(|s| !first.deletions.contains(s))
            .cloned()
            .collect();
        let after = Inventory::from_snapshots(Location::Destination, survivors);
        prop_assert!(plan_prune(&after, &rules, now).is_empty());
    }
}
