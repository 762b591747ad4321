//! Property tests for the inventory model: serialization round-trips and
//! merge invariants over generated documents.

use std::collections::BTreeMap;

use muster::inventory::{ClusterEntry, HostRecord, InventoryDocument};
use muster::model::VcsField;
use muster_vcs::{ProbeReport, ReportedKind};
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,11}"
}

fn record() -> impl Strategy<Value = HostRecord> {
    (name(), name(), proptest::option::of("[a-zA-Z ]{1,16}")).prop_map(|(host, user, title)| {
        HostRecord {
            host,
            user,
            auth: None,
            vcs: None,
            extra: title
                .map(|t| {
                    BTreeMap::from([(
                        "title".to_owned(),
                        serde_json::Value::String(t),
                    )])
                })
                .unwrap_or_default(),
        }
    })
}

fn entry() -> impl Strategy<Value = ClusterEntry> {
    prop_oneof![
        record().prop_map(ClusterEntry::Single),
        proptest::collection::vec(record(), 1..4).prop_map(ClusterEntry::Many),
    ]
}

fn document() -> impl Strategy<Value = InventoryDocument> {
    proptest::collection::btree_map(name(), entry(), 0..4).prop_map(|hosts| InventoryDocument {
        hosts: Some(hosts),
        extra: BTreeMap::new(),
    })
}

fn some_field(rev: &str) -> VcsField {
    VcsField::Report(ProbeReport {
        kind: ReportedKind::Git,
        branch: "main".to_owned(),
        rev: rev.to_owned(),
    })
}

proptest! {
    #[test]
    fn serialization_round_trips(doc in document()) {
        let json = serde_json::to_string(&doc).unwrap();
        let back: InventoryDocument = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, doc);
    }

    #[test]
    fn merge_is_idempotent(doc in document(), rev in "[0-9a-f]{7}") {
        let units = doc.units();
        prop_assume!(!units.is_empty());

        let mut once = doc.clone();
        // Merge may legitimately fail for duplicate (host, user) pairs that
        // shadow each other; idempotence only concerns successful merges.
        prop_assume!(once.merge(&units[0], some_field(&rev)).is_ok());

        let mut twice = once.clone();
        twice.merge(&units[0], some_field(&rev)).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn merge_preserves_shape_and_membership(doc in document(), rev in "[0-9a-f]{7}") {
        let units = doc.units();
        prop_assume!(!units.is_empty());

        let mut merged = doc.clone();
        let _ = merged.merge(&units[0], some_field(&rev));

        let before = doc.hosts.as_ref().unwrap();
        let after = merged.hosts.as_ref().unwrap();
        prop_assert_eq!(before.len(), after.len());
        for (cluster, entry) in before {
            match (entry, &after[cluster]) {
                (ClusterEntry::Single(_), ClusterEntry::Single(_)) => {}
                (ClusterEntry::Many(b), ClusterEntry::Many(a)) => {
                    prop_assert_eq!(b.len(), a.len());
                    for (rb, ra) in b.iter().zip(a) {
                        prop_assert_eq!(&rb.host, &ra.host);
                        prop_assert_eq!(&rb.user, &ra.user);
                        prop_assert_eq!(&rb.extra, &ra.extra);
                    }
                }
                _ => prop_assert!(false, "cluster shape changed"),
            }
        }
    }

    #[test]
    fn merge_touches_at_most_one_record(doc in document(), rev in "[0-9a-f]{7}") {
        let units = doc.units();
        prop_assume!(!units.is_empty());

        let mut merged = doc.clone();
        let _ = merged.merge(&units[0], some_field(&rev));

        let mut changed = 0;
        let before = serde_json::to_value(&doc).unwrap();
        let after = serde_json::to_value(&merged).unwrap();
        for (cluster, entry) in before["hosts"].as_object().unwrap() {
            let after_entry = &after["hosts"][cluster.as_str()];
            if entry.is_array() {
                for (index, record) in entry.as_array().unwrap().iter().enumerate() {
                    if record != &after_entry[index] {
                        changed += 1;
                    }
                }
            } else if entry != after_entry {
                changed += 1;
            }
        }
        prop_assert!(changed <= 1);
    }
}
