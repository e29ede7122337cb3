//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the eviction policy and the store's upsert and
//! expiry behavior over generated inputs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;
use tempfile::TempDir;

use crate::cache::eviction;
use crate::cache::{CompactionPolicy, DeletePredicate, PutOptions, Record, RecordMeta, Store};

// == Strategies ==
/// Generates valid record keys
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,32}".prop_map(|s| s)
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Generates an eviction snapshot already sorted the way the store returns it
fn snapshot_strategy() -> impl Strategy<Value = Vec<RecordMeta>> {
    prop::collection::btree_map(valid_key_strategy(), (0u64..2_000, 0i64..50), 0..40).prop_map(
        |entries| {
            let mut metas: Vec<RecordMeta> = entries
                .into_iter()
                .map(|(key, (size, offset))| RecordMeta {
                    key,
                    size_bytes: size,
                    updated_at: Some(base_time() + Duration::seconds(offset)),
                })
                .collect();
            metas.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.key.cmp(&b.key)));
            metas
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // *For any* snapshot and budget, after a pass with infallible removal the
    // remaining bytes are within budget, or every record has been evicted.
    #[test]
    fn prop_budget_enforcement(snapshot in snapshot_strategy(), budget in 0u64..20_000) {
        let report = eviction::run(&snapshot, budget, |_| Ok(()));

        prop_assert!(
            report.within_budget(budget) || report.evicted.len() == snapshot.len(),
            "{} bytes remain over budget {} with records left",
            report.remaining_bytes,
            budget
        );
        let total: u64 = snapshot.iter().map(|m| m.size_bytes).sum();
        prop_assert_eq!(report.bytes_freed + report.remaining_bytes, total);
    }

    // *For any* snapshot, the evicted records are exactly a prefix of the
    // oldest-first ordering.
    #[test]
    fn prop_eviction_order_is_oldest_first(snapshot in snapshot_strategy(), budget in 0u64..20_000) {
        let evicted = eviction::plan(&snapshot, budget);
        let prefix: Vec<String> = snapshot
            .iter()
            .take(evicted.len())
            .map(|m| m.key.clone())
            .collect();

        prop_assert_eq!(evicted, prefix);
    }

    // *For any* snapshot, the pass removes no more than it must: undoing the
    // last eviction would put usage back over budget.
    #[test]
    fn prop_eviction_is_minimal(snapshot in snapshot_strategy(), budget in 0u64..20_000) {
        let report = eviction::run(&snapshot, budget, |_| Ok(()));

        if let Some(last) = report.evicted.last() {
            let size = snapshot.iter().find(|m| &m.key == last).unwrap().size_bytes;
            prop_assert!(report.remaining_bytes + size > budget);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    // *For any* sequence of upserts, the store holds one record per key whose
    // fields match the most recent write to that key.
    #[test]
    fn prop_upsert_uniqueness(
        writes in prop::collection::vec(
            (valid_key_strategy(), prop::collection::vec(any::<u8>(), 0..64), any::<bool>()),
            1..30
        )
    ) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("p.sqlite"), CompactionPolicy::default());
        let mut conn = store.connect().unwrap();
        let mut expected: BTreeMap<String, Record> = BTreeMap::new();

        for (i, (key, payload, auto_delete)) in writes.into_iter().enumerate() {
            let options = PutOptions::new().auto_delete(auto_delete);
            let record = Record::new(key.clone(), payload, options, base_time() + Duration::seconds(i as i64));
            conn.upsert(&record).unwrap();
            expected.insert(key, record);
        }

        prop_assert_eq!(conn.usage().unwrap().total_entries, expected.len() as u64);
        for (key, record) in &expected {
            let fetched = conn.get(key).unwrap();
            prop_assert_eq!(fetched.as_ref(), Some(record));
        }
    }

    // *For any* expiry offset, sweeping at `now` removes an auto-delete
    // record iff `now` is past its expiry, and never touches pinned records.
    #[test]
    fn prop_expiry_correctness(offset_secs in -1_000i64..1_000) {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("p.sqlite"), CompactionPolicy::default());
        let mut conn = store.connect().unwrap();
        let now = base_time();
        let expires = now + Duration::seconds(offset_secs);

        conn.upsert(&Record::new("auto", vec![1], PutOptions::new().expires_at(expires), now)).unwrap();
        conn.upsert(&Record::new(
            "pinned",
            vec![1],
            PutOptions::new().expires_at(expires).auto_delete(false),
            now,
        )).unwrap();

        conn.delete_where(&DeletePredicate::ExpiredBefore(now)).unwrap();

        prop_assert_eq!(conn.get("auto").unwrap().is_none(), now > expires);
        prop_assert!(conn.get("pinned").unwrap().is_some());
    }
}
