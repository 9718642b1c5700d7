//! Navigation E2E tests.
//!
//! Pagination stability across rebuilds, sibling lookups and aggregation
//! over an index built by the engine.

use pretty_assertions::assert_eq;

use catalog_indexing::{RebuildMode, RebuildOptions};
use catalog_storage::ScanDirection;
use catalog_types::PrimaryRecord;
use e2e_tests::{base_time, make_record, touched, TestHarness};

#[tokio::test]
async fn test_pagination_is_stable_across_rebuilds() {
    let harness = TestHarness::new();
    let records = harness.seed(120);
    harness.changed_only().await;

    let first_page = harness
        .reader
        .page(None, 25, ScanDirection::Forward)
        .unwrap();

    for record in records.iter().step_by(7) {
        harness.primary.upsert(touched(record, 15));
    }
    harness.changed_only().await;
    harness
        .run(RebuildMode::ForceRebuildAll, RebuildOptions::default())
        .await
        .unwrap();

    let again = harness
        .reader
        .page(None, 25, ScanDirection::Forward)
        .unwrap();
    assert_eq!(again, first_page);

    let all = harness.all_ids();
    let mut expected: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
    expected.sort();
    assert_eq!(all, expected);
}

#[tokio::test]
async fn test_equal_sort_keys_break_ties_by_name_hash() {
    let harness = TestHarness::new();
    for (id, name) in [("z-1", "Gamma"), ("a-1", "Alpha"), ("m-1", "Beta")] {
        harness.add(PrimaryRecord::new(id, name, "shared", base_time()));
    }
    harness.changed_only().await;
    let order = harness.all_ids();

    harness
        .run(RebuildMode::Full, RebuildOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.all_ids(), order);
    assert_eq!(order.len(), 3);
}

#[tokio::test]
async fn test_cursor_walk_both_directions() {
    let harness = TestHarness::new();
    harness.seed(45);
    harness.changed_only().await;

    let forward = harness.reader.page(None, 20, ScanDirection::Forward).unwrap();
    let second = harness
        .reader
        .page(forward.next_cursor.as_deref(), 20, ScanDirection::Forward)
        .unwrap();
    assert!(second.prev_cursor.is_some());

    let back = harness
        .reader
        .page(second.prev_cursor.as_deref(), 20, ScanDirection::Backward)
        .unwrap();
    assert_eq!(back.ids, forward.ids);
    assert!(!back.has_more);
}

#[tokio::test]
async fn test_siblings_follow_navigation_order() {
    let harness = TestHarness::new();
    let records = harness.seed(5);
    harness.changed_only().await;

    let siblings = harness.reader.siblings(&records[2].id).unwrap().unwrap();
    assert_eq!(siblings.previous.as_deref(), Some(records[1].id.as_str()));
    assert_eq!(siblings.next.as_deref(), Some(records[3].id.as_str()));

    let last = harness.reader.siblings(&records[4].id).unwrap().unwrap();
    assert!(last.next.is_none());
    assert!(harness.reader.siblings("not-indexed").unwrap().is_none());
}

#[tokio::test]
async fn test_statistics_after_rebuild() {
    let harness = TestHarness::new();
    harness.seed(8);
    let mut bare = make_record(8);
    bare.previews.clear();
    harness.add(bare);
    harness.changed_only().await;

    let stats = harness.reader.statistics().unwrap();
    assert_eq!(stats.ordered_records, 9);
    assert_eq!(stats.indexed_records, 9);
    assert_eq!(stats.records_with_thumbnail, 8);
    assert_eq!(stats.cached_thumbnails, 8);
    assert_eq!(stats.thumbnail_bytes, 8 * 4_096);
    assert_eq!(stats.total_child_count, 9 * 12);
    assert_eq!(stats.total_cached_derivatives, 9 * 3);
    assert_eq!(stats.outdated_states, 0);
    assert!(stats.last_indexed_at.is_some());
}
