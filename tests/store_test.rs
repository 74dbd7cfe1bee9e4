//! Integration tests for the content tree store: mutations, error capture,
//! observers and save coordination.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rstest::rstest;

use content_tree::application::SaveError;
use content_tree::domain::{NodeDto, MAX_DEPTH, MAX_PROPS_NESTING};
use content_tree::util::testing;
use content_tree::{ContentNodeValue, ContentTreeStore, Snapshot, StoreOptions};

fn store() -> ContentTreeStore {
    testing::init_test_setup();
    ContentTreeStore::create(None, StoreOptions::default())
}

fn root_key(store: &ContentTreeStore) -> String {
    store.get().data.key
}

fn child_keys(store: &ContentTreeStore, key: &str) -> Vec<String> {
    let snapshot = store.get();
    snapshot
        .data
        .find(key)
        .map(|node| node.children.iter().map(|c| c.key.clone()).collect())
        .unwrap_or_default()
}

fn value_of(store: &ContentTreeStore, key: &str) -> Option<ContentNodeValue> {
    store.get().data.find(key).map(|node| node.value.clone())
}

/// Store whose hook records every dump it receives.
fn recording_store() -> (ContentTreeStore, Arc<Mutex<Vec<String>>>) {
    testing::init_test_setup();
    let dumps = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&dumps);
    let store = ContentTreeStore::create(
        None,
        StoreOptions::default().with_save(move |dump: String| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(dump);
                Ok::<(), SaveError>(())
            }
        }),
    );
    (store, dumps)
}

fn record_snapshots(store: &ContentTreeStore) -> Arc<Mutex<Vec<Snapshot>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store.subscribe(move |snapshot| sink.lock().push(snapshot.clone()));
    seen
}

// ============================================================
// Scenarios
// ============================================================

#[tokio::test]
async fn given_empty_store_when_adding_first_node_then_size_two_with_synthesized_label() {
    let (store, dumps) = recording_store();

    let key = store.add(None, None).unwrap();

    let snapshot = store.get();
    assert_eq!(snapshot.size, 2);
    assert_eq!(snapshot.error, "");
    assert!(snapshot.is_saving);
    let value = value_of(&store, &key).unwrap();
    assert_eq!(value.node_type, "default");
    assert_eq!(value.label.as_deref(), Some("default #1"));
    assert_eq!(value.allow_inner_blocks, Some(true));

    store.settled().await;
    assert!(!store.get().is_saving);
    assert_eq!(dumps.lock().len(), 1);
}

#[tokio::test]
async fn given_two_nodes_when_duplicating_then_copy_has_fresh_key_and_same_content() {
    let (store, _) = recording_store();
    let first = store
        .add(None, Some(ContentNodeValue::new("hero").with_prop("title", "Hi")))
        .unwrap();
    let second = store.add(None, None).unwrap();

    let copy = store.duplicate(&first).unwrap();

    let snapshot = store.get();
    assert_eq!(snapshot.size, 4);
    assert_ne!(copy, first);
    let original = value_of(&store, &first).unwrap();
    let copied = value_of(&store, &copy).unwrap();
    assert_eq!(copied.node_type, original.node_type);
    assert_eq!(copied.props, original.props);
    // Placed right after the source
    assert_eq!(child_keys(&store, &root_key(&store)), [first, copy, second]);
    store.settled().await;
}

#[test]
fn given_malformed_json_when_editing_then_error_set_and_tree_unchanged() {
    let store = store();
    let key = store.add(None, None).unwrap();
    let before = store.get();

    store.edit(&key, "{not json");

    let after = store.get();
    assert!(after.error.starts_with("invalid node value"));
    assert_eq!(after.data, before.data);
    assert_eq!(after.version, before.version);
}

#[tokio::test]
async fn given_rejecting_save_when_adding_then_saving_flag_clears_and_error_is_kept() {
    testing::init_test_setup();
    let store = ContentTreeStore::create(
        None,
        StoreOptions::default().with_save(|_dump: String| async {
            tokio::task::yield_now().await;
            Err::<(), SaveError>("disk full".into())
        }),
    );
    let seen = record_snapshots(&store);

    let key = store.add(None, None).unwrap();
    assert!(store.get().is_saving);
    store.settled().await;

    let snapshot = store.get();
    assert!(!snapshot.is_saving);
    assert_eq!(snapshot.error, "save failed: disk full");
    assert!(snapshot.data.find(&key).is_some());

    let flags: Vec<bool> = seen.lock().iter().map(|s| s.is_saving).collect();
    assert_eq!(flags, [false, true, false]);
}

// ============================================================
// Structural properties
// ============================================================

#[test]
fn given_adds_and_duplicates_when_listing_keys_then_all_unique() {
    let store = store();
    let a = store.add(None, None).unwrap();
    let b = store.add(Some(&a), None).unwrap();
    store.add(Some(&b), None);
    for _ in 0..5 {
        store.duplicate(&a);
        store.duplicate(&b);
    }

    let snapshot = store.get();
    let mut keys = snapshot.data.keys();
    let total = keys.len();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), total);
    assert_eq!(total, snapshot.size);
}

#[test]
fn given_removed_node_when_removing_again_then_no_op() {
    let store = store();
    let key = store.add(None, None).unwrap();
    store.remove(&key);
    let once = store.get();

    store.remove(&key);

    let twice = store.get();
    assert_eq!(once, twice);
    assert_eq!(twice.size, 1);
    assert!(!twice.has_error());
}

#[test]
fn given_root_when_removing_then_rejected() {
    let store = store();
    store.remove(&root_key(&store));
    let snapshot = store.get();
    assert_eq!(snapshot.size, 1);
    assert_eq!(snapshot.error, "cannot remove the root node");
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(2)]
#[case(100)]
fn given_same_source_and_target_when_moving_then_only_reorders(#[case] index: usize) {
    let store = store();
    let a = store.add(None, None).unwrap();
    let b = store.add(None, None).unwrap();
    let c = store.add(None, None).unwrap();
    let nested = store.add(Some(&b), None).unwrap();

    store.move_node(&b, &b, index);

    let root = root_key(&store);
    let order = child_keys(&store, &root);
    assert_eq!(order.len(), 3);
    assert_eq!(order[index.min(2)], b);
    assert!(order.contains(&a) && order.contains(&c));
    assert_eq!(child_keys(&store, &b), [nested]);
    assert!(!store.get().has_error());
}

#[test]
fn given_node_when_moving_into_descendant_then_rejected_and_unchanged() {
    let store = store();
    let a = store.add(None, None).unwrap();
    let child = store.add(Some(&a), None).unwrap();
    let before = store.get();

    store.move_node(&a, &child, 0);

    let after = store.get();
    assert!(after.error.contains("own subtree"));
    assert_eq!(after.data, before.data);
    assert_eq!(after.version, before.version);
}

#[test]
fn given_other_parent_when_moving_then_reparents_at_index() {
    let store = store();
    let a = store.add(None, None).unwrap();
    let b = store.add(None, None).unwrap();
    let b1 = store.add(Some(&b), None).unwrap();

    store.move_node(&a, &b, 0);

    assert_eq!(child_keys(&store, &b), [a, b1]);
    assert_eq!(child_keys(&store, &root_key(&store)), [b]);
}

#[rstest]
#[case::source("missing", true, "source node \"missing\" not found")]
#[case::target("missing", false, "target node \"missing\" not found")]
fn given_unknown_key_when_moving_then_not_found(
    #[case] missing: &str,
    #[case] as_source: bool,
    #[case] expected: &str,
) {
    let store = store();
    let a = store.add(None, None).unwrap();
    if as_source {
        store.move_node(missing, &a, 0);
    } else {
        store.move_node(&a, missing, 0);
    }
    assert_eq!(store.get().error, expected);
}

#[test]
fn given_unknown_parent_when_adding_then_none_and_error() {
    let store = store();
    assert!(store.add(Some("nope"), None).is_none());
    let snapshot = store.get();
    assert_eq!(snapshot.size, 1);
    assert_eq!(snapshot.error, "parent node \"nope\" not found");
}

#[test]
fn given_root_when_duplicating_then_rejected() {
    let store = store();
    assert!(store.duplicate(&root_key(&store)).is_none());
    assert_eq!(store.get().size, 1);
    assert!(store.get().has_error());
}

// ============================================================
// Edit
// ============================================================

#[rstest]
#[case::empty("")]
#[case::blank("   ")]
#[case::null("null")]
fn given_empty_payload_when_editing_then_silently_ignored(#[case] payload: &str) {
    let store = store();
    let key = store.add(None, None).unwrap();
    let before = store.get();

    store.edit(&key, payload);

    assert_eq!(store.get(), before);
}

#[test]
fn given_json_value_when_editing_then_replaced_wholesale() {
    let store = store();
    let key = store
        .add(None, Some(ContentNodeValue::new("hero").with_label("Top").with_html("<h1/>")))
        .unwrap();

    store.edit(&key, r#"{"type":"text","props":{"size":3}}"#);

    let value = value_of(&store, &key).unwrap();
    assert_eq!(value, ContentNodeValue::new("text").with_prop("size", 3));
    assert_eq!(store.get().version, 2);
}

#[test]
fn given_root_when_editing_then_rejected() {
    let store = store();
    store.edit(&root_key(&store), ContentNodeValue::new("hijack"));
    let snapshot = store.get();
    assert_eq!(snapshot.data.value.node_type, "root");
    assert!(snapshot.has_error());
}

#[test]
fn given_unknown_key_when_editing_then_not_found() {
    let store = store();
    store.edit("ghost", ContentNodeValue::new("text"));
    assert_eq!(store.get().error, "target node \"ghost\" not found");
}

// ============================================================
// Labels
// ============================================================

#[test]
fn given_removed_node_when_adding_then_label_number_not_reused() {
    let store = store();
    store.add(None, None);
    let second = store.add(None, None).unwrap();
    store.remove(&second);

    let third = store.add(None, None).unwrap();

    assert_eq!(value_of(&store, &third).unwrap().label.as_deref(), Some("default #3"));
}

#[test]
fn given_explicit_label_when_adding_then_kept() {
    let store = store();
    let key = store
        .add(None, Some(ContentNodeValue::new("text").with_label("Intro")))
        .unwrap();
    assert_eq!(value_of(&store, &key).unwrap().label.as_deref(), Some("Intro"));

    let blank = store
        .add(None, Some(ContentNodeValue::new("text").with_label("  ")))
        .unwrap();
    assert_eq!(value_of(&store, &blank).unwrap().label.as_deref(), Some("text #2"));
}

#[test]
fn given_configured_default_when_adding_without_value_then_used() {
    testing::init_test_setup();
    let store = ContentTreeStore::create(
        None,
        StoreOptions::default().with_default_node_value(ContentNodeValue::new("section")),
    );
    let key = store.add(None, None).unwrap();
    let value = value_of(&store, &key).unwrap();
    assert_eq!(value.node_type, "section");
    assert_eq!(value.label.as_deref(), Some("section #1"));
}

// ============================================================
// Dump and restore
// ============================================================

#[test]
fn given_store_when_dumping_and_hydrating_then_identical_tree() {
    let store = store();
    let a = store.add(None, Some(ContentNodeValue::new("hero").with_html("<b/>"))).unwrap();
    store.add(Some(&a), None);
    store.add(None, None);
    let dump = serde_json::to_string(&store.get().data).unwrap();

    let hydrated = ContentTreeStore::create(Some(&dump), StoreOptions::default());

    let snapshot = hydrated.get();
    assert_eq!(snapshot.data, store.get().data);
    assert_eq!(snapshot.version, 0);
    assert!(!snapshot.has_error());

    // Numbering continues after the hydrated nodes
    let next = hydrated.add(None, None).unwrap();
    assert_eq!(value_of(&hydrated, &next).unwrap().label.as_deref(), Some("default #4"));
}

#[test]
fn given_malformed_initial_dump_when_creating_then_root_only_with_error() {
    testing::init_test_setup();
    let store = ContentTreeStore::create(Some("[1, 2"), StoreOptions::default());
    let snapshot = store.get();
    assert_eq!(snapshot.size, 1);
    assert!(snapshot.error.starts_with("invalid tree dump"));
}

#[test]
fn given_dump_when_restoring_then_replaces_tree_and_bumps_version() {
    let source = store();
    let kept = source.add(None, None).unwrap();
    let dump = serde_json::to_string(&source.get().data).unwrap();

    let store = store();
    store.add(None, None);
    store.add(None, None);
    store.restore(&dump);

    let snapshot = store.get();
    assert_eq!(snapshot.data, source.get().data);
    assert!(snapshot.data.find(&kept).is_some());
    assert_eq!(snapshot.version, 3);
}

#[rstest]
#[case::garbage("not a tree")]
#[case::duplicate_keys(r#"{"key":"r","value":{"type":"root"},"children":[{"key":"r","value":{"type":"x"}}]}"#)]
fn given_bad_dump_when_restoring_then_tree_untouched(#[case] dump: &str) {
    let store = store();
    store.add(None, None);
    let before = store.get();

    store.restore(dump);

    let after = store.get();
    assert!(after.has_error());
    assert_eq!(after.data, before.data);
    assert_eq!(after.version, before.version);
}

#[test]
fn given_nesting_past_depth_limit_when_dumping_then_store_still_restores() {
    let store = store();
    let mut parent = root_key(&store);
    for _ in 0..70 {
        match store.add(Some(&parent), None) {
            Some(key) => parent = key,
            None => break,
        }
    }
    let deep = store.get();
    assert_eq!(deep.size, MAX_DEPTH);
    assert!(deep.error.contains("maximum depth"));
    let dump = serde_json::to_string(&deep.data).unwrap();

    store.restore(&dump);
    let restored = store.get();
    assert!(!restored.has_error(), "{}", restored.error);
    assert_eq!(restored.data, deep.data);

    let hydrated = ContentTreeStore::create(Some(&dump), StoreOptions::default()).get();
    assert!(!hydrated.has_error(), "{}", hydrated.error);
    assert_eq!(hydrated.size, MAX_DEPTH);
}

#[test]
fn given_props_nested_past_limit_when_adding_or_editing_then_rejected() {
    let store = store();
    let key = store.add(None, None).unwrap();
    let mut deep = serde_json::json!(1);
    for _ in 0..MAX_PROPS_NESTING {
        deep = serde_json::json!([deep]);
    }
    let value = ContentNodeValue::new("text").with_prop("deep", deep);
    let before = store.get();

    assert!(store.add(None, Some(value.clone())).is_none());
    assert!(store.get().error.contains("props nest deeper"));
    store.edit(&key, value);

    let after = store.get();
    assert!(after.error.contains("props nest deeper"));
    assert_eq!(after.data, before.data);
}

// ============================================================
// Errors
// ============================================================

#[test]
fn given_error_when_next_mutation_succeeds_then_error_cleared() {
    let store = store();
    store.remove(&root_key(&store));
    assert!(store.get().has_error());

    store.add(None, None);

    assert!(!store.get().has_error());
}

#[test]
fn given_error_when_resetting_then_only_error_changes() {
    let store = store();
    store.edit("ghost", "{}");
    let before = store.get();

    store.reset_error();

    let after = store.get();
    assert!(!after.has_error());
    assert_eq!(after.data, before.data);
    assert_eq!(after.version, before.version);
    assert_eq!(after.revision, before.revision + 1);

    // Nothing to clear: no publication
    store.reset_error();
    assert_eq!(store.get().revision, after.revision);
}

#[test]
fn given_adversarial_inputs_when_calling_operations_then_never_panics() {
    let store = store();
    let root = root_key(&store);
    let weird = ["", " ", "\0", "🌳", "null", "{}", "[]", root.as_str(), "a\"b"];

    for key in weird {
        store.add(Some(key), None);
        store.remove(key);
        store.duplicate(key);
        store.edit(key, key);
        store.edit(key, "{\"type\":1}");
        store.move_node(key, &root, usize::MAX);
        store.move_node(&root, key, 0);
        store.restore(key);
    }

    let snapshot = store.get();
    assert!(snapshot.data.find(&root).is_some());
}

// ============================================================
// Observers
// ============================================================

#[test]
fn given_observer_when_subscribing_then_receives_current_and_later_snapshots() {
    let store = store();
    let seen = record_snapshots(&store);
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(store.observer_count(), 1);

    store.add(None, None);
    store.add(None, None);

    let seen = seen.lock();
    assert_eq!(seen.iter().map(|s| s.size).collect::<Vec<_>>(), [1, 2, 3]);
    let revisions: Vec<u64> = seen.iter().map(|s| s.revision).collect();
    assert!(revisions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn given_subscription_when_unsubscribed_then_no_more_calls() {
    let store = store();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let subscription = store.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    subscription.unsubscribe();
    store.add(None, None);

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.observer_count(), 0);
}

#[test]
fn given_observer_when_reading_store_in_callback_then_no_deadlock() {
    let store = store();
    let handle = store.clone();
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sizes);
    store.subscribe(move |_| sink.lock().push(handle.get().size));

    store.add(None, None);

    assert_eq!(*sizes.lock(), [1, 2]);
}

#[test]
fn given_noop_remove_when_observed_then_nothing_published() {
    let store = store();
    let seen = record_snapshots(&store);
    store.remove("absent");
    store.edit("absent", "");
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test]
async fn given_watch_receiver_when_mutating_then_holds_latest() {
    let store = store();
    let mut rx = store.watch();
    store.add(None, None);

    rx.changed().await.unwrap();
    assert_eq!(rx.borrow().size, 2);
}

#[test]
fn given_clones_on_threads_when_adding_then_all_applied() {
    let store = store();
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let store = store.clone();
            scope.spawn(move || {
                for _ in 0..25 {
                    store.add(None, None);
                }
            });
        }
    });
    let snapshot = store.get();
    assert_eq!(snapshot.size, 101);
    assert_eq!(snapshot.version, 100);
}

// ============================================================
// Save coordination
// ============================================================

#[tokio::test]
async fn given_hook_when_mutating_then_receives_dump_of_committed_tree() {
    let (store, dumps) = recording_store();
    let key = store.add(None, None).unwrap();
    store.settled().await;

    let dumps = dumps.lock();
    let saved: NodeDto<ContentNodeValue> = serde_json::from_str(&dumps[0]).unwrap();
    assert_eq!(saved, store.get().data);
    assert!(saved.find(&key).is_some());
}

#[tokio::test]
async fn given_explicit_save_when_called_then_version_bumped_and_hook_runs() {
    let (store, dumps) = recording_store();
    store.save();
    store.settled().await;
    assert_eq!(store.get().version, 1);
    assert_eq!(store.get().size, 1);
    assert_eq!(dumps.lock().len(), 1);
}

#[tokio::test]
async fn given_failed_operations_when_saving_then_hook_not_called() {
    let (store, dumps) = recording_store();
    store.remove("absent");
    store.edit("absent", "{}");
    store.remove(&root_key(&store));
    store.settled().await;
    assert!(dumps.lock().is_empty());
    assert_eq!(store.get().version, 0);
}

#[tokio::test]
async fn given_overlapping_saves_when_first_finishes_then_still_saving() {
    testing::init_test_setup();
    let delays = Arc::new(Mutex::new(vec![10u64, 40]));
    let store = ContentTreeStore::create(
        None,
        StoreOptions::default().with_save(move |_dump: String| {
            let delay = delays.lock().pop().unwrap_or(0);
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok::<(), SaveError>(())
            }
        }),
    );
    let seen = record_snapshots(&store);

    store.add(None, None);
    store.add(None, None);
    store.settled().await;

    let flags: Vec<bool> = seen.lock().iter().map(|s| s.is_saving).collect();
    // initial, two mutations, first completion still saving, last completion idle
    assert_eq!(flags, [false, true, true, true, false]);
}

#[tokio::test]
async fn given_panicking_hook_when_saving_then_error_captured() {
    testing::init_test_setup();
    let store = ContentTreeStore::create(
        None,
        StoreOptions::default().with_save(|dump: String| async move {
            if !dump.is_empty() {
                panic!("hook exploded");
            }
            Ok::<(), SaveError>(())
        }),
    );

    store.add(None, None);
    store.settled().await;

    let snapshot = store.get();
    assert!(!snapshot.is_saving);
    assert_eq!(snapshot.size, 2);
    assert_eq!(snapshot.error, "save failed: save hook panicked");
}

#[tokio::test]
async fn given_store_dropped_mid_save_when_save_finishes_then_nothing_breaks() {
    testing::init_test_setup();
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    let store = ContentTreeStore::create(
        None,
        StoreOptions::default().with_save(move |_dump: String| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), SaveError>(())
            }
        }),
    );

    store.add(None, None);
    drop(store);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(finished.load(Ordering::SeqCst), 1);
}
