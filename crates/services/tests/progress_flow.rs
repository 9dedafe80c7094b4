use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use orbit_core::model::{Achievement, DependencyGraph, GroupId, ItemId, SettingsPatch, Theme};
use orbit_core::time::{fixed_clock, fixed_now};
use services::{
    EventFilter, EventKind, ImportValidationError, ProgressConfig, ProgressEvent, ProgressStore,
    STORAGE_KEY,
};
use storage::repository::{InMemoryStore, KeyValueStore, StorageError};

const CHAIN: &str = r#"{
    "basics": {"prerequisites": [], "itemCount": 2},
    "dom": {"prerequisites": ["basics"], "itemCount": 2},
    "events": {"prerequisites": ["dom"], "itemCount": 1}
}"#;

fn gid(raw: &str) -> GroupId {
    GroupId::new(raw).unwrap()
}

fn iid(raw: &str) -> ItemId {
    ItemId::new(raw).unwrap()
}

fn store_over(graph: &str, kv: Arc<dyn KeyValueStore>) -> ProgressStore {
    let graph = Arc::new(DependencyGraph::from_json_str(graph).unwrap());
    let config = ProgressConfig::for_graph(&graph);
    ProgressStore::new(graph, config, fixed_clock(), kv)
}

fn chain_store() -> (ProgressStore, Arc<InMemoryStore>) {
    let kv = Arc::new(InMemoryStore::new());
    (store_over(CHAIN, kv.clone()), kv)
}

fn record_events(store: &ProgressStore) -> Arc<Mutex<Vec<ProgressEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = store.add_listener(move |event, _| sink.lock().unwrap().push(event.clone()));
    seen
}

fn achievement_ids(achievements: &[Achievement]) -> Vec<&str> {
    achievements.iter().map(|a| a.id.as_str()).collect()
}

/// Backend whose every call fails.
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Connection("offline".into()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Connection("offline".into()))
    }
}

#[tokio::test]
async fn first_completion_unlocks_dependents_in_order() {
    let (store, _kv) = chain_store();
    let seen = record_events(&store);

    assert!(store.complete_item(iid("basics-1")).await);

    assert!(store.is_item_completed("basics-1").await);
    assert!(store.is_group_unlocked("dom").await);
    assert!(!store.is_group_unlocked("events").await);

    let user = store.get_user().await;
    assert_eq!(user.total_xp, 150);
    assert_eq!(user.level, 1);

    let stats = store.get_stats().await;
    assert_eq!(stats.items_completed, 1);
    assert_eq!(stats.groups_explored, 1);
    assert_eq!(stats.last_active_at, Some(fixed_now()));

    let names: Vec<&str> = seen.lock().unwrap().iter().map(ProgressEvent::name).collect();
    assert_eq!(
        names,
        vec![
            "xpGained",
            "xpGained",
            "achievementEarned",
            "groupUnlocked",
            "achievementEarned",
            "itemCompleted",
        ]
    );
    let events = seen.lock().unwrap();
    assert_eq!(events[3], ProgressEvent::GroupUnlocked(gid("dom")));
    assert_eq!(events[5], ProgressEvent::ItemCompleted(iid("basics-1")));

    let achievements = store.get_achievements().await;
    assert_eq!(achievement_ids(&achievements), vec!["group-dom", "first-steps"]);
}

#[tokio::test]
async fn completing_twice_changes_nothing() {
    let (store, _kv) = chain_store();
    store.complete_item(iid("basics-1")).await;
    let before = store.snapshot().await;
    let seen = record_events(&store);

    assert!(!store.complete_item(iid("basics-1")).await);
    assert!(!store.unlock_group(&gid("dom")).await);

    assert_eq!(store.snapshot().await, before);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unlocks_follow_the_dependency_chain() {
    let (store, _kv) = chain_store();

    store.complete_item(iid("basics-1")).await;
    store.complete_item(iid("basics-2")).await;
    assert!(!store.is_group_unlocked("events").await);

    store.complete_item(iid("dom-1")).await;
    assert!(store.is_group_unlocked("events").await);

    let achievements = store.get_achievements().await;
    assert!(achievement_ids(&achievements).contains(&"galaxy-explorer"));
    let progress = store.get_progress().await;
    assert!((progress.overall_progress_percent - 60.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn crossing_a_level_boundary_fires_once() {
    let (store, _kv) = chain_store();
    store.add_xp(999).await;
    let seen = record_events(&store);

    store.add_xp(1).await;
    store.add_xp(1).await;

    let events = seen.lock().unwrap();
    let level_ups: Vec<_> = events
        .iter()
        .filter(|e| e.kind() == EventKind::LevelUp)
        .collect();
    assert_eq!(level_ups, vec![&ProgressEvent::LevelUp { previous: 1, level: 2 }]);

    let achievements = store.get_achievements().await;
    let level_two = achievements.iter().filter(|a| a.id == "level-2").count();
    assert_eq!(level_two, 1);
    assert_eq!(store.get_user().await.level, 2);
}

#[tokio::test]
async fn direct_unlock_awards_explorer_xp() {
    let (store, _kv) = chain_store();
    let seen = record_events(&store);

    assert!(store.unlock_group(&gid("events")).await);
    assert_eq!(store.get_user().await.total_xp, 50);
    assert_eq!(
        seen.lock().unwrap().last(),
        Some(&ProgressEvent::GroupUnlocked(gid("events")))
    );
}

#[tokio::test]
async fn ten_completions_earn_dedicated_learner() {
    let graph = r#"{"basics": {"prerequisites": [], "itemCount": 12}}"#;
    let store = store_over(graph, Arc::new(InMemoryStore::new()));

    for n in 1..=9 {
        store.complete_item(iid(&format!("basics-{n}"))).await;
    }
    assert!(!achievement_ids(&store.get_achievements().await).contains(&"dedicated-learner"));

    store.complete_item(iid("basics-10")).await;
    assert!(achievement_ids(&store.get_achievements().await).contains(&"dedicated-learner"));
}

#[tokio::test]
async fn reset_restores_seed_defaults() {
    let (store, _kv) = chain_store();
    store
        .update_settings(SettingsPatch {
            theme: Some(Theme::Light),
            ..SettingsPatch::default()
        })
        .await;
    store.complete_item(iid("basics-1")).await;
    store.add_xp(2000).await;
    store.record_quiz_result(&gid("basics"), 80).await.unwrap();
    let seen = record_events(&store);

    store.reset_progress().await;

    let progress = store.get_progress().await;
    assert_eq!(progress.unlocked_groups.len(), 1);
    assert!(progress.is_unlocked("basics"));
    assert!(progress.completed_items.is_empty());
    assert_eq!(store.get_user().await.level, 1);
    assert_eq!(store.get_user().await.total_xp, 0);
    assert!(store.get_achievements().await.is_empty());
    assert_eq!(store.get_stats().await.quizzes_taken, 0);
    assert!(store.get_quiz_records().await.get("basics").is_none());
    assert_eq!(store.get_settings().await.theme, Theme::Light);
    assert_eq!(*seen.lock().unwrap(), vec![ProgressEvent::ProgressReset]);
}

#[tokio::test]
async fn saved_progress_survives_a_restart() {
    let (store, kv) = chain_store();
    store.complete_item(iid("basics-1")).await;
    store.set_current_group(Some(gid("dom"))).await;
    let before = store.snapshot().await;

    let restarted = store_over(CHAIN, kv);
    assert!(restarted.load().await);
    assert_eq!(restarted.snapshot().await, before);
}

#[tokio::test]
async fn load_merges_partial_documents_and_restores_invariants() {
    let kv = Arc::new(InMemoryStore::new());
    kv.set(
        STORAGE_KEY,
        r#"{"user": {"totalXp": 2500, "level": 1}, "progress": {"unlockedGroups": ["dom"]}}"#,
    )
    .await
    .unwrap();

    let store = store_over(CHAIN, kv);
    assert!(store.load().await);

    let user = store.get_user().await;
    assert_eq!(user.level, 3);
    assert!(store.is_group_unlocked("basics").await);
    assert!(store.is_group_unlocked("dom").await);
    assert!(store.get_settings().await.sound_enabled);
}

#[tokio::test]
async fn unreadable_saved_document_keeps_defaults() {
    let kv = Arc::new(InMemoryStore::new());
    kv.set(STORAGE_KEY, "{not json").await.unwrap();
    let store = store_over(CHAIN, kv);

    assert!(!store.load().await);
    assert_eq!(store.get_user().await.total_xp, 0);
    assert!(store.is_group_unlocked("basics").await);
}

#[tokio::test]
async fn storage_failures_do_not_block_mutations() {
    let store = store_over(CHAIN, Arc::new(BrokenStore));
    assert!(!store.load().await);

    assert!(store.complete_item(iid("basics-1")).await);
    store.save().await;
    assert!(store.is_group_unlocked("dom").await);
}

#[tokio::test]
async fn invalid_import_changes_nothing() {
    let (store, _kv) = chain_store();
    store.complete_item(iid("basics-1")).await;
    let before = store.snapshot().await;
    let seen = record_events(&store);

    assert_eq!(
        store.import_document(r#"{"user": {}, "progress": {}}"#).await,
        Err(ImportValidationError::MissingKey("stats"))
    );
    assert!(matches!(
        store.import_document("[]").await,
        Err(ImportValidationError::NotAnObject)
    ));
    assert!(matches!(
        store.import_document("nope").await,
        Err(ImportValidationError::Malformed(_))
    ));
    assert!(matches!(
        store
            .import_document(r#"{"user": {"totalXp": -4}, "progress": {}, "stats": {}}"#)
            .await,
        Err(ImportValidationError::Decode(_))
    ));

    assert_eq!(store.snapshot().await, before);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn import_rejects_blank_ids() {
    let (store, _kv) = chain_store();
    store.complete_item(iid("basics-1")).await;
    let before = store.snapshot().await;

    let blank_item = r#"{"user": {}, "progress": {"completedItems": ["basics-1", "  "]}, "stats": {}}"#;
    let blank_group = r#"{"user": {}, "progress": {"unlockedGroups": ["basics", ""]}, "stats": {}}"#;
    let blank_current = r#"{"user": {}, "progress": {"currentGroup": " "}, "stats": {}}"#;
    for raw in [blank_item, blank_group, blank_current] {
        assert!(matches!(
            store.import_document(raw).await,
            Err(ImportValidationError::Decode(_))
        ));
    }

    assert_eq!(store.snapshot().await, before);
}

#[tokio::test]
async fn stray_items_do_not_raise_overall_progress() {
    let (store, _kv) = chain_store();
    store.complete_item(iid("basics-99")).await;
    let after_stray = store.get_progress().await.overall_progress_percent;
    assert!((after_stray - 20.0).abs() < f64::EPSILON);

    store.complete_item(iid("ghost-1")).await;
    store.complete_item(iid("basics-100")).await;
    let progress = store.get_progress().await;
    assert_eq!(progress.completed_items.len(), 3);
    assert!((progress.overall_progress_percent - 40.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn export_then_import_restores_state() {
    let (source, _kv) = chain_store();
    source.complete_item(iid("basics-1")).await;
    source.record_quiz_result(&gid("basics"), 100).await.unwrap();
    let exported = serde_json::to_string(&source.export_document().await).unwrap();

    let (target, kv) = chain_store();
    let seen = record_events(&target);
    target.import_document(&exported).await.unwrap();

    assert_eq!(target.snapshot().await, source.snapshot().await);
    assert_eq!(*seen.lock().unwrap(), vec![ProgressEvent::DataImported]);
    assert!(kv.get(STORAGE_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn filtered_listeners_and_unsubscribe() {
    let (store, _kv) = chain_store();
    let unlocked = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&unlocked);
    let subscription = store.subscribe(
        EventFilter::only([EventKind::GroupUnlocked]),
        move |event, snapshot| {
            if let ProgressEvent::GroupUnlocked(group) = event {
                assert!(snapshot.progress.is_unlocked(group.as_str()));
                sink.lock().unwrap().push(group.clone());
            }
        },
    );

    store.complete_item(iid("basics-1")).await;
    assert_eq!(*unlocked.lock().unwrap(), vec![gid("dom")]);

    assert!(subscription.unsubscribe());
    store.complete_item(iid("dom-1")).await;
    assert_eq!(unlocked.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn listeners_receive_the_final_snapshot() {
    let (store, _kv) = chain_store();
    let totals = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&totals);
    let _ = store.add_listener(move |_, snapshot| {
        sink.lock().unwrap().push(snapshot.user.total_xp);
    });

    store.complete_item(iid("basics-1")).await;

    let totals = totals.lock().unwrap();
    assert!(!totals.is_empty());
    assert!(totals.iter().all(|xp| *xp == 150));
}

#[tokio::test]
async fn a_panicking_listener_does_not_stop_others() {
    let (store, _kv) = chain_store();
    let _ = store.add_listener(|_, _| panic!("bad listener"));
    let seen = record_events(&store);

    assert!(store.complete_item(iid("basics-1")).await);
    assert!(!seen.lock().unwrap().is_empty());
    assert_eq!(store.get_stats().await.items_completed, 1);
}

#[tokio::test]
async fn concurrent_completions_are_serialized() {
    let (store, _kv) = chain_store();
    let store = Arc::new(store);

    let handles: Vec<_> = ["basics-1", "basics-1", "basics-2", "dom-1"]
        .into_iter()
        .map(|item| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.complete_item(iid(item)).await })
        })
        .collect();
    let mut fresh = 0;
    for handle in handles {
        if handle.await.unwrap() {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 3);
    assert_eq!(store.get_stats().await.items_completed, 3);
    assert_eq!(store.get_progress().await.completed_items.len(), 3);
}
