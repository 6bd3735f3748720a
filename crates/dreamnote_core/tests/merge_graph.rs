use dreamnote_core::config::GraphConfig;
use dreamnote_core::db::open_shared_db_in_memory;
use dreamnote_core::emotion::{EmotionKey, EmotionVector};
use dreamnote_core::graph::bonds::BondKind;
use dreamnote_core::graph::GraphConsistencyError;
use dreamnote_core::model::link::ManualLink;
use dreamnote_core::model::thought::{create_thought, Position, Thought, ThoughtId, ThoughtTag};
use dreamnote_core::repo::thought_repo::{LocalStore, SqliteLocalStore};
use dreamnote_core::service::thought_service::{DragOutcome, ServiceError, ThoughtService};
use dreamnote_core::sync::memory_remote::InMemoryRemoteStore;
use dreamnote_core::sync::status::SyncStatus;
use std::sync::Arc;

const OWNER: &str = "owner-1";

struct Harness {
    local: Arc<SqliteLocalStore>,
    remote: Arc<InMemoryRemoteStore>,
    service: ThoughtService,
}

fn harness() -> Harness {
    let local = Arc::new(
        SqliteLocalStore::try_new(open_shared_db_in_memory().unwrap(), OWNER).unwrap(),
    );
    let remote = Arc::new(InMemoryRemoteStore::new());
    let service = ThoughtService::new(local.clone(), remote.clone(), GraphConfig::default());
    service.start_sync();
    Harness {
        local,
        remote,
        service,
    }
}

async fn saved(h: &Harness, text: &str, emotion: EmotionKey, x: f64) -> ThoughtId {
    let mut thought = create_thought(text, [], 0, Some(emotion));
    thought.move_to(Position::new(x, 0.0));
    let pending = h.service.save(thought).unwrap();
    let id = pending.thought_id.clone();
    assert_eq!(pending.wait().await, SyncStatus::Synced);
    id
}

fn thought_in_view(h: &Harness, id: &ThoughtId) -> Option<Thought> {
    h.service
        .get_combined_view()
        .into_iter()
        .find(|thought| &thought.id == id)
}

fn link(a: &ThoughtId, b: &ThoughtId) -> ManualLink {
    ManualLink::new(a.clone(), b.clone()).unwrap()
}

#[tokio::test]
async fn merging_walk_and_rain_blends_content_and_retires_sources() {
    let h = harness();
    let mut walk = create_thought("walk", [ThoughtTag::Idea], 30, Some(EmotionKey::Joy));
    walk.move_to(Position::new(0.0, 0.0));
    let mut rain = create_thought("rain", [ThoughtTag::Reflection], 20, None);
    rain.set_emotion_vector(Some(EmotionVector::one_hot(EmotionKey::Sadness)));
    rain.move_to(Position::new(100.0, 50.0));
    let (walk_id, rain_id) = (walk.id.clone(), rain.id.clone());
    h.service.save(walk).unwrap().wait().await;
    h.service.save(rain).unwrap().wait().await;

    let receipt = h.service.merge(&walk_id, &rain_id).unwrap();
    let merged_id = receipt.merged_id.clone();

    let merged = thought_in_view(&h, &merged_id).unwrap();
    assert_eq!(merged.text, "walk — rain");
    assert_eq!(merged.title, "walk + rain");
    assert_eq!(merged.duration_seconds, 50);
    assert_eq!(merged.position, Some(Position::new(50.0, 25.0)));
    let vector = merged.emotion_vector.clone().unwrap();
    assert!((vector.weight(EmotionKey::Joy) - 0.5).abs() < 1e-9);
    assert!((vector.weight(EmotionKey::Sadness) - 0.5).abs() < 1e-9);
    assert!((vector.total() - 1.0).abs() < 1e-9);

    assert!(thought_in_view(&h, &walk_id).is_none());
    assert!(thought_in_view(&h, &rain_id).is_none());

    assert_eq!(receipt.pending.wait().await, SyncStatus::Synced);
    assert!(h.remote.contains(OWNER, &merged_id));
    assert!(!h.remote.contains(OWNER, &walk_id));
    assert!(!h.remote.contains(OWNER, &rain_id));
    assert_eq!(h.service.get_combined_view().len(), 1);
}

#[tokio::test]
async fn node_linked_to_both_sources_is_linked_to_merge_once() {
    let h = harness();
    let a = saved(&h, "first", EmotionKey::Hope, 0.0).await;
    let b = saved(&h, "second", EmotionKey::Hope, 500.0).await;
    let c = saved(&h, "third", EmotionKey::Love, 1_000.0).await;
    let d = saved(&h, "fourth", EmotionKey::Peace, 1_500.0).await;

    for (x, y) in [(&a, &c), (&b, &c), (&a, &b), (&c, &d)] {
        assert!(h.service.create_manual_link(x, y).unwrap());
    }

    let merged = h.service.merge(&a, &b).unwrap().merged_id;
    let links = h.local.links().unwrap();

    assert_eq!(links.len(), 2);
    assert!(links.contains(&link(&merged, &c)));
    assert!(links.contains(&link(&c, &d)));
    assert!(links.iter().all(|l| !l.touches(&a) && !l.touches(&b)));

    let graph = h.service.graph().unwrap();
    assert_eq!(graph.linked_to(&c).len(), 2);
}

#[tokio::test]
async fn graph_errors_are_non_fatal_no_ops() {
    let h = harness();
    let a = saved(&h, "alone", EmotionKey::Joy, 0.0).await;
    let ghost = ThoughtId::new("ghost");

    let err = h.service.create_manual_link(&a, &ghost).unwrap_err();
    assert!(!err.is_fatal());
    assert!(matches!(
        err,
        ServiceError::Graph(GraphConsistencyError::UnknownThought(ref id)) if *id == ghost
    ));
    assert!(matches!(
        h.service.merge(&a, &a),
        Err(ServiceError::Graph(GraphConsistencyError::SelfMerge(_)))
    ));
    assert!(matches!(
        h.service.create_manual_link(&a, &a),
        Err(ServiceError::Graph(GraphConsistencyError::SelfLink(_)))
    ));
    assert!(h.local.links().unwrap().is_empty());
    assert_eq!(h.service.get_combined_view().len(), 1);
}

#[tokio::test]
async fn manual_links_are_removable_and_pruned_on_delete() {
    let h = harness();
    let a = saved(&h, "first", EmotionKey::Joy, 0.0).await;
    let b = saved(&h, "second", EmotionKey::Joy, 10.0).await;
    let c = saved(&h, "third", EmotionKey::Joy, 20.0).await;

    h.service.create_manual_link(&a, &b).unwrap();
    h.service.create_manual_link(&b, &c).unwrap();
    assert!(h.service.remove_manual_link(&b, &a).unwrap());
    assert!(!h.service.remove_manual_link(&a, &b).unwrap());

    h.service.delete(&c).unwrap().wait().await;
    assert!(h.local.links().unwrap().is_empty());
}

#[tokio::test]
async fn drag_release_far_away_stores_position() {
    let h = harness();
    let a = saved(&h, "first", EmotionKey::Joy, 0.0).await;
    saved(&h, "second", EmotionKey::Joy, 1_000.0).await;

    let outcome = h.service.drag_release(&a, Position::new(300.0, 40.0)).unwrap();
    let DragOutcome::Moved(pending) = outcome else {
        panic!("expected a move");
    };
    pending.wait().await;

    let stored = h.local.get(&a).unwrap().unwrap();
    assert_eq!(stored.position, Some(Position::new(300.0, 40.0)));
    assert_eq!(h.service.get_combined_view().len(), 2);
}

#[tokio::test]
async fn drag_release_onto_node_merges_with_target_first() {
    let h = harness();
    let dragged = saved(&h, "dragged", EmotionKey::Joy, 0.0).await;
    let target = saved(&h, "target", EmotionKey::Love, 1_000.0).await;

    let outcome = h.service.drag_release(&dragged, Position::new(990.0, 5.0)).unwrap();
    let DragOutcome::Merged(receipt) = outcome else {
        panic!("expected a merge");
    };
    receipt.pending.wait().await;

    let merged = thought_in_view(&h, &receipt.merged_id).unwrap();
    assert_eq!(merged.text, "target — dragged");
    assert_eq!(merged.position, Some(Position::new(995.0, 2.5)));
    assert!(thought_in_view(&h, &dragged).is_none());
    assert!(thought_in_view(&h, &target).is_none());
}

#[tokio::test]
async fn automatic_bonds_follow_content_and_layout() {
    let h = harness();
    saved(&h, "morning coffee ritual", EmotionKey::Joy, 0.0).await;
    saved(&h, "coffee spilled everywhere", EmotionKey::Sadness, 2_000.0).await;
    saved(&h, "quiet", EmotionKey::Joy, 300.0).await;

    let bonds = h.service.graph().unwrap().automatic_bonds();
    assert_eq!(bonds.len(), 2);
    assert!(bonds.iter().any(|bond| bond.kind == BondKind::SharedKeyword));
    assert!(bonds.iter().any(|bond| bond.kind == BondKind::SharedEmotion));
}

#[tokio::test]
async fn merge_with_failed_remote_remove_is_reported_and_retried() {
    let h = harness();
    let a = saved(&h, "walk", EmotionKey::Joy, 0.0).await;
    let b = saved(&h, "rain", EmotionKey::Sadness, 500.0).await;
    h.remote.fail_removes_for(a.clone());

    let receipt = h.service.merge(&a, &b).unwrap();
    let merged = receipt.merged_id.clone();
    assert!(receipt.pending.wait().await.is_failed());
    assert!(h.remote.contains(OWNER, &merged));
    assert!(h.remote.contains(OWNER, &a));
    assert!(!h.remote.contains(OWNER, &b));
    assert_eq!(h.service.status_tracker().pending_removals(), vec![a.clone()]);
    assert_eq!(h.service.status_tracker().failed_ids(), vec![merged.clone()]);

    h.remote.clear_remove_failures();
    let retries = h.service.retry_failed().unwrap();
    assert_eq!(retries.len(), 2);
    for retry in retries {
        assert_eq!(retry.wait().await, SyncStatus::Synced);
    }

    assert!(!h.remote.contains(OWNER, &a));
    let view = h.service.get_combined_view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, merged);
    assert!(h.service.status_tracker().pending_removals().is_empty());
    assert!(h.service.status_tracker().failed_ids().is_empty());
}

#[tokio::test]
async fn offline_merge_is_completed_by_retry() {
    let h = harness();
    let a = saved(&h, "walk", EmotionKey::Joy, 0.0).await;
    let b = saved(&h, "rain", EmotionKey::Sadness, 500.0).await;
    h.remote.set_offline(true);

    let receipt = h.service.merge(&a, &b).unwrap();
    let merged = receipt.merged_id.clone();
    assert!(receipt.pending.wait().await.is_failed());
    assert!(h.local.get(&a).unwrap().is_none());
    assert!(h.local.get(&merged).unwrap().is_some());
    assert_eq!(h.service.get_combined_view().len(), 3);
    let mut retired = vec![a.clone(), b.clone()];
    retired.sort();
    assert_eq!(h.service.status_tracker().pending_removals(), retired);

    h.remote.set_offline(false);
    let retries = h.service.retry_failed().unwrap();
    assert_eq!(retries.len(), 3);
    for retry in retries {
        assert_eq!(retry.wait().await, SyncStatus::Synced);
    }

    assert_eq!(h.remote.document_count(OWNER), 1);
    assert!(h.remote.contains(OWNER, &merged));
    let view = h.service.get_combined_view();
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].id, merged);
    assert!(h.service.status_tracker().pending_removals().is_empty());
    assert!(h.service.status_tracker().failed_ids().is_empty());
}
