//! Closure invariants, round trips and boundary behaviour.

use treeline_domain::{BatchKind, FormItem, ItemOutcome, NodeKey, NodePayload};

use super::{payload, resolved, TestDb};
use crate::infrastructure::ports::USER_GROUPS;
use crate::use_cases::BatchError;

#[tokio::test]
async fn invariants_hold_across_mixed_batches() {
    let db = TestDb::new().await;
    let n = db
        .seed(&[
            ("R", None),
            ("A", Some("R")),
            ("B", Some("A")),
            ("C", Some("B")),
            ("D", Some("R")),
            ("E", Some("D")),
            ("S", None),
            ("T", Some("S")),
        ])
        .await;
    db.assert_invariants().await;

    // Nested moving roots: B leaves A's subtree while A itself moves.
    db.apply(
        BatchKind::Move,
        &[
            FormItem::move_to(n.id("A"), Some(n.id("T")), NodePayload::empty()),
            FormItem::move_to(n.id("B"), Some(n.id("E")), NodePayload::empty()),
        ],
    )
    .await
    .unwrap();
    db.assert_invariants().await;
    let closure = db.closure().await;
    assert!(closure.contains(&n.triple("S", "A", 2)));
    assert!(closure.contains(&n.triple("R", "C", 4)));
    assert!(!closure.iter().any(|(a, d, _)| *a == n.raw("A") && *d == n.raw("C")));

    // A nested root that stays inside its moving ancestor.
    db.apply(
        BatchKind::Move,
        &[
            FormItem::move_to(n.id("D"), None, NodePayload::empty()),
            FormItem::move_to(n.id("C"), Some(n.id("D")), NodePayload::empty()),
        ],
    )
    .await
    .unwrap();
    db.assert_invariants().await;

    db.apply(
        BatchKind::Mixed,
        &[
            FormItem::child_of_existing(n.id("E"), payload("F")),
            FormItem::child_of_batch(0, payload("G")),
            FormItem::move_to(n.id("S"), Some(n.id("B")), NodePayload::empty()),
            FormItem::delete(n.id("T")),
        ],
    )
    .await
    .unwrap();
    db.assert_invariants().await;
}

#[tokio::test]
async fn reapplying_the_current_state_changes_no_rows() {
    let db = TestDb::new().await;
    let n = db
        .seed(&[("R", None), ("A", Some("R")), ("B", Some("A")), ("X", None)])
        .await;
    let before = db.closure().await;

    let outcome = db
        .apply(
            BatchKind::Move,
            &[
                FormItem::move_to(n.id("R"), None, NodePayload::empty()),
                FormItem::move_to(n.id("A"), Some(n.id("R")), NodePayload::empty()),
                FormItem::move_to(n.id("B"), Some(n.id("A")), NodePayload::empty()),
                FormItem::move_to(n.id("X"), None, NodePayload::empty()),
            ],
        )
        .await
        .unwrap();

    assert!(outcome.stats.paths_unchanged());
    assert_eq!(outcome.stats.paths_created, 0);
    assert_eq!(db.closure().await, before);
}

#[tokio::test]
async fn insert_then_read_ancestors_returns_the_parent_chain() {
    let db = TestDb::new().await;
    let n = db.seed(&[("R", None), ("A", Some("R"))]).await;

    let outcome = db
        .apply(
            BatchKind::Create,
            &[FormItem::child_of_existing(n.id("A"), payload("leaf"))],
        )
        .await
        .unwrap();
    let leaf = resolved(&outcome)[0];

    let chain = db.tags().hierarchy.read_ancestors(leaf, None).await.unwrap();
    let pairs: Vec<_> = chain.iter().map(|r| (r.node, r.depth)).collect();
    assert_eq!(pairs, vec![(leaf, 0), (n.id("A"), 1), (n.id("R"), 2)]);

    let bounded = db
        .tags()
        .hierarchy
        .read_ancestors(leaf, Some(1))
        .await
        .unwrap();
    assert_eq!(bounded.len(), 2);

    let below = db
        .tags()
        .hierarchy
        .read_descendants(n.id("R"), None)
        .await
        .unwrap();
    assert_eq!(below.first().map(|r| (r.node, r.depth)), Some((n.id("R"), 0)));
    assert_eq!(below.len(), 3);
}

#[tokio::test]
async fn move_and_move_back_restores_the_closure() {
    let db = TestDb::new().await;
    let n = db
        .seed(&[
            ("R1", None),
            ("A", Some("R1")),
            ("B", Some("A")),
            ("R2", None),
            ("C", Some("R2")),
        ])
        .await;
    let before = db.closure().await;

    db.apply(
        BatchKind::Move,
        &[FormItem::move_to(n.id("A"), Some(n.id("C")), NodePayload::empty())],
    )
    .await
    .unwrap();
    assert_ne!(db.closure().await, before);

    db.apply(
        BatchKind::Move,
        &[FormItem::move_to(n.id("A"), Some(n.id("R1")), NodePayload::empty())],
    )
    .await
    .unwrap();
    assert_eq!(db.closure().await, before);
}

#[tokio::test]
async fn exists_path_in_either_direction() {
    let db = TestDb::new().await;
    let n = db
        .seed(&[("R", None), ("A", Some("R")), ("X", None)])
        .await;
    let hierarchy = &db.tags().hierarchy;

    assert!(hierarchy.exists_path(n.id("R"), n.id("A")).await.unwrap());
    assert!(hierarchy.exists_path(n.id("A"), n.id("R")).await.unwrap());
    assert!(hierarchy.exists_path(n.id("X"), n.id("X")).await.unwrap());
    assert!(!hierarchy.exists_path(n.id("A"), n.id("X")).await.unwrap());
}

#[tokio::test]
async fn reading_an_unknown_node_is_missing() {
    let db = TestDb::new().await;
    let err = db
        .tags()
        .hierarchy
        .read_ancestors(treeline_domain::NodeId::new(404), None)
        .await
        .unwrap_err();
    assert!(err.is_node_missing());
}

#[tokio::test]
async fn empty_batch_is_a_no_op() {
    let db = TestDb::new().await;
    let outcome = db.apply(BatchKind::Mixed, &[]).await.unwrap();
    assert!(outcome.items.is_empty());
    assert_eq!(db.total_rows().await, 0);
}

#[tokio::test]
async fn siblings_under_root_get_only_self_rows() {
    let db = TestDb::new().await;
    let forms: Vec<FormItem> = (0..6)
        .map(|i| FormItem::create_root(payload(&format!("root-{i}"))))
        .collect();

    let outcome = db.apply(BatchKind::Create, &forms).await.unwrap();

    assert_eq!(resolved(&outcome).len(), 6);
    assert_eq!(db.node_ids().await.len(), 6);
    let closure = db.closure().await;
    assert_eq!(closure.len(), 6);
    assert!(closure.iter().all(|(a, d, k)| a == d && *k == 0));
}

#[tokio::test]
async fn create_loop_lists_every_member_and_writes_nothing() {
    let db = TestDb::new().await;
    let err = db
        .apply(
            BatchKind::Create,
            &[
                FormItem::child_of_batch(2, payload("a")),
                FormItem::child_of_batch(0, payload("b")),
                FormItem::child_of_batch(1, payload("c")),
            ],
        )
        .await
        .unwrap_err();

    let BatchError::LoopDetected { path } = &err else {
        panic!("expected a loop, got {err:?}");
    };
    assert_eq!(path.len(), 4);
    assert_eq!(path.first(), path.last());
    for index in 0..3 {
        assert!(path.contains(&NodeKey::Batch(index)));
    }
    assert!(db.node_ids().await.is_empty());
}

#[tokio::test]
async fn deleting_a_subtree_removes_every_row_it_touches() {
    let db = TestDb::new().await;
    // Depth 2, breadth 2 under R, plus an unrelated root.
    let n = db
        .seed(&[
            ("R", None),
            ("A", Some("R")),
            ("B", Some("R")),
            ("A1", Some("A")),
            ("B1", Some("B")),
            ("Z", None),
        ])
        .await;
    let before = db.total_rows().await;

    let outcome = db
        .apply(BatchKind::Delete, &[FormItem::delete(n.id("R"))])
        .await
        .unwrap();

    assert_eq!(outcome.items, vec![ItemOutcome::Deleted]);
    assert_eq!(outcome.stats.nodes_deleted, 5);
    // 5 self rows, 4 depth-1 rows, 2 depth-2 rows; the breadth x (depth + 1) bound is 12
    assert_eq!(before - db.total_rows().await, 11);
    assert_eq!(db.node_ids().await, [n.raw("Z")].into_iter().collect());
    db.assert_invariants().await;
}

#[tokio::test]
async fn unknown_parent_rolls_back_the_whole_batch() {
    let db = TestDb::new().await;
    let err = db
        .apply(
            BatchKind::Create,
            &[
                FormItem::create_root(payload("kept?")),
                FormItem::child_of_existing(treeline_domain::NodeId::new(77), payload("orphan")),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::NodeMissing(id) if id.get() == 77));
    assert!(db.node_ids().await.is_empty());
    assert_eq!(db.total_rows().await, 0);
}

#[tokio::test]
async fn duplicate_targets_are_rejected() {
    let db = TestDb::new().await;
    let n = db.seed(&[("R", None)]).await;
    let err = db
        .apply(
            BatchKind::Mixed,
            &[
                FormItem::edit(n.id("R"), payload("x")),
                FormItem::delete(n.id("R")),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BatchError::DuplicateFormId(_)));
    assert_eq!(db.node_ids().await.len(), 1);
}

#[tokio::test]
async fn hierarchies_do_not_share_rows() {
    let db = TestDb::new().await;
    db.seed(&[("R", None), ("A", Some("R"))]).await;

    let groups = &db.app.user_groups.apply_batch;
    groups
        .execute(BatchKind::Create, &[FormItem::create_root(payload("admins"))])
        .await
        .unwrap();

    assert_eq!(db.closure().await.len(), 3);
    assert_eq!(db.closure_of(USER_GROUPS).await.len(), 1);
}
