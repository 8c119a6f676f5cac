//! Uninitialized taint stories
//!
//! kubelet started with `--cloud-provider=external` taints its Node until a
//! cloud controller finishes initialization. Here the agent plays that role:
//! it removes exactly that taint and nothing else, and never writes back a
//! taint list that changed underneath it.

use serde_json::json;
use tokio_util::sync::CancellationToken;

use node_address_agent::reconciler::ReconcilerConfig;
use node_address_agent::UNINITIALIZED_TAINT_KEY;

use super::helpers::*;

fn settled_addresses() -> serde_json::Value {
    json!([
        { "type": "Hostname", "address": "node1" },
        { "type": "ExternalIP", "address": "203.0.113.10" }
    ])
}

fn external_routes() -> std::sync::Arc<StaticRoutes> {
    StaticRoutes::new(&[("8.8.8.8", "203.0.113.10")])
}

// =============================================================================
// Removal Stories
// =============================================================================

/// Story: other taints are written back exactly as they were
///
/// Foreign taints carry values and timestamps. Removing ours must not
/// reformat, reorder, or drop anything about theirs.
#[tokio::test]
async fn story_foreign_taints_survive_byte_for_byte() {
    let gpu = json!({
        "key": "nvidia.com/gpu",
        "value": "present",
        "effect": "NoSchedule"
    });
    let maintenance = json!({
        "key": "example.com/maintenance",
        "effect": "NoExecute",
        "timeAdded": "2025-01-01T00:00:00Z"
    });
    let api = FakeNodeApi::new(node_doc(
        "node1",
        settled_addresses(),
        json!([gpu.clone(), uninitialized_taint(), maintenance.clone()]),
    ));
    let routes = external_routes();
    let reconciler = reconciler(&api, &routes, external_only());

    let outcome = reconciler
        .reconcile(&CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.taint_removed);
    assert!(!outcome.addresses_changed);
    assert_eq!(api.snapshot()["spec"]["taints"], json!([gpu, maintenance]));
}

/// Story: the taint was listed twice with different effects; both go
#[tokio::test]
async fn story_every_taint_with_the_key_is_removed() {
    let api = FakeNodeApi::new(node_doc(
        "node1",
        settled_addresses(),
        json!([
            uninitialized_taint(),
            { "key": UNINITIALIZED_TAINT_KEY, "effect": "NoExecute" }
        ]),
    ));
    let routes = external_routes();
    let reconciler = reconciler(&api, &routes, external_only());

    reconciler
        .reconcile(&CancellationToken::new())
        .await
        .unwrap();

    assert!(taint_keys(&api.snapshot()).is_empty());
    assert_eq!(api.spec_writes(), 1);
}

/// Story: nothing to remove means nothing written
#[tokio::test]
async fn story_absent_taint_is_a_no_op() {
    let api = FakeNodeApi::new(node_doc(
        "node1",
        settled_addresses(),
        json!([{ "key": "nvidia.com/gpu", "effect": "NoSchedule" }]),
    ));
    let routes = external_routes();
    let reconciler = reconciler(&api, &routes, external_only());

    let outcome = reconciler
        .reconcile(&CancellationToken::new())
        .await
        .unwrap();

    assert!(!outcome.taint_removed);
    assert_eq!(api.writes(), 0);
}

/// Story: another component owns initialization, so removal is turned off
#[tokio::test]
async fn story_removal_disabled_leaves_the_taint() {
    let api = FakeNodeApi::new(node_doc(
        "node1",
        json!([{ "type": "Hostname", "address": "node1" }]),
        json!([uninitialized_taint()]),
    ));
    let routes = external_routes();
    let config = ReconcilerConfig {
        remove_taint: false,
        ..external_only()
    };
    let reconciler = reconciler(&api, &routes, config);

    let outcome = reconciler
        .reconcile(&CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.addresses_changed);
    assert!(!outcome.taint_removed);
    assert_eq!(taint_keys(&api.snapshot()), vec![UNINITIALIZED_TAINT_KEY]);
    assert_eq!(api.spec_writes(), 0);
}

// =============================================================================
// Concurrent Edit Stories
// =============================================================================

/// Story: a device plugin adds a taint while we are removing ours
///
/// Between our read and our write, another controller appends a taint. The
/// precondition in our patch no longer holds, so the whole patch is
/// rejected instead of silently dropping their taint. The next cycle reads
/// the new list and removes ours while keeping theirs.
#[tokio::test]
async fn story_concurrent_taint_edit_is_never_clobbered() {
    let api = FakeNodeApi::new(node_doc(
        "node1",
        settled_addresses(),
        json!([uninitialized_taint()]),
    ));
    let routes = external_routes();
    let reconciler = reconciler(&api, &routes, external_only());
    let cancel = CancellationToken::new();

    api.race_next_patch(|doc| {
        doc["spec"]["taints"]
            .as_array_mut()
            .expect("taints present")
            .push(json!({ "key": "nvidia.com/gpu", "effect": "NoSchedule" }));
    });

    let err = reconciler.reconcile(&cancel).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        taint_keys(&api.snapshot()),
        vec![UNINITIALIZED_TAINT_KEY, "nvidia.com/gpu"]
    );
    assert_eq!(api.spec_writes(), 0);

    let outcome = reconciler.reconcile(&cancel).await.unwrap();
    assert!(outcome.taint_removed);
    assert_eq!(taint_keys(&api.snapshot()), vec!["nvidia.com/gpu"]);
}

/// Story: someone else already removed the taint between our read and write
///
/// The precondition fails, and the next cycle sees nothing left to do.
#[tokio::test]
async fn story_taint_removed_by_someone_else_mid_cycle() {
    let api = FakeNodeApi::new(node_doc(
        "node1",
        settled_addresses(),
        json!([uninitialized_taint()]),
    ));
    let routes = external_routes();
    let reconciler = reconciler(&api, &routes, external_only());
    let cancel = CancellationToken::new();

    api.race_next_patch(|doc| {
        doc["spec"]["taints"] = json!([]);
    });

    assert!(reconciler.reconcile(&cancel).await.is_err());

    let outcome = reconciler.reconcile(&cancel).await.unwrap();
    assert!(!outcome.mutated());
    assert_eq!(api.writes(), 0);
}
