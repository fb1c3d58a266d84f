// Copyright 2024. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::Semaphore,
    time::{self, Instant},
};
use treesync_test_utils::{async_assert_eventually, async_assert_unchanged, collect_recv, unpack_enum};

use super::*;
use crate::{
    test_utils::{
        MockCall,
        MockNodeConfiguration,
        MockPeerManager,
        MockSpaceSettings,
        MockSyncStatus,
        MockTreeBehaviour,
        MockTreeManager,
        SyncStatusCall,
    },
    CancelReason,
    TreeManagerError,
};

fn space_id() -> SpaceId {
    SpaceId::new("space")
}

fn peer(id: &str) -> PeerId {
    PeerId::new(id)
}

fn tree_ids(ids: &[&str]) -> Vec<TreeId> {
    ids.iter().copied().map(TreeId::from).collect()
}

fn create_syncer(tree_manager: MockTreeManager, config: TreeSyncConfig) -> TreeSyncer {
    let _ = env_logger::try_init();
    let syncer = TreeSyncer::builder(space_id(), tree_manager).with_config(config).build();
    syncer.init().unwrap();
    syncer
}

fn long_timeout_config() -> TreeSyncConfig {
    TreeSyncConfig {
        request_timeout: Duration::from_secs(60),
        ..Default::default()
    }
}

fn get_tree_call(peer_id: &str, tree_id: &str, has_deadline: bool) -> MockCall {
    MockCall::GetTree {
        peer_id: peer(peer_id),
        tree_id: TreeId::new(tree_id),
        has_deadline,
    }
}

async fn close_promptly(syncer: &TreeSyncer) {
    time::timeout(Duration::from_secs(1), syncer.close())
        .await
        .expect("close did not return in time");
}

#[tokio::test]
async fn it_starts_queued_tasks_on_run() {
    let tree_manager = MockTreeManager::new();
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());

    syncer.sync_all(&peer("peerA"), &tree_ids(&["existing1"]), &tree_ids(&["missing1"]));
    assert!(syncer.status().is_created());
    assert!(syncer.has_lane(&peer("peerA")));

    async_assert_unchanged!(tree_manager.num_calls(), expect = 0, duration = Duration::from_millis(50));
    let lane = syncer.lane(&peer("peerA")).unwrap();
    assert_eq!(lane.head_pool().num_queued(), 1);
    assert_eq!(lane.fetch_pool().num_queued(), 1);

    syncer.run().unwrap();
    assert!(syncer.is_running());
    async_assert_eventually!(tree_manager.get_tree_calls().len(), expect = 2);
    let calls = tree_manager.calls();
    assert!(calls.contains(&get_tree_call("peerA", "existing1", false)));
    assert!(calls.contains(&get_tree_call("peerA", "missing1", true)));
    async_assert_eventually!(
        tree_manager.sync_calls(),
        expect = vec![(peer("peerA"), TreeId::new("existing1"))]
    );

    close_promptly(&syncer).await;
    assert!(syncer.is_closed());
}

#[tokio::test]
async fn it_starts_tasks_submitted_after_run() {
    let tree_manager = MockTreeManager::new();
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["existing1"]), &tree_ids(&["missing1"]));
    let lane = syncer.lane(&peer("peerA")).unwrap();
    assert!(lane.head_pool().is_running());
    assert!(lane.fetch_pool().is_running());

    async_assert_eventually!(tree_manager.get_tree_calls().len(), expect = 2);
    let calls = tree_manager.calls();
    assert!(calls.contains(&get_tree_call("peerA", "existing1", false)));
    assert!(calls.contains(&get_tree_call("peerA", "missing1", true)));
    async_assert_eventually!(tree_manager.sync_calls().len(), expect = 1);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_deduplicates_within_a_single_request() {
    let tree_manager = MockTreeManager::new();
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["x", "x"]), &tree_ids(&["y", "y", "y"]));
    let lane = syncer.lane(&peer("peerA")).unwrap();
    assert_eq!(lane.head_pool().num_in_flight(), 1);
    assert_eq!(lane.fetch_pool().num_in_flight(), 1);

    async_assert_eventually!(lane.head_pool().num_in_flight(), expect = 0);
    async_assert_eventually!(lane.fetch_pool().num_in_flight(), expect = 0);
    assert_eq!(tree_manager.count_get_tree("peerA", "x"), 1);
    assert_eq!(tree_manager.count_get_tree("peerA", "y"), 1);
    assert_eq!(tree_manager.get_tree_calls().len(), 2);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_schedules_a_tree_on_both_pools() {
    let tree_manager = MockTreeManager::new();
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["t"]), &tree_ids(&["t"]));
    async_assert_eventually!(tree_manager.count_get_tree("peerA", "t"), expect = 2);
    let calls = tree_manager.calls();
    assert!(calls.contains(&get_tree_call("peerA", "t", false)));
    assert!(calls.contains(&get_tree_call("peerA", "t", true)));

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_bounds_concurrent_tree_requests() {
    let gate = Arc::new(Semaphore::new(0));
    let tree_manager = MockTreeManager::with_default_behaviour(MockTreeBehaviour::Gate(gate.clone()));
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig {
        fetch_concurrency: 2,
        request_timeout: Duration::from_secs(60),
        ..Default::default()
    });
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &[], &tree_ids(&["m1", "m2", "m3"]));
    async_assert_eventually!(tree_manager.num_active(), expect = 2);
    async_assert_unchanged!(tree_manager.num_active(), expect = 2, duration = Duration::from_millis(50));
    assert_eq!(tree_manager.get_tree_calls().len(), 2);
    assert_eq!(tree_manager.count_get_tree("peerA", "m3"), 0);

    gate.add_permits(1);
    async_assert_eventually!(tree_manager.count_get_tree("peerA", "m3"), expect = 1);
    assert_eq!(tree_manager.num_active(), 2);

    gate.add_permits(2);
    async_assert_eventually!(tree_manager.num_active(), expect = 0);
    assert_eq!(tree_manager.peak_active(), 2);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_runs_head_updates_one_at_a_time_in_order() {
    let gate = Arc::new(Semaphore::new(0));
    let tree_manager = MockTreeManager::with_default_behaviour(MockTreeBehaviour::Gate(gate.clone()));
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["h1", "h2", "h3"]), &[]);
    async_assert_eventually!(tree_manager.num_active(), expect = 1);
    async_assert_unchanged!(tree_manager.num_active(), expect = 1, duration = Duration::from_millis(50));
    assert_eq!(tree_manager.get_tree_calls(), vec![(peer("peerA"), TreeId::new("h1"))]);

    gate.add_permits(1);
    async_assert_eventually!(tree_manager.get_tree_calls().len(), expect = 2);
    gate.add_permits(2);
    async_assert_eventually!(tree_manager.sync_calls().len(), expect = 3);

    let order = tree_manager
        .get_tree_calls()
        .into_iter()
        .map(|(_, tree_id)| tree_id)
        .collect::<Vec<_>>();
    assert_eq!(order, tree_ids(&["h1", "h2", "h3"]));
    assert_eq!(tree_manager.peak_active(), 1);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_isolates_tree_requests_per_peer() {
    let tree_manager = MockTreeManager::new();
    tree_manager.set_behaviour("hang", MockTreeBehaviour::WaitForCancel);
    let syncer = create_syncer(tree_manager.clone(), long_timeout_config());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &[], &tree_ids(&["hang"]));
    syncer.sync_all(&peer("peerB"), &[], &tree_ids(&["quick"]));
    assert_eq!(syncer.num_lanes(), 2);

    let lane_b = syncer.lane(&peer("peerB")).unwrap();
    let started = Instant::now();
    async_assert_eventually!(lane_b.fetch_pool().num_in_flight(), expect = 0);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(tree_manager.count_get_tree("peerB", "quick"), 1);
    assert!(syncer.lane(&peer("peerA")).unwrap().fetch_pool().contains("hang"));

    close_promptly(&syncer).await;
    assert!(tree_manager.calls().contains(&MockCall::Cancelled {
        peer_id: peer("peerA"),
        tree_id: TreeId::new("hang"),
        reason: CancelReason::Shutdown,
    }));
}

#[tokio::test]
async fn it_isolates_head_updates_per_peer() {
    let tree_manager = MockTreeManager::new();
    tree_manager.set_behaviour("stuck", MockTreeBehaviour::WaitForCancel);
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["stuck", "t1"]), &[]);
    syncer.sync_all(&peer("peerB"), &tree_ids(&["t1"]), &[]);

    async_assert_eventually!(
        tree_manager.sync_calls(),
        expect = vec![(peer("peerB"), TreeId::new("t1"))]
    );
    // peerA's second head update waits behind the stuck one
    assert_eq!(tree_manager.count_get_tree("peerA", "t1"), 0);

    close_promptly(&syncer).await;
    assert_eq!(tree_manager.count_get_tree("peerA", "t1"), 0);
}

#[tokio::test]
async fn it_cancels_tree_requests_on_timeout() {
    let tree_manager = MockTreeManager::with_default_behaviour(MockTreeBehaviour::WaitForCancel);
    let mut call_rx = tree_manager.subscribe();
    let timeout = Duration::from_millis(100);
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig {
        request_timeout: timeout,
        ..Default::default()
    });
    syncer.run().unwrap();

    let started = Instant::now();
    syncer.sync_all(&peer("peerA"), &[], &tree_ids(&["slow"]));
    let calls = collect_recv!(call_rx, take = 2, timeout = Duration::from_secs(2));
    let elapsed = started.elapsed();
    assert_eq!(calls[0], get_tree_call("peerA", "slow", true));
    assert_eq!(calls[1], MockCall::Cancelled {
        peer_id: peer("peerA"),
        tree_id: TreeId::new("slow"),
        reason: CancelReason::DeadlineExceeded,
    });
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(500));

    // The key is released so the tree can be requested again
    let lane = syncer.lane(&peer("peerA")).unwrap();
    async_assert_eventually!(lane.fetch_pool().num_in_flight(), expect = 0);
    assert!(!syncer.is_closed());

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_does_not_bound_head_updates_by_the_request_timeout() {
    let tree_manager = MockTreeManager::new();
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig {
        request_timeout: Duration::from_millis(10),
        ..Default::default()
    });
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["h1"]), &[]);
    async_assert_eventually!(tree_manager.contexts().len(), expect = 1);
    let ctx = tree_manager.contexts().remove(0);
    assert!(ctx.deadline().is_none());
    assert_eq!(ctx.peer_id(), "peerA");

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_cancels_in_flight_tasks_on_close() {
    let tree_manager = MockTreeManager::with_default_behaviour(MockTreeBehaviour::WaitForCancel);
    let syncer = create_syncer(tree_manager.clone(), long_timeout_config());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["head"]), &tree_ids(&["fetch"]));
    async_assert_eventually!(tree_manager.num_active(), expect = 2);
    let contexts = tree_manager.contexts();
    assert!(contexts.iter().all(|ctx| !ctx.is_cancelled()));

    close_promptly(&syncer).await;
    assert_eq!(tree_manager.num_active(), 0);
    assert!(contexts
        .iter()
        .all(|ctx| ctx.cancel_reason() == Some(CancelReason::Shutdown)));
    let cancelled = tree_manager
        .calls()
        .into_iter()
        .filter(|call| matches!(call, MockCall::Cancelled { .. }))
        .count();
    assert_eq!(cancelled, 2);

    let lane = syncer.lane(&peer("peerA")).unwrap();
    assert!(lane.is_closed());
    assert_eq!(lane.head_pool().num_in_flight(), 0);
    assert_eq!(lane.fetch_pool().num_in_flight(), 0);
}

#[tokio::test]
async fn it_discards_queued_tasks_on_close() {
    let tree_manager = MockTreeManager::new();
    tree_manager.set_behaviour("first", MockTreeBehaviour::WaitForCancel);
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["first", "second"]), &[]);
    async_assert_eventually!(tree_manager.num_active(), expect = 1);

    close_promptly(&syncer).await;
    assert_eq!(tree_manager.count_get_tree("peerA", "second"), 0);
    assert_eq!(syncer.lane(&peer("peerA")).unwrap().head_pool().num_in_flight(), 0);
}

#[tokio::test]
async fn it_closes_a_syncer_that_never_ran() {
    let tree_manager = MockTreeManager::new();
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.sync_all(&peer("peerA"), &tree_ids(&["t1"]), &tree_ids(&["m1"]));

    close_promptly(&syncer).await;
    assert!(syncer.is_closed());
    syncer.run().unwrap();
    assert!(syncer.is_closed());
    async_assert_unchanged!(tree_manager.num_calls(), expect = 0, duration = Duration::from_millis(20));
}

#[tokio::test]
async fn it_ignores_requests_once_closed() {
    let tree_manager = MockTreeManager::new();
    let status = MockSyncStatus::new();
    let syncer = TreeSyncer::builder(space_id(), tree_manager.clone())
        .with_synced_tree_remover(status.clone())
        .build();
    syncer.init().unwrap();
    syncer.run().unwrap();
    close_promptly(&syncer).await;

    syncer.sync_all(&peer("peerA"), &tree_ids(&["t1"]), &tree_ids(&["m1"]));
    assert_eq!(syncer.num_lanes(), 0);
    assert!(status.calls().is_empty());
    async_assert_unchanged!(tree_manager.num_calls(), expect = 0, duration = Duration::from_millis(20));

    // Idempotent
    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_starts_every_pending_lane_on_run() {
    let tree_manager = MockTreeManager::new();
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.sync_all(&peer("peerA"), &tree_ids(&["a"]), &[]);
    syncer.sync_all(&peer("peerB"), &[], &tree_ids(&["b"]));
    assert!(!syncer.lane(&peer("peerA")).unwrap().head_pool().is_running());

    syncer.run().unwrap();
    syncer.run().unwrap();
    for peer_id in [peer("peerA"), peer("peerB")] {
        let lane = syncer.lane(&peer_id).unwrap();
        assert!(lane.head_pool().is_running());
        assert!(lane.fetch_pool().is_running());
    }
    async_assert_eventually!(tree_manager.get_tree_calls().len(), expect = 2);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_reports_sync_state() {
    let tree_manager = MockTreeManager::new();
    let status = MockSyncStatus::new();
    let syncer = TreeSyncer::builder(space_id(), tree_manager)
        .with_node_configuration(MockNodeConfiguration::new().with_nodes(space_id(), [peer("peerA")]))
        .with_sync_details_updater(status.clone())
        .with_synced_tree_remover(status.clone())
        .with_space_settings(MockSpaceSettings::new("settings"))
        .build();
    syncer.init().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["t1", "settings", "t1"]), &tree_ids(&["m1"]));
    syncer.sync_all(&peer("peerB"), &tree_ids(&["t2", "settings"]), &[]);

    assert_eq!(status.calls(), vec![
        SyncStatusCall::UpdateSpaceDetails {
            existing: tree_ids(&["t1", "settings", "t1"]),
            missing: tree_ids(&["m1"]),
            space_id: space_id(),
        },
        SyncStatusCall::RemoveAllExcept {
            peer_id: peer("peerA"),
            existing: tree_ids(&["t1", "t1"]),
        },
        SyncStatusCall::RemoveAllExcept {
            peer_id: peer("peerB"),
            existing: tree_ids(&["t2"]),
        },
    ]);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_syncs_empty_derived_trees_after_requesting_them() {
    let tree_manager = MockTreeManager::new();
    tree_manager.set_behaviour("derived", MockTreeBehaviour::DerivedEmpty);
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &[], &tree_ids(&["derived", "regular"]));
    async_assert_eventually!(
        tree_manager.sync_calls(),
        expect = vec![(peer("peerA"), TreeId::new("derived"))]
    );
    async_assert_eventually!(tree_manager.count_get_tree("peerA", "regular"), expect = 1);
    let lane = syncer.lane(&peer("peerA")).unwrap();
    async_assert_eventually!(lane.fetch_pool().num_in_flight(), expect = 0);
    assert_eq!(tree_manager.sync_calls().len(), 1);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_skips_trees_that_cannot_sync_with_peers() {
    let tree_manager = MockTreeManager::new();
    tree_manager.set_behaviour("plain", MockTreeBehaviour::NotSyncable);
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["plain", "t1"]), &[]);
    async_assert_eventually!(
        tree_manager.sync_calls(),
        expect = vec![(peer("peerA"), TreeId::new("t1"))]
    );
    assert_eq!(tree_manager.count_get_tree("peerA", "plain"), 1);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_releases_failed_tasks_for_resubmission() {
    let tree_manager = MockTreeManager::new();
    tree_manager.set_behaviour(
        "gone",
        MockTreeBehaviour::Fail(TreeManagerError::NotFound(TreeId::new("gone"))),
    );
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["gone"]), &tree_ids(&["gone"]));
    let lane = syncer.lane(&peer("peerA")).unwrap();
    async_assert_eventually!(lane.head_pool().num_in_flight(), expect = 0);
    async_assert_eventually!(lane.fetch_pool().num_in_flight(), expect = 0);
    assert_eq!(tree_manager.count_get_tree("peerA", "gone"), 2);

    syncer.sync_all(&peer("peerA"), &tree_ids(&["gone"]), &[]);
    async_assert_eventually!(tree_manager.count_get_tree("peerA", "gone"), expect = 3);
    assert!(tree_manager.sync_calls().is_empty());

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_survives_a_panicking_tree_manager() {
    let tree_manager = MockTreeManager::new();
    tree_manager.set_behaviour("boom", MockTreeBehaviour::Panic);
    let syncer = create_syncer(tree_manager.clone(), TreeSyncConfig::default());
    syncer.run().unwrap();

    syncer.sync_all(&peer("peerA"), &tree_ids(&["boom", "after"]), &[]);
    async_assert_eventually!(
        tree_manager.sync_calls(),
        expect = vec![(peer("peerA"), TreeId::new("after"))]
    );
    let lane = syncer.lane(&peer("peerA")).unwrap();
    assert!(lane.head_pool().is_running());
    assert!(!lane.head_pool().contains("boom"));
    assert_eq!(tree_manager.num_active(), 0);

    close_promptly(&syncer).await;
}

#[tokio::test]
async fn it_refreshes_trees_with_responsible_peers() {
    let tree_manager = MockTreeManager::new();
    let peer_manager = MockPeerManager::new([peer("peerA"), peer("peerB")]);
    let syncer = TreeSyncer::builder(space_id(), tree_manager.clone())
        .with_peer_manager(peer_manager.clone())
        .build();
    syncer.init().unwrap();
    syncer.run().unwrap();

    syncer.refresh_trees(&tree_ids(&["t1", "t2"])).await.unwrap();
    assert!(syncer.has_lane(&peer("peerA")));
    assert!(syncer.has_lane(&peer("peerB")));
    async_assert_eventually!(tree_manager.sync_calls().len(), expect = 4);
    assert!(tree_manager.calls().contains(&get_tree_call("peerB", "t2", false)));

    peer_manager.set_error(PeerManagerError::NoResponsiblePeers);
    let err = syncer.refresh_trees(&tree_ids(&["t1"])).await.unwrap_err();
    unpack_enum!(TreeSyncerError::PeerManager(err) = err);
    assert_eq!(err, PeerManagerError::NoResponsiblePeers);

    close_promptly(&syncer).await;
    syncer.refresh_trees(&tree_ids(&["t1"])).await.unwrap();
    assert_eq!(peer_manager.call_count(), 2);
}

#[tokio::test]
async fn it_requires_a_peer_manager_to_refresh_trees() {
    let syncer = create_syncer(MockTreeManager::new(), TreeSyncConfig::default());
    let err = syncer.refresh_trees(&tree_ids(&["t1"])).await.unwrap_err();
    unpack_enum!(TreeSyncerError::PeerManager(err) = err);
    unpack_enum!(PeerManagerError::Unavailable(_msg) = err);
    assert_eq!(syncer.num_lanes(), 0);
}

#[test]
fn it_rejects_invalid_config_on_init() {
    let syncer = TreeSyncer::builder(space_id(), MockTreeManager::new())
        .with_config(TreeSyncConfig {
            fetch_concurrency: 0,
            ..Default::default()
        })
        .build();
    let err = syncer.init().unwrap_err();
    unpack_enum!(TreeSyncerError::InvalidConfig(_msg) = err);
    assert!(syncer.status().is_created());
    assert_eq!(syncer.space_id(), "space");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn it_accepts_requests_from_threads_outside_the_runtime() {
    let tree_manager = MockTreeManager::new();
    let syncer = Arc::new(create_syncer(tree_manager.clone(), TreeSyncConfig::default()));
    syncer.run().unwrap();

    let thread_syncer = syncer.clone();
    std::thread::spawn(move || {
        thread_syncer.sync_all(&peer("peerA"), &tree_ids(&["t1"]), &tree_ids(&["m1"]));
    })
    .join()
    .expect("sync_all panicked outside the runtime");

    assert!(syncer.lane(&peer("peerA")).unwrap().head_pool().is_running());
    async_assert_eventually!(
        tree_manager.sync_calls(),
        expect = vec![(peer("peerA"), TreeId::new("t1"))]
    );
    async_assert_eventually!(tree_manager.count_get_tree("peerA", "m1"), expect = 1);

    close_promptly(&syncer).await;
}

#[test]
fn it_requires_a_runtime_to_run() {
    let syncer = create_syncer(MockTreeManager::new(), TreeSyncConfig::default());
    syncer.sync_all(&peer("peerA"), &tree_ids(&["t1"]), &[]);

    let err = syncer.run().unwrap_err();
    unpack_enum!(TreeSyncerError::NoRuntime(_err) = err);
    assert!(syncer.status().is_created());
    assert!(!syncer.lane(&peer("peerA")).unwrap().head_pool().is_running());
}

#[test]
fn it_runs_on_the_given_runtime() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let tree_manager = MockTreeManager::new();
    let mut call_rx = tree_manager.subscribe();
    let syncer = TreeSyncer::builder(space_id(), tree_manager.clone())
        .with_runtime(runtime.handle().clone())
        .build();
    syncer.init().unwrap();

    // Neither call is made from within the runtime
    syncer.run().unwrap();
    syncer.sync_all(&peer("peerA"), &[], &tree_ids(&["m1"]));

    runtime.block_on(async {
        let calls = collect_recv!(call_rx, take = 1, timeout = Duration::from_secs(5));
        assert_eq!(calls, vec![get_tree_call("peerA", "m1", true)]);
        close_promptly(&syncer).await;
    });
}
