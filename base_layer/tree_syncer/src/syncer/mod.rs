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

mod tasks;

#[cfg(test)]
mod test;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future;
use log::*;
use tokio::runtime::Handle;
use treesync_shutdown::{Shutdown, ShutdownSignal};

use crate::{
    NodeConfiguration,
    PeerId,
    PeerLane,
    PeerManager,
    PeerManagerError,
    SpaceId,
    SpaceSettings,
    SyncContext,
    SyncDetailsUpdater,
    SyncServices,
    SyncedTreeRemover,
    TreeId,
    TreeManager,
    TreeSyncConfig,
    TreeSyncerError,
};

const LOG_TARGET: &str = "tree_syncer::syncer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncerStatus {
    Created,
    Running,
    Closed,
}

impl SyncerStatus {
    is_fn!(is_created, SyncerStatus::Created);

    is_fn!(is_running, SyncerStatus::Running);

    is_fn!(is_closed, SyncerStatus::Closed);
}

impl fmt::Display for SyncerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

struct SyncerState {
    status: SyncerStatus,
    lanes: HashMap<PeerId, PeerLane>,
    shutdown: Shutdown,
    /// Set once running. Lanes are started on it regardless of the thread that requests the sync.
    runtime: Option<Handle>,
}

/// Schedules tree synchronization with remote peers for a single space.
///
/// Peer lanes are created on the first request for a peer and live until the syncer is closed. Requests made before
/// [TreeSyncer::run] are queued and start once the syncer is running.
///
/// Once running, `sync_all` and `refresh_trees` may be called from any thread, inside a tokio runtime or not.
pub struct TreeSyncer {
    space_id: SpaceId,
    config: TreeSyncConfig,
    tree_manager: Arc<dyn TreeManager>,
    services: SyncServices,
    signal: ShutdownSignal,
    runtime: Option<Handle>,
    state: Mutex<SyncerState>,
}

impl TreeSyncer {
    pub fn builder<T: TreeManager>(space_id: SpaceId, tree_manager: T) -> TreeSyncerBuilder {
        TreeSyncerBuilder::new(space_id, Arc::new(tree_manager))
    }

    fn new(
        space_id: SpaceId,
        config: TreeSyncConfig,
        tree_manager: Arc<dyn TreeManager>,
        services: SyncServices,
        runtime: Option<Handle>,
    ) -> Self {
        let shutdown = Shutdown::new();
        Self {
            space_id,
            config,
            tree_manager,
            services,
            signal: shutdown.to_signal(),
            runtime,
            state: Mutex::new(SyncerState {
                status: SyncerStatus::Created,
                lanes: HashMap::new(),
                shutdown,
                runtime: None,
            }),
        }
    }

    /// Checks the configuration. Requests are accepted from construction onwards, so this does not change the
    /// syncer status.
    pub fn init(&self) -> Result<(), TreeSyncerError> {
        self.config.validate()?;
        debug!(
            target: LOG_TARGET,
            "Tree syncer initialized: space={} request_timeout={:.2?} fetch_concurrency={} head_concurrency={}",
            self.space_id,
            self.config.request_timeout,
            self.config.fetch_concurrency,
            self.config.head_concurrency
        );
        Ok(())
    }

    /// Starts every existing peer lane. Lanes created after this call start immediately. Does nothing unless the
    /// syncer has just been created.
    ///
    /// Lanes run on the runtime given to the builder, or else on the runtime `run` is called from. Returns
    /// `TreeSyncerError::NoRuntime` if there is neither.
    pub fn run(&self) -> Result<(), TreeSyncerError> {
        let mut state = self.lock_state();
        if !state.status.is_created() {
            debug!(
                target: LOG_TARGET,
                "Tree syncer run ignored: space={} status={}", self.space_id, state.status
            );
            return Ok(());
        }
        let runtime = match self.runtime.clone() {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };
        state.status = SyncerStatus::Running;
        state.lanes.values().for_each(|lane| lane.run(&runtime));
        state.runtime = Some(runtime);
        info!(
            target: LOG_TARGET,
            "Tree syncer running: space={} lanes={}",
            self.space_id,
            state.lanes.len()
        );
        Ok(())
    }

    /// Schedules a head exchange with `peer_id` for every tree in `existing` and a request for every tree in
    /// `missing`. Trees already scheduled for this peer are skipped. Task outcomes are logged, never returned.
    pub fn sync_all(&self, peer_id: &PeerId, existing: &[TreeId], missing: &[TreeId]) {
        let mut state = self.lock_state();
        if state.status.is_closed() {
            debug!(
                target: LOG_TARGET,
                "Tree syncer closed, ignoring sync request: space={} peer={}", self.space_id, peer_id
            );
            return;
        }

        self.services.report_sync_state(&self.space_id, peer_id, existing, missing);

        let lane = self.get_or_create_lane(&mut state, peer_id);
        trace!(
            target: LOG_TARGET,
            "Sync request: space={} peer={} existing={} missing={}",
            self.space_id,
            peer_id,
            existing.len(),
            missing.len()
        );
        self.queue_head_updates(&lane, existing);
        self.queue_requests(&lane, missing);
    }

    /// Schedules a head exchange for every tree in `tree_ids` with each peer responsible for this space.
    pub async fn refresh_trees(&self, tree_ids: &[TreeId]) -> Result<(), TreeSyncerError> {
        if self.is_closed() {
            return Ok(());
        }
        let peer_manager = self
            .services
            .peer_manager
            .as_ref()
            .ok_or_else(|| PeerManagerError::Unavailable("no peer manager configured".to_string()))?;
        let peers = peer_manager.get_responsible_peers(&self.space_id).await?;

        let mut state = self.lock_state();
        if state.status.is_closed() {
            return Ok(());
        }
        debug!(
            target: LOG_TARGET,
            "Refreshing trees: space={} trees={} peers={}",
            self.space_id,
            tree_ids.len(),
            peers.len()
        );
        for peer_id in &peers {
            let lane = self.get_or_create_lane(&mut state, peer_id);
            self.queue_head_updates(&lane, tree_ids);
        }
        Ok(())
    }

    /// Cancels every task context and closes every peer lane. Resolves once all running tasks have returned.
    pub async fn close(&self) {
        let lanes = {
            let mut state = self.lock_state();
            if !state.status.is_closed() {
                info!(
                    target: LOG_TARGET,
                    "Closing tree syncer: space={} lanes={}",
                    self.space_id,
                    state.lanes.len()
                );
            }
            state.status = SyncerStatus::Closed;
            state.shutdown.trigger();
            state.lanes.values().cloned().collect::<Vec<_>>()
        };
        future::join_all(lanes.iter().map(PeerLane::close)).await;
        debug!(target: LOG_TARGET, "Tree syncer closed: space={}", self.space_id);
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    pub fn config(&self) -> &TreeSyncConfig {
        &self.config
    }

    pub fn status(&self) -> SyncerStatus {
        self.lock_state().status
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn is_closed(&self) -> bool {
        self.status().is_closed()
    }

    pub fn has_lane(&self, peer_id: &PeerId) -> bool {
        self.lock_state().lanes.contains_key(peer_id)
    }

    pub fn lane(&self, peer_id: &PeerId) -> Option<PeerLane> {
        self.lock_state().lanes.get(peer_id).cloned()
    }

    pub fn num_lanes(&self) -> usize {
        self.lock_state().lanes.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, SyncerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_or_create_lane(&self, state: &mut SyncerState, peer_id: &PeerId) -> PeerLane {
        let runtime = state.runtime.clone().filter(|_| state.status.is_running());
        state
            .lanes
            .entry(peer_id.clone())
            .or_insert_with(|| {
                let lane = PeerLane::new(peer_id.clone(), &self.config);
                if let Some(runtime) = runtime.as_ref() {
                    lane.run(runtime);
                }
                debug!(
                    target: LOG_TARGET,
                    "Created peer lane: space={} peer={} started={}",
                    self.space_id,
                    peer_id,
                    runtime.is_some()
                );
                lane
            })
            .clone()
    }

    fn new_context(&self, peer_id: &PeerId) -> SyncContext {
        SyncContext::new(peer_id.clone(), self.signal.clone())
    }

    fn queue_head_updates(&self, lane: &PeerLane, tree_ids: &[TreeId]) {
        let ctx = self.new_context(lane.peer_id());
        for tree_id in tree_ids {
            let task = tasks::update_head(
                self.tree_manager.clone(),
                self.space_id.clone(),
                tree_id.clone(),
                ctx.clone(),
            );
            if let Err(err) = lane.head_pool().try_add(tree_id.as_str(), task) {
                warn!(
                    target: LOG_TARGET,
                    "Failed to queue head update: space={} peer={} tree={} error={}",
                    self.space_id,
                    lane.peer_id(),
                    tree_id,
                    err
                );
            }
        }
    }

    fn queue_requests(&self, lane: &PeerLane, tree_ids: &[TreeId]) {
        let ctx = self.new_context(lane.peer_id());
        for tree_id in tree_ids {
            let task = tasks::request_tree(
                self.tree_manager.clone(),
                self.space_id.clone(),
                tree_id.clone(),
                ctx.clone(),
                self.config.request_timeout,
            );
            if let Err(err) = lane.fetch_pool().try_add(tree_id.as_str(), task) {
                warn!(
                    target: LOG_TARGET,
                    "Failed to queue tree request: space={} peer={} tree={} error={}",
                    self.space_id,
                    lane.peer_id(),
                    tree_id,
                    err
                );
            }
        }
    }
}

impl fmt::Debug for TreeSyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("TreeSyncer")
            .field("space_id", &self.space_id)
            .field("config", &self.config)
            .field("services", &self.services)
            .field("status", &state.status)
            .field("lanes", &state.lanes.len())
            .finish()
    }
}

pub struct TreeSyncerBuilder {
    space_id: SpaceId,
    tree_manager: Arc<dyn TreeManager>,
    config: TreeSyncConfig,
    services: SyncServices,
    runtime: Option<Handle>,
}

impl TreeSyncerBuilder {
    pub(crate) fn new(space_id: SpaceId, tree_manager: Arc<dyn TreeManager>) -> Self {
        Self {
            space_id,
            tree_manager,
            config: TreeSyncConfig::default(),
            services: SyncServices::default(),
            runtime: None,
        }
    }

    /// Runs peer lanes on `runtime`. Without one, [TreeSyncer::run] must be called from within a tokio runtime.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_config(mut self, config: TreeSyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces all services set so far
    pub fn with_services(mut self, services: SyncServices) -> Self {
        self.services = services;
        self
    }

    pub fn with_node_configuration<T: NodeConfiguration + 'static>(mut self, node_configuration: T) -> Self {
        self.services = self.services.with_node_configuration(node_configuration);
        self
    }

    pub fn with_sync_details_updater<T: SyncDetailsUpdater + 'static>(mut self, updater: T) -> Self {
        self.services = self.services.with_sync_details_updater(updater);
        self
    }

    pub fn with_synced_tree_remover<T: SyncedTreeRemover + 'static>(mut self, remover: T) -> Self {
        self.services = self.services.with_synced_tree_remover(remover);
        self
    }

    pub fn with_space_settings<T: SpaceSettings + 'static>(mut self, space_settings: T) -> Self {
        self.services = self.services.with_space_settings(space_settings);
        self
    }

    pub fn with_peer_manager<T: PeerManager + 'static>(mut self, peer_manager: T) -> Self {
        self.services = self.services.with_peer_manager(peer_manager);
        self
    }

    pub fn build(self) -> TreeSyncer {
        TreeSyncer::new(
            self.space_id,
            self.config,
            self.tree_manager,
            self.services,
            self.runtime,
        )
    }
}
