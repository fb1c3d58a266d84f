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

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::future;
use log::*;
use tokio::runtime::Handle;

use crate::{
    PeerId,
    SpaceId,
    SyncServices,
    TreeId,
    TreeManager,
    TreeSyncConfig,
    TreeSyncer,
    TreeSyncerBuilder,
    TreeSyncerError,
};

const LOG_TARGET: &str = "tree_syncer::factory";

/// Creates tree syncers that share a configuration, a tree manager and a set of space services.
#[derive(Clone)]
pub struct TreeSyncerFactory {
    config: TreeSyncConfig,
    tree_manager: Arc<dyn TreeManager>,
    services: SyncServices,
    runtime: Option<Handle>,
}

impl TreeSyncerFactory {
    pub fn new<T: TreeManager>(config: TreeSyncConfig, tree_manager: T) -> Self {
        Self {
            config,
            tree_manager: Arc::new(tree_manager),
            services: SyncServices::default(),
            runtime: None,
        }
    }

    pub fn with_services(mut self, services: SyncServices) -> Self {
        self.services = services;
        self
    }

    /// Runs the peer lanes of every new syncer on `runtime`
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn config(&self) -> &TreeSyncConfig {
        &self.config
    }

    /// Returns a new, unstarted tree syncer bound to `space_id`
    pub fn new_syncer(&self, space_id: SpaceId) -> Arc<TreeSyncer> {
        let mut builder = TreeSyncerBuilder::new(space_id, self.tree_manager.clone())
            .with_config(self.config.clone())
            .with_services(self.services.clone());
        if let Some(runtime) = self.runtime.clone() {
            builder = builder.with_runtime(runtime);
        }
        Arc::new(builder.build())
    }
}

#[derive(Default)]
struct RegistryState {
    syncers: HashMap<SpaceId, Arc<TreeSyncer>>,
    is_started: bool,
}

/// Holds at most one tree syncer per space.
///
/// Networking layers use the registry to route the trees a peer reports for a space to that space's syncer.
pub struct TreeSyncerRegistry {
    factory: TreeSyncerFactory,
    state: Mutex<RegistryState>,
}

impl TreeSyncerRegistry {
    pub fn new(factory: TreeSyncerFactory) -> Self {
        Self {
            factory,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Creates and initializes a tree syncer for `space_id`. The syncer is started at once if the registry has been
    /// started. A syncer previously registered for the space is closed and replaced.
    pub async fn register(&self, space_id: SpaceId) -> Result<Arc<TreeSyncer>, TreeSyncerError> {
        let syncer = self.factory.new_syncer(space_id.clone());
        syncer.init()?;

        let replaced = {
            let mut state = self.lock_state();
            if state.is_started {
                syncer.run()?;
            }
            state.syncers.insert(space_id.clone(), syncer.clone())
        };

        if let Some(replaced) = replaced {
            debug!(target: LOG_TARGET, "Replacing tree syncer: space={}", space_id);
            replaced.close().await;
        }
        Ok(syncer)
    }

    /// Starts every registered tree syncer, and every syncer registered from now on.
    pub fn start_sync(&self) -> Result<(), TreeSyncerError> {
        let mut state = self.lock_state();
        if state.is_started {
            return Ok(());
        }
        for syncer in state.syncers.values() {
            syncer.run()?;
        }
        state.is_started = true;
        info!(target: LOG_TARGET, "Started tree sync for {} space(s)", state.syncers.len());
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.lock_state().is_started
    }

    pub fn get(&self, space_id: &SpaceId) -> Option<Arc<TreeSyncer>> {
        self.lock_state().syncers.get(space_id).cloned()
    }

    pub fn num_syncers(&self) -> usize {
        self.lock_state().syncers.len()
    }

    /// Routes a peer's trees to the syncer for `space_id`. Returns false if no syncer is registered for the space.
    pub fn sync_all(&self, space_id: &SpaceId, peer_id: &PeerId, existing: &[TreeId], missing: &[TreeId]) -> bool {
        match self.get(space_id) {
            Some(syncer) => {
                syncer.sync_all(peer_id, existing, missing);
                true
            },
            None => {
                debug!(
                    target: LOG_TARGET,
                    "No tree syncer registered: space={} peer={}", space_id, peer_id
                );
                false
            },
        }
    }

    /// Unregisters and closes the syncer for `space_id`
    pub async fn remove(&self, space_id: &SpaceId) -> Option<Arc<TreeSyncer>> {
        let syncer = self.lock_state().syncers.remove(space_id)?;
        syncer.close().await;
        Some(syncer)
    }

    /// Unregisters and closes every syncer
    pub async fn close_all(&self) {
        let syncers = {
            let mut state = self.lock_state();
            state.syncers.drain().map(|(_, syncer)| syncer).collect::<Vec<_>>()
        };
        if !syncers.is_empty() {
            info!(target: LOG_TARGET, "Closing {} tree syncer(s)", syncers.len());
        }
        future::join_all(syncers.iter().map(|syncer| syncer.close())).await;
    }

    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
