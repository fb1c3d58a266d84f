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

//! Optional space services the tree syncer reports to or consults. Any that are not provided are skipped.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::{PeerId, SpaceId, TreeId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeerManagerError {
    #[error("No responsible peers are available")]
    NoResponsiblePeers,
    #[error("Peer manager unavailable: {0}")]
    Unavailable(String),
}

/// Network configuration lookup.
pub trait NodeConfiguration: Send + Sync {
    /// Returns the ids of the nodes responsible for storing the given space.
    fn node_ids(&self, space_id: &SpaceId) -> Vec<PeerId>;
}

/// Receives the trees a responsible node reported for a space.
pub trait SyncDetailsUpdater: Send + Sync {
    fn update_space_details(&self, existing: &[TreeId], missing: &[TreeId], space_id: &SpaceId);
}

/// Tracks which trees are synced with a peer.
pub trait SyncedTreeRemover: Send + Sync {
    /// Forget every tree synced with `peer_id` except `existing`.
    fn remove_all_except(&self, peer_id: &PeerId, existing: &[TreeId]);
}

/// Looks up the space settings tree, which is excluded from sync status bookkeeping.
pub trait SpaceSettings: Send + Sync {
    fn settings_id(&self, space_id: &SpaceId) -> Option<TreeId>;
}

#[async_trait]
pub trait PeerManager: Send + Sync {
    async fn get_responsible_peers(&self, space_id: &SpaceId) -> Result<Vec<PeerId>, PeerManagerError>;
}

/// The set of space services handed to every tree syncer.
#[derive(Clone, Default)]
pub struct SyncServices {
    pub(crate) node_configuration: Option<Arc<dyn NodeConfiguration>>,
    pub(crate) sync_details_updater: Option<Arc<dyn SyncDetailsUpdater>>,
    pub(crate) synced_tree_remover: Option<Arc<dyn SyncedTreeRemover>>,
    pub(crate) space_settings: Option<Arc<dyn SpaceSettings>>,
    pub(crate) peer_manager: Option<Arc<dyn PeerManager>>,
}

impl SyncServices {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_node_configuration<T: NodeConfiguration + 'static>(mut self, node_configuration: T) -> Self {
        self.node_configuration = Some(Arc::new(node_configuration));
        self
    }

    pub fn with_sync_details_updater<T: SyncDetailsUpdater + 'static>(mut self, updater: T) -> Self {
        self.sync_details_updater = Some(Arc::new(updater));
        self
    }

    pub fn with_synced_tree_remover<T: SyncedTreeRemover + 'static>(mut self, remover: T) -> Self {
        self.synced_tree_remover = Some(Arc::new(remover));
        self
    }

    pub fn with_space_settings<T: SpaceSettings + 'static>(mut self, space_settings: T) -> Self {
        self.space_settings = Some(Arc::new(space_settings));
        self
    }

    pub fn with_peer_manager<T: PeerManager + 'static>(mut self, peer_manager: T) -> Self {
        self.peer_manager = Some(Arc::new(peer_manager));
        self
    }

    /// True if `peer_id` is one of the nodes responsible for `space_id`.
    pub(crate) fn is_responsible_peer(&self, space_id: &SpaceId, peer_id: &PeerId) -> bool {
        self.node_configuration
            .as_ref()
            .map(|conf| conf.node_ids(space_id).contains(peer_id))
            .unwrap_or(false)
    }

    /// Reports the trees a peer advertised for a space. Details are only forwarded for responsible peers. The
    /// synced tree set is trimmed for every peer, leaving out the space settings tree.
    pub(crate) fn report_sync_state(
        &self,
        space_id: &SpaceId,
        peer_id: &PeerId,
        existing: &[TreeId],
        missing: &[TreeId],
    ) {
        if self.is_responsible_peer(space_id, peer_id) {
            if let Some(updater) = self.sync_details_updater.as_ref() {
                updater.update_space_details(existing, missing, space_id);
            }
        }

        if let Some(remover) = self.synced_tree_remover.as_ref() {
            let settings_id = self.space_settings.as_ref().and_then(|s| s.settings_id(space_id));
            let existing = existing
                .iter()
                .filter(|id| Some(*id) != settings_id.as_ref())
                .cloned()
                .collect::<Vec<_>>();
            remover.remove_all_except(peer_id, &existing);
        }
    }
}

impl fmt::Debug for SyncServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncServices")
            .field("node_configuration", &self.node_configuration.is_some())
            .field("sync_details_updater", &self.sync_details_updater.is_some())
            .field("synced_tree_remover", &self.synced_tree_remover.is_some())
            .field("space_settings", &self.space_settings.is_some())
            .field("peer_manager", &self.peer_manager.is_some())
            .finish()
    }
}
