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
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    NodeConfiguration,
    PeerId,
    PeerManager,
    PeerManagerError,
    SpaceId,
    SpaceSettings,
    SyncDetailsUpdater,
    SyncedTreeRemover,
    TreeId,
};

#[derive(Debug, Clone, Default)]
pub struct MockNodeConfiguration {
    nodes: HashMap<SpaceId, Vec<PeerId>>,
}

impl MockNodeConfiguration {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_nodes<I: IntoIterator<Item = PeerId>>(mut self, space_id: SpaceId, nodes: I) -> Self {
        self.nodes.entry(space_id).or_default().extend(nodes);
        self
    }
}

impl NodeConfiguration for MockNodeConfiguration {
    fn node_ids(&self, space_id: &SpaceId) -> Vec<PeerId> {
        self.nodes.get(space_id).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatusCall {
    UpdateSpaceDetails {
        existing: Vec<TreeId>,
        missing: Vec<TreeId>,
        space_id: SpaceId,
    },
    RemoveAllExcept {
        peer_id: PeerId,
        existing: Vec<TreeId>,
    },
}

/// Records sync status updates
#[derive(Debug, Clone, Default)]
pub struct MockSyncStatus {
    calls: Arc<Mutex<Vec<SyncStatusCall>>>,
}

impl MockSyncStatus {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn calls(&self) -> Vec<SyncStatusCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: SyncStatusCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl SyncDetailsUpdater for MockSyncStatus {
    fn update_space_details(&self, existing: &[TreeId], missing: &[TreeId], space_id: &SpaceId) {
        self.push(SyncStatusCall::UpdateSpaceDetails {
            existing: existing.to_vec(),
            missing: missing.to_vec(),
            space_id: space_id.clone(),
        });
    }
}

impl SyncedTreeRemover for MockSyncStatus {
    fn remove_all_except(&self, peer_id: &PeerId, existing: &[TreeId]) {
        self.push(SyncStatusCall::RemoveAllExcept {
            peer_id: peer_id.clone(),
            existing: existing.to_vec(),
        });
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockSpaceSettings {
    settings_id: Option<TreeId>,
}

impl MockSpaceSettings {
    pub fn new<T: Into<TreeId>>(settings_id: T) -> Self {
        Self {
            settings_id: Some(settings_id.into()),
        }
    }
}

impl SpaceSettings for MockSpaceSettings {
    fn settings_id(&self, _space_id: &SpaceId) -> Option<TreeId> {
        self.settings_id.clone()
    }
}

#[derive(Debug, Clone)]
pub struct MockPeerManager {
    peers: Arc<Mutex<Result<Vec<PeerId>, PeerManagerError>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockPeerManager {
    pub fn new<I: IntoIterator<Item = PeerId>>(peers: I) -> Self {
        Self {
            peers: Arc::new(Mutex::new(Ok(peers.into_iter().collect()))),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_error(&self, err: PeerManagerError) {
        *self.peers.lock().unwrap() = Err(err);
    }

    pub fn call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait]
impl PeerManager for MockPeerManager {
    async fn get_responsible_peers(&self, _space_id: &SpaceId) -> Result<Vec<PeerId>, PeerManagerError> {
        *self.call_count.lock().unwrap() += 1;
        self.peers.lock().unwrap().clone()
    }
}
