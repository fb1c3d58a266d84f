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

use futures::future;
use tokio::runtime::Handle;

use crate::{PeerId, TreeSyncConfig, WorkPool};

/// The pair of work pools serving a single remote peer.
///
/// Head exchanges for trees the local node already holds run on the head pool. Requests for trees the local node is
/// missing run on the fetch pool. Both pools are keyed by tree id.
#[derive(Debug, Clone)]
pub struct PeerLane {
    peer_id: PeerId,
    head_pool: WorkPool,
    fetch_pool: WorkPool,
}

impl PeerLane {
    pub fn new(peer_id: PeerId, config: &TreeSyncConfig) -> Self {
        let head_pool = WorkPool::with_max_queued(
            format!("head:{}", peer_id),
            config.head_concurrency,
            config.max_queued_tasks,
        );
        let fetch_pool = WorkPool::with_max_queued(
            format!("fetch:{}", peer_id),
            config.fetch_concurrency,
            config.max_queued_tasks,
        );
        Self {
            peer_id,
            head_pool,
            fetch_pool,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn head_pool(&self) -> &WorkPool {
        &self.head_pool
    }

    pub fn fetch_pool(&self) -> &WorkPool {
        &self.fetch_pool
    }

    /// Starts both pools on `runtime`. Idempotent.
    pub fn run(&self, runtime: &Handle) {
        self.head_pool.run(runtime);
        self.fetch_pool.run(runtime);
    }

    /// Closes both pools concurrently, resolving once the running tasks of both have returned.
    pub async fn close(&self) {
        future::join(self.head_pool.close(), self.fetch_pool.close()).await;
    }

    pub fn is_closed(&self) -> bool {
        self.head_pool.is_closed() && self.fetch_pool.is_closed()
    }
}
