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

//! # Tree Syncer
//!
//! Per-peer scheduling of object tree synchronization for a single space.
//!
//! For every remote peer the local node talks to, the [TreeSyncer] owns a [PeerLane]: a pair of bounded
//! [WorkPool]s. Trees the local node already holds are queued on the lane's head pool, where they are
//! synchronized with the peer one at a time. Trees the local node is missing are queued on the lane's fetch pool,
//! where up to `fetch_concurrency` of them are requested from the peer concurrently. Both pools deduplicate by tree
//! id, so a tree that is already scheduled or running for a peer is not scheduled again.
//!
//! All I/O is delegated to a [TreeManager]. Every task receives a [SyncContext] which carries the peer id and is
//! cancelled when the syncer is closed (and, for fetches, when `request_timeout` elapses).
//!
//! ```text
//!  sync_all(peer, existing, missing)
//!          |
//!          v
//!   +------------------- PeerLane(peer) -------------------+
//!   |  head pool (1 worker)       fetch pool (N workers)   |
//!   |  existing ids -> update     missing ids -> request   |
//!   +------------------------------------------------------+
//!          |                              |
//!          v                              v
//!   TreeManager::get_tree +        TreeManager::get_tree
//!   SyncTree::sync_with_peer       (bounded by request_timeout)
//! ```

#[macro_use]
mod macros;

mod config;
pub use self::config::{
    serializers,
    TreeSyncConfig,
    DEFAULT_FETCH_CONCURRENCY,
    DEFAULT_HEAD_CONCURRENCY,
    DEFAULT_REQUEST_TIMEOUT,
};

mod context;
pub use context::{CancelReason, SyncContext};

mod error;
pub use error::TreeSyncerError;

mod factory;
pub use factory::{TreeSyncerFactory, TreeSyncerRegistry};

mod peer_lane;
pub use peer_lane::PeerLane;

mod services;
pub use services::{
    NodeConfiguration,
    PeerManager,
    PeerManagerError,
    SpaceSettings,
    SyncDetailsUpdater,
    SyncServices,
    SyncedTreeRemover,
};

mod syncer;
pub use syncer::{SyncerStatus, TreeSyncer, TreeSyncerBuilder};

mod tree_manager;
pub use tree_manager::{is_empty_derived_tree, ObjectTree, SyncTree, TreeManager, TreeManagerError};

mod types;
pub use types::{PeerId, SpaceId, TreeId};

pub mod work_pool;
pub use work_pool::{PoolStatus, WorkPool, WorkPoolError};

#[cfg(any(test, feature = "test-mocks"))]
pub mod test_utils;
