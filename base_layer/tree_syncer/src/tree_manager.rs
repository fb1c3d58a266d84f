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

//! The contract between the tree syncer and the component that owns local trees and performs the network I/O.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{CancelReason, PeerId, SpaceId, SyncContext, TreeId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeManagerError {
    #[error("Tree `{0}` not found")]
    NotFound(TreeId),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("Tree `{0}` does not support sync with peer")]
    NotSyncable(TreeId),
    #[error("Peer `{0}` is unavailable")]
    PeerUnavailable(PeerId),
    #[error("Tree manager error: {0}")]
    Other(String),
}

impl TreeManagerError {
    /// True if the error was caused by the tree syncer shutting down.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TreeManagerError::Cancelled)
    }
}

impl From<CancelReason> for TreeManagerError {
    fn from(reason: CancelReason) -> Self {
        match reason {
            CancelReason::Shutdown => TreeManagerError::Cancelled,
            CancelReason::DeadlineExceeded => TreeManagerError::DeadlineExceeded,
        }
    }
}

/// Provides trees to the tree syncer.
///
/// For a tree that is present locally `get_tree` is a cache lookup plus any head loading. For a missing tree it
/// acquires the tree over the network, bounded by the given context.
#[async_trait]
pub trait TreeManager: Send + Sync + 'static {
    async fn get_tree(
        &self,
        ctx: &SyncContext,
        space_id: &SpaceId,
        tree_id: &TreeId,
    ) -> Result<Arc<dyn ObjectTree>, TreeManagerError>;
}

/// A handle to a local object tree.
pub trait ObjectTree: Send + Sync {
    fn id(&self) -> &TreeId;

    /// The id of the root change of this tree
    fn root_id(&self) -> &TreeId;

    /// True if the tree id is derived from its contents rather than randomly generated.
    fn is_derived(&self) -> bool;

    /// The number of changes in the tree
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the head exchange capability if this tree supports it.
    fn as_sync_tree(&self) -> Option<&dyn SyncTree> {
        None
    }
}

/// Head exchange with a single peer.
#[async_trait]
pub trait SyncTree: Send + Sync {
    async fn sync_with_peer(&self, ctx: &SyncContext, peer_id: &PeerId) -> Result<(), TreeManagerError>;
}

/// A derived tree which contains nothing but its root change. Peers can only learn that we hold one of these when we
/// sync it with them explicitly.
pub fn is_empty_derived_tree(tree: &dyn ObjectTree) -> bool {
    tree.is_derived() && tree.len() == 1 && tree.root_id() == tree.id()
}
