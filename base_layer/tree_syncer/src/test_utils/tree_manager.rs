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
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use crate::{
    CancelReason,
    ObjectTree,
    PeerId,
    SpaceId,
    SyncContext,
    SyncTree,
    TreeId,
    TreeManager,
    TreeManagerError,
};

/// A call observed by the [MockTreeManager]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `get_tree` was called. `has_deadline` is true for tree requests and false for head updates.
    GetTree {
        peer_id: PeerId,
        tree_id: TreeId,
        has_deadline: bool,
    },
    SyncWithPeer { peer_id: PeerId, tree_id: TreeId },
    /// A blocked `get_tree` call observed cancellation of its context
    Cancelled {
        peer_id: PeerId,
        tree_id: TreeId,
        reason: CancelReason,
    },
}

/// How the mock responds to `get_tree` for a given tree
#[derive(Debug, Clone)]
pub enum MockTreeBehaviour {
    /// Returns a tree that supports sync with peer
    Syncable,
    /// Returns a tree that does not support sync with peer
    NotSyncable,
    /// Returns a syncable derived tree holding only its root change
    DerivedEmpty,
    Fail(TreeManagerError),
    Panic,
    /// Blocks until the context is cancelled
    WaitForCancel,
    /// Blocks until a permit is available or the context is cancelled, then returns a syncable tree. The permit is
    /// consumed.
    Gate(Arc<Semaphore>),
}

#[derive(Debug)]
struct State {
    default_behaviour: MockTreeBehaviour,
    behaviours: HashMap<TreeId, MockTreeBehaviour>,
    calls: Vec<MockCall>,
    contexts: Vec<SyncContext>,
    active_get_tree: usize,
    peak_get_tree: usize,
    subscribers: Vec<mpsc::UnboundedSender<MockCall>>,
}

#[derive(Debug, Clone)]
pub struct MockTreeManager {
    state: Arc<Mutex<State>>,
}

impl MockTreeManager {
    pub fn new() -> Self {
        Self::with_default_behaviour(MockTreeBehaviour::Syncable)
    }

    pub fn with_default_behaviour(behaviour: MockTreeBehaviour) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                default_behaviour: behaviour,
                behaviours: HashMap::new(),
                calls: Vec::new(),
                contexts: Vec::new(),
                active_get_tree: 0,
                peak_get_tree: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn set_behaviour<T: Into<TreeId>>(&self, tree_id: T, behaviour: MockTreeBehaviour) {
        self.lock().behaviours.insert(tree_id.into(), behaviour);
    }

    /// Returns a receiver of every call made from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<MockCall> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn get_tree_calls(&self) -> Vec<(PeerId, TreeId)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::GetTree { peer_id, tree_id, .. } => Some((peer_id.clone(), tree_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count_get_tree(&self, peer_id: &str, tree_id: &str) -> usize {
        self.get_tree_calls()
            .iter()
            .filter(|(p, t)| p == peer_id && t == tree_id)
            .count()
    }

    pub fn sync_calls(&self) -> Vec<(PeerId, TreeId)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::SyncWithPeer { peer_id, tree_id } => Some((peer_id.clone(), tree_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn num_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// The contexts passed to every `get_tree` call so far
    pub fn contexts(&self) -> Vec<SyncContext> {
        self.lock().contexts.clone()
    }

    /// The number of `get_tree` calls that have not yet returned
    pub fn num_active(&self) -> usize {
        self.lock().active_get_tree
    }

    /// The highest number of concurrent `get_tree` calls seen
    pub fn peak_active(&self) -> usize {
        self.lock().peak_get_tree
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: MockCall) {
        let mut state = self.lock();
        state.subscribers.retain(|tx| tx.send(call.clone()).is_ok());
        state.calls.push(call);
    }

    fn behaviour_for(&self, tree_id: &TreeId) -> MockTreeBehaviour {
        let state = self.lock();
        state
            .behaviours
            .get(tree_id)
            .cloned()
            .unwrap_or_else(|| state.default_behaviour.clone())
    }

    fn new_tree(&self, tree_id: &TreeId, syncable: bool) -> Arc<dyn ObjectTree> {
        Arc::new(MockTree {
            id: tree_id.clone(),
            root_id: TreeId::new(format!("{}.root", tree_id)),
            is_derived: false,
            len: 2,
            syncable,
            manager: self.clone(),
        })
    }

    async fn wait_for_cancel(&self, ctx: &SyncContext, tree_id: &TreeId) -> TreeManagerError {
        let reason = ctx.cancelled().await;
        self.record(MockCall::Cancelled {
            peer_id: ctx.peer_id().clone(),
            tree_id: tree_id.clone(),
            reason,
        });
        reason.into()
    }
}

impl Default for MockTreeManager {
    fn default() -> Self {
        Self::new()
    }
}

struct ActiveGuard<'a> {
    manager: &'a MockTreeManager,
}

impl<'a> ActiveGuard<'a> {
    fn enter(manager: &'a MockTreeManager) -> Self {
        let mut state = manager.lock();
        state.active_get_tree += 1;
        state.peak_get_tree = state.peak_get_tree.max(state.active_get_tree);
        Self { manager }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.manager.state.lock() {
            state.active_get_tree -= 1;
        }
    }
}

#[async_trait]
impl TreeManager for MockTreeManager {
    async fn get_tree(
        &self,
        ctx: &SyncContext,
        _space_id: &SpaceId,
        tree_id: &TreeId,
    ) -> Result<Arc<dyn ObjectTree>, TreeManagerError> {
        let _guard = ActiveGuard::enter(self);
        self.lock().contexts.push(ctx.clone());
        self.record(MockCall::GetTree {
            peer_id: ctx.peer_id().clone(),
            tree_id: tree_id.clone(),
            has_deadline: ctx.deadline().is_some(),
        });

        match self.behaviour_for(tree_id) {
            MockTreeBehaviour::Syncable => Ok(self.new_tree(tree_id, true)),
            MockTreeBehaviour::NotSyncable => Ok(self.new_tree(tree_id, false)),
            MockTreeBehaviour::DerivedEmpty => Ok(Arc::new(MockTree {
                id: tree_id.clone(),
                root_id: tree_id.clone(),
                is_derived: true,
                len: 1,
                syncable: true,
                manager: self.clone(),
            })),
            MockTreeBehaviour::Fail(err) => Err(err),
            MockTreeBehaviour::Panic => panic!("mock tree manager panicked on tree {}", tree_id),
            MockTreeBehaviour::WaitForCancel => Err(self.wait_for_cancel(ctx, tree_id).await),
            MockTreeBehaviour::Gate(gate) => {
                tokio::select! {
                    biased;
                    err = self.wait_for_cancel(ctx, tree_id) => Err(err),
                    permit = gate.acquire() => {
                        permit.unwrap().forget();
                        Ok(self.new_tree(tree_id, true))
                    },
                }
            },
        }
    }
}

pub struct MockTree {
    id: TreeId,
    root_id: TreeId,
    is_derived: bool,
    len: usize,
    syncable: bool,
    manager: MockTreeManager,
}

impl ObjectTree for MockTree {
    fn id(&self) -> &TreeId {
        &self.id
    }

    fn root_id(&self) -> &TreeId {
        &self.root_id
    }

    fn is_derived(&self) -> bool {
        self.is_derived
    }

    fn len(&self) -> usize {
        self.len
    }

    fn as_sync_tree(&self) -> Option<&dyn SyncTree> {
        if self.syncable {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl SyncTree for MockTree {
    async fn sync_with_peer(&self, ctx: &SyncContext, peer_id: &PeerId) -> Result<(), TreeManagerError> {
        if let Some(reason) = ctx.cancel_reason() {
            return Err(reason.into());
        }
        self.manager.record(MockCall::SyncWithPeer {
            peer_id: peer_id.clone(),
            tree_id: self.id.clone(),
        });
        Ok(())
    }
}
