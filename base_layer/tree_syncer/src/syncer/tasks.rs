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

//! Task bodies run on the peer lane pools.

use std::{sync::Arc, time::Duration};

use log::*;

use crate::{is_empty_derived_tree, SpaceId, SyncContext, TreeId, TreeManager, TreeManagerError};

const LOG_TARGET: &str = "tree_syncer::syncer::tasks";

/// Exchanges heads of a tree the local node already holds with the context peer.
pub(super) async fn update_head(
    tree_manager: Arc<dyn TreeManager>,
    space_id: SpaceId,
    tree_id: TreeId,
    ctx: SyncContext,
) {
    let tree = match tree_manager.get_tree(&ctx, &space_id, &tree_id).await {
        Ok(tree) => tree,
        Err(err) => {
            log_task_error("Head update", &ctx, &space_id, &tree_id, &err);
            return;
        },
    };

    let sync_tree = match tree.as_sync_tree() {
        Some(sync_tree) => sync_tree,
        None => {
            warn!(
                target: LOG_TARGET,
                "Tree does not support sync with peer: space={} peer={} tree={}",
                space_id,
                ctx.peer_id(),
                tree_id
            );
            return;
        },
    };

    match sync_tree.sync_with_peer(&ctx, ctx.peer_id()).await {
        Ok(()) => debug!(
            target: LOG_TARGET,
            "Head update complete: space={} peer={} tree={}",
            space_id,
            ctx.peer_id(),
            tree_id
        ),
        Err(err) => log_task_error("Head update", &ctx, &space_id, &tree_id, &err),
    }
}

/// Acquires a tree the local node is missing from the context peer, within `timeout`.
pub(super) async fn request_tree(
    tree_manager: Arc<dyn TreeManager>,
    space_id: SpaceId,
    tree_id: TreeId,
    ctx: SyncContext,
    timeout: Duration,
) {
    let ctx = ctx.with_timeout(timeout);
    let tree = match tree_manager.get_tree(&ctx, &space_id, &tree_id).await {
        Ok(tree) => tree,
        Err(err) => {
            log_task_error("Tree request", &ctx, &space_id, &tree_id, &err);
            return;
        },
    };
    debug!(
        target: LOG_TARGET,
        "Tree request complete: space={} peer={} tree={} len={}",
        space_id,
        ctx.peer_id(),
        tree_id,
        tree.len()
    );

    // The peer cannot tell we hold an empty derived tree unless we sync it
    if !is_empty_derived_tree(&*tree) {
        return;
    }
    if let Some(sync_tree) = tree.as_sync_tree() {
        if let Err(err) = sync_tree.sync_with_peer(&ctx, ctx.peer_id()).await {
            log_task_error("Empty tree sync", &ctx, &space_id, &tree_id, &err);
        }
    }
}

fn log_task_error(action: &str, ctx: &SyncContext, space_id: &SpaceId, tree_id: &TreeId, err: &TreeManagerError) {
    let is_shutdown = err.is_cancelled() || ctx.cancel_reason().map_or(false, |reason| reason.is_shutdown());
    if is_shutdown {
        debug!(
            target: LOG_TARGET,
            "{} cancelled: space={} peer={} tree={} error={}",
            action,
            space_id,
            ctx.peer_id(),
            tree_id,
            err
        );
    } else {
        warn!(
            target: LOG_TARGET,
            "{} failed: space={} peer={} tree={} error={}",
            action,
            space_id,
            ctx.peer_id(),
            tree_id,
            err
        );
    }
}
