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

use std::{cmp, fmt, future::Future, time::Duration};

use tokio::time::{self, Instant};
use treesync_shutdown::ShutdownSignal;

use crate::PeerId;

/// The reason a [SyncContext] was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The owning tree syncer was closed
    Shutdown,
    /// The context deadline elapsed
    DeadlineExceeded,
}

impl CancelReason {
    is_fn!(is_shutdown, CancelReason::Shutdown);

    is_fn!(is_deadline_exceeded, CancelReason::DeadlineExceeded);
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Shutdown => f.write_str("context cancelled"),
            CancelReason::DeadlineExceeded => f.write_str("context deadline exceeded"),
        }
    }
}

/// Context passed to every sync task and on to the [TreeManager](crate::TreeManager).
///
/// Carries the id of the peer the task was scheduled for, the root shutdown signal of the tree syncer and an
/// optional deadline. Cloning is cheap. Derived contexts can only tighten the deadline, never extend it.
#[derive(Debug, Clone)]
pub struct SyncContext {
    peer_id: PeerId,
    signal: ShutdownSignal,
    deadline: Option<Instant>,
}

impl SyncContext {
    pub fn new(peer_id: PeerId, signal: ShutdownSignal) -> Self {
        Self {
            peer_id,
            signal,
            deadline: None,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns a child context that is additionally cancelled once `timeout` has elapsed from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a child context that is additionally cancelled at `deadline`. If this context already has an earlier
    /// deadline, that one is kept.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = self.deadline.map_or(deadline, |current| cmp::min(current, deadline));
        Self {
            peer_id: self.peer_id.clone(),
            signal: self.signal.clone(),
            deadline: Some(deadline),
        }
    }

    /// Returns the reason this context is cancelled, or None if it is still live. Shutdown takes precedence over the
    /// deadline.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        if self.signal.is_triggered() {
            return Some(CancelReason::Shutdown);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_reason().is_some()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) -> CancelReason {
        let mut signal = self.signal.clone();
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = signal.wait() => CancelReason::Shutdown,
                    _ = time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            },
            None => {
                signal.wait().await;
                CancelReason::Shutdown
            },
        }
    }

    /// Drives `fut` to completion unless the context is cancelled first.
    pub async fn run_until_cancelled<F: Future>(&self, fut: F) -> Result<F::Output, CancelReason> {
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(reason),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod test {
    use futures::future;
    use treesync_shutdown::Shutdown;

    use super::*;

    fn new_context() -> (Shutdown, SyncContext) {
        let shutdown = Shutdown::new();
        let ctx = SyncContext::new(PeerId::new("peerA"), shutdown.to_signal());
        (shutdown, ctx)
    }

    #[tokio::test]
    async fn it_is_cancelled_by_shutdown() {
        let (mut shutdown, ctx) = new_context();
        let child = ctx.with_timeout(Duration::from_secs(60));
        assert!(!ctx.is_cancelled());
        assert!(!child.is_cancelled());

        shutdown.trigger();
        assert_eq!(ctx.cancel_reason(), Some(CancelReason::Shutdown));
        assert_eq!(child.cancelled().await, CancelReason::Shutdown);
    }

    #[tokio::test]
    async fn it_is_cancelled_by_deadline() {
        let (_shutdown, ctx) = new_context();
        let child = ctx.with_timeout(Duration::from_millis(50));
        let started = Instant::now();
        assert_eq!(child.cancelled().await, CancelReason::DeadlineExceeded);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(child.is_cancelled());
        assert!(!ctx.is_cancelled());
    }

    #[tokio::test]
    async fn it_keeps_the_earlier_deadline() {
        let (_shutdown, ctx) = new_context();
        let short = ctx.with_timeout(Duration::from_millis(10));
        let derived = short.with_timeout(Duration::from_secs(60));
        assert_eq!(derived.deadline(), short.deadline());
        assert_eq!(derived.peer_id(), "peerA");
    }

    #[tokio::test]
    async fn it_runs_until_cancelled() {
        let (mut shutdown, ctx) = new_context();
        assert_eq!(ctx.run_until_cancelled(async { 123 }).await, Ok(123));

        shutdown.trigger();
        let result = ctx.run_until_cancelled(future::pending::<()>()).await;
        assert_eq!(result, Err(CancelReason::Shutdown));
    }
}
