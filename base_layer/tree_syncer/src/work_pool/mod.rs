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

//! A keyed, bounded worker pool.
//!
//! A [WorkPool] runs submitted jobs on a fixed number of tokio tasks, in submission order. Every job carries a key
//! and at most one job per key is queued or running at a time. Submitting a job whose key is already in flight is a
//! silent no-op. A key is released once its job has finished, failed or panicked, or has been discarded on close.

mod error;
pub use error::WorkPoolError;


use std::{
    collections::HashSet,
    fmt,
    future::Future,
    mem,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use futures::{future, future::BoxFuture, FutureExt};
use log::*;
use tokio::{
    runtime::Handle,
    sync::{mpsc, Mutex as AsyncMutex},
    task::JoinHandle,
};

const LOG_TARGET: &str = "tree_syncer::work_pool";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// Jobs are accepted and queued but no workers have been started
    Created,
    Running,
    /// No further jobs are accepted
    Closed,
}

impl PoolStatus {
    is_fn!(is_created, PoolStatus::Created);

    is_fn!(is_running, PoolStatus::Running);

    is_fn!(is_closed, PoolStatus::Closed);
}

struct QueuedJob {
    key: String,
    job: BoxFuture<'static, ()>,
}

type SharedReceiver = Arc<AsyncMutex<mpsc::UnboundedReceiver<QueuedJob>>>;

struct PoolState {
    status: PoolStatus,
    in_flight: HashSet<String>,
    num_queued: usize,
    sender: Option<mpsc::UnboundedSender<QueuedJob>>,
    receiver: Option<mpsc::UnboundedReceiver<QueuedJob>>,
    workers: Vec<JoinHandle<()>>,
}

struct Inner {
    name: String,
    num_workers: usize,
    max_queued: usize,
    state: Mutex<PoolState>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, key: &str) {
        self.lock_state().in_flight.remove(key);
    }
}

/// A fixed set of workers draining a FIFO queue of keyed jobs. Cloning returns another handle to the same pool.
///
/// Workers only hold a weak reference to the pool. Dropping the last handle closes the queue, so running workers
/// finish their current job and exit even if `close` was never called.
#[derive(Clone)]
pub struct WorkPool {
    inner: Arc<Inner>,
}

impl WorkPool {
    /// Creates a pool with `num_workers` workers and an unbounded queue. The workers are started by [WorkPool::run].
    pub fn new<T: Into<String>>(name: T, num_workers: usize) -> Self {
        Self::with_max_queued(name, num_workers, 0)
    }

    /// Creates a pool which holds at most `max_queued` jobs waiting to start. A `max_queued` of 0 is unbounded.
    pub fn with_max_queued<T: Into<String>>(name: T, num_workers: usize, max_queued: usize) -> Self {
        let name = name.into();
        let num_workers = if num_workers == 0 {
            warn!(
                target: LOG_TARGET,
                "Work pool '{}' configured with 0 workers. Using 1 worker instead.", name
            );
            1
        } else {
            num_workers
        };
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                name,
                num_workers,
                max_queued,
                state: Mutex::new(PoolState {
                    status: PoolStatus::Created,
                    in_flight: HashSet::new(),
                    num_queued: 0,
                    sender: Some(sender),
                    receiver: Some(receiver),
                    workers: Vec::new(),
                }),
            }),
        }
    }

    /// Queues `job` under `key`.
    ///
    /// Returns `Ok(())` without queuing anything if a job with the same key is already queued or running.
    pub fn try_add<K, F>(&self, key: K, job: F) -> Result<(), WorkPoolError>
    where
        K: Into<String>,
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let mut state = self.inner.lock_state();
        if state.status.is_closed() {
            return Err(WorkPoolError::PoolClosed);
        }
        if state.in_flight.contains(&key) {
            trace!(
                target: LOG_TARGET,
                "[{}] Job '{}' is already in flight. Ignoring.", self.inner.name, key
            );
            return Ok(());
        }
        if self.inner.max_queued > 0 && state.num_queued >= self.inner.max_queued {
            return Err(WorkPoolError::QueueFull {
                capacity: self.inner.max_queued,
            });
        }
        let sender = state.sender.as_ref().ok_or(WorkPoolError::PoolClosed)?;
        sender
            .send(QueuedJob {
                key: key.clone(),
                job: job.boxed(),
            })
            .map_err(|_| WorkPoolError::PoolClosed)?;
        trace!(target: LOG_TARGET, "[{}] Queued job '{}'", self.inner.name, key);
        state.in_flight.insert(key);
        state.num_queued += 1;
        Ok(())
    }

    /// Starts the workers on `runtime`. Jobs queued before this call start in submission order. Calling `run` on a
    /// running or closed pool does nothing.
    pub fn run(&self, runtime: &Handle) {
        let mut state = self.inner.lock_state();
        if !state.status.is_created() {
            return;
        }
        let receiver = match state.receiver.take() {
            Some(receiver) => receiver,
            None => return,
        };
        state.status = PoolStatus::Running;
        let receiver = Arc::new(AsyncMutex::new(receiver));
        state.workers = (0..self.inner.num_workers)
            .map(|_| {
                runtime.spawn(worker(
                    Arc::downgrade(&self.inner),
                    self.inner.name.clone(),
                    receiver.clone(),
                ))
            })
            .collect();
        debug!(
            target: LOG_TARGET,
            "[{}] Started {} worker(s) with {} job(s) queued",
            self.inner.name,
            self.inner.num_workers,
            state.num_queued
        );
    }

    /// Closes the pool. Queued jobs that have not started are discarded. Resolves once every worker has exited,
    /// i.e. once running jobs have returned. Closing a closed pool does nothing.
    pub async fn close(&self) {
        let workers = {
            let mut state = self.inner.lock_state();
            if !state.status.is_closed() {
                debug!(
                    target: LOG_TARGET,
                    "[{}] Closing with {} job(s) in flight", self.inner.name, state.in_flight.len()
                );
            }
            state.status = PoolStatus::Closed;
            state.sender = None;
            if state.receiver.take().is_some() {
                // Never started, nothing will drain the queue
                state.in_flight.clear();
                state.num_queued = 0;
            }
            mem::take(&mut state.workers)
        };

        for result in future::join_all(workers).await {
            if let Err(err) = result {
                if err.is_panic() {
                    warn!(target: LOG_TARGET, "[{}] Worker panicked: {}", self.inner.name, err);
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn num_workers(&self) -> usize {
        self.inner.num_workers
    }

    pub fn status(&self) -> PoolStatus {
        self.inner.lock_state().status
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    pub fn is_closed(&self) -> bool {
        self.status().is_closed()
    }

    /// The number of keys currently queued or running
    pub fn num_in_flight(&self) -> usize {
        self.inner.lock_state().in_flight.len()
    }

    /// The number of jobs waiting for a worker
    pub fn num_queued(&self) -> usize {
        self.inner.lock_state().num_queued
    }

    /// True if a job with `key` is queued or running
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock_state().in_flight.contains(key)
    }
}

impl fmt::Debug for WorkPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("WorkPool")
            .field("name", &self.inner.name)
            .field("num_workers", &self.inner.num_workers)
            .field("max_queued", &self.inner.max_queued)
            .field("status", &state.status)
            .field("in_flight", &state.in_flight.len())
            .field("num_queued", &state.num_queued)
            .finish()
    }
}

async fn worker(pool: Weak<Inner>, name: String, receiver: SharedReceiver) {
    loop {
        let next = receiver.lock().await.recv().await;
        let QueuedJob { key, job } = match next {
            Some(queued) => queued,
            None => break,
        };
        let inner = match pool.upgrade() {
            Some(inner) => inner,
            // Every pool handle was dropped
            None => break,
        };

        let is_closed = {
            let mut state = inner.lock_state();
            state.num_queued = state.num_queued.saturating_sub(1);
            state.status.is_closed()
        };
        if is_closed {
            debug!(target: LOG_TARGET, "[{}] Discarding job '{}'", name, key);
            drop(job);
            inner.release(&key);
            continue;
        }

        if let Err(err) = AssertUnwindSafe(job).catch_unwind().await {
            let msg = err
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| err.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<unknown>".to_string());
            warn!(target: LOG_TARGET, "[{}] Job '{}' panicked: {}", name, key, msg);
        }
        inner.release(&key);
    }
    trace!(target: LOG_TARGET, "[{}] Worker exited", name);
}
