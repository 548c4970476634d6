// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pools and their priority queues.
//!
//! Each pool owns its mutex, condition variable and workers; there is no
//! work-stealing across pools. Idle-priority tasks sit in a tail queue
//! consulted only when the main queue is empty. Draining pools keep
//! accepting submissions so in-flight sync chains can finish; workers
//! exit once the queues are empty.

use crate::plant::Core;
use parking_lot::{Condvar, Mutex};
use reflex_core::{CauseNode, PoolId, Priority, Task};
use smol_str::SmolStr;
use std::cell::RefCell;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::thread::JoinHandle;

thread_local! {
    static CURRENT_NODE: RefCell<Option<Arc<CauseNode>>> = const { RefCell::new(None) };
}

/// The cause-chain node of the task running on this thread, if any.
pub(crate) fn current_node() -> Option<Arc<CauseNode>> {
    CURRENT_NODE.with(|slot| slot.borrow().clone())
}

pub(crate) fn set_current_node(node: Option<Arc<CauseNode>>) {
    CURRENT_NODE.with(|slot| *slot.borrow_mut() = node);
}

#[derive(Debug, Default)]
struct PoolState {
    ready: BinaryHeap<Task>,
    idle: BinaryHeap<Task>,
    draining: bool,
}

pub(crate) struct ThreadPool {
    id: PoolId,
    name: SmolStr,
    concurrency: usize,
    state: Mutex<PoolState>,
    available: Condvar,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(id: PoolId, name: impl Into<SmolStr>, concurrency: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            concurrency: concurrency.max(1),
            state: Mutex::new(PoolState::default()),
            available: Condvar::new(),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn name(&self) -> &SmolStr {
        &self.name
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Queue a task and wake at most one worker.
    pub fn submit(&self, task: Task) {
        let mut state = self.state.lock();
        if task.priority() == Priority::Idle {
            state.idle.push(task);
        } else {
            state.ready.push(task);
        }
        drop(state);
        self.available.notify_one();
    }

    /// Block until a task is available.
    ///
    /// Returns `None` once the pool is draining and both queues are
    /// empty, which tells the worker to exit.
    pub fn next(&self) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.ready.pop() {
                return Some(task);
            }
            if let Some(task) = state.idle.pop() {
                return Some(task);
            }
            if state.draining {
                return None;
            }
            self.available.wait(&mut state);
        }
    }

    /// Begin draining: workers finish the queues and exit.
    pub fn drain(&self) {
        self.state.lock().draining = true;
        self.available.notify_all();
    }

    /// Spawn this pool's workers. Idempotent per pool.
    pub fn spawn_workers(self: &Arc<Self>, core: &Arc<Core>) {
        let mut workers = self.workers.lock();
        if !workers.is_empty() {
            return;
        }
        for index in 0..self.concurrency {
            let pool = self.clone();
            let core = core.clone();
            let name = format!("reflex-{}-{}", self.name, index);
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&core, &pool));
            match handle {
                Ok(handle) => workers.push(handle),
                Err(error) => tracing::error!(worker = %name, %error, "failed to spawn worker"),
            }
        }
    }

    /// Wait for every worker of this pool to exit.
    pub fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// Run a pool's dispatch loop on the current thread.
pub(crate) fn worker_loop(core: &Arc<Core>, pool: &Arc<ThreadPool>) {
    tracing::debug!(pool = %pool.name(), "worker started");
    while let Some(task) = pool.next() {
        core.run_task(task);
    }
    tracing::debug!(pool = %pool.name(), "worker exited");
}

/// All pools of one plant.
pub(crate) struct PoolSet {
    default_pool: Arc<ThreadPool>,
    main_pool: Arc<ThreadPool>,
    named: Mutex<HashMap<PoolId, Arc<ThreadPool>>>,
}

impl PoolSet {
    pub fn new(default_concurrency: usize) -> Self {
        Self {
            default_pool: ThreadPool::new(PoolId::Default, "default", default_concurrency),
            main_pool: ThreadPool::new(PoolId::Main, "main", 1),
            named: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_pool(&self) -> &Arc<ThreadPool> {
        &self.default_pool
    }

    pub fn main_pool(&self) -> &Arc<ThreadPool> {
        &self.main_pool
    }

    pub fn get(&self, id: PoolId) -> Arc<ThreadPool> {
        match id {
            PoolId::Default => self.default_pool().clone(),
            PoolId::Main => self.main_pool().clone(),
            other => self
                .named
                .lock()
                .get(&other)
                .cloned()
                .unwrap_or_else(|| self.default_pool.clone()),
        }
    }

    /// Declare a named (or dedicated) pool, creating it on first use.
    ///
    /// Returns the existing concurrency when redeclared differently; the
    /// caller turns that into a bind error.
    pub fn declare(
        &self,
        id: PoolId,
        name: impl Into<SmolStr>,
        concurrency: usize,
    ) -> Result<Arc<ThreadPool>, usize> {
        let mut named = self.named.lock();
        if let Some(existing) = named.get(&id) {
            if existing.concurrency() != concurrency {
                return Err(existing.concurrency());
            }
            return Ok(existing.clone());
        }
        let pool = ThreadPool::new(id, name, concurrency);
        named.insert(id, pool.clone());
        Ok(pool)
    }

    /// Every pool except main, whose loop runs on the start thread.
    pub fn worker_pools(&self) -> Vec<Arc<ThreadPool>> {
        let mut pools = vec![self.default_pool.clone()];
        pools.extend(self.named.lock().values().cloned());
        pools
    }

    pub fn all(&self) -> Vec<Arc<ThreadPool>> {
        let mut pools = self.worker_pools();
        pools.push(self.main_pool.clone());
        pools
    }
}

impl std::fmt::Debug for PoolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSet").field("default", &self.default_pool).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
