// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed data cache: per-type latest value plus bounded history.
//!
//! Emitted values are uniquely constructed and promoted to shared
//! ownership on entry. Readers copy an `Arc` out under the slot lock and
//! never hold any lock while user code runs. The cache also stores
//! *linked* values: data recorded against the task that produced it, so a
//! descendant task can prefer its ancestor's output over the global
//! latest.

use crate::id::{ReactionId, TaskId};
use crate::message::{Message, TypeInterner, TypeKey};
use crate::task::Cause;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

type Shared = Arc<dyn Any + Send + Sync>;

/// One node in a cause chain.
///
/// Every task owns a node; the node's parent is the producing task's node.
/// Values emitted while the task runs are linked here. The chain keeps
/// ancestors alive exactly as long as a descendant task could still
/// consult them.
pub struct CauseNode {
    reaction: ReactionId,
    task: TaskId,
    parent: Option<Arc<CauseNode>>,
    linked: Mutex<HashMap<TypeKey, Shared>>,
}

impl std::fmt::Debug for CauseNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CauseNode")
            .field("reaction", &self.reaction)
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

impl CauseNode {
    pub fn new(reaction: ReactionId, task: TaskId, parent: Option<Arc<CauseNode>>) -> Arc<Self> {
        Arc::new(Self { reaction, task, parent, linked: Mutex::new(HashMap::new()) })
    }

    pub fn cause(&self) -> Cause {
        Cause { reaction: self.reaction, task: self.task }
    }

    pub fn parent(&self) -> Option<&Arc<CauseNode>> {
        self.parent.as_ref()
    }

    /// Record a value produced while this task was running.
    pub fn link(&self, key: TypeKey, value: Shared) {
        self.linked.lock().insert(key, value);
    }

    /// Walk this node and its ancestors for a linked value of `key`.
    fn lookup(&self, key: TypeKey) -> Option<Shared> {
        let mut node = Some(self);
        while let Some(current) = node {
            if let Some(value) = current.linked.lock().get(&key) {
                return Some(value.clone());
            }
            node = current.parent.as_deref();
        }
        None
    }
}

/// Per-type storage slot: a ring of shared values, newest at the front.
#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
}

struct SlotState {
    capacity: usize,
    ring: VecDeque<Shared>,
}

impl Default for SlotState {
    fn default() -> Self {
        Self { capacity: 1, ring: VecDeque::with_capacity(1) }
    }
}

/// The plant's typed data cache.
pub struct DataCache {
    interner: Arc<TypeInterner>,
    slots: RwLock<Vec<Arc<Slot>>>,
}

impl std::fmt::Debug for DataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataCache")
            .field("types", &self.slots.read().len())
            .finish_non_exhaustive()
    }
}

impl DataCache {
    pub fn new(interner: Arc<TypeInterner>) -> Self {
        Self { interner, slots: RwLock::new(Vec::new()) }
    }

    pub fn interner(&self) -> &Arc<TypeInterner> {
        &self.interner
    }

    /// Replace the latest value for `T`, pushing it onto the history ring.
    ///
    /// Returns the shared handle so the emitter can hand the same
    /// allocation to interested reactions.
    pub fn store<T: Message>(&self, value: T) -> Arc<T> {
        let shared = Arc::new(value);
        self.store_shared(self.interner.key_of::<T>(), shared.clone());
        shared
    }

    /// Store an already-shared value under `key`.
    pub fn store_shared(&self, key: TypeKey, value: Shared) {
        let slot = self.slot(key);
        let mut state = slot.state.lock();
        state.ring.push_front(value);
        let capacity = state.capacity;
        state.ring.truncate(capacity);
    }

    /// The most recently stored value for `T`, or `None` if nothing has
    /// ever been stored (the no-data condition).
    pub fn latest<T: Message>(&self) -> Option<Arc<T>> {
        let key = self.interner.get::<T>()?;
        let slot = self.slot(key);
        let front = slot.state.lock().ring.front()?.clone();
        front.downcast::<T>().ok()
    }

    /// Up to `n` most recent values for `T`, newest first.
    pub fn history<T: Message>(&self, n: usize) -> Vec<Arc<T>> {
        let Some(key) = self.interner.get::<T>() else {
            return Vec::new();
        };
        let slot = self.slot(key);
        let state = slot.state.lock();
        state.ring.iter().take(n).filter_map(|v| v.clone().downcast::<T>().ok()).collect()
    }

    /// Grow the history ring for `T` to hold at least `n` values.
    pub fn ensure_history<T: Message>(&self, n: usize) {
        let slot = self.slot(self.interner.key_of::<T>());
        let mut state = slot.state.lock();
        state.capacity = state.capacity.max(n.max(1));
    }

    /// Linked lookup: prefer a value of `T` produced along `cause`'s
    /// chain, falling back to the global latest when the chain has none.
    pub fn linked<T: Message>(&self, cause: Option<&CauseNode>) -> Option<Arc<T>> {
        if let Some(node) = cause {
            if let Some(key) = self.interner.get::<T>() {
                if let Some(value) = node.lookup(key) {
                    if let Ok(typed) = value.downcast::<T>() {
                        return Some(typed);
                    }
                }
            }
        }
        self.latest::<T>()
    }

    /// The slot for `key`, growing the table if this key is new.
    fn slot(&self, key: TypeKey) -> Arc<Slot> {
        {
            let slots = self.slots.read();
            if let Some(slot) = slots.get(key.index()) {
                return slot.clone();
            }
        }
        let mut slots = self.slots.write();
        while slots.len() <= key.index() {
            slots.push(Arc::new(Slot::default()));
        }
        slots[key.index()].clone()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
