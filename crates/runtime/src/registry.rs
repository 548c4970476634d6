// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reaction registry: message-type key to interested reactions.
//!
//! Buckets are append-ordered; insertion order is the tie-break when
//! priorities and emit times are equal. Lookups snapshot the bucket under
//! a read lock and iterate without holding it, so unbinding during an
//! in-flight emission is safe: the unbound reaction is skipped by the
//! task constructor, and the removal is observable no later than the next
//! emission.

use parking_lot::RwLock;
use reflex_core::{Reaction, ReactionId, TypeKey};
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct Registry {
    buckets: RwLock<Vec<Arc<RwLock<Vec<Arc<Reaction>>>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `reaction` to the interest list for `key`.
    pub fn bind(&self, key: TypeKey, reaction: Arc<Reaction>) {
        self.bucket(key).write().push(reaction);
    }

    /// Remove one reaction from the interest list for `key`.
    pub fn unbind(&self, key: TypeKey, id: ReactionId) {
        self.bucket(key).write().retain(|r| r.id() != id);
    }

    /// Snapshot of the reactions interested in `key`, in insertion order.
    ///
    /// Disabled reactions are included; skipping them is the task
    /// constructor's job.
    pub fn interested(&self, key: TypeKey) -> Vec<Arc<Reaction>> {
        let buckets = self.buckets.read();
        match buckets.get(key.index()) {
            Some(bucket) => bucket.read().clone(),
            None => Vec::new(),
        }
    }

    /// Whether any reaction is interested in `key`.
    pub fn has_interest(&self, key: TypeKey) -> bool {
        let buckets = self.buckets.read();
        buckets.get(key.index()).is_some_and(|bucket| !bucket.read().is_empty())
    }

    fn bucket(&self, key: TypeKey) -> Arc<RwLock<Vec<Arc<Reaction>>>> {
        {
            let buckets = self.buckets.read();
            if let Some(bucket) = buckets.get(key.index()) {
                return bucket.clone();
            }
        }
        let mut buckets = self.buckets.write();
        while buckets.len() <= key.index() {
            buckets.push(Arc::new(RwLock::new(Vec::new())));
        }
        buckets[key.index()].clone()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
