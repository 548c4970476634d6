// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message type identity.
//!
//! Any `Send + Sync + 'static` value is a message. At runtime each message
//! type is assigned a dense integer key on first use; the cache and the
//! reaction registry index their tables by that key. The interner is owned
//! by the plant, so two plants in one process keep fully independent
//! keyspaces.

use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;

/// Marker trait for anything that can be emitted.
pub trait Message: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Message for T {}

/// Dense per-plant key for a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey(u32);

impl TypeKey {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Assigns dense keys to message types on first use.
#[derive(Debug, Default)]
pub struct TypeInterner {
    inner: RwLock<InternerState>,
}

#[derive(Debug, Default)]
struct InternerState {
    keys: HashMap<TypeId, TypeKey>,
    names: Vec<&'static str>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// The key for `T`, assigning one if this is the first use.
    pub fn key_of<T: Message>(&self) -> TypeKey {
        let id = TypeId::of::<T>();
        if let Some(key) = self.inner.read().keys.get(&id) {
            return *key;
        }
        let mut state = self.inner.write();
        // Racing callers may have inserted between the read and write lock.
        if let Some(key) = state.keys.get(&id) {
            return *key;
        }
        let key = TypeKey(state.names.len() as u32);
        state.names.push(std::any::type_name::<T>());
        state.keys.insert(id, key);
        key
    }

    /// The key for `T` if it has ever been used, without assigning one.
    pub fn get<T: Message>(&self) -> Option<TypeKey> {
        self.inner.read().keys.get(&TypeId::of::<T>()).copied()
    }

    /// Human-readable name for a key, for logs and diagnostics.
    pub fn name(&self, key: TypeKey) -> &'static str {
        self.inner.read().names.get(key.index()).copied().unwrap_or("<unknown type>")
    }

    /// Number of distinct types seen so far.
    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
