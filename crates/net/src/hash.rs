// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! 128-bit message-type hashes for the wire protocol.
//!
//! The hash is the truncated SHA-256 of the type's stable name, so two
//! processes built from the same source agree on every hash without any
//! registration handshake.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identity of a message type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeHash([u8; 16]);

impl TypeHash {
    pub fn of<T: 'static>() -> Self {
        Self::from_name(std::any::type_name::<T>())
    }

    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Display for TypeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "hash_tests.rs"]
mod tests;
