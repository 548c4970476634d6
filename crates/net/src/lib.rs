// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! reflex-net: transparent multi-process pub/sub for reflex plants.
//!
//! Installs as an ordinary reactor ([`NetworkReactor`]) built from the
//! runtime's own UDP and timer words. Peers discover each other through
//! multicast announces (or static configuration), data packets carry a
//! 128-bit type hash plus a JSON payload behind a length-prefixed frame,
//! duplicates are dropped by a sliding window per peer, and reliable
//! sends are retransmitted on a Jacobson/Karels estimated timeout.

pub mod dedup;
pub mod hash;
pub mod rtt;
pub mod service;
pub mod wire;
pub mod words;

pub use dedup::PacketDeduplicator;
pub use hash::TypeHash;
pub use rtt::RttEstimator;
pub use service::{configure_network, EmitError, NetConfig, NetEmit, NetState, NetworkReactor};
pub use wire::{decode, encode, read_packet, write_packet, Packet, WireError};
pub use words::{network, FromNetwork, NetworkWord};
