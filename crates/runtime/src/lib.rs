// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! reflex-runtime: the dispatch engine of the reflex runtime.
//!
//! Owns the reaction registry, the priority- and group-aware thread
//! pools, the subscription DSL, the timer and IO services, and the
//! [`Plant`] facade that ties them together.

pub mod dsl;
pub mod plant;
pub mod reactor;

mod chrono;
mod dispatch;
mod io;
mod pool;
mod registry;
mod sync_group;

pub use dsl::{
    always, every, io_source, last, linked, optional, per, shutdown, startup, tcp, trigger, udp,
    udp_broadcast, udp_multicast, watchdog, with, Always, BindContext, OnBuilder, Source,
    SourceFn, SourceSet,
};
pub use plant::{Plant, PlantConfig, PoolSpec};
pub use reactor::{Environment, Reactor};
