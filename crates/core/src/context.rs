// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Context handed to a reaction's argument-assembly phase.
//!
//! Assembled by the dispatcher in the emitting thread. Besides the cache
//! it carries the out-of-band payloads that service threads attach to a
//! dispatch (IO readiness, datagrams, timer ticks); a context built for a
//! plain local emission leaves those empty.

use crate::cache::{CauseNode, DataCache};
use crate::messages::{Datagram, IoEvent, TcpConnection};
use std::sync::Arc;
use std::time::Instant;

/// Inputs available to the `fetch` phase of each source word.
pub struct FetchContext<'a> {
    pub cache: &'a DataCache,
    /// Cause-chain node of the producing task, when the emission came from
    /// inside a running task.
    pub cause: Option<Arc<CauseNode>>,
    /// Readiness event, set only for dispatches from the IO service.
    pub io: Option<IoEvent>,
    /// Datagram, set only for dispatches from a UDP subscription.
    pub datagram: Option<Arc<Datagram>>,
    /// Accepted connection, set only for dispatches from a TCP listener.
    pub tcp: Option<TcpConnection>,
    /// Scheduled fire time, set only for dispatches from the timer service.
    pub tick: Option<Instant>,
}

impl<'a> FetchContext<'a> {
    pub fn new(cache: &'a DataCache, cause: Option<Arc<CauseNode>>) -> Self {
        Self { cache, cause, io: None, datagram: None, tcp: None, tick: None }
    }

    pub fn with_io(mut self, event: IoEvent) -> Self {
        self.io = Some(event);
        self
    }

    pub fn with_datagram(mut self, datagram: Arc<Datagram>) -> Self {
        self.datagram = Some(datagram);
        self
    }

    pub fn with_tcp(mut self, connection: TcpConnection) -> Self {
        self.tcp = Some(connection);
        self
    }

    pub fn with_tick(mut self, at: Instant) -> Self {
        self.tick = Some(at);
        self
    }
}
