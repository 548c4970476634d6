// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The core source words.
//!
//! Each word decides what it contributes to the callback and how it
//! binds: cache-backed words register interest with the registry,
//! time-backed words with the timer service, descriptor-backed words
//! with the IO service. Words holding transient state (IO events, timer
//! ticks) remember the last observed value so a multi-word reaction
//! triggered by one of its other words still gets an argument.

use super::{BindContext, Source};
use parking_lot::Mutex;
use reflex_core::{
    BindError, Datagram, FetchContext, IoEvent, IoEvents, Message, ReactionOptions,
    ReactionStatistics, TcpConnection,
};
use std::marker::PhantomData;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::os::fd::{AsRawFd, IntoRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Subscribe to emissions of `T`.
pub fn trigger<T: Message>() -> Trigger<T> {
    Trigger { _marker: PhantomData }
}

pub struct Trigger<T: Message> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Message> Source for Trigger<T> {
    type Output = Arc<T>;

    fn configure(&self, options: &mut ReactionOptions) {
        // Statistics handlers must not emit statistics about themselves.
        if std::any::TypeId::of::<T>() == std::any::TypeId::of::<ReactionStatistics>() {
            options.no_stats = true;
        }
    }

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        ctx.bind_trigger::<T>();
        Ok(())
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        ctx.cache.latest::<T>()
    }
}

/// Read the latest `T` from the cache without subscribing to it.
pub fn with<T: Message>() -> With<T> {
    With { _marker: PhantomData }
}

pub struct With<T: Message> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Message> Source for With<T> {
    type Output = Arc<T>;

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        ctx.cache.latest::<T>()
    }
}

/// Like [`with`], but prefer a `T` produced along the cause chain.
pub fn linked<T: Message>() -> Linked<T> {
    Linked { _marker: PhantomData }
}

pub struct Linked<T: Message> {
    _marker: PhantomData<fn() -> T>,
}

impl<T: Message> Source for Linked<T> {
    type Output = Arc<T>;

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        ctx.cache.linked::<T>(ctx.cause.as_deref())
    }
}

/// Never cancel on absence: the callback receives an `Option`.
pub fn optional<S: Source>(inner: S) -> Optional<S> {
    Optional { inner }
}

pub struct Optional<S: Source> {
    inner: S,
}

impl<S: Source> Source for Optional<S> {
    type Output = Option<S::Output>;

    fn configure(&self, options: &mut ReactionOptions) {
        self.inner.configure(options);
    }

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        self.inner.bind(ctx)
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        Some(self.inner.fetch(ctx))
    }
}

/// Cache-backed words that can serve bounded history.
pub trait HistorySource: Source {
    type Item: Message;
}

impl<T: Message> HistorySource for Trigger<T> {
    type Item = T;
}

impl<T: Message> HistorySource for With<T> {
    type Item = T;
}

/// The `depth` most recent values of the inner word's type, newest
/// first; sized `min(depth, emissions so far)`.
pub fn last<S: HistorySource>(depth: usize, inner: S) -> Last<S> {
    Last { depth: depth.max(1), inner }
}

pub struct Last<S: HistorySource> {
    depth: usize,
    inner: S,
}

impl<S: HistorySource> Source for Last<S> {
    type Output = Vec<Arc<S::Item>>;

    fn configure(&self, options: &mut ReactionOptions) {
        self.inner.configure(options);
    }

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        self.inner.bind(ctx)?;
        ctx.ensure_history::<S::Item>(self.depth);
        Ok(())
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        let history = ctx.cache.history::<S::Item>(self.depth);
        if history.is_empty() {
            None
        } else {
            Some(history)
        }
    }
}

/// Run once when the plant starts.
pub fn startup() -> StartupWord {
    StartupWord(trigger::<reflex_core::Startup>())
}

pub struct StartupWord(Trigger<reflex_core::Startup>);

impl Source for StartupWord {
    type Output = Arc<reflex_core::Startup>;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        self.0.bind(ctx)
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        self.0.fetch(ctx)
    }
}

/// Run once when shutdown is initiated.
pub fn shutdown() -> ShutdownWord {
    ShutdownWord(trigger::<reflex_core::Shutdown>())
}

pub struct ShutdownWord(Trigger<reflex_core::Shutdown>);

impl Source for ShutdownWord {
    type Output = Arc<reflex_core::Shutdown>;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        self.0.bind(ctx)
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        self.0.fetch(ctx)
    }
}

/// Token handed to an [`always`] callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Always;

/// Loop continuously on a dedicated worker until the plant drains.
pub fn always() -> AlwaysWord {
    AlwaysWord
}

pub struct AlwaysWord;

impl Source for AlwaysWord {
    type Output = Always;

    fn configure(&self, options: &mut ReactionOptions) {
        options.always = true;
        options.no_stats = true;
    }

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        ctx.register_always();
        Ok(())
    }

    fn fetch(&self, _ctx: &FetchContext<'_>) -> Option<Self::Output> {
        Some(Always)
    }
}

/// Fire every `period`; the callback receives the scheduled fire time.
pub fn every(period: Duration) -> Every {
    Every { period, seen: Mutex::new(None) }
}

/// Fire `rate` times per `unit`: the reciprocal form of [`every`].
pub fn per(rate: u32, unit: Duration) -> Every {
    let period = unit.checked_div(rate).unwrap_or(Duration::ZERO);
    Every { period, seen: Mutex::new(None) }
}

pub struct Every {
    period: Duration,
    seen: Mutex<Option<Instant>>,
}

impl Source for Every {
    type Output = Instant;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        ctx.every(self.period)
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        if let Some(tick) = ctx.tick {
            *self.seen.lock() = Some(tick);
            return Some(tick);
        }
        *self.seen.lock()
    }
}

/// Fire when `timeout` elapses without an `emit_watchdog::<T>()` reset.
pub fn watchdog<T: Message>(timeout: Duration) -> WatchdogWord<T> {
    WatchdogWord { timeout, seen: Mutex::new(None), _marker: PhantomData }
}

pub struct WatchdogWord<T: Message> {
    timeout: Duration,
    seen: Mutex<Option<Instant>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Message> Source for WatchdogWord<T> {
    type Output = Instant;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        ctx.watchdog::<T>(self.timeout)
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        if let Some(tick) = ctx.tick {
            *self.seen.lock() = Some(tick);
            return Some(tick);
        }
        *self.seen.lock()
    }
}

/// Watch a file descriptor for readiness.
pub fn io_source(fd: RawFd, mask: IoEvents) -> IoWord {
    IoWord { fd, mask, seen: Mutex::new(None) }
}

pub struct IoWord {
    fd: RawFd,
    mask: IoEvents,
    seen: Mutex<Option<IoEvent>>,
}

impl Source for IoWord {
    type Output = IoEvent;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        ctx.subscribe_io(self.fd, self.mask)
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        if let Some(event) = ctx.io.filter(|event| event.fd == self.fd) {
            *self.seen.lock() = Some(event);
            return Some(event);
        }
        *self.seen.lock()
    }
}

enum UdpMode {
    Unicast,
    Broadcast,
    Multicast(Ipv4Addr),
}

/// Receive datagrams on a UDP port.
pub fn udp(port: u16) -> UdpWord {
    UdpWord { port, mode: UdpMode::Unicast, socket: Mutex::new(None) }
}

/// Receive broadcast datagrams on a UDP port.
pub fn udp_broadcast(port: u16) -> UdpWord {
    UdpWord { port, mode: UdpMode::Broadcast, socket: Mutex::new(None) }
}

/// Receive datagrams addressed to a multicast group.
pub fn udp_multicast(group: Ipv4Addr, port: u16) -> UdpWord {
    UdpWord { port, mode: UdpMode::Multicast(group), socket: Mutex::new(None) }
}

pub struct UdpWord {
    port: u16,
    mode: UdpMode,
    socket: Mutex<Option<UdpSocket>>,
}

impl Source for UdpWord {
    type Output = Datagram;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port))?;
        socket.set_nonblocking(true)?;
        match self.mode {
            UdpMode::Unicast => {}
            UdpMode::Broadcast => socket.set_broadcast(true)?,
            UdpMode::Multicast(group) => {
                socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
            }
        }
        ctx.subscribe_io(socket.as_raw_fd(), IoEvents::READ)?;
        *self.socket.lock() = Some(socket);
        Ok(())
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        let guard = self.socket.lock();
        let socket = guard.as_ref()?;
        let event = ctx.io.filter(|event| event.fd == socket.as_raw_fd())?;
        if !event.events.contains(IoEvents::READ) {
            return None;
        }
        let mut buffer = vec![0u8; 65536];
        let (length, source) = socket.recv_from(&mut buffer).ok()?;
        buffer.truncate(length);
        Some(Datagram { source, payload: buffer })
    }
}

impl UdpWord {
    /// The bound local address, available after bind.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.lock().as_ref().and_then(|socket| socket.local_addr().ok())
    }
}

/// Accept connections on a TCP port.
pub fn tcp(port: u16) -> TcpWord {
    TcpWord { port, listener: Mutex::new(None) }
}

pub struct TcpWord {
    port: u16,
    listener: Mutex<Option<TcpListener>>,
}

impl Source for TcpWord {
    type Output = TcpConnection;

    fn bind(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.port))?;
        listener.set_nonblocking(true)?;
        ctx.subscribe_io(listener.as_raw_fd(), IoEvents::READ)?;
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output> {
        let guard = self.listener.lock();
        let listener = guard.as_ref()?;
        let event = ctx.io.filter(|event| event.fd == listener.as_raw_fd())?;
        if !event.events.contains(IoEvents::READ) {
            return None;
        }
        let (stream, peer) = listener.accept().ok()?;
        // Hand the descriptor over blocking; the accepting reaction owns
        // it from here.
        let _ = stream.set_nonblocking(false);
        Some(TcpConnection { fd: stream.into_raw_fd(), peer })
    }
}

#[cfg(test)]
#[path = "sources_tests.rs"]
mod tests;
