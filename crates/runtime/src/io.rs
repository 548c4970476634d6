// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IO service: file-descriptor readiness turned into dispatches.
//!
//! One thread blocks in poll(2) over the subscription table plus a
//! self-wake socket pair; table changes and shutdown write a byte to the
//! pair to interrupt the poll and reload. CLOSE and ERROR results
//! automatically unbind the subscribed reaction after delivery.

use crate::plant::Core;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use parking_lot::Mutex;
use reflex_core::{FetchContext, IoEvent, IoEvents, Reaction, ReactionId, Unbinder};
use std::io::{Read, Write};
use std::os::fd::{AsFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

#[derive(Clone)]
struct Watch {
    fd: RawFd,
    mask: IoEvents,
    reaction: Arc<Reaction>,
    /// Set while a dispatched event is still in flight; the descriptor
    /// is left out of the poll set until the task consumes it, so a
    /// level-triggered readiness fires exactly one task.
    busy: Arc<AtomicBool>,
}

/// Re-arms a suppressed descriptor when its task is done with.
struct Rearm {
    busy: Arc<AtomicBool>,
    shared: Weak<IoShared>,
}

impl Drop for Rearm {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        if let Some(shared) = self.shared.upgrade() {
            shared.wake();
        }
    }
}

struct IoShared {
    table: Mutex<Vec<Watch>>,
    waker: Mutex<Option<UnixStream>>,
    draining: AtomicBool,
}

impl IoShared {
    /// Interrupt the poll so the thread reloads its descriptor set.
    fn wake(&self) {
        if let Some(waker) = self.waker.lock().as_ref() {
            let _ = (&*waker).write(&[1]);
        }
    }
}

pub(crate) struct IoService {
    shared: Arc<IoShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl IoService {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(IoShared {
                table: Mutex::new(Vec::new()),
                waker: Mutex::new(None),
                draining: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Watch `fd` for `mask`; readiness dispatches `reaction`.
    pub fn subscribe(
        &self,
        fd: RawFd,
        mask: IoEvents,
        reaction: Arc<Reaction>,
    ) -> Result<Unbinder, reflex_core::BindError> {
        if fd < 0 {
            return Err(reflex_core::BindError::InvalidFd(fd));
        }
        let id = reaction.id();
        {
            let mut table = self.shared.table.lock();
            table.push(Watch { fd, mask, reaction, busy: Arc::new(AtomicBool::new(false)) });
            table.sort_by_key(|watch| watch.fd);
        }
        self.shared.wake();
        let shared = Arc::downgrade(&self.shared);
        Ok(Box::new(move || remove_watch(&shared, fd, id)))
    }

    pub fn spawn(&self, core: &Arc<Core>) {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return;
        }
        let (reader, writer) = match UnixStream::pair() {
            Ok(pair) => pair,
            Err(error) => {
                tracing::error!(%error, "failed to create io wake pair");
                return;
            }
        };
        if let Err(error) = reader.set_nonblocking(true) {
            tracing::error!(%error, "failed to configure io wake pair");
            return;
        }
        *self.shared.waker.lock() = Some(writer);
        let shared = self.shared.clone();
        let core = Arc::downgrade(core);
        let handle = std::thread::Builder::new()
            .name("reflex-io".into())
            .spawn(move || io_loop(&shared, reader, &core));
        match handle {
            Ok(handle) => *slot = Some(handle),
            Err(error) => tracing::error!(%error, "failed to spawn io thread"),
        }
    }

    pub fn drain(&self) {
        self.shared.draining.store(true, Ordering::Release);
        self.shared.wake();
    }

    pub fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for IoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoService")
            .field("watches", &self.shared.table.lock().len())
            .finish_non_exhaustive()
    }
}

fn remove_watch(shared: &Weak<IoShared>, fd: RawFd, id: ReactionId) {
    if let Some(shared) = shared.upgrade() {
        shared.table.lock().retain(|watch| !(watch.fd == fd && watch.reaction.id() == id));
        shared.wake();
    }
}

/// Borrow a subscriber-supplied descriptor for one poll call.
///
/// Validity is the subscriber's contract; a stale descriptor surfaces as
/// POLLNVAL and unbinds the reaction rather than crashing the poller.
#[allow(unsafe_code)]
fn borrow_fd<'a>(fd: RawFd) -> BorrowedFd<'a> {
    unsafe { BorrowedFd::borrow_raw(fd) }
}

fn poll_flags(mask: IoEvents) -> PollFlags {
    let mut flags = PollFlags::empty();
    if mask.contains(IoEvents::READ) {
        flags |= PollFlags::POLLIN;
    }
    if mask.contains(IoEvents::WRITE) {
        flags |= PollFlags::POLLOUT;
    }
    flags
}

fn readiness(revents: PollFlags) -> IoEvents {
    let mut events = IoEvents::empty();
    if revents.contains(PollFlags::POLLIN) {
        events |= IoEvents::READ;
    }
    if revents.contains(PollFlags::POLLOUT) {
        events |= IoEvents::WRITE;
    }
    if revents.contains(PollFlags::POLLHUP) {
        events |= IoEvents::CLOSE;
    }
    if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
        events |= IoEvents::ERROR;
    }
    events
}

fn io_loop(shared: &Arc<IoShared>, mut reader: UnixStream, core: &Weak<Core>) {
    tracing::debug!("io thread started");
    loop {
        if shared.draining.load(Ordering::Acquire) {
            break;
        }
        let watches: Vec<Watch> = shared
            .table
            .lock()
            .iter()
            .filter(|watch| !watch.busy.load(Ordering::Acquire))
            .cloned()
            .collect();

        let mut fds = Vec::with_capacity(watches.len() + 1);
        fds.push(PollFd::new(reader.as_fd(), PollFlags::POLLIN));
        for watch in &watches {
            fds.push(PollFd::new(borrow_fd(watch.fd), poll_flags(watch.mask)));
        }

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(nix::errno::Errno::EINTR) => continue,
            Err(error) => {
                tracing::error!(%error, "poll failed");
                break;
            }
        }

        let ready: Vec<(usize, PollFlags)> = fds
            .iter()
            .enumerate()
            .filter_map(|(index, fd)| fd.revents().map(|revents| (index, revents)))
            .filter(|(_, revents)| !revents.is_empty())
            .collect();
        drop(fds);

        let Some(core) = core.upgrade() else {
            break;
        };
        for (index, revents) in ready {
            if index == 0 {
                drain_wake(&mut reader);
                continue;
            }
            let watch = &watches[index - 1];
            let events = readiness(revents) & (watch.mask | IoEvents::CLOSE | IoEvents::ERROR);
            if events.is_empty() {
                continue;
            }
            let event = IoEvent { fd: watch.fd, events };
            watch.busy.store(true, Ordering::Release);
            let rearm = Rearm { busy: watch.busy.clone(), shared: Arc::downgrade(shared) };
            let ctx = FetchContext::new(&core.cache, None).with_io(event);
            core.dispatch_guarded(watch.reaction.clone(), ctx, rearm);
            if events.intersects(IoEvents::CLOSE | IoEvents::ERROR) {
                tracing::debug!(fd = watch.fd, ?events, "auto-unbinding io reaction");
                watch.reaction.unbind();
            }
        }
    }
    tracing::debug!("io thread exited");
}

/// Swallow queued wake bytes.
fn drain_wake(reader: &mut UnixStream) {
    let mut buffer = [0u8; 16];
    while matches!(reader.read(&mut buffer), Ok(n) if n > 0) {}
}

#[cfg(test)]
#[path = "io_tests.rs"]
mod tests;
