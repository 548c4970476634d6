// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer service: interval firings, delayed emits, watchdog deadlines.
//!
//! One thread sleeps until the earliest deadline. Interval entries
//! advance by their nominal step rather than re-anchoring to now, so
//! long-term frequency stays exact even when individual firings are
//! late. Shutdown is cooperative: the thread re-checks the draining flag
//! at every wake.

use crate::plant::{Core, SharedClock};
use parking_lot::{Condvar, Mutex};
use reflex_core::{FetchContext, Reaction, TypeKey, Unbinder};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct IntervalEntry {
    reaction: Arc<Reaction>,
    period: Duration,
    next: Instant,
}

struct DelayEntry {
    at: Instant,
    emit: Box<dyn FnOnce(&Arc<Core>) + Send>,
}

struct WatchdogEntry {
    key: TypeKey,
    reaction: Arc<Reaction>,
    timeout: Duration,
    deadline: Instant,
}

#[derive(Default)]
struct ChronoInner {
    intervals: Vec<IntervalEntry>,
    delays: Vec<DelayEntry>,
    watchdogs: Vec<WatchdogEntry>,
    draining: bool,
}

struct ChronoShared {
    inner: Mutex<ChronoInner>,
    wake: Condvar,
}

/// What one pass of the timer loop decided to do.
enum Firing {
    Tick { reaction: Arc<Reaction>, at: Instant },
    Emit(Box<dyn FnOnce(&Arc<Core>) + Send>),
}

pub(crate) struct ChronoService {
    shared: Arc<ChronoShared>,
    clock: SharedClock,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ChronoService {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            shared: Arc::new(ChronoShared {
                inner: Mutex::new(ChronoInner::default()),
                wake: Condvar::new(),
            }),
            clock,
            thread: Mutex::new(None),
        }
    }

    /// Register an interval firing for `reaction` every `period`.
    pub fn every(&self, reaction: Arc<Reaction>, period: Duration) -> Unbinder {
        let id = reaction.id();
        {
            let mut inner = self.shared.inner.lock();
            let next = self.clock.now() + period;
            inner.intervals.push(IntervalEntry { reaction, period, next });
        }
        self.shared.wake.notify_one();
        self.remover(move |inner| inner.intervals.retain(|e| e.reaction.id() != id))
    }

    /// Schedule a one-shot action at `at`.
    pub fn delay(&self, at: Instant, emit: Box<dyn FnOnce(&Arc<Core>) + Send>) {
        self.shared.inner.lock().delays.push(DelayEntry { at, emit });
        self.shared.wake.notify_one();
    }

    /// Arm a watchdog: fire `reaction` whenever `timeout` elapses without
    /// a reset for `key`.
    pub fn watchdog(&self, key: TypeKey, reaction: Arc<Reaction>, timeout: Duration) -> Unbinder {
        let id = reaction.id();
        {
            let mut inner = self.shared.inner.lock();
            let deadline = self.clock.now() + timeout;
            inner.watchdogs.push(WatchdogEntry { key, reaction, timeout, deadline });
        }
        self.shared.wake.notify_one();
        self.remover(move |inner| inner.watchdogs.retain(|e| e.reaction.id() != id))
    }

    /// Push every watchdog deadline for `key` out by its timeout.
    pub fn reset_watchdog(&self, key: TypeKey) {
        let now = self.clock.now();
        let mut inner = self.shared.inner.lock();
        for entry in inner.watchdogs.iter_mut().filter(|e| e.key == key) {
            entry.deadline = now + entry.timeout;
        }
        drop(inner);
        self.shared.wake.notify_one();
    }

    fn remover(&self, remove: impl FnOnce(&mut ChronoInner) + Send + 'static) -> Unbinder {
        let shared = Arc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = shared.upgrade() {
                remove(&mut shared.inner.lock());
                shared.wake.notify_one();
            }
        })
    }

    pub fn spawn(&self, core: &Arc<Core>) {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return;
        }
        let shared = self.shared.clone();
        let clock = self.clock.clone();
        let core = Arc::downgrade(core);
        let handle = std::thread::Builder::new()
            .name("reflex-chrono".into())
            .spawn(move || chrono_loop(&shared, &clock, &core));
        match handle {
            Ok(handle) => *slot = Some(handle),
            Err(error) => tracing::error!(%error, "failed to spawn timer thread"),
        }
    }

    pub fn drain(&self) {
        self.shared.inner.lock().draining = true;
        self.shared.wake.notify_one();
    }

    pub fn join(&self) {
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for ChronoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChronoService").finish_non_exhaustive()
    }
}

fn chrono_loop(shared: &Arc<ChronoShared>, clock: &SharedClock, core: &Weak<Core>) {
    tracing::debug!("timer thread started");
    loop {
        let now = clock.now();
        let firings = {
            let mut inner = shared.inner.lock();
            if inner.draining {
                break;
            }
            let firings = collect_due(&mut inner, now);
            if firings.is_empty() {
                // Nothing due: sleep until the earliest deadline, or
                // until a registration wakes us.
                match next_deadline(&inner) {
                    Some(deadline) => {
                        shared.wake.wait_until(&mut inner, deadline);
                    }
                    None => shared.wake.wait(&mut inner),
                }
                continue;
            }
            firings
        };

        let Some(core) = core.upgrade() else {
            break;
        };
        for firing in firings {
            match firing {
                Firing::Tick { reaction, at } => {
                    let ctx = FetchContext::new(&core.cache, None).with_tick(at);
                    core.dispatch(reaction, ctx);
                }
                Firing::Emit(emit) => emit(&core),
            }
        }
    }
    tracing::debug!("timer thread exited");
}

/// Pop everything due at `now`, advancing interval and watchdog entries.
fn collect_due(inner: &mut ChronoInner, now: Instant) -> Vec<Firing> {
    let mut firings = Vec::new();
    for entry in &mut inner.intervals {
        if entry.next <= now {
            firings.push(Firing::Tick { reaction: entry.reaction.clone(), at: entry.next });
            // Nominal-step advance keeps long-term frequency exact.
            entry.next += entry.period;
        }
    }
    let mut index = 0;
    while index < inner.delays.len() {
        if inner.delays[index].at <= now {
            let entry = inner.delays.swap_remove(index);
            firings.push(Firing::Emit(entry.emit));
        } else {
            index += 1;
        }
    }
    for entry in &mut inner.watchdogs {
        if entry.deadline <= now {
            firings.push(Firing::Tick { reaction: entry.reaction.clone(), at: entry.deadline });
            entry.deadline = now + entry.timeout;
        }
    }
    firings
}

fn next_deadline(inner: &ChronoInner) -> Option<Instant> {
    let intervals = inner.intervals.iter().map(|e| e.next);
    let delays = inner.delays.iter().map(|e| e.at);
    let watchdogs = inner.watchdogs.iter().map(|e| e.deadline);
    intervals.chain(delays).chain(watchdogs).min()
}

#[cfg(test)]
#[path = "chrono_tests.rs"]
mod tests;
