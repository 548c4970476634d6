// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The plant: one long-lived object owning every runtime component.
//!
//! `start` turns the calling thread into the main pool's worker and
//! blocks until shutdown completes; `shutdown` is idempotent and safe
//! from any thread, including from inside a reaction.

use crate::chrono::ChronoService;
use crate::io::IoService;
use crate::pool::{worker_loop, PoolSet};
use crate::reactor::{Environment, Reactor};
use crate::registry::Registry;
use crate::sync_group::SyncRegistry;
use parking_lot::Mutex;
use reflex_core::{
    CommandLineArguments, DataCache, IdSource, LogLevel, Reaction, Shutdown, Startup,
    TypeInterner,
};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared closure yielding the current instant; defaults to the system
/// clock, replaceable for tests.
#[derive(Clone)]
pub(crate) struct SharedClock(Arc<dyn Fn() -> Instant + Send + Sync>);

impl SharedClock {
    pub fn system() -> Self {
        Self(Arc::new(Instant::now))
    }

    pub fn from_clock(clock: impl reflex_core::Clock) -> Self {
        Self(Arc::new(move || clock.now()))
    }

    pub fn now(&self) -> Instant {
        (self.0.as_ref())()
    }
}

impl std::fmt::Debug for SharedClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedClock")
    }
}

/// Plant configuration.
#[derive(Clone)]
pub struct PlantConfig {
    pub default_pool_concurrency: usize,
    pub log_level: LogLevel,
    pub args: Vec<String>,
    clock: SharedClock,
}

impl PlantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_pool_concurrency(mut self, concurrency: usize) -> Self {
        self.default_pool_concurrency = concurrency.max(1);
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Argv to emit as [`CommandLineArguments`] during start.
    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn clock(mut self, clock: impl reflex_core::Clock) -> Self {
        self.clock = SharedClock::from_clock(clock);
        self
    }
}

impl Default for PlantConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self {
            default_pool_concurrency: parallelism,
            log_level: LogLevel::Info,
            args: Vec::new(),
            clock: SharedClock::system(),
        }
    }
}

impl std::fmt::Debug for PlantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlantConfig")
            .field("default_pool_concurrency", &self.default_pool_concurrency)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

/// Descriptor type for a named worker pool.
///
/// Declare with `on(..).pool::<MyPool>()`; every reaction naming the same
/// descriptor shares the pool. Conflicting concurrency across
/// declarations is a bind error.
pub trait PoolSpec: 'static {
    fn concurrency() -> usize {
        1
    }

    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Everything one plant owns, shared behind an `Arc`.
pub(crate) struct Core {
    pub(crate) config: PlantConfig,
    pub(crate) interner: Arc<TypeInterner>,
    pub(crate) cache: DataCache,
    pub(crate) registry: Registry,
    pub(crate) ids: IdSource,
    pub(crate) pools: PoolSet,
    pub(crate) sync: SyncRegistry,
    pub(crate) chrono: ChronoService,
    pub(crate) io: IoService,
    pub(crate) started: AtomicBool,
    pub(crate) draining: AtomicBool,
    pub(crate) init_queue: Mutex<Vec<Box<dyn FnOnce(&Arc<Core>) + Send>>>,
    pub(crate) always_list: Mutex<Vec<Arc<Reaction>>>,
    reactors: Mutex<Vec<Box<dyn Any + Send>>>,
    extensions: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Core {
    pub(crate) fn new(config: PlantConfig) -> Arc<Self> {
        let interner = Arc::new(TypeInterner::new());
        let clock = config.clock.clone();
        Arc::new(Self {
            cache: DataCache::new(interner.clone()),
            interner,
            registry: Registry::new(),
            ids: IdSource::new(),
            pools: PoolSet::new(config.default_pool_concurrency),
            sync: SyncRegistry::new(),
            chrono: ChronoService::new(clock),
            io: IoService::new(),
            started: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            init_queue: Mutex::new(Vec::new()),
            always_list: Mutex::new(Vec::new()),
            reactors: Mutex::new(Vec::new()),
            extensions: Mutex::new(HashMap::new()),
            config,
        })
    }

    pub(crate) fn now(&self) -> Instant {
        self.config.clock.now()
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Lazily-created shared state slot keyed by type; used by service
    /// extensions such as the network layer.
    pub(crate) fn extension<E: Default + Send + Sync + 'static>(&self) -> Arc<E> {
        let mut extensions = self.extensions.lock();
        let entry = extensions
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Arc::new(E::default()) as Arc<dyn Any + Send + Sync>);
        match entry.clone().downcast::<E>() {
            Ok(extension) => extension,
            // Slots are keyed by TypeId, so a mismatch is impossible.
            Err(_) => unreachable!("extension slot holds a foreign type"),
        }
    }

    pub(crate) fn initiate_shutdown(self: &Arc<Self>) {
        if self.draining.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("plant shutdown initiated");
        self.emit(Shutdown);
        self.chrono.drain();
        self.io.drain();
        for pool in self.pools.all() {
            pool.drain();
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("started", &self.is_started())
            .field("draining", &self.is_draining())
            .finish_non_exhaustive()
    }
}

/// The process-wide reactive runtime.
pub struct Plant {
    core: Arc<Core>,
}

impl Plant {
    pub fn new(config: PlantConfig) -> Self {
        tracing::info!(
            workers = config.default_pool_concurrency,
            "building plant"
        );
        Self { core: Core::new(config) }
    }

    /// Construct a reactor, running its subscriptions' bind phases.
    pub fn install<R: Reactor>(&self) -> Result<(), reflex_core::BindError> {
        let label = short_type_name::<R>();
        tracing::debug!(reactor = label, "installing reactor");
        let env = Environment::new(
            Arc::downgrade(&self.core),
            label,
            self.core.config.log_level,
        );
        let reactor = R::install(&env)?;
        self.core.reactors.lock().push(Box::new(reactor));
        Ok(())
    }

    /// An emission environment for the host program itself.
    pub fn environment(&self) -> Environment {
        Environment::new(Arc::downgrade(&self.core), "plant", self.core.config.log_level)
    }

    /// Run until shutdown. The calling thread becomes the main pool's
    /// only worker; `main_thread` reactions run here.
    pub fn start(&self) {
        let core = &self.core;
        if core.started.swap(true, Ordering::AcqRel) {
            tracing::warn!("start called twice; ignoring");
            return;
        }

        if !core.config.args.is_empty() {
            core.emit(CommandLineArguments { args: core.config.args.clone() });
        }

        // Deferred initialize emissions fire before any other task.
        let pending = std::mem::take(&mut *core.init_queue.lock());
        for emit in pending {
            emit(core);
        }
        core.emit(Startup);

        core.chrono.spawn(core);
        core.io.spawn(core);
        for pool in core.pools.worker_pools() {
            pool.spawn_workers(core);
        }
        let always: Vec<Arc<Reaction>> = core.always_list.lock().clone();
        for reaction in always {
            core.dispatch_always(&reaction);
        }

        worker_loop(core, core.pools.main_pool());

        for pool in core.pools.worker_pools() {
            pool.join();
        }
        core.chrono.join();
        core.io.join();
        let dropped = core.sync.clear_all();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded tasks parked in sync queues");
        }
        tracing::info!("plant stopped");
    }

    /// Initiate shutdown. Idempotent; safe from any thread or reaction.
    pub fn shutdown(&self) {
        self.core.initiate_shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.core.is_started() && !self.core.is_draining()
    }
}

impl std::fmt::Debug for Plant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plant").field("core", &self.core).finish()
    }
}

/// Last path segment of a type name, for reactor labels.
pub(crate) fn short_type_name<T: 'static>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

#[cfg(test)]
#[path = "plant_tests.rs"]
mod tests;
