// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The subscription DSL.
//!
//! A subscription is a set of *source words* (each contributing one
//! callback argument, in declaration order) plus builder options that
//! flatten into the reaction's scheduling options. `then` fuses the
//! sources and the callback into a single parsed reaction: sources bind
//! once at subscription time, fetch per emission in the emitting thread,
//! and the options drive the precondition, priority, reschedule and
//! postcondition phases of the scheduler.

mod sources;

pub use sources::{
    always, every, io_source, last, linked, optional, per, shutdown, startup, tcp, trigger, udp,
    udp_broadcast, udp_multicast, watchdog, with, Always, AlwaysWord, Every, HistorySource,
    IoWord, Last, Linked, Optional, ShutdownWord, StartupWord, TcpWord, Trigger, UdpWord,
    WatchdogWord, With,
};

use crate::plant::{Core, PoolSpec};
use crate::reactor::Environment;
use reflex_core::{
    BindError, FetchContext, GroupTag, Message, PoolId, Priority, Reaction, ReactionHandle,
    ReactionOptions, RunGenerator, Unbinder,
};
use smol_str::SmolStr;
use std::any::TypeId;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// One word of a subscription that contributes a callback argument.
pub trait Source: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Adjust the reaction's options before it is constructed.
    fn configure(&self, _options: &mut ReactionOptions) {}

    /// Subscription-time side effects: register interest, timers, fds.
    fn bind(&self, _ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        Ok(())
    }

    /// Assemble this word's argument. `None` cancels the task.
    fn fetch(&self, ctx: &FetchContext<'_>) -> Option<Self::Output>;
}

/// A declaration-ordered set of source words.
///
/// Implemented for any single [`Source`] and for tuples of up to five;
/// the callback passed to [`OnBuilder::then`] takes one argument per
/// word, in the same order.
pub trait SourceSet: Send + Sync + 'static {
    type Args: Send + 'static;

    fn configure_all(&self, options: &mut ReactionOptions);
    fn bind_all(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError>;
    fn fetch_all(&self, ctx: &FetchContext<'_>) -> Option<Self::Args>;
}

impl<S: Source> SourceSet for S {
    type Args = (S::Output,);

    fn configure_all(&self, options: &mut ReactionOptions) {
        Source::configure(self, options);
    }

    fn bind_all(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        Source::bind(self, ctx)
    }

    fn fetch_all(&self, ctx: &FetchContext<'_>) -> Option<Self::Args> {
        Some((Source::fetch(self, ctx)?,))
    }
}

macro_rules! impl_source_set {
    ($(($source:ident, $index:tt)),+) => {
        impl<$($source: Source),+> SourceSet for ($($source,)+) {
            type Args = ($($source::Output,)+);

            fn configure_all(&self, options: &mut ReactionOptions) {
                $(Source::configure(&self.$index, options);)+
            }

            fn bind_all(&self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
                $(Source::bind(&self.$index, ctx)?;)+
                Ok(())
            }

            fn fetch_all(&self, ctx: &FetchContext<'_>) -> Option<Self::Args> {
                Some(($(Source::fetch(&self.$index, ctx)?,)+))
            }
        }
    };
}

impl_source_set!((S1, 0), (S2, 1));
impl_source_set!((S1, 0), (S2, 1), (S3, 2));
impl_source_set!((S1, 0), (S2, 1), (S3, 2), (S4, 3));
impl_source_set!((S1, 0), (S2, 1), (S3, 2), (S4, 3), (S5, 4));

/// Callback invokable with a source set's argument tuple.
pub trait SourceFn<Args>: Send + Sync + 'static {
    fn invoke(&self, args: Args);
}

macro_rules! impl_source_fn {
    ($(($arg:ident, $var:ident)),+) => {
        impl<Func, $($arg),+> SourceFn<($($arg,)+)> for Func
        where
            Func: Fn($($arg),+) + Send + Sync + 'static,
        {
            fn invoke(&self, ($($var,)+): ($($arg,)+)) {
                self($($var),+)
            }
        }
    };
}

impl_source_fn!((A1, a1));
impl_source_fn!((A1, a1), (A2, a2));
impl_source_fn!((A1, a1), (A2, a2), (A3, a3));
impl_source_fn!((A1, a1), (A2, a2), (A3, a3), (A4, a4));
impl_source_fn!((A1, a1), (A2, a2), (A3, a3), (A4, a4), (A5, a5));

/// Subscription-time context handed to each word's bind phase.
pub struct BindContext<'a> {
    core: &'a Arc<Core>,
    reaction: &'a Arc<Reaction>,
}

impl<'a> BindContext<'a> {
    pub(crate) fn new(core: &'a Arc<Core>, reaction: &'a Arc<Reaction>) -> Self {
        Self { core, reaction }
    }

    pub fn reaction(&self) -> &Arc<Reaction> {
        self.reaction
    }

    /// Register interest in emissions of `T`.
    pub fn bind_trigger<T: Message>(&mut self) {
        let key = self.core.interner.key_of::<T>();
        self.core.registry.bind(key, self.reaction.clone());
        let core = Arc::downgrade(self.core);
        let id = self.reaction.id();
        self.reaction.add_unbinder(Box::new(move || {
            if let Some(core) = core.upgrade() {
                core.registry.unbind(key, id);
            }
        }));
    }

    /// Grow the history ring for `T` to at least `depth`.
    pub fn ensure_history<T: Message>(&mut self, depth: usize) {
        self.core.cache.ensure_history::<T>(depth);
    }

    /// Register an interval firing with the timer service.
    pub fn every(&mut self, period: Duration) -> Result<(), BindError> {
        if period.is_zero() {
            return Err(BindError::InvalidInterval(period));
        }
        let unbinder = self.core.chrono.every(self.reaction.clone(), period);
        self.reaction.add_unbinder(unbinder);
        Ok(())
    }

    /// Arm a watchdog keyed by `T` with the timer service.
    pub fn watchdog<T: Message>(&mut self, timeout: Duration) -> Result<(), BindError> {
        if timeout.is_zero() {
            return Err(BindError::InvalidInterval(timeout));
        }
        let key = self.core.interner.key_of::<T>();
        let unbinder = self.core.chrono.watchdog(key, self.reaction.clone(), timeout);
        self.reaction.add_unbinder(unbinder);
        Ok(())
    }

    /// Watch a file descriptor with the IO service.
    pub fn subscribe_io(
        &mut self,
        fd: std::os::fd::RawFd,
        mask: reflex_core::IoEvents,
    ) -> Result<(), BindError> {
        let unbinder = self.core.io.subscribe(fd, mask, self.reaction.clone())?;
        self.reaction.add_unbinder(unbinder);
        Ok(())
    }

    /// Register this reaction as a continuous loop on a dedicated pool.
    pub fn register_always(&mut self) {
        let id = self.reaction.id();
        let pool_id = PoolId::Dedicated(id);
        let name = format!("loop-{}", self.reaction.label());
        // Dedicated pools are unique per reaction id; declare cannot
        // conflict.
        if let Ok(pool) = self.core.pools.declare(pool_id, name.as_str(), 1) {
            if self.core.is_started() {
                pool.spawn_workers(self.core);
            }
        }
        self.core.always_list.lock().push(self.reaction.clone());
        {
            let core = Arc::downgrade(self.core);
            self.reaction.add_unbinder(Box::new(move || {
                if let Some(core) = core.upgrade() {
                    core.always_list.lock().retain(|r| r.id() != id);
                }
            }));
        }
        if self.core.is_started() {
            self.core.dispatch_always(self.reaction);
        }
    }

    /// Run extra cleanup when the reaction is unbound.
    pub fn on_unbind(&mut self, unbinder: Unbinder) {
        self.reaction.add_unbinder(unbinder);
    }

    /// Lazily-created shared service state keyed by type.
    pub fn extension<E: Default + Send + Sync + 'static>(&self) -> Arc<E> {
        self.core.extension::<E>()
    }

    /// An emission environment for service threads spawned at bind time.
    pub fn environment(&self) -> Environment {
        Environment::new(
            Arc::downgrade(self.core),
            self.reaction.label().clone(),
            self.core.config.log_level,
        )
    }
}

/// Builder returned by [`Environment::on`].
pub struct OnBuilder<S: SourceSet> {
    core: Weak<Core>,
    sources: S,
    options: ReactionOptions,
    pool_decl: Option<(PoolId, &'static str, usize)>,
}

impl<S: SourceSet> OnBuilder<S> {
    pub(crate) fn new(core: Weak<Core>, sources: S) -> Self {
        Self { core, sources, options: ReactionOptions::default(), pool_decl: None }
    }

    /// Serialize with every other reaction in group `G`.
    pub fn sync<G: 'static>(mut self) -> Self {
        self.options.sync_group = Some(GroupTag::of::<G>());
        self
    }

    /// At most one task of this reaction running at a time.
    pub fn single(mut self) -> Self {
        self.options.limit = Some(1);
        self
    }

    /// At most `n` tasks of this reaction running at a time.
    pub fn buffer(mut self, n: usize) -> Self {
        self.options.limit = Some(n.max(1));
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    /// Run tasks on the thread that called `start`.
    pub fn main_thread(mut self) -> Self {
        self.options.pool = PoolId::Main;
        self
    }

    /// Run tasks on the named pool `P`, declaring it on first use.
    pub fn pool<P: PoolSpec>(mut self) -> Self {
        let id = PoolId::Named(TypeId::of::<P>());
        self.options.pool = id;
        self.pool_decl = Some((id, P::name(), P::concurrency()));
        self
    }

    /// Unbind after the first task attempt.
    pub fn once(mut self) -> Self {
        self.options.once = true;
        self
    }

    /// Fuse the words and the callback into a live reaction.
    pub fn then<F>(
        self,
        label: impl Into<SmolStr>,
        callback: F,
    ) -> Result<ReactionHandle, BindError>
    where
        F: SourceFn<S::Args>,
    {
        let core = self.core.upgrade().ok_or(BindError::Draining)?;
        if core.is_draining() {
            return Err(BindError::Draining);
        }

        if let Some((id, name, concurrency)) = self.pool_decl {
            let pool = core
                .pools
                .declare(id, name, concurrency)
                .map_err(|existing| BindError::PoolConflict(name, existing))?;
            if core.is_started() {
                pool.spawn_workers(&core);
            }
        }

        let id = core.ids.next_reaction();
        let mut options = self.options;
        self.sources.configure_all(&mut options);
        if options.always {
            options.pool = PoolId::Dedicated(id);
        }

        let sources = Arc::new(self.sources);
        let callback = Arc::new(callback);
        let generator: RunGenerator = {
            let sources = sources.clone();
            Box::new(move |ctx| {
                let args = sources.fetch_all(ctx)?;
                let callback = callback.clone();
                Some(Box::new(move || callback.invoke(args)))
            })
        };

        let reaction = Reaction::new(id, label, options, generator);
        let mut ctx = BindContext::new(&core, &reaction);
        if let Err(error) = sources.bind_all(&mut ctx) {
            // Roll back whatever the earlier words registered.
            reaction.unbind();
            return Err(error);
        }
        tracing::debug!(reaction = %reaction.label(), id = %reaction.id(), "bound reaction");
        Ok(ReactionHandle::new(&reaction))
    }
}

#[cfg(test)]
#[path = "dsl_tests.rs"]
mod tests;
