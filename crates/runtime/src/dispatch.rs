// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The emission pipeline and the worker task body.
//!
//! An emission stores into the cache, links the value onto the producing
//! task's cause chain, and offers every interested reaction a task. Task
//! construction is all-or-nothing and silent: a reaction that is
//! disabled, missing data, or over its concurrency limit simply produces
//! nothing, and the emission continues for its peers.

use crate::plant::Core;
use crate::pool;
use reflex_core::{
    FetchContext, Message, Reaction, ReactionStatistics, ReadyRun, Task, TypeKey,
};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// How a delivery reaches interested reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Queue tasks on each reaction's pool.
    Queue,
    /// Run each task synchronously in the emitting thread.
    Direct,
}

impl Core {
    /// Local emission: cache, then schedule interested reactions.
    pub(crate) fn emit<T: Message>(self: &Arc<Self>, value: T) {
        let key = self.store(value);
        self.deliver(key, Delivery::Queue);
    }

    /// Direct emission: like local, but interested reactions run
    /// synchronously in the calling thread, bypassing the pools.
    pub(crate) fn emit_direct<T: Message>(self: &Arc<Self>, value: T) {
        let key = self.store(value);
        self.deliver(key, Delivery::Direct);
    }

    /// Deferred emission: held until `start`, where it fires before any
    /// other task. After start this is a plain local emission.
    pub(crate) fn emit_deferred<T: Message>(self: &Arc<Self>, value: T) {
        if self.is_started() {
            self.emit(value);
        } else {
            self.init_queue.lock().push(Box::new(move |core: &Arc<Core>| core.emit(value)));
        }
    }

    /// Cache the value and link it onto the producing task's chain.
    fn store<T: Message>(&self, value: T) -> TypeKey {
        let key = self.interner.key_of::<T>();
        let shared = self.cache.store(value);
        if let Some(node) = pool::current_node() {
            node.link(key, shared);
        }
        key
    }

    fn deliver(self: &Arc<Self>, key: TypeKey, mode: Delivery) {
        let interested = self.registry.interested(key);
        if interested.is_empty() {
            return;
        }
        let cause = pool::current_node();
        for reaction in interested {
            let ctx = FetchContext::new(&self.cache, cause.clone());
            match mode {
                Delivery::Queue => self.dispatch(reaction, ctx),
                Delivery::Direct => {
                    if let Some(task) = self.build_task(reaction, ctx) {
                        self.execute(task);
                    }
                }
            }
        }
    }

    /// Offer one reaction a task for the given context, queueing it on
    /// the reaction's pool when construction succeeds.
    pub(crate) fn dispatch(self: &Arc<Self>, reaction: Arc<Reaction>, ctx: FetchContext<'_>) {
        if let Some(task) = self.build_task(reaction, ctx) {
            self.submit(task);
        }
    }

    /// The task constructor. `None` means the emission produced no task
    /// for this reaction; the reasons are deliberately not distinguished.
    pub(crate) fn build_task(
        &self,
        reaction: Arc<Reaction>,
        ctx: FetchContext<'_>,
    ) -> Option<Task> {
        if reaction.is_unbound() || !reaction.is_enabled() {
            return None;
        }
        let run: ReadyRun = reaction.generate(&ctx)?;
        let priority = reaction.options().priority;
        let task = Task::new(
            self.ids.next_task(),
            reaction,
            ctx.cause.clone(),
            run,
            priority,
            self.now(),
        );
        // The slot is claimed for the task's whole life; execute (or the
        // sync park path) releases it.
        if !task.parent().claim_task_slot() {
            return None;
        }
        Some(task)
    }

    /// Like [`dispatch`](Self::dispatch), dropping `guard` once the task
    /// has run (or immediately when no task is produced). The IO service
    /// uses this to re-arm a descriptor only after its event was
    /// consumed.
    pub(crate) fn dispatch_guarded(
        self: &Arc<Self>,
        reaction: Arc<Reaction>,
        ctx: FetchContext<'_>,
        guard: impl Send + 'static,
    ) {
        match self.build_task(reaction, ctx) {
            Some(task) => self.submit(task.with_guard(guard)),
            None => drop(guard),
        }
    }

    pub(crate) fn submit(self: &Arc<Self>, task: Task) {
        let pool = self.pools.get(task.parent().options().pool);
        pool.submit(task);
    }

    /// Worker body for a popped task: sync reschedule, execute, release.
    pub(crate) fn run_task(self: &Arc<Self>, task: Task) {
        let group = task.parent().options().sync_group.map(|tag| self.sync.group(tag));
        let task = match &group {
            // A resubmitted task already owns its group.
            Some(group) if !task.sync_claimed() => {
                let parent = task.parent().clone();
                match group.reschedule(task) {
                    Some(task) => task,
                    // Parked; parked tasks release their slot until the
                    // running task's postcondition resubmits them.
                    None => {
                        parent.finish_task();
                        return;
                    }
                }
            }
            _ => task,
        };
        self.execute(task);
        if let Some(group) = group {
            if let Some(mut next) = group.release() {
                next.set_sync_claimed();
                next.parent().begin_task();
                self.submit(next);
            }
        }
    }

    /// Run the user callback and the postconditions that follow it.
    fn execute(self: &Arc<Self>, task: Task) {
        let reaction = task.parent().clone();
        let options = *reaction.options();
        let node = task.node().clone();
        let task_id = task.id();
        let cause = task.cause();
        let emitted_at = task.emitted_at();

        let previous = pool::current_node();
        pool::set_current_node(Some(node));
        let started_at = self.now();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(task.into_run()));
        let finished_at = self.now();
        pool::set_current_node(previous);
        // Slot claimed at construction.
        reaction.finish_task();

        let panic_text = outcome.err().map(panic_message);
        if let Some(text) = &panic_text {
            tracing::error!(
                reaction = %reaction.label(),
                task = %task_id,
                panic = %text,
                "reaction panicked"
            );
        }

        if options.once {
            reaction.unbind();
        }
        if options.always && !self.is_draining() {
            let ctx = FetchContext::new(&self.cache, None);
            if let Some(next) = self.build_task(reaction.clone(), ctx) {
                self.submit(next);
            }
        }
        if !options.no_stats && self.statistics_wanted() {
            self.emit(ReactionStatistics {
                label: reaction.label().clone(),
                reaction: reaction.id(),
                task: task_id,
                cause,
                emitted_at,
                started_at,
                finished_at,
                panic: panic_text,
            });
        }
    }

    /// Submit the initial task of an always-loop reaction.
    pub(crate) fn dispatch_always(self: &Arc<Self>, reaction: &Arc<Reaction>) {
        if self.draining.load(Ordering::Acquire) {
            return;
        }
        let ctx = FetchContext::new(&self.cache, None);
        self.dispatch(reaction.clone(), ctx);
    }

    fn statistics_wanted(&self) -> bool {
        self.interner
            .get::<ReactionStatistics>()
            .is_some_and(|key| self.registry.has_interest(key))
    }
}

/// Best-effort text of a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
