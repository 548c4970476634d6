// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reactions: durable, addressable subscriptions.
//!
//! A reaction is shared-owned between the registry and any in-flight
//! tasks; the detachable [`ReactionHandle`] holds only a weak reference,
//! so dropping a handle never tears down a live subscription and the last
//! in-flight task releases the reaction after unbind.

use crate::context::FetchContext;
use crate::id::ReactionId;
use crate::priority::Priority;
use parking_lot::Mutex;
use smol_str::SmolStr;
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Callback run in reverse order when a reaction is unbound.
pub type Unbinder = Box<dyn FnOnce() + Send>;

/// A fully-bound invocation of the user callback, ready to run.
pub type ReadyRun = Box<dyn FnOnce() + Send>;

/// The fused argument-assembly + callback closure of one reaction.
///
/// Runs in the emitting thread; returns `None` when a mandatory argument
/// is absent, which silently cancels the task being built.
pub type RunGenerator = Box<dyn Fn(&FetchContext<'_>) -> Option<ReadyRun> + Send + Sync>;

/// Tag identifying a synchronization group by marker type.
#[derive(Debug, Clone, Copy, Eq)]
pub struct GroupTag {
    id: TypeId,
    name: &'static str,
}

impl GroupTag {
    pub fn of<G: 'static>() -> Self {
        Self { id: TypeId::of::<G>(), name: std::any::type_name::<G>() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for GroupTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for GroupTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Which worker pool a reaction's tasks run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolId {
    /// The unnamed pool with the configured default concurrency.
    Default,
    /// The single worker owned by the thread that called `start`.
    Main,
    /// A named pool declared by a pool descriptor type.
    Named(TypeId),
    /// A pool of one worker dedicated to a single looping reaction.
    Dedicated(ReactionId),
}

/// Scheduling options accumulated from the subscription's words.
#[derive(Debug, Clone, Copy)]
pub struct ReactionOptions {
    pub priority: Priority,
    pub pool: PoolId,
    pub sync_group: Option<GroupTag>,
    /// Maximum concurrently running tasks of this reaction (`Single` is 1).
    pub limit: Option<usize>,
    /// Unbind after the first task has been attempted.
    pub once: bool,
    /// Resubmit a fresh task after each run until the plant drains.
    pub always: bool,
    /// Suppress statistics emission for this reaction's tasks.
    pub no_stats: bool,
}

impl Default for ReactionOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            pool: PoolId::Default,
            sync_group: None,
            limit: None,
            once: false,
            always: false,
            no_stats: false,
        }
    }
}

/// One durable subscription.
pub struct Reaction {
    id: ReactionId,
    label: SmolStr,
    enabled: AtomicBool,
    active: AtomicUsize,
    unbound: AtomicBool,
    options: ReactionOptions,
    generator: RunGenerator,
    unbinders: Mutex<Vec<Unbinder>>,
}

impl Reaction {
    pub fn new(
        id: ReactionId,
        label: impl Into<SmolStr>,
        options: ReactionOptions,
        generator: RunGenerator,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            label: label.into(),
            enabled: AtomicBool::new(true),
            active: AtomicUsize::new(0),
            unbound: AtomicBool::new(false),
            options,
            generator,
            unbinders: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> ReactionId {
        self.id
    }

    pub fn label(&self) -> &SmolStr {
        &self.label
    }

    pub fn options(&self) -> &ReactionOptions {
        &self.options
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Number of live tasks of this reaction: constructed, queued or
    /// running, but not yet finished. Tasks parked in a sync queue do
    /// not count.
    pub fn active_tasks(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn begin_task(&self) {
        self.active.fetch_add(1, Ordering::AcqRel);
    }

    pub fn finish_task(&self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Atomically claim a task slot against the concurrency limit.
    ///
    /// Claiming at construction rather than at start is what makes the
    /// limit hold when emissions burst faster than workers pick tasks
    /// up. Returns false, leaving the count untouched, when the
    /// reaction is saturated.
    pub fn claim_task_slot(&self) -> bool {
        let prior = self.active.fetch_add(1, Ordering::AcqRel);
        match self.options.limit {
            Some(limit) if prior >= limit => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                false
            }
            _ => true,
        }
    }

    /// Run the argument-assembly phase against `ctx`.
    pub fn generate(&self, ctx: &FetchContext<'_>) -> Option<ReadyRun> {
        (self.generator)(ctx)
    }

    /// Read-only view of the construction gate: enabled, bound, and
    /// below the concurrency limit. The dispatcher claims slots with
    /// [`claim_task_slot`](Self::claim_task_slot) instead, which is
    /// race-free.
    pub fn precondition(&self) -> bool {
        if !self.is_enabled() || self.unbound.load(Ordering::Acquire) {
            return false;
        }
        match self.options.limit {
            Some(limit) => self.active_tasks() < limit,
            None => true,
        }
    }

    /// Register cleanup to run when this reaction is unbound.
    pub fn add_unbinder(&self, unbinder: Unbinder) {
        self.unbinders.lock().push(unbinder);
    }

    /// Remove this reaction from every index it was bound into.
    ///
    /// Idempotent. In-flight tasks run to completion; new emissions stop
    /// producing tasks immediately.
    pub fn unbind(&self) {
        if self.unbound.swap(true, Ordering::AcqRel) {
            return;
        }
        self.disable();
        let mut unbinders = std::mem::take(&mut *self.unbinders.lock());
        while let Some(unbinder) = unbinders.pop() {
            unbinder();
        }
    }

    pub fn is_unbound(&self) -> bool {
        self.unbound.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reaction")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("enabled", &self.is_enabled())
            .field("active", &self.active_tasks())
            .finish_non_exhaustive()
    }
}

/// Detachable reference to a reaction.
#[derive(Debug, Clone)]
pub struct ReactionHandle {
    inner: Weak<Reaction>,
    id: ReactionId,
}

impl ReactionHandle {
    pub fn new(reaction: &Arc<Reaction>) -> Self {
        Self { inner: Arc::downgrade(reaction), id: reaction.id() }
    }

    pub fn id(&self) -> ReactionId {
        self.id
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.upgrade().is_some_and(|r| r.is_enabled())
    }

    /// Restore task delivery for subsequent emissions.
    pub fn enable(&self) {
        if let Some(reaction) = self.inner.upgrade() {
            reaction.enable();
        }
    }

    /// Stop producing tasks; the subscription stays registered.
    pub fn disable(&self) {
        if let Some(reaction) = self.inner.upgrade() {
            reaction.disable();
        }
    }

    /// Permanently remove the subscription. Idempotent.
    pub fn unbind(&self) {
        if let Some(reaction) = self.inner.upgrade() {
            reaction.unbind();
        }
    }
}

#[cfg(test)]
#[path = "reaction_tests.rs"]
mod tests;
