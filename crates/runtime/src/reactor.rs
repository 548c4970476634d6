// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reactors and their emission environment.
//!
//! A reactor is a user type whose `install` constructor is the one place
//! bind-side side effects happen. The [`Environment`] it receives holds
//! only a weak back-reference to the plant, so reactors never keep a
//! dead plant alive; emissions after the plant is gone are dropped.

use crate::dsl::{OnBuilder, SourceSet};
use crate::plant::Core;
use crate::pool;
use reflex_core::{BindError, LogLevel, LogMessage, Message};
use smol_str::SmolStr;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// A user-defined component that installs subscriptions.
pub trait Reactor: Send + 'static {
    fn install(env: &Environment) -> Result<Self, BindError>
    where
        Self: Sized;
}

/// A reactor's connection to its plant.
#[derive(Clone)]
pub struct Environment {
    core: Weak<Core>,
    label: SmolStr,
    log_level: LogLevel,
}

impl Environment {
    pub(crate) fn new(core: Weak<Core>, label: impl Into<SmolStr>, log_level: LogLevel) -> Self {
        Self { core, label: label.into(), log_level }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Override the log filter for this reactor.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Begin a subscription over the given source words.
    pub fn on<S: SourceSet>(&self, sources: S) -> OnBuilder<S> {
        OnBuilder::new(self.core.clone(), sources)
    }

    /// Local emission: cache, then schedule interested reactions.
    pub fn emit<T: Message>(&self, value: T) {
        if let Some(core) = self.core.upgrade() {
            core.emit(value);
        }
    }

    /// Run interested reactions synchronously in this thread.
    pub fn emit_direct<T: Message>(&self, value: T) {
        if let Some(core) = self.core.upgrade() {
            core.emit_direct(value);
        }
    }

    /// Deferred emission that fires during `start`, before any other
    /// task. After start this is a plain local emission.
    pub fn emit_init<T: Message>(&self, value: T) {
        if let Some(core) = self.core.upgrade() {
            core.emit_deferred(value);
        }
    }

    /// Local emission fired by the timer service after `delay`.
    pub fn emit_delayed<T: Message>(&self, value: T, delay: Duration) {
        if let Some(core) = self.core.upgrade() {
            let at = core.now() + delay;
            core.chrono.delay(at, Box::new(move |core: &Arc<Core>| core.emit(value)));
        }
    }

    /// Reset every watchdog keyed by `T`.
    pub fn emit_watchdog<T: Message>(&self) {
        if let Some(core) = self.core.upgrade() {
            let key = core.interner.key_of::<T>();
            core.chrono.reset_watchdog(key);
        }
    }

    /// Initiate plant shutdown; safe from inside a reaction.
    pub fn shutdown(&self) {
        if let Some(core) = self.core.upgrade() {
            core.initiate_shutdown();
        }
    }

    /// Log through the plant: messages at or above this reactor's level
    /// are emitted Direct as [`LogMessage`] and bridged to `tracing`.
    pub fn log(&self, level: LogLevel, text: impl Into<String>) {
        if level < self.log_level {
            return;
        }
        let text = text.into();
        let (reaction, task) = match pool::current_node() {
            Some(node) => {
                let cause = node.cause();
                (Some(cause.reaction), Some(cause.task))
            }
            None => (None, None),
        };
        match level {
            LogLevel::Trace => tracing::trace!(reactor = %self.label, "{text}"),
            LogLevel::Debug => tracing::debug!(reactor = %self.label, "{text}"),
            LogLevel::Info => tracing::info!(reactor = %self.label, "{text}"),
            LogLevel::Warn => tracing::warn!(reactor = %self.label, "{text}"),
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(reactor = %self.label, "{text}")
            }
        }
        if let Some(core) = self.core.upgrade() {
            core.emit_direct(LogMessage { level, text, reaction, task });
        }
    }

    /// Lazily-created shared service state keyed by type; `None` once
    /// the plant is gone.
    pub fn extension<E: Default + Send + Sync + 'static>(&self) -> Option<Arc<E>> {
        self.core.upgrade().map(|core| core.extension::<E>())
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment").field("label", &self.label).finish_non_exhaustive()
    }
}
