// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Synthetic messages emitted by the runtime itself.
//!
//! These are ordinary message types: user code subscribes to them with the
//! same DSL it uses for its own messages.

use crate::id::{ReactionId, TaskId};
use crate::task::Cause;
use bitflags::bitflags;
use smol_str::SmolStr;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::time::Instant;

/// Emitted once, locally, when the plant starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Startup;

/// Emitted once, locally, when shutdown is initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown;

/// Emitted once during start when the host supplied argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLineArguments {
    pub args: Vec<String>,
}

/// Severity of a [`LogMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        })
    }
}

/// Emitted with Direct scope whenever a reactor logs at or above its
/// configured level.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub level: LogLevel,
    pub text: String,
    /// Reaction that was running when the log call was made, if any.
    pub reaction: Option<ReactionId>,
    /// Task that was running when the log call was made, if any.
    pub task: Option<TaskId>,
}

/// Emitted after each task finishes, carrying timing and failure info.
#[derive(Debug, Clone)]
pub struct ReactionStatistics {
    pub label: SmolStr,
    pub reaction: ReactionId,
    pub task: TaskId,
    pub cause: Option<Cause>,
    pub emitted_at: Instant,
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Panic payload text if the user callback panicked.
    pub panic: Option<String>,
}

impl ReactionStatistics {
    pub fn succeeded(&self) -> bool {
        self.panic.is_none()
    }

    pub fn run_time(&self) -> std::time::Duration {
        self.finished_at.duration_since(self.started_at)
    }

    pub fn queue_time(&self) -> std::time::Duration {
        self.started_at.duration_since(self.emitted_at)
    }
}

bitflags! {
    /// Readiness bits for file-descriptor subscriptions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IoEvents: u8 {
        const READ  = 0b0001;
        const WRITE = 0b0010;
        const CLOSE = 0b0100;
        const ERROR = 0b1000;
    }
}

/// One readiness notification from the IO service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoEvent {
    pub fd: RawFd,
    pub events: IoEvents,
}

/// A raw datagram delivered to a UDP subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub source: SocketAddr,
    pub payload: Vec<u8>,
}

/// An accepted connection delivered to a TCP subscription.
///
/// The receiving reaction owns the descriptor; pairing it with an
/// `io(fd, ..)` subscription is the usual next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpConnection {
    pub fd: RawFd,
    pub peer: SocketAddr,
}

#[cfg(test)]
#[path = "messages_tests.rs"]
mod tests;
