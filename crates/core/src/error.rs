// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bind-time errors.

use std::os::fd::RawFd;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced while installing a reactor or binding a subscription.
///
/// A failed bind aborts the installation; nothing is partially
/// registered from the failing `on` call.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("plant is shutting down")]
    Draining,
    #[error("invalid file descriptor: {0}")]
    InvalidFd(RawFd),
    #[error("interval must be non-zero, got {0:?}")]
    InvalidInterval(Duration),
    #[error("rate must be non-zero")]
    InvalidRate,
    #[error("pool {0} already declared with concurrency {1}")]
    PoolConflict(&'static str, usize),
    #[error("socket setup failed: {0}")]
    Socket(#[from] std::io::Error),
}
