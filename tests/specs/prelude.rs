// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for the scenario specs.

use reflex_runtime::{Environment, Plant, PlantConfig};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Ceiling for condition polling in specs.
pub const SPEC_WAIT_MAX_MS: u64 = 5_000;

/// Build a plant with `workers` default-pool workers.
pub fn plant(workers: usize) -> (Plant, Environment) {
    let plant = Plant::new(PlantConfig::default().default_pool_concurrency(workers));
    let env = plant.environment();
    (plant, env)
}

/// Poll `condition` until it holds or `max_ms` elapses.
pub fn wait_for(max_ms: u64, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(max_ms);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A plant running on a background thread.
///
/// Dropping stops the plant and joins the thread, so a failing assert
/// never leaves the test hanging.
pub struct RunningPlant {
    env: Environment,
    thread: Option<JoinHandle<()>>,
}

impl RunningPlant {
    pub fn spawn(plant: Plant) -> Self {
        let env = plant.environment();
        let thread = std::thread::spawn(move || plant.start());
        Self { env, thread: Some(thread) }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.env.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RunningPlant {
    fn drop(&mut self) {
        self.halt();
    }
}
