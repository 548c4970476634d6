// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrency-limit specs: single and buffered reactions.

use crate::prelude::*;
use reflex_runtime::trigger;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct Burst;

#[test]
fn single_reaction_never_overlaps_itself() {
    let (plant, env) = plant(4);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    {
        let active = active.clone();
        let peak = peak.clone();
        let runs = runs.clone();
        env.on(trigger::<Burst>())
            .single()
            .then("lone", move |_: Arc<Burst>| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let running = RunningPlant::spawn(plant);
    for _ in 0..20 {
        running.env().emit(Burst);
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(wait_for(SPEC_WAIT_MAX_MS, || runs.load(Ordering::SeqCst) >= 1));
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(peak.load(Ordering::SeqCst), 1, "single reaction overlapped itself");
    // Saturated emissions are abandoned, not queued.
    assert!(runs.load(Ordering::SeqCst) < 20);
    running.stop();
}

#[test]
fn buffered_reaction_caps_concurrency_at_n() {
    let (plant, env) = plant(4);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    {
        let active = active.clone();
        let peak = peak.clone();
        let runs = runs.clone();
        env.on(trigger::<Burst>())
            .buffer(2)
            .then("pair", move |_: Arc<Burst>| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                active.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let running = RunningPlant::spawn(plant);
    for _ in 0..30 {
        running.env().emit(Burst);
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(wait_for(SPEC_WAIT_MAX_MS, || runs.load(Ordering::SeqCst) >= 2));
    std::thread::sleep(Duration::from_millis(50));
    assert!(peak.load(Ordering::SeqCst) <= 2, "buffer(2) exceeded");
    running.stop();
}
