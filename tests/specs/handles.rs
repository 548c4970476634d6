// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handle lifecycle specs: enable, disable, unbind.

use crate::prelude::*;
use reflex_runtime::trigger;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Pulse;

fn counted_subscription(
    env: &reflex_runtime::Environment,
) -> (reflex_core::ReactionHandle, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    let handle = env
        .on(trigger::<Pulse>())
        .then("pulse", move |_: Arc<Pulse>| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    (handle, count)
}

#[test]
fn disable_stops_and_enable_restores_delivery() {
    let (plant, env) = plant(2);
    let (handle, count) = counted_subscription(&env);
    let running = RunningPlant::spawn(plant);

    running.env().emit(Pulse);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || count.load(Ordering::SeqCst) == 1));

    handle.disable();
    running.env().emit(Pulse);
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 1, "disabled reaction still ran");

    handle.enable();
    running.env().emit(Pulse);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || count.load(Ordering::SeqCst) == 2));
    running.stop();
}

#[test]
fn unbind_is_permanent_and_idempotent() {
    let (plant, env) = plant(2);
    let (handle, count) = counted_subscription(&env);
    let running = RunningPlant::spawn(plant);

    running.env().emit(Pulse);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || count.load(Ordering::SeqCst) == 1));

    handle.unbind();
    handle.unbind();
    running.env().emit(Pulse);
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 1, "unbound reaction still ran");

    // Enable cannot resurrect an unbound reaction.
    handle.enable();
    running.env().emit(Pulse);
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    running.stop();
}

#[test]
fn emission_with_no_subscribers_is_harmless() {
    let (plant, _env) = plant(1);
    let running = RunningPlant::spawn(plant);
    running.env().emit(Pulse);
    running.stop();
}
