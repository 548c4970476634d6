// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority ordering specs.

use crate::prelude::*;
use parking_lot::Mutex;
use reflex_core::Priority;
use reflex_runtime::trigger;
use std::sync::Arc;
use std::time::Duration;

struct Gate;
struct Work;

#[test]
fn higher_priority_tasks_start_first() {
    let (plant, env) = plant(1);
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    // Holds the single worker so the Work tasks pile up in the queue.
    env.on(trigger::<Gate>())
        .then("gate", move |_: Arc<Gate>| std::thread::sleep(Duration::from_millis(100)))
        .unwrap();

    // Subscribed lowest-priority first, so queue order cannot be
    // mistaken for insertion order.
    for (name, priority) in
        [("low", Priority::Low), ("normal", Priority::Normal), ("high", Priority::High)]
    {
        let sink = order.clone();
        let stopper = env.clone();
        env.on(trigger::<Work>())
            .priority(priority)
            .then(name, move |_: Arc<Work>| {
                let mut order = sink.lock();
                order.push(name);
                if order.len() == 3 {
                    stopper.shutdown();
                }
            })
            .unwrap();
    }

    let running = RunningPlant::spawn(plant);
    running.env().emit(Gate);
    std::thread::sleep(Duration::from_millis(30));
    running.env().emit(Work);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || order.lock().len() == 3));
    assert_eq!(*order.lock(), vec!["high", "normal", "low"]);
    running.stop();
}

#[test]
fn idle_tasks_run_only_when_nothing_else_is_queued() {
    let (plant, env) = plant(1);
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    env.on(trigger::<Gate>())
        .then("gate", move |_: Arc<Gate>| std::thread::sleep(Duration::from_millis(100)))
        .unwrap();

    for (name, priority) in [("idle", Priority::Idle), ("low", Priority::Low)] {
        let sink = order.clone();
        let stopper = env.clone();
        env.on(trigger::<Work>())
            .priority(priority)
            .then(name, move |_: Arc<Work>| {
                let mut order = sink.lock();
                order.push(name);
                if order.len() == 2 {
                    stopper.shutdown();
                }
            })
            .unwrap();
    }

    let running = RunningPlant::spawn(plant);
    running.env().emit(Gate);
    std::thread::sleep(Duration::from_millis(30));
    running.env().emit(Work);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || order.lock().len() == 2));
    assert_eq!(*order.lock(), vec!["low", "idle"]);
    running.stop();
}
