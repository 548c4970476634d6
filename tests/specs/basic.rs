// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Basic trigger delivery specs.

use crate::prelude::*;
use parking_lot::Mutex;
use reflex_runtime::{trigger, with};
use std::sync::Arc;

struct Meter {
    data: i32,
}

struct Offset {
    data: i32,
}

#[test]
fn basic_trigger_delivers_the_emitted_value() {
    let (plant, env) = plant(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let stopper = env.clone();
    env.on(trigger::<Meter>())
        .then("meter", move |m: Arc<Meter>| {
            sink.lock().push(m.data);
            stopper.shutdown();
        })
        .unwrap();
    env.emit(Meter { data: 10 });
    plant.start();
    assert_eq!(*seen.lock(), vec![10]);
}

#[test]
fn with_data_is_satisfied_from_the_cache() {
    let (plant, env) = plant(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let stopper = env.clone();
    env.on((trigger::<Meter>(), with::<Offset>()))
        .then("meter+offset", move |m: Arc<Meter>, o: Arc<Offset>| {
            sink.lock().push(m.data + o.data);
            stopper.shutdown();
        })
        .unwrap();
    env.emit(Offset { data: 100 });
    env.emit(Meter { data: 10 });
    plant.start();
    assert_eq!(*seen.lock(), vec![110]);
}

#[test]
fn missing_with_data_silently_drops_the_task() {
    let (plant, env) = plant(2);
    let runs = Arc::new(Mutex::new(0usize));
    let counter = runs.clone();
    env.on((trigger::<Meter>(), with::<Offset>()))
        .then("starved", move |_: Arc<Meter>, _: Arc<Offset>| {
            *counter.lock() += 1;
        })
        .unwrap();
    let running = RunningPlant::spawn(plant);
    // No Offset has ever been emitted: no task may be produced.
    running.env().emit(Meter { data: 1 });
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(*runs.lock(), 0);
    running.stop();
}

#[test]
fn every_interested_reaction_gets_one_task_per_emission() {
    let (plant, env) = plant(4);
    let hits = Arc::new(Mutex::new(Vec::new()));
    for name in ["a", "b", "c"] {
        let sink = hits.clone();
        env.on(trigger::<Meter>())
            .then(name, move |_: Arc<Meter>| sink.lock().push(name))
            .unwrap();
    }
    let running = RunningPlant::spawn(plant);
    running.env().emit(Meter { data: 1 });
    assert!(wait_for(SPEC_WAIT_MAX_MS, || hits.lock().len() == 3));
    let mut names = hits.lock().clone();
    names.sort_unstable();
    assert_eq!(names, vec!["a", "b", "c"]);
    running.stop();
}

#[test]
fn emissions_from_callbacks_chain() {
    struct First;
    struct Second;

    let (plant, env) = plant(2);
    let chained = env.clone();
    env.on(trigger::<First>())
        .then("first", move |_: Arc<First>| chained.emit(Second))
        .unwrap();
    let done = Arc::new(Mutex::new(false));
    let flag = done.clone();
    let stopper = env.clone();
    env.on(trigger::<Second>())
        .then("second", move |_: Arc<Second>| {
            *flag.lock() = true;
            stopper.shutdown();
        })
        .unwrap();
    env.emit(First);
    plant.start();
    assert!(*done.lock());
}
