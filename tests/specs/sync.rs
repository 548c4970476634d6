// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sync-group mutual exclusion specs.

use crate::prelude::*;
use reflex_runtime::trigger;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Tick;
struct GroupS;

#[test]
fn sync_group_never_runs_two_tasks_at_once() {
    let (plant, env) = plant(4);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));

    for name in ["incr", "decr"] {
        let active = active.clone();
        let peak = peak.clone();
        let runs = runs.clone();
        env.on(trigger::<Tick>())
            .sync::<GroupS>()
            .then(name, move |_: Arc<Tick>| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                active.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    let running = RunningPlant::spawn(plant);
    for _ in 0..500 {
        running.env().emit(Tick);
    }
    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || runs.load(Ordering::SeqCst) == 1000),
        "only {} of 1000 sync tasks ran",
        runs.load(Ordering::SeqCst)
    );
    assert_eq!(peak.load(Ordering::SeqCst), 1, "two sync tasks overlapped");
    running.stop();
}

#[test]
fn separate_groups_do_not_serialize_each_other() {
    struct GroupA;
    struct GroupB;

    let (plant, env) = plant(4);
    let runs = Arc::new(AtomicUsize::new(0));
    for _ in 0..2 {
        let runs = runs.clone();
        env.on(trigger::<Tick>())
            .sync::<GroupA>()
            .then("a", move |_: Arc<Tick>| {
                runs.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    let runs_b = runs.clone();
    env.on(trigger::<Tick>())
        .sync::<GroupB>()
        .then("b", move |_: Arc<Tick>| {
            runs_b.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let running = RunningPlant::spawn(plant);
    for _ in 0..100 {
        running.env().emit(Tick);
    }
    assert!(wait_for(SPEC_WAIT_MAX_MS, || runs.load(Ordering::SeqCst) == 300));
    running.stop();
}
