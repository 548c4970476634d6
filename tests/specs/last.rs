// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded-history delivery specs.

use crate::prelude::*;
use parking_lot::Mutex;
use reflex_runtime::{last, trigger};
use std::sync::Arc;

struct Count(u32);

#[test]
fn last_five_sees_growing_then_sliding_windows() {
    let (plant, env) = plant(1);
    let seen: Arc<Mutex<Vec<Vec<u32>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let next = env.clone();
    env.on(last(5, trigger::<Count>()))
        .then("window", move |window: Vec<Arc<Count>>| {
            let values: Vec<u32> = window.iter().map(|c| c.0).collect();
            let newest = values[0];
            sink.lock().push(values);
            if newest < 10 {
                next.emit(Count(newest + 1));
            } else {
                next.shutdown();
            }
        })
        .unwrap();
    env.emit(Count(1));
    plant.start();

    let seen = seen.lock();
    let sizes: Vec<usize> = seen.iter().map(|w| w.len()).collect();
    assert_eq!(sizes, vec![1, 2, 3, 4, 5, 5, 5, 5, 5, 5]);
    assert_eq!(seen[0], vec![1]);
    assert_eq!(seen[1], vec![2, 1]);
    assert_eq!(seen[4], vec![5, 4, 3, 2, 1]);
    assert_eq!(seen[9], vec![10, 9, 8, 7, 6]);
}

#[test]
fn last_one_behaves_like_a_plain_trigger() {
    let (plant, env) = plant(1);
    let seen: Arc<Mutex<Vec<Vec<u32>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let stopper = env.clone();
    env.on(last(1, trigger::<Count>()))
        .then("single", move |window: Vec<Arc<Count>>| {
            sink.lock().push(window.iter().map(|c| c.0).collect());
            stopper.shutdown();
        })
        .unwrap();
    env.emit(Count(7));
    plant.start();
    assert_eq!(*seen.lock(), vec![vec![7]]);
}
