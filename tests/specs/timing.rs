// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timer service specs: rates, delays, watchdogs.

use crate::prelude::*;
use parking_lot::Mutex;
use reflex_runtime::{every, per, trigger, watchdog};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Delayed(i32);
struct Service;

#[test]
#[serial]
fn per_second_rate_fires_at_the_nominal_frequency() {
    let (plant, env) = plant(2);
    let stamps: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = stamps.clone();
    env.on(per(100, Duration::from_secs(1)))
        .then("rate", move |_: Instant| sink.lock().push(Instant::now()))
        .unwrap();

    let running = RunningPlant::spawn(plant);
    std::thread::sleep(Duration::from_millis(1100));
    running.stop();

    let stamps = stamps.lock();
    // 100 Hz for 1.1s with generous CI margins.
    assert!(
        (85..=125).contains(&stamps.len()),
        "expected about 110 firings, got {}",
        stamps.len()
    );
    let intervals: Vec<Duration> =
        stamps.windows(2).map(|pair| pair[1].duration_since(pair[0])).collect();
    let mean = intervals.iter().sum::<Duration>() / intervals.len() as u32;
    assert!(
        (Duration::from_millis(8)..=Duration::from_millis(12)).contains(&mean),
        "mean inter-arrival {mean:?} is off the 10ms nominal"
    );
}

#[test]
#[serial]
fn every_and_per_agree_on_the_period() {
    let (plant, env) = plant(2);
    let every_count = Arc::new(AtomicUsize::new(0));
    let per_count = Arc::new(AtomicUsize::new(0));
    {
        let count = every_count.clone();
        env.on(every(Duration::from_millis(20)))
            .then("every", move |_: Instant| {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    {
        let count = per_count.clone();
        env.on(per(50, Duration::from_secs(1)))
            .then("per", move |_: Instant| {
                count.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    let running = RunningPlant::spawn(plant);
    std::thread::sleep(Duration::from_millis(400));
    running.stop();
    let every_fired = every_count.load(Ordering::SeqCst) as i64;
    let per_fired = per_count.load(Ordering::SeqCst) as i64;
    assert!((every_fired - per_fired).abs() <= 4, "every={every_fired} per={per_fired}");
}

#[test]
fn delayed_emissions_arrive_after_the_delay() {
    let (plant, env) = plant(2);
    let arrived: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let sink = arrived.clone();
    let stopper = env.clone();
    env.on(trigger::<Delayed>())
        .then("delayed", move |_: Arc<Delayed>| {
            *sink.lock() = Some(Instant::now());
            stopper.shutdown();
        })
        .unwrap();

    let started = Instant::now();
    env.emit_delayed(Delayed(1), Duration::from_millis(50));
    plant.start();

    let arrived = arrived.lock().take().expect("delayed emission never arrived");
    let waited = arrived.duration_since(started);
    assert!(waited >= Duration::from_millis(45), "arrived too early: {waited:?}");
    assert!(waited < Duration::from_millis(1000), "arrived too late: {waited:?}");
}

#[test]
#[serial]
fn watchdog_fires_once_resets_stop() {
    let (plant, env) = plant(2);
    let fired: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    env.on(watchdog::<Service>(Duration::from_millis(80)))
        .then("watchdog", move |_: Instant| sink.lock().push(Instant::now()))
        .unwrap();

    let running = RunningPlant::spawn(plant);
    let started = Instant::now();
    // Service the watchdog for a while, then go quiet.
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(40));
        running.env().emit_watchdog::<Service>();
    }
    assert!(fired.lock().is_empty(), "watchdog fired while being serviced");
    assert!(wait_for(SPEC_WAIT_MAX_MS, || !fired.lock().is_empty()));
    running.stop();

    let first = fired.lock()[0];
    // Three 40ms resets push the first possible expiry past 200ms.
    assert!(first.duration_since(started) >= Duration::from_millis(150));
}
