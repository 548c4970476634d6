// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IO readiness specs over a local socket pair.

use crate::prelude::*;
use parking_lot::Mutex;
use reflex_core::{IoEvent, IoEvents};
use reflex_runtime::io_source;
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

#[test]
fn readiness_fires_once_per_written_chunk() {
    let (reader, mut writer) = UnixStream::pair().unwrap();
    let read_fd = reader.as_raw_fd();
    let drain = reader.try_clone().unwrap();

    let (plant, env) = plant(2);
    let events: Arc<Mutex<Vec<IoEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handle = env
        .on(io_source(read_fd, IoEvents::READ))
        .then("pipe-read", move |event: IoEvent| {
            if event.events.contains(IoEvents::READ) {
                let mut buffer = [0u8; 64];
                // Read through a shared reference so the callback stays Fn.
                let _ = (&drain).read(&mut buffer);
            }
            sink.lock().push(event);
        })
        .unwrap();

    let running = RunningPlant::spawn(plant);
    writer.write_all(&[7]).unwrap();

    assert!(wait_for(SPEC_WAIT_MAX_MS, || !events.lock().is_empty()));
    // Settle to catch spurious re-fires of the level-triggered fd.
    std::thread::sleep(std::time::Duration::from_millis(50));
    {
        let events = events.lock();
        let reads: Vec<&IoEvent> = events
            .iter()
            .filter(|e| e.events.contains(IoEvents::READ) && !e.events.contains(IoEvents::CLOSE))
            .collect();
        assert_eq!(reads.len(), 1, "expected one read event, got {events:?}");
        assert_eq!(reads[0].fd, read_fd);
    }

    // Closing the peer delivers CLOSE and auto-unbinds the reaction.
    drop(writer);
    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        events.lock().iter().any(|e| e.events.contains(IoEvents::CLOSE))
    }));
    assert!(wait_for(SPEC_WAIT_MAX_MS, || !handle.is_enabled()));
    running.stop();
}

#[test]
fn writable_descriptors_report_write_readiness() {
    let (reader, writer) = UnixStream::pair().unwrap();
    let write_fd = writer.as_raw_fd();

    let (plant, env) = plant(2);
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let stopper = env.clone();
    env.on(io_source(write_fd, IoEvents::WRITE))
        .then("pipe-write", move |event: IoEvent| {
            if sink.lock().replace(event).is_none() {
                stopper.shutdown();
            }
        })
        .unwrap();

    plant.start();
    let event = seen.lock().take().expect("no write readiness");
    assert_eq!(event.fd, write_fd);
    assert!(event.events.contains(IoEvents::WRITE));
    drop(reader);
}
