// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-plant pub/sub specs over loopback.

use crate::prelude::*;
use parking_lot::Mutex;
use reflex_net::{configure_network, network, FromNetwork, NetConfig, NetEmit, NetworkReactor};
use reflex_runtime::{Plant, PlantConfig};
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Telemetry {
    sequence: u32,
    value: f64,
}

const ALPHA_PORT: u16 = 47631;
const BETA_PORT: u16 = 47632;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
}

fn node(name: &str, port: u16, peer: (&str, u16)) -> (Plant, reflex_runtime::Environment) {
    let plant = Plant::new(PlantConfig::default().default_pool_concurrency(2));
    let env = plant.environment();
    // Static peers and no announce port: discovery-free loopback wiring.
    configure_network(
        &env,
        NetConfig::new(name)
            .data_port(port)
            .announce_port(0)
            .static_peer(peer.0, loopback(peer.1)),
    );
    plant.install::<NetworkReactor>().unwrap();
    (plant, env)
}

#[test]
#[serial]
fn typed_messages_cross_plants() {
    let (alpha, alpha_env) = node("alpha", ALPHA_PORT, ("beta", BETA_PORT));
    let (beta, beta_env) = node("beta", BETA_PORT, ("alpha", ALPHA_PORT));

    let seen: Arc<Mutex<Vec<(SocketAddr, u32)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    beta_env
        .on(network::<Telemetry>())
        .then("telemetry", move |packet: Arc<FromNetwork<Telemetry>>| {
            sink.lock().push((packet.source, packet.data.sequence));
        })
        .unwrap();

    let alpha_running = RunningPlant::spawn(alpha);
    let beta_running = RunningPlant::spawn(beta);
    // Let the IO threads come up before sending.
    std::thread::sleep(std::time::Duration::from_millis(100));

    alpha_env
        .emit_network(&Telemetry { sequence: 42, value: 1.5 }, Some("beta"), true)
        .unwrap();

    assert!(
        wait_for(SPEC_WAIT_MAX_MS, || !seen.lock().is_empty()),
        "telemetry never arrived"
    );
    {
        let seen = seen.lock();
        assert_eq!(seen[0].1, 42);
        assert_eq!(seen[0].0, loopback(ALPHA_PORT));
    }

    beta_running.stop();
    alpha_running.stop();
}

#[test]
#[serial]
fn retransmission_does_not_duplicate_delivery() {
    let (alpha, alpha_env) = node("alpha", ALPHA_PORT, ("beta", BETA_PORT));
    let (beta, beta_env) = node("beta", BETA_PORT, ("alpha", ALPHA_PORT));

    let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    beta_env
        .on(network::<Telemetry>())
        .then("telemetry", move |packet: Arc<FromNetwork<Telemetry>>| {
            sink.lock().push(packet.data.sequence);
        })
        .unwrap();

    let alpha_running = RunningPlant::spawn(alpha);
    let beta_running = RunningPlant::spawn(beta);
    std::thread::sleep(std::time::Duration::from_millis(100));

    for sequence in 0..5 {
        alpha_env
            .emit_network(&Telemetry { sequence, value: 0.0 }, Some("beta"), true)
            .unwrap();
    }

    assert!(wait_for(SPEC_WAIT_MAX_MS, || seen.lock().len() >= 5));
    // Give retransmissions a window to (wrongly) double-deliver.
    std::thread::sleep(std::time::Duration::from_millis(300));
    let mut received = seen.lock().clone();
    received.sort_unstable();
    assert_eq!(received, vec![0, 1, 2, 3, 4]);

    beta_running.stop();
    alpha_running.stop();
}
