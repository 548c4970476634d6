// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The network service, installed as an ordinary reactor.
//!
//! [`NetworkReactor`] subscribes to its own sockets with the runtime's
//! UDP words and to the timer service for announces and retransmission.
//! Shared state lives in the plant's extension slot so the
//! [`network`](crate::words::network) word and the emit scopes reach the
//! same peer table and codec registry.

use crate::dedup::PacketDeduplicator;
use crate::hash::TypeHash;
use crate::rtt::RttEstimator;
use crate::wire::{decode, encode, Packet};
use parking_lot::{Mutex, RwLock};
use reflex_core::{BindError, Datagram, IoEvent, IoEvents, Message};
use reflex_runtime::{every, io_source, shutdown, udp_multicast, Environment, Reactor};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors surfaced from the network emit scopes.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("network service is not installed")]
    NotInstalled,
    #[error("no peer named {0}")]
    NoPeer(String),
    #[error("payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("send failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Network configuration; set with [`configure_network`] before
/// installing [`NetworkReactor`].
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub node_name: String,
    /// Port data packets arrive on.
    pub data_port: u16,
    /// Announce port; 0 disables multicast discovery.
    pub announce_port: u16,
    pub announce_group: Ipv4Addr,
    pub announce_interval: Duration,
    /// Retransmission bookkeeping cadence.
    pub retransmit_interval: Duration,
    pub min_rto: Duration,
    pub max_rto: Duration,
    /// Reliable packets are dropped after this many attempts.
    pub max_retransmits: u32,
    /// Peers known without discovery, as (name, data address).
    pub static_peers: Vec<(String, SocketAddr)>,
}

impl NetConfig {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self { node_name: node_name.into(), ..Self::default() }
    }

    pub fn data_port(mut self, port: u16) -> Self {
        self.data_port = port;
        self
    }

    pub fn announce_port(mut self, port: u16) -> Self {
        self.announce_port = port;
        self
    }

    pub fn announce_group(mut self, group: Ipv4Addr) -> Self {
        self.announce_group = group;
        self
    }

    pub fn static_peer(mut self, name: impl Into<String>, addr: SocketAddr) -> Self {
        self.static_peers.push((name.into(), addr));
        self
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            node_name: "reflex".to_string(),
            data_port: 7447,
            announce_port: 7446,
            announce_group: Ipv4Addr::new(239, 226, 152, 162),
            announce_interval: Duration::from_secs(1),
            retransmit_interval: Duration::from_millis(50),
            min_rto: Duration::from_millis(100),
            max_rto: Duration::from_secs(60),
            max_retransmits: 5,
            static_peers: Vec::new(),
        }
    }
}

/// A reliable packet awaiting its ack.
struct PendingPacket {
    frame: Vec<u8>,
    sent_at: Instant,
    first_sent_at: Instant,
    attempts: u32,
}

/// One known remote plant.
pub struct Peer {
    name: Mutex<String>,
    addr: SocketAddr,
    dedup: Mutex<PacketDeduplicator>,
    rtt: Mutex<RttEstimator>,
    pending: Mutex<HashMap<u16, PendingPacket>>,
}

impl Peer {
    fn new(name: String, addr: SocketAddr, min_rto: Duration, max_rto: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(name),
            addr,
            dedup: Mutex::new(PacketDeduplicator::new()),
            rtt: Mutex::new(RttEstimator::new(min_rto, max_rto)),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> String {
        self.name.lock().clone()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Deserializer registered by a `network::<T>()` word.
type Codec = Arc<dyn Fn(SocketAddr, &serde_json::Value) + Send + Sync>;

/// Shared network state living in the plant's extension slot.
#[derive(Default)]
pub struct NetState {
    config: Mutex<NetConfig>,
    pub(crate) codecs: RwLock<HashMap<TypeHash, Codec>>,
    peers: Mutex<HashMap<SocketAddr, Arc<Peer>>>,
    /// Send half of the data socket. Sends originate here so the source
    /// address peers see is the address they should reply and ack to.
    sender: Mutex<Option<UdpSocket>>,
    /// Receive half of the data socket, pumped by the IO word.
    receiver: Mutex<Option<UdpSocket>>,
    next_id: AtomicU16,
    draining: AtomicBool,
    installed: AtomicBool,
}

impl NetState {
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    pub(crate) fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub(crate) fn register_codec(&self, hash: TypeHash, codec: Codec) {
        self.codecs.write().insert(hash, codec);
    }

    fn next_packet_id(&self) -> u16 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn ensure_peer(&self, name: &str, addr: SocketAddr) -> Arc<Peer> {
        let config = self.config.lock();
        let (min_rto, max_rto) = (config.min_rto, config.max_rto);
        drop(config);
        let mut peers = self.peers.lock();
        let peer = peers
            .entry(addr)
            .or_insert_with(|| Peer::new(name.to_string(), addr, min_rto, max_rto))
            .clone();
        if !name.is_empty() {
            *peer.name.lock() = name.to_string();
        }
        peer
    }

    fn peer_named(&self, name: &str) -> Option<Arc<Peer>> {
        self.peers.lock().values().find(|peer| peer.name.lock().as_str() == name).cloned()
    }

    fn all_peers(&self) -> Vec<Arc<Peer>> {
        self.peers.lock().values().cloned().collect()
    }

    fn ensure_sender(&self) -> Result<(), std::io::Error> {
        let mut sender = self.sender.lock();
        if sender.is_none() {
            *sender = Some(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?);
        }
        Ok(())
    }

    fn send_frame(&self, addr: SocketAddr, frame: &[u8]) -> Result<(), std::io::Error> {
        self.ensure_sender()?;
        let guard = self.sender.lock();
        match guard.as_ref() {
            Some(socket) => socket.send_to(frame, addr).map(|_| ()),
            // ensure_sender just filled the slot.
            None => unreachable!("sender socket missing after ensure"),
        }
    }

    /// Drain the data socket, handling every queued frame.
    fn pump(&self, env: &Environment) {
        let mut frames = Vec::new();
        {
            let guard = self.receiver.lock();
            let Some(socket) = guard.as_ref() else {
                return;
            };
            let mut buffer = vec![0u8; crate::wire::MAX_FRAME_LEN + 4];
            while let Ok((length, source)) = socket.recv_from(&mut buffer) {
                frames.push(Datagram { source, payload: buffer[..length].to_vec() });
            }
        }
        for datagram in frames {
            self.handle_data(env, &datagram);
        }
    }

    /// Handle one frame arriving on the data port.
    pub(crate) fn handle_data(&self, env: &Environment, datagram: &Datagram) {
        let packet = match decode(&datagram.payload) {
            Ok(packet) => packet,
            Err(error) => {
                tracing::debug!(source = %datagram.source, %error, "dropping malformed frame");
                return;
            }
        };
        match packet {
            Packet::Data { id, hash, reliable, payload } => {
                let peer = self.ensure_peer("", datagram.source);
                if reliable {
                    let ack = Packet::Ack { id };
                    if let Ok(frame) = encode(&ack) {
                        let _ = self.send_frame(datagram.source, &frame);
                    }
                }
                {
                    let mut dedup = peer.dedup.lock();
                    if dedup.is_duplicate(id) {
                        tracing::trace!(source = %datagram.source, id, "dropping duplicate");
                        return;
                    }
                    dedup.add_packet(id);
                }
                let codec = self.codecs.read().get(&hash).cloned();
                match codec {
                    Some(codec) => codec(datagram.source, &payload),
                    None => {
                        tracing::debug!(source = %datagram.source, %hash, "no codec for packet")
                    }
                }
            }
            Packet::Ack { id } => {
                let peer = self.ensure_peer("", datagram.source);
                if let Some(pending) = peer.pending.lock().remove(&id) {
                    peer.rtt.lock().measure(pending.first_sent_at.elapsed());
                }
            }
            Packet::Announce { node, data_port } => {
                self.note_announce(env, &node, datagram.source, data_port);
            }
        }
    }

    /// Handle one frame arriving on the announce port.
    fn handle_announce(&self, env: &Environment, datagram: &Datagram) {
        if let Ok(Packet::Announce { node, data_port }) = decode(&datagram.payload) {
            self.note_announce(env, &node, datagram.source, data_port);
        }
    }

    fn note_announce(&self, env: &Environment, node: &str, source: SocketAddr, data_port: u16) {
        if node == self.config.lock().node_name {
            return;
        }
        let addr = SocketAddr::new(source.ip(), data_port);
        let known = self.peers.lock().contains_key(&addr);
        self.ensure_peer(node, addr);
        if !known {
            env.log(reflex_core::LogLevel::Info, format!("discovered peer {node} at {addr}"));
        }
    }

    /// Periodic announce broadcast.
    fn beacon(&self) {
        if self.is_draining() {
            return;
        }
        let config = self.config.lock().clone();
        if config.announce_port == 0 {
            return;
        }
        let packet =
            Packet::Announce { node: config.node_name.clone(), data_port: config.data_port };
        if let Ok(frame) = encode(&packet) {
            let target = SocketAddr::new(config.announce_group.into(), config.announce_port);
            if let Err(error) = self.send_frame(target, &frame) {
                tracing::debug!(%error, "announce failed");
            }
        }
    }

    /// Resend overdue reliable packets; drop after too many attempts.
    fn retransmit(&self) {
        if self.is_draining() {
            return;
        }
        let max_attempts = self.config.lock().max_retransmits;
        for peer in self.all_peers() {
            let timeout = peer.rtt.lock().timeout();
            let mut pending = peer.pending.lock();
            let mut resend = Vec::new();
            pending.retain(|id, packet| {
                if packet.sent_at.elapsed() < timeout {
                    return true;
                }
                if packet.attempts >= max_attempts {
                    tracing::warn!(peer = %peer.name(), id, "dropping unacked packet");
                    return false;
                }
                packet.attempts += 1;
                packet.sent_at = Instant::now();
                resend.push(packet.frame.clone());
                true
            });
            drop(pending);
            for frame in resend {
                let _ = self.send_frame(peer.addr, &frame);
            }
        }
    }

    /// Send one serialized value to `target` (or every peer).
    fn send_value(
        &self,
        hash: TypeHash,
        payload: serde_json::Value,
        target: Option<&str>,
        reliable: bool,
    ) -> Result<(), EmitError> {
        let peers = match target {
            Some(name) => {
                vec![self.peer_named(name).ok_or_else(|| EmitError::NoPeer(name.to_string()))?]
            }
            None => self.all_peers(),
        };
        for peer in peers {
            let id = self.next_packet_id();
            let packet = Packet::Data { id, hash, reliable, payload: payload.clone() };
            let frame = encode(&packet)?;
            self.send_frame(peer.addr, &frame)?;
            if reliable {
                let now = Instant::now();
                peer.pending.lock().insert(
                    id,
                    PendingPacket { frame, sent_at: now, first_sent_at: now, attempts: 1 },
                );
            }
        }
        Ok(())
    }

    /// Send raw bytes to an address, bypassing caches and reactions.
    fn send_raw(&self, target: SocketAddr, payload: &[u8]) -> Result<(), EmitError> {
        self.send_frame(target, payload)?;
        Ok(())
    }
}

impl std::fmt::Debug for NetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetState")
            .field("peers", &self.peers.lock().len())
            .field("codecs", &self.codecs.read().len())
            .finish_non_exhaustive()
    }
}

/// Store the network configuration ahead of installing the reactor.
pub fn configure_network(env: &Environment, config: NetConfig) {
    if let Some(state) = env.extension::<NetState>() {
        *state.config.lock() = config;
    }
}

/// The reactor that owns the network service's subscriptions.
pub struct NetworkReactor;

impl Reactor for NetworkReactor {
    fn install(env: &Environment) -> Result<Self, BindError> {
        let state = env.extension::<NetState>().ok_or(BindError::Draining)?;
        let config = state.config.lock().clone();
        for (name, addr) in &config.static_peers {
            state.ensure_peer(name, *addr);
        }

        // One bound socket for both directions: peers see data-port
        // source addresses, so acks and replies come straight back here.
        let data_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.data_port))?;
        data_socket.set_nonblocking(true)?;
        let data_fd = data_socket.as_raw_fd();
        *state.sender.lock() = Some(data_socket.try_clone()?);
        *state.receiver.lock() = Some(data_socket);

        {
            let state = state.clone();
            let env_rx = env.clone();
            env.on(io_source(data_fd, IoEvents::READ))
                .then("network-data", move |_: IoEvent| state.pump(&env_rx))?;
        }

        if config.announce_port != 0 {
            let state_rx = state.clone();
            let env_rx = env.clone();
            env.on(udp_multicast(config.announce_group, config.announce_port)).then(
                "network-announce",
                move |datagram: Datagram| state_rx.handle_announce(&env_rx, &datagram),
            )?;

            let state_tx = state.clone();
            env.on(every(config.announce_interval))
                .then("network-beacon", move |_: Instant| state_tx.beacon())?;
        }

        {
            let state = state.clone();
            env.on(every(config.retransmit_interval))
                .then("network-retransmit", move |_: Instant| state.retransmit())?;
        }

        {
            let state = state.clone();
            env.on(shutdown()).then("network-drain", move |_: Arc<reflex_core::Shutdown>| {
                state.draining.store(true, Ordering::Release);
            })?;
        }

        state.installed.store(true, Ordering::Release);
        tracing::info!(node = %config.node_name, data_port = config.data_port, "network up");
        Ok(NetworkReactor)
    }
}

/// Network emit scopes, added onto [`Environment`].
pub trait NetEmit {
    /// Serialize and send to `target` (every peer when `None`). Reliable
    /// sends are retransmitted until acked or given up on.
    fn emit_network<T>(
        &self,
        value: &T,
        target: Option<&str>,
        reliable: bool,
    ) -> Result<(), EmitError>
    where
        T: serde::Serialize + Message;

    /// Send a raw payload to (addr, port) without touching caches or
    /// reactions.
    fn emit_udp(&self, target: SocketAddr, payload: &[u8]) -> Result<(), EmitError>;
}

impl NetEmit for Environment {
    fn emit_network<T>(
        &self,
        value: &T,
        target: Option<&str>,
        reliable: bool,
    ) -> Result<(), EmitError>
    where
        T: serde::Serialize + Message,
    {
        let state = self.extension::<NetState>().ok_or(EmitError::NotInstalled)?;
        if !state.is_installed() {
            return Err(EmitError::NotInstalled);
        }
        // Draining network scopes are no-ops, not errors.
        if state.is_draining() {
            return Ok(());
        }
        let payload = serde_json::to_value(value)?;
        state.send_value(TypeHash::of::<T>(), payload, target, reliable)
    }

    fn emit_udp(&self, target: SocketAddr, payload: &[u8]) -> Result<(), EmitError> {
        let state = self.extension::<NetState>().ok_or(EmitError::NotInstalled)?;
        if state.is_draining() {
            return Ok(());
        }
        state.send_raw(target, payload)
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
