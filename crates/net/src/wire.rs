// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format for inter-plant packets.
//!
//! Frame: 4-byte big-endian length prefix + JSON payload. One UDP
//! datagram carries one frame; TCP streams carry back-to-back frames.

use crate::hash::TypeHash;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use thiserror::Error;

/// Maximum accepted frame payload, matching the UDP receive buffer.
pub const MAX_FRAME_LEN: usize = 65536;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("frame declares {declared} bytes but {available} are present")]
    Truncated { declared: usize, available: usize },
    #[error("frame of {0} bytes exceeds the maximum")]
    Oversized(usize),
    #[error("malformed packet: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no codec registered for type hash {0}")]
    UnknownType(TypeHash),
}

/// Every packet kind exchanged between plants.
///
/// Serializes as `{"type": "...", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    /// Periodic presence beacon naming the node and its data port.
    #[serde(rename = "announce")]
    Announce { node: String, data_port: u16 },

    /// One serialized emission.
    #[serde(rename = "data")]
    Data {
        /// Rolling per-sender packet id, for deduplication and acks.
        id: u16,
        hash: TypeHash,
        reliable: bool,
        payload: serde_json::Value,
    },

    /// Receipt for a reliable data packet.
    #[serde(rename = "ack")]
    Ack { id: u16 },
}

/// Encode one packet as a length-prefixed frame.
pub fn encode(packet: &Packet) -> Result<Vec<u8>, WireError> {
    let body = serde_json::to_vec(packet)?;
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode one frame, tolerating trailing bytes.
pub fn decode(frame: &[u8]) -> Result<Packet, WireError> {
    if frame.len() < 4 {
        return Err(WireError::TooShort(frame.len()));
    }
    let mut length = [0u8; 4];
    length.copy_from_slice(&frame[..4]);
    let declared = u32::from_be_bytes(length) as usize;
    if declared > MAX_FRAME_LEN {
        return Err(WireError::Oversized(declared));
    }
    let available = frame.len() - 4;
    if declared > available {
        return Err(WireError::Truncated { declared, available });
    }
    Ok(serde_json::from_slice(&frame[4..4 + declared])?)
}

/// Read one frame from a stream (TCP transport).
pub fn read_packet(stream: &mut impl Read) -> Result<Packet, WireError> {
    let mut length = [0u8; 4];
    stream.read_exact(&mut length)?;
    let declared = u32::from_be_bytes(length) as usize;
    if declared > MAX_FRAME_LEN {
        return Err(WireError::Oversized(declared));
    }
    let mut body = vec![0u8; declared];
    stream.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}

/// Write one frame to a stream (TCP transport).
pub fn write_packet(stream: &mut impl Write, packet: &Packet) -> Result<(), WireError> {
    let frame = encode(packet)?;
    stream.write_all(&frame)?;
    Ok(())
}

#[cfg(test)]
#[path = "wire_tests.rs"]
mod tests;
