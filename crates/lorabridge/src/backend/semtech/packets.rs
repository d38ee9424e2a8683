// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Binary codec for the Semtech UDP packet-forwarder protocol.
//!
//! Every datagram starts with a 4-byte header, optionally followed by an
//! 8-byte gateway identifier and/or a JSON payload:
//!
//! ```text
//! 0               1               2               3
//! +---------------+---------------+---------------+---------------+
//! | protocol ver  |         random token (LE)     |  identifier   |
//! +---------------+---------------+---------------+---------------+
//! |                gateway id (8 bytes, some kinds)               |
//! +---------------------------------------------------------------+
//! |                JSON payload (some kinds)                      |
//! +---------------------------------------------------------------+
//! ```
//!
//! The token is chosen by the sender of a request and echoed in the matching
//! acknowledgment; it is the only correlation mechanism the protocol offers.

use crate::backend::semtech::payloads::{PullRespPayload, PushDataPayload, TxAckPayload};
use crate::error::{Error, Result};
use crate::frames::GatewayId;
use std::convert::TryFrom;

/// Legacy protocol version.
pub const PROTOCOL_VERSION_1: u8 = 0x01;
/// Current protocol version.
pub const PROTOCOL_VERSION_2: u8 = 0x02;

/// Header length: version + token + identifier.
const HEADER_LEN: usize = 4;
/// Header plus the 8-byte gateway identifier.
const ADDRESSED_HEADER_LEN: usize = HEADER_LEN + 8;

/// Packet identifier byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    PushData = 0x00,
    PushAck = 0x01,
    PullData = 0x02,
    PullResp = 0x03,
    PullAck = 0x04,
    TxAck = 0x05,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(PacketType::PushData),
            0x01 => Ok(PacketType::PushAck),
            0x02 => Ok(PacketType::PullData),
            0x03 => Ok(PacketType::PullResp),
            0x04 => Ok(PacketType::PullAck),
            0x05 => Ok(PacketType::TxAck),
            other => Err(Error::MalformedPacket(format!(
                "unknown packet identifier: 0x{:02x}",
                other
            ))),
        }
    }
}

/// PUSH_DATA: gateway forwards received packets and/or stats upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PushDataPacket {
    pub protocol_version: u8,
    pub random_token: u16,
    pub gateway_id: GatewayId,
    pub payload: PushDataPayload,
}

/// PUSH_ACK: server confirms a PUSH_DATA, echoing its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushAckPacket {
    pub protocol_version: u8,
    pub random_token: u16,
}

/// PULL_DATA: gateway opens/refreshes its downlink path (NAT keepalive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullDataPacket {
    pub protocol_version: u8,
    pub random_token: u16,
    pub gateway_id: GatewayId,
}

/// PULL_ACK: server confirms a PULL_DATA, echoing its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullAckPacket {
    pub protocol_version: u8,
    pub random_token: u16,
}

/// PULL_RESP: server asks the gateway to transmit a downlink.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRespPacket {
    pub protocol_version: u8,
    pub random_token: u16,
    pub payload: PullRespPayload,
}

/// TX_ACK: gateway reports the outcome of a PULL_RESP.
///
/// Protocol version 1 carries no JSON body; version 2 may carry a
/// `txpk_ack` object with an error code.
#[derive(Debug, Clone, PartialEq)]
pub struct TxAckPacket {
    pub protocol_version: u8,
    pub random_token: u16,
    pub gateway_id: GatewayId,
    pub payload: Option<TxAckPayload>,
}

impl TxAckPacket {
    /// The reported error code, normalized: absent body, absent field, empty
    /// string, and `"NONE"` all mean success and return `""`.
    #[must_use]
    pub fn error_code(&self) -> &str {
        match &self.payload {
            Some(payload) => match payload.txpk_ack.error.as_deref() {
                Some("NONE") | None => "",
                Some(code) => code,
            },
            None => "",
        }
    }
}

/// A decoded datagram of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    PushData(PushDataPacket),
    PushAck(PushAckPacket),
    PullData(PullDataPacket),
    PullResp(PullRespPacket),
    PullAck(PullAckPacket),
    TxAck(TxAckPacket),
}

impl Packet {
    /// Decode a raw datagram.
    ///
    /// # Errors
    ///
    /// `Error::MalformedPacket` for datagrams shorter than the header, an
    /// unsupported protocol version, an unknown identifier, or a truncated
    /// gateway identifier. `Error::InvalidPayload` when the JSON body does
    /// not decode.
    pub fn decode(data: &[u8]) -> Result<Self> {
        crate::trace_fn!("Packet::decode");
        if data.len() < HEADER_LEN {
            return Err(Error::MalformedPacket(format!(
                "packet too short: {} bytes",
                data.len()
            )));
        }

        let version = data[0];
        if version != PROTOCOL_VERSION_1 && version != PROTOCOL_VERSION_2 {
            return Err(Error::MalformedPacket(format!(
                "unsupported protocol version: 0x{:02x}",
                version
            )));
        }

        let token = u16::from_le_bytes([data[1], data[2]]);
        let packet_type = PacketType::try_from(data[3])?;

        match packet_type {
            PacketType::PushData => {
                let gateway_id = read_gateway_id(data)?;
                let payload = decode_json(&data[ADDRESSED_HEADER_LEN..])?;
                Ok(Packet::PushData(PushDataPacket {
                    protocol_version: version,
                    random_token: token,
                    gateway_id,
                    payload,
                }))
            }
            PacketType::PushAck => Ok(Packet::PushAck(PushAckPacket {
                protocol_version: version,
                random_token: token,
            })),
            PacketType::PullData => {
                let gateway_id = read_gateway_id(data)?;
                Ok(Packet::PullData(PullDataPacket {
                    protocol_version: version,
                    random_token: token,
                    gateway_id,
                }))
            }
            PacketType::PullResp => {
                let payload = decode_json(&data[HEADER_LEN..])?;
                Ok(Packet::PullResp(PullRespPacket {
                    protocol_version: version,
                    random_token: token,
                    payload,
                }))
            }
            PacketType::PullAck => Ok(Packet::PullAck(PullAckPacket {
                protocol_version: version,
                random_token: token,
            })),
            PacketType::TxAck => {
                let gateway_id = read_gateway_id(data)?;
                let rest = &data[ADDRESSED_HEADER_LEN..];
                let payload = if rest.is_empty() {
                    None
                } else {
                    Some(decode_json(rest)?)
                };
                Ok(Packet::TxAck(TxAckPacket {
                    protocol_version: version,
                    random_token: token,
                    gateway_id,
                    payload,
                }))
            }
        }
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        crate::trace_fn!("Packet::encode");
        match self {
            Packet::PushData(p) => {
                let json = serde_json::to_vec(&p.payload)?;
                let mut buf = header(p.protocol_version, p.random_token, PacketType::PushData);
                buf.extend_from_slice(p.gateway_id.as_bytes());
                buf.extend_from_slice(&json);
                Ok(buf)
            }
            Packet::PushAck(p) => Ok(header(
                p.protocol_version,
                p.random_token,
                PacketType::PushAck,
            )),
            Packet::PullData(p) => {
                let mut buf = header(p.protocol_version, p.random_token, PacketType::PullData);
                buf.extend_from_slice(p.gateway_id.as_bytes());
                Ok(buf)
            }
            Packet::PullResp(p) => {
                let json = serde_json::to_vec(&p.payload)?;
                let mut buf = header(p.protocol_version, p.random_token, PacketType::PullResp);
                buf.extend_from_slice(&json);
                Ok(buf)
            }
            Packet::PullAck(p) => Ok(header(
                p.protocol_version,
                p.random_token,
                PacketType::PullAck,
            )),
            Packet::TxAck(p) => {
                let mut buf = header(p.protocol_version, p.random_token, PacketType::TxAck);
                buf.extend_from_slice(p.gateway_id.as_bytes());
                if let Some(payload) = &p.payload {
                    buf.extend_from_slice(&serde_json::to_vec(payload)?);
                }
                Ok(buf)
            }
        }
    }

    /// Packet identifier of this datagram.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::PushData(_) => PacketType::PushData,
            Packet::PushAck(_) => PacketType::PushAck,
            Packet::PullData(_) => PacketType::PullData,
            Packet::PullResp(_) => PacketType::PullResp,
            Packet::PullAck(_) => PacketType::PullAck,
            Packet::TxAck(_) => PacketType::TxAck,
        }
    }
}

fn header(version: u8, token: u16, packet_type: PacketType) -> Vec<u8> {
    let token_bytes = token.to_le_bytes();
    vec![version, token_bytes[0], token_bytes[1], packet_type as u8]
}

fn read_gateway_id(data: &[u8]) -> Result<GatewayId> {
    if data.len() < ADDRESSED_HEADER_LEN {
        return Err(Error::MalformedPacket(format!(
            "truncated gateway id: {} bytes",
            data.len()
        )));
    }
    let mut id = [0u8; 8];
    id.copy_from_slice(&data[HEADER_LEN..ADDRESSED_HEADER_LEN]);
    Ok(GatewayId::new(id))
}

fn decode_json<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(Error::from)
}
