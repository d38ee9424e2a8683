// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Protocol-agnostic frame types exchanged between the wire backend and the
//! integration layer.
//!
//! Everything in this module is independent of the Semtech UDP encoding:
//! frequencies are plain Hz, payloads are raw bytes, timestamps are typed.
//! The wire backend converts to/from its JSON representation at the edge.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 8-byte gateway hardware identifier (EUI-64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GatewayId([u8; 8]);

impl GatewayId {
    #[must_use]
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl From<[u8; 8]> for GatewayId {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for GatewayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl FromStr for GatewayId {
    type Err = crate::error::Error;

    /// Parse a 16-character hex string (e.g. `"0102030405060708"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 16 {
            return Err(crate::error::Error::InvalidPayload(format!(
                "gateway id must be 16 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 8];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex = std::str::from_utf8(chunk)
                .map_err(|e| crate::error::Error::InvalidPayload(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex, 16)
                .map_err(|e| crate::error::Error::InvalidPayload(e.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

/// CRC state reported by the concentrator for a received packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcStatus {
    /// CRC present and valid.
    Ok,
    /// CRC present and invalid.
    Fail,
    /// Packet received without CRC.
    NoCrc,
}

/// Radio modulation parameters for one transmission.
#[derive(Debug, Clone, PartialEq)]
pub enum ModulationInfo {
    Lora {
        /// Bandwidth in Hz (125_000 / 250_000 / 500_000).
        bandwidth: u32,
        spreading_factor: u32,
        /// Coding rate identifier, e.g. `"4/5"`.
        code_rate: String,
    },
    Fsk {
        /// Bitrate in bits per second.
        datarate: u32,
    },
    LrFhss {
        /// Vendor data-rate identifier, kept verbatim.
        identifier: String,
    },
}

/// Reception metadata attached to an uplink by the receiving gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkRxInfo {
    pub gateway_id: GatewayId,
    /// UTC reception time, when the gateway has a time source.
    pub time: Option<DateTime<Utc>>,
    /// Time since the GPS epoch, when the gateway has a GPS lock.
    pub time_since_gps_epoch: Option<Duration>,
    /// Concentrator counter at reception (microseconds, rolls over).
    pub timestamp: u32,
    pub rssi: i32,
    /// LoRa signal-to-noise ratio in dB; zero for FSK.
    pub snr: f32,
    pub channel: u32,
    pub rf_chain: u32,
    pub board: u32,
    pub antenna: u32,
    pub crc_status: CrcStatus,
}

/// Transmission parameters the uplink was received with.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkTxInfo {
    /// Center frequency in Hz.
    pub frequency: u32,
    pub modulation: ModulationInfo,
}

/// One radio packet received by a gateway, decoded and ready for the bus.
///
/// Ephemeral: produced from one inbound datagram, emitted once, not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct UplinkFrame {
    pub phy_payload: Vec<u8>,
    pub tx_info: UplinkTxInfo,
    pub rx_info: UplinkRxInfo,
}

/// When the gateway must put a downlink item on the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownlinkTiming {
    /// Transmit as soon as possible.
    Immediately,
    /// Transmit when the concentrator counter reaches `timestamp` (us).
    Delay { timestamp: u32 },
    /// Transmit at the given GPS-epoch time (ms).
    GpsEpoch { time_since_gps_epoch_ms: u64 },
}

/// One transmission attempt within a downlink frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DownlinkItem {
    pub phy_payload: Vec<u8>,
    /// Target center frequency in Hz.
    pub frequency: u32,
    /// TX power in dBm.
    pub power: i32,
    pub modulation: ModulationInfo,
    pub timing: DownlinkTiming,
    pub board: u32,
    pub antenna: u32,
}

/// A logical downlink: an ordered, non-empty set of transmission attempts.
///
/// Item 0 is the primary window (RX1), item 1 the fallback window (RX2).
/// The wire backend tries items in order, advancing on a negative
/// acknowledgment, and reports one aggregated [`DownlinkTxAck`] at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct DownlinkFrame {
    /// Opaque correlation identifier assigned by the integration layer.
    pub downlink_id: u32,
    /// Pre-assigned wire token. When `None` the backend draws a random one.
    pub token: Option<u16>,
    pub gateway_id: GatewayId,
    pub items: Vec<DownlinkItem>,
}

/// Per-item downlink outcome.
///
/// `Ignored` is the initialization value and means *this window was never
/// attempted* (e.g. item 1 after item 0 succeeded). It is neutral: neither
/// success nor failure. Consumers that need a boolean outcome must inspect
/// the last non-`Ignored` status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxAckStatus {
    Ignored,
    Ok,
    TooLate,
    TooEarly,
    CollisionPacket,
    CollisionBeacon,
    TxFreq,
    TxPower,
    GpsUnlocked,
    /// Error code not in the known set, kept verbatim.
    Other(String),
}

impl TxAckStatus {
    /// Map a gateway-reported `txpk_ack.error` code.
    ///
    /// An absent, empty, or `"NONE"` code means the transmission was
    /// accepted.
    #[must_use]
    pub fn from_error_code(code: &str) -> Self {
        match code {
            "" | "NONE" => TxAckStatus::Ok,
            "TOO_LATE" => TxAckStatus::TooLate,
            "TOO_EARLY" => TxAckStatus::TooEarly,
            "COLLISION_PACKET" => TxAckStatus::CollisionPacket,
            "COLLISION_BEACON" => TxAckStatus::CollisionBeacon,
            "TX_FREQ" => TxAckStatus::TxFreq,
            "TX_POWER" => TxAckStatus::TxPower,
            "GPS_UNLOCKED" => TxAckStatus::GpsUnlocked,
            other => TxAckStatus::Other(other.to_string()),
        }
    }

    /// True for any status other than `Ok` and `Ignored`.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !matches!(self, TxAckStatus::Ok | TxAckStatus::Ignored)
    }
}

impl fmt::Display for TxAckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxAckStatus::Ignored => write!(f, "IGNORED"),
            TxAckStatus::Ok => write!(f, "OK"),
            TxAckStatus::TooLate => write!(f, "TOO_LATE"),
            TxAckStatus::TooEarly => write!(f, "TOO_EARLY"),
            TxAckStatus::CollisionPacket => write!(f, "COLLISION_PACKET"),
            TxAckStatus::CollisionBeacon => write!(f, "COLLISION_BEACON"),
            TxAckStatus::TxFreq => write!(f, "TX_FREQ"),
            TxAckStatus::TxPower => write!(f, "TX_POWER"),
            TxAckStatus::GpsUnlocked => write!(f, "GPS_UNLOCKED"),
            TxAckStatus::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Aggregated acknowledgment for one downlink frame.
///
/// `items` has the same length and order as the originating
/// [`DownlinkFrame::items`]; untouched slots remain
/// [`TxAckStatus::Ignored`].
#[derive(Debug, Clone, PartialEq)]
pub struct DownlinkTxAck {
    pub downlink_id: u32,
    pub gateway_id: GatewayId,
    pub items: Vec<TxAckStatus>,
}

/// Periodic statistics reported by a gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStats {
    pub gateway_id: GatewayId,
    pub time: Option<DateTime<Utc>>,
    /// (latitude, longitude, altitude in meters), when the gateway has GPS.
    pub location: Option<(f64, f64, i32)>,
    pub rx_packets_received: u32,
    pub rx_packets_received_ok: u32,
    pub rx_packets_forwarded: u32,
    /// Percentage of upstream datagrams that were acknowledged.
    pub ack_rate: Option<f64>,
    pub tx_packets_received: u32,
    pub tx_packets_emitted: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_id_display_roundtrip() {
        let id = GatewayId::new([0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        let s = id.to_string();
        assert_eq!(s, "0102030405060708");
        let parsed: GatewayId = s.parse().expect("hex parse should succeed");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_gateway_id_rejects_short_string() {
        assert!("0102".parse::<GatewayId>().is_err());
    }

    #[test]
    fn test_tx_ack_status_mapping() {
        assert_eq!(TxAckStatus::from_error_code(""), TxAckStatus::Ok);
        assert_eq!(TxAckStatus::from_error_code("NONE"), TxAckStatus::Ok);
        assert_eq!(TxAckStatus::from_error_code("TOO_LATE"), TxAckStatus::TooLate);
        assert_eq!(
            TxAckStatus::from_error_code("WEIRD"),
            TxAckStatus::Other("WEIRD".to_string())
        );
    }

    #[test]
    fn test_tx_ack_status_is_error() {
        assert!(!TxAckStatus::Ok.is_error());
        assert!(!TxAckStatus::Ignored.is_error());
        assert!(TxAckStatus::TxFreq.is_error());
        assert!(TxAckStatus::Other("X".into()).is_error());
    }
}
