// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! JSON sub-payload types for the Semtech UDP protocol.
//!
//! Field names, optionality, and value encodings follow the packet
//! forwarder's PROTOCOL.TXT byte-for-byte: gateways parse these objects
//! literally, so every `rename` and `skip_serializing_if` here is part of
//! the compatibility surface.

use crate::backend::semtech::time::{CompactTime, ExpandedTime};
use crate::error::{Error, Result};
use crate::frames::{
    CrcStatus, DownlinkItem, DownlinkTiming, GatewayId, GatewayStats, ModulationInfo, UplinkFrame,
    UplinkRxInfo, UplinkTxInfo,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Modulation identifier as carried in the `modu` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modu {
    #[serde(rename = "LORA")]
    Lora,
    #[serde(rename = "FSK")]
    Fsk,
    #[serde(rename = "LR-FHSS")]
    LrFhss,
}

/// The `datr` field: a single JSON value that is either an unsigned integer
/// (FSK bits-per-second) or a string (LoRa `SF<n>BW<khz>` identifier, or an
/// LR-FHSS identifier kept verbatim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRate {
    Lora {
        spreading_factor: u32,
        /// Bandwidth in kHz, as encoded on the wire.
        bandwidth: u32,
    },
    Fsk {
        bitrate: u32,
    },
    LrFhss {
        identifier: String,
    },
}

impl Serialize for DataRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataRate::Lora {
                spreading_factor,
                bandwidth,
            } => serializer.serialize_str(&format!("SF{}BW{}", spreading_factor, bandwidth)),
            DataRate::Fsk { bitrate } => serializer.serialize_u32(*bitrate),
            DataRate::LrFhss { identifier } => serializer.serialize_str(identifier),
        }
    }
}

struct DataRateVisitor;

impl Visitor<'_> for DataRateVisitor {
    type Value = DataRate;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an FSK bitrate integer or a LoRa/LR-FHSS data-rate string")
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<DataRate, E> {
        u32::try_from(v)
            .map(|bitrate| DataRate::Fsk { bitrate })
            .map_err(|_| E::custom(format!("FSK bitrate out of range: {}", v)))
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<DataRate, E> {
        u64::try_from(v)
            .map_err(|_| E::custom(format!("negative data rate: {}", v)))
            .and_then(|v| self.visit_u64(v))
    }

    fn visit_str<E: serde::de::Error>(self, s: &str) -> std::result::Result<DataRate, E> {
        if let Some(rest) = s.strip_prefix("SF") {
            let bw_pos = rest
                .find("BW")
                .ok_or_else(|| E::custom(format!("invalid LoRa data rate: {}", s)))?;
            let spreading_factor = rest[..bw_pos]
                .parse()
                .map_err(|_| E::custom(format!("invalid spreading factor in: {}", s)))?;
            let bandwidth = rest[bw_pos + 2..]
                .parse()
                .map_err(|_| E::custom(format!("invalid bandwidth in: {}", s)))?;
            Ok(DataRate::Lora {
                spreading_factor,
                bandwidth,
            })
        } else {
            Ok(DataRate::LrFhss {
                identifier: s.to_string(),
            })
        }
    }
}

impl<'de> Deserialize<'de> for DataRate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(DataRateVisitor)
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One received radio packet (`rxpk` array element of PUSH_DATA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxPk {
    /// UTC reception time, compact ISO-8601 form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<CompactTime>,
    /// GPS time of reception, milliseconds since the GPS epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmms: Option<u64>,
    /// Concentrator counter at reception, microseconds.
    pub tmst: u32,
    /// Center frequency in MHz.
    pub freq: f64,
    /// Concentrator IF channel.
    pub chan: u32,
    /// Concentrator RF chain.
    pub rfch: u32,
    /// CRC status: 1 = OK, -1 = fail, 0 = no CRC.
    pub stat: i8,
    pub modu: Modu,
    pub datr: DataRate,
    /// LoRa coding rate, e.g. `"4/5"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codr: Option<String>,
    /// RSSI in dBm.
    pub rssi: i32,
    /// LoRa signal-to-noise ratio in dB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lsnr: Option<f32>,
    /// Payload size in bytes.
    pub size: u32,
    /// Base64-encoded PHY payload.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brd: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ant: Option<u32>,
}

impl RxPk {
    /// CRC status as a typed value.
    #[must_use]
    pub fn crc_status(&self) -> CrcStatus {
        match self.stat {
            1 => CrcStatus::Ok,
            -1 => CrcStatus::Fail,
            _ => CrcStatus::NoCrc,
        }
    }

    /// Convert to a protocol-agnostic uplink frame.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPayload` when the base64 payload does not
    /// decode or modulation fields are inconsistent.
    pub fn to_uplink_frame(&self, gateway_id: GatewayId) -> Result<UplinkFrame> {
        let phy_payload = BASE64.decode(&self.data)?;
        let modulation = modulation_info(self.modu, &self.datr, self.codr.as_deref())?;

        Ok(UplinkFrame {
            phy_payload,
            tx_info: UplinkTxInfo {
                frequency: mhz_to_hz(self.freq),
                modulation,
            },
            rx_info: UplinkRxInfo {
                gateway_id,
                time: self.time.filter(|t| !t.is_zero()).map(|t| t.0),
                time_since_gps_epoch: self.tmms.map(Duration::from_millis),
                timestamp: self.tmst,
                rssi: self.rssi,
                snr: self.lsnr.unwrap_or(0.0),
                channel: self.chan,
                rf_chain: self.rfch,
                board: self.brd.unwrap_or(0),
                antenna: self.ant.unwrap_or(0),
                crc_status: self.crc_status(),
            },
        })
    }
}

/// Gateway statistics block (`stat` object of PUSH_DATA).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// UTC system time, expanded form.
    pub time: ExpandedTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lati: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alti: Option<i32>,
    /// Radio packets received.
    pub rxnb: u32,
    /// Radio packets received with valid CRC.
    pub rxok: u32,
    /// Radio packets forwarded upstream.
    pub rxfw: u32,
    /// Percentage of upstream datagrams that were acknowledged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ackr: Option<f64>,
    /// Downlink datagrams received.
    pub dwnb: u32,
    /// Packets emitted on air.
    pub txnb: u32,
}

impl Stat {
    /// Convert to protocol-agnostic gateway statistics.
    #[must_use]
    pub fn to_gateway_stats(&self, gateway_id: GatewayId) -> GatewayStats {
        let location = match (self.lati, self.long) {
            (Some(lat), Some(lon)) => Some((lat, lon, self.alti.unwrap_or(0))),
            _ => None,
        };
        GatewayStats {
            gateway_id,
            time: Some(self.time.0),
            location,
            rx_packets_received: self.rxnb,
            rx_packets_received_ok: self.rxok,
            rx_packets_forwarded: self.rxfw,
            ack_rate: self.ackr,
            tx_packets_received: self.dwnb,
            tx_packets_emitted: self.txnb,
        }
    }
}

/// PUSH_DATA JSON body: received packets and/or a statistics block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushDataPayload {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rxpk: Vec<RxPk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<Stat>,
}

/// One downlink transmission request (`txpk` object of PULL_RESP).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxPk {
    /// Transmit immediately, ignoring timing fields.
    #[serde(default, skip_serializing_if = "is_false")]
    pub imme: bool,
    /// Transmit when the concentrator counter reaches this value (us).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmst: Option<u32>,
    /// Transmit at this GPS-epoch time (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmms: Option<u64>,
    /// Center frequency in MHz.
    pub freq: f64,
    /// Concentrator RF chain.
    pub rfch: u32,
    /// TX power in dBm.
    pub powe: i32,
    pub modu: Modu,
    pub datr: DataRate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codr: Option<String>,
    /// FSK frequency deviation in Hz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fdev: Option<u32>,
    /// Invert LoRa polarity (true for LoRaWAN downlinks).
    #[serde(default, skip_serializing_if = "is_false")]
    pub ipol: bool,
    /// Preamble length override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prea: Option<u32>,
    /// Payload size in bytes.
    pub size: u32,
    /// Base64-encoded PHY payload.
    pub data: String,
    /// Disable the physical-layer CRC.
    #[serde(default, skip_serializing_if = "is_false")]
    pub ncrc: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brd: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ant: Option<u32>,
}

impl TxPk {
    /// Build a transmission request from one downlink item.
    pub fn from_downlink_item(item: &DownlinkItem) -> Result<Self> {
        let (modu, datr, codr, fdev, ipol) = match &item.modulation {
            ModulationInfo::Lora {
                bandwidth,
                spreading_factor,
                code_rate,
            } => (
                Modu::Lora,
                DataRate::Lora {
                    spreading_factor: *spreading_factor,
                    bandwidth: bandwidth / 1000,
                },
                Some(code_rate.clone()),
                None,
                // LoRaWAN downlinks are transmitted with inverted polarity so
                // gateways do not receive each other's transmissions.
                true,
            ),
            ModulationInfo::Fsk { datarate } => (
                Modu::Fsk,
                DataRate::Fsk { bitrate: *datarate },
                None,
                Some(datarate / 2),
                false,
            ),
            ModulationInfo::LrFhss { identifier } => (
                Modu::LrFhss,
                DataRate::LrFhss {
                    identifier: identifier.clone(),
                },
                None,
                None,
                true,
            ),
        };

        let (imme, tmst, tmms) = match item.timing {
            DownlinkTiming::Immediately => (true, None, None),
            DownlinkTiming::Delay { timestamp } => (false, Some(timestamp), None),
            DownlinkTiming::GpsEpoch {
                time_since_gps_epoch_ms,
            } => (false, None, Some(time_since_gps_epoch_ms)),
        };

        let size = u32::try_from(item.phy_payload.len())
            .map_err(|_| Error::InvalidPayload("payload too large".to_string()))?;

        Ok(Self {
            imme,
            tmst,
            tmms,
            freq: hz_to_mhz(item.frequency),
            rfch: 0,
            powe: item.power,
            modu,
            datr,
            codr,
            fdev,
            ipol,
            prea: None,
            size,
            data: BASE64.encode(&item.phy_payload),
            ncrc: false,
            brd: Some(item.board),
            ant: Some(item.antenna),
        })
    }
}

/// PULL_RESP JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRespPayload {
    pub txpk: TxPk,
}

/// The `txpk_ack` object of TX_ACK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxPkAck {
    /// Error code, or `"NONE"`/absent when the transmission was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// TX_ACK JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxAckPayload {
    pub txpk_ack: TxPkAck,
}

/// Convert a wire frequency in MHz to Hz.
#[inline]
#[must_use]
pub fn mhz_to_hz(mhz: f64) -> u32 {
    (mhz * 1_000_000.0).round() as u32
}

/// Convert a frequency in Hz to the wire MHz representation.
#[inline]
#[must_use]
pub fn hz_to_mhz(hz: u32) -> f64 {
    f64::from(hz) / 1_000_000.0
}

fn modulation_info(modu: Modu, datr: &DataRate, codr: Option<&str>) -> Result<ModulationInfo> {
    match (modu, datr) {
        (
            Modu::Lora,
            DataRate::Lora {
                spreading_factor,
                bandwidth,
            },
        ) => Ok(ModulationInfo::Lora {
            bandwidth: bandwidth * 1000,
            spreading_factor: *spreading_factor,
            code_rate: codr.unwrap_or("4/5").to_string(),
        }),
        (Modu::Fsk, DataRate::Fsk { bitrate }) => Ok(ModulationInfo::Fsk { datarate: *bitrate }),
        (Modu::LrFhss, DataRate::LrFhss { identifier }) => Ok(ModulationInfo::LrFhss {
            identifier: identifier.clone(),
        }),
        (modu, datr) => Err(Error::InvalidPayload(format!(
            "modulation {:?} inconsistent with data rate {:?}",
            modu, datr
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datarate_lora_roundtrip() {
        let dr = DataRate::Lora {
            spreading_factor: 7,
            bandwidth: 125,
        };
        let json = serde_json::to_string(&dr).expect("serialize");
        assert_eq!(json, "\"SF7BW125\"");
        let back: DataRate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, dr);
    }

    #[test]
    fn test_datarate_fsk_roundtrip() {
        let dr = DataRate::Fsk { bitrate: 50000 };
        let json = serde_json::to_string(&dr).expect("serialize");
        assert_eq!(json, "50000");
        let back: DataRate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, dr);
    }

    #[test]
    fn test_datarate_lrfhss_roundtrip() {
        let dr = DataRate::LrFhss {
            identifier: "M0CW137".to_string(),
        };
        let json = serde_json::to_string(&dr).expect("serialize");
        assert_eq!(json, "\"M0CW137\"");
        let back: DataRate = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, dr);
    }

    #[test]
    fn test_datarate_rejects_malformed_sf() {
        assert!(serde_json::from_str::<DataRate>("\"SFxBW125\"").is_err());
        assert!(serde_json::from_str::<DataRate>("\"SF7\"").is_err());
    }

    #[test]
    fn test_rxpk_decode_reference_sample() {
        // Sample adapted from the packet forwarder PROTOCOL.TXT.
        let json = r#"{
            "time": "2016-01-06T09:20:23Z",
            "tmst": 3512348611,
            "chan": 2,
            "rfch": 0,
            "freq": 866.349812,
            "stat": 1,
            "modu": "LORA",
            "datr": "SF7BW125",
            "codr": "4/6",
            "rssi": -35,
            "lsnr": 5.1,
            "size": 32,
            "data": "-DS4CGaDCdG+48eJNM3Vai-zDpsR71Pn9CPA9uCON84"
        }"#;
        let rxpk: RxPk = serde_json::from_str(json).expect("decode should succeed");
        assert_eq!(rxpk.tmst, 3512348611);
        assert_eq!(rxpk.crc_status(), CrcStatus::Ok);
        assert_eq!(
            rxpk.datr,
            DataRate::Lora {
                spreading_factor: 7,
                bandwidth: 125
            }
        );
        // URL-safe alphabet in the sample above is not standard base64; the
        // uplink conversion must reject it rather than panic.
        assert!(rxpk.to_uplink_frame(GatewayId::default()).is_err());
    }

    #[test]
    fn test_rxpk_to_uplink_frame() {
        let rxpk = RxPk {
            time: None,
            tmms: Some(1_000),
            tmst: 42,
            freq: 868.1,
            chan: 1,
            rfch: 0,
            stat: 1,
            modu: Modu::Lora,
            datr: DataRate::Lora {
                spreading_factor: 12,
                bandwidth: 125,
            },
            codr: Some("4/5".to_string()),
            rssi: -120,
            lsnr: Some(-19.5),
            size: 3,
            data: BASE64.encode([1u8, 2, 3]),
            brd: None,
            ant: None,
        };
        let frame = rxpk
            .to_uplink_frame(GatewayId::new([1; 8]))
            .expect("conversion should succeed");
        assert_eq!(frame.phy_payload, vec![1, 2, 3]);
        assert_eq!(frame.tx_info.frequency, 868_100_000);
        assert_eq!(
            frame.rx_info.time_since_gps_epoch,
            Some(Duration::from_millis(1_000))
        );
        match frame.tx_info.modulation {
            ModulationInfo::Lora {
                bandwidth,
                spreading_factor,
                ..
            } => {
                assert_eq!(bandwidth, 125_000);
                assert_eq!(spreading_factor, 12);
            }
            other => panic!("expected LoRa modulation, got {:?}", other),
        }
    }

    #[test]
    fn test_modulation_mismatch_is_invalid_payload() {
        let rxpk = RxPk {
            time: None,
            tmms: None,
            tmst: 0,
            freq: 868.1,
            chan: 0,
            rfch: 0,
            stat: 1,
            modu: Modu::Fsk,
            datr: DataRate::Lora {
                spreading_factor: 7,
                bandwidth: 125,
            },
            codr: None,
            rssi: 0,
            lsnr: None,
            size: 0,
            data: BASE64.encode([]),
            brd: None,
            ant: None,
        };
        assert!(rxpk.to_uplink_frame(GatewayId::default()).is_err());
    }

    #[test]
    fn test_txpk_from_lora_item() {
        let item = DownlinkItem {
            phy_payload: vec![0xAA, 0xBB],
            frequency: 869_525_000,
            power: 27,
            modulation: ModulationInfo::Lora {
                bandwidth: 125_000,
                spreading_factor: 9,
                code_rate: "4/5".to_string(),
            },
            timing: DownlinkTiming::Delay { timestamp: 5_000_000 },
            board: 0,
            antenna: 0,
        };
        let txpk = TxPk::from_downlink_item(&item).expect("conversion should succeed");
        assert!(!txpk.imme);
        assert_eq!(txpk.tmst, Some(5_000_000));
        assert!(txpk.ipol);
        assert_eq!(txpk.freq, 869.525);
        assert_eq!(txpk.size, 2);
        assert_eq!(
            txpk.datr,
            DataRate::Lora {
                spreading_factor: 9,
                bandwidth: 125
            }
        );
    }

    #[test]
    fn test_txpk_from_fsk_item_sets_fdev() {
        let item = DownlinkItem {
            phy_payload: vec![1],
            frequency: 868_800_000,
            power: 14,
            modulation: ModulationInfo::Fsk { datarate: 50_000 },
            timing: DownlinkTiming::Immediately,
            board: 0,
            antenna: 0,
        };
        let txpk = TxPk::from_downlink_item(&item).expect("conversion should succeed");
        assert!(txpk.imme);
        assert_eq!(txpk.fdev, Some(25_000));
        assert!(!txpk.ipol);
    }

    #[test]
    fn test_stat_to_gateway_stats() {
        let json = r#"{
            "time": "2014-01-12 08:59:28 GMT",
            "lati": 46.24,
            "long": 3.2523,
            "alti": 145,
            "rxnb": 2,
            "rxok": 2,
            "rxfw": 2,
            "ackr": 100.0,
            "dwnb": 2,
            "txnb": 2
        }"#;
        let stat: Stat = serde_json::from_str(json).expect("decode should succeed");
        let stats = stat.to_gateway_stats(GatewayId::new([2; 8]));
        assert_eq!(stats.location, Some((46.24, 3.2523, 145)));
        assert_eq!(stats.rx_packets_received, 2);
        assert_eq!(stats.ack_rate, Some(100.0));
    }

    #[test]
    fn test_push_data_payload_optional_sections() {
        let only_stat: PushDataPayload =
            serde_json::from_str(r#"{"stat":{"time":"2014-01-12 08:59:28 GMT","rxnb":0,"rxok":0,"rxfw":0,"dwnb":0,"txnb":0}}"#)
                .expect("stat-only payload should decode");
        assert!(only_stat.rxpk.is_empty());
        assert!(only_stat.stat.is_some());

        let empty: PushDataPayload = serde_json::from_str("{}").expect("empty payload decodes");
        assert!(empty.rxpk.is_empty());
        assert!(empty.stat.is_none());
    }

    #[test]
    fn test_freq_conversion_roundtrip() {
        for hz in [868_100_000u32, 866_349_812, 923_300_000] {
            assert_eq!(mhz_to_hz(hz_to_mhz(hz)), hz);
        }
    }
}
