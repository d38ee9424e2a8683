// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SX1301 concentrator configuration artifact.
//!
//! Renders a [`RadioChainAssignment`] as the `radio_*`/`chan_*` sections of
//! an SX1301-style `global_conf` the packet-forwarder HAL consumes. Field
//! names (`chan_multiSF_0`, `chan_Lora_std`, `chan_FSK`, `if`) are fixed by
//! that format.

use super::placement::{AssignedChannel, RadioChainAssignment, MAX_MULTI_SF_CHANNELS};
use super::ChannelModulation;
use serde::{Deserialize, Serialize};

/// One radio chain section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioConfig {
    pub enable: bool,
    /// Center frequency in Hz.
    pub freq: u32,
}

/// One multi-SF LoRa channel section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSfChannelConfig {
    pub enable: bool,
    pub radio: u32,
    #[serde(rename = "if")]
    pub if_freq: i32,
}

/// The single-SF "LoRa-STD" channel section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoraStdChannelConfig {
    pub enable: bool,
    pub radio: u32,
    #[serde(rename = "if")]
    pub if_freq: i32,
    /// Bandwidth in Hz.
    pub bandwidth: u32,
    pub spread_factor: u32,
}

/// The FSK channel section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FskChannelConfig {
    pub enable: bool,
    pub radio: u32,
    #[serde(rename = "if")]
    pub if_freq: i32,
    /// Bandwidth in Hz.
    pub bandwidth: u32,
    /// Bitrate in bits per second.
    pub datarate: u32,
}

/// Complete SX1301 channel configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sx1301Config {
    pub radio_0: RadioConfig,
    pub radio_1: RadioConfig,
    #[serde(rename = "chan_multiSF_0")]
    pub chan_multi_sf_0: MultiSfChannelConfig,
    #[serde(rename = "chan_multiSF_1")]
    pub chan_multi_sf_1: MultiSfChannelConfig,
    #[serde(rename = "chan_multiSF_2")]
    pub chan_multi_sf_2: MultiSfChannelConfig,
    #[serde(rename = "chan_multiSF_3")]
    pub chan_multi_sf_3: MultiSfChannelConfig,
    #[serde(rename = "chan_multiSF_4")]
    pub chan_multi_sf_4: MultiSfChannelConfig,
    #[serde(rename = "chan_multiSF_5")]
    pub chan_multi_sf_5: MultiSfChannelConfig,
    #[serde(rename = "chan_multiSF_6")]
    pub chan_multi_sf_6: MultiSfChannelConfig,
    #[serde(rename = "chan_multiSF_7")]
    pub chan_multi_sf_7: MultiSfChannelConfig,
    #[serde(rename = "chan_Lora_std")]
    pub chan_lora_std: LoraStdChannelConfig,
    #[serde(rename = "chan_FSK")]
    pub chan_fsk: FskChannelConfig,
}

impl Sx1301Config {
    /// Render a placement result as the vendor artifact.
    #[must_use]
    pub fn from_assignment(assignment: &RadioChainAssignment) -> Self {
        crate::trace_fn!("Sx1301Config::from_assignment");
        let mut config = Self {
            radio_0: radio_config(assignment.radios.first().copied().flatten()),
            radio_1: radio_config(assignment.radios.get(1).copied().flatten()),
            ..Self::default()
        };

        for (index, assigned) in assignment
            .multi_sf
            .iter()
            .enumerate()
            .take(MAX_MULTI_SF_CHANNELS)
        {
            *config.multi_sf_slot_mut(index) = MultiSfChannelConfig {
                enable: true,
                radio: assigned.radio as u32,
                if_freq: assigned.if_offset,
            };
        }

        if let Some(assigned) = &assignment.lora_std {
            config.chan_lora_std = lora_std_config(assigned);
        }
        if let Some(assigned) = &assignment.fsk {
            config.chan_fsk = fsk_config(assigned);
        }
        config
    }

    fn multi_sf_slot_mut(&mut self, index: usize) -> &mut MultiSfChannelConfig {
        match index {
            0 => &mut self.chan_multi_sf_0,
            1 => &mut self.chan_multi_sf_1,
            2 => &mut self.chan_multi_sf_2,
            3 => &mut self.chan_multi_sf_3,
            4 => &mut self.chan_multi_sf_4,
            5 => &mut self.chan_multi_sf_5,
            6 => &mut self.chan_multi_sf_6,
            _ => &mut self.chan_multi_sf_7,
        }
    }
}

fn radio_config(center: Option<u32>) -> RadioConfig {
    match center {
        Some(freq) => RadioConfig { enable: true, freq },
        None => RadioConfig::default(),
    }
}

fn lora_std_config(assigned: &AssignedChannel) -> LoraStdChannelConfig {
    let spread_factor = match &assigned.channel.modulation {
        ChannelModulation::LoraStd { spreading_factor } => *spreading_factor,
        _ => 0,
    };
    LoraStdChannelConfig {
        enable: true,
        radio: assigned.radio as u32,
        if_freq: assigned.if_offset,
        bandwidth: assigned.channel.bandwidth,
        spread_factor,
    }
}

fn fsk_config(assigned: &AssignedChannel) -> FskChannelConfig {
    let datarate = match &assigned.channel.modulation {
        ChannelModulation::Fsk { datarate } => *datarate,
        _ => 0,
    };
    FskChannelConfig {
        enable: true,
        radio: assigned.radio as u32,
        if_freq: assigned.if_offset,
        bandwidth: assigned.channel.bandwidth,
        datarate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chanplan::{assign, RadioChannel};

    fn eu868_plan() -> Vec<RadioChannel> {
        let multi = |frequency| RadioChannel {
            frequency,
            bandwidth: 125_000,
            modulation: ChannelModulation::LoraMultiSf {
                spreading_factors: vec![7, 8, 9, 10, 11, 12],
            },
        };
        vec![
            multi(868_100_000),
            multi(868_300_000),
            multi(868_500_000),
            multi(867_100_000),
            multi(867_300_000),
            multi(867_500_000),
            multi(867_700_000),
            multi(867_900_000),
            RadioChannel {
                frequency: 868_300_000,
                bandwidth: 250_000,
                modulation: ChannelModulation::LoraStd {
                    spreading_factor: 7,
                },
            },
            RadioChannel {
                frequency: 868_800_000,
                bandwidth: 125_000,
                modulation: ChannelModulation::Fsk { datarate: 50_000 },
            },
        ]
    }

    #[test]
    fn test_eu868_artifact() {
        let assignment = assign(&eu868_plan()).expect("placement should succeed");
        let config = Sx1301Config::from_assignment(&assignment);

        assert_eq!(
            config.radio_0,
            RadioConfig {
                enable: true,
                freq: 867_500_000
            }
        );
        assert_eq!(
            config.radio_1,
            RadioConfig {
                enable: true,
                freq: 868_500_000
            }
        );
        assert_eq!(
            config.chan_multi_sf_0,
            MultiSfChannelConfig {
                enable: true,
                radio: 1,
                if_freq: -400_000
            }
        );
        assert_eq!(
            config.chan_multi_sf_7,
            MultiSfChannelConfig {
                enable: true,
                radio: 0,
                if_freq: 400_000
            }
        );
        assert_eq!(
            config.chan_lora_std,
            LoraStdChannelConfig {
                enable: true,
                radio: 1,
                if_freq: -200_000,
                bandwidth: 250_000,
                spread_factor: 7
            }
        );
        assert_eq!(
            config.chan_fsk,
            FskChannelConfig {
                enable: true,
                radio: 1,
                if_freq: 300_000,
                bandwidth: 125_000,
                datarate: 50_000
            }
        );
    }

    #[test]
    fn test_artifact_field_names() {
        let assignment = assign(&eu868_plan()).expect("placement should succeed");
        let config = Sx1301Config::from_assignment(&assignment);
        let json = serde_json::to_value(&config).expect("serialize");

        for key in ["radio_0", "radio_1", "chan_multiSF_0", "chan_multiSF_7", "chan_Lora_std", "chan_FSK"] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
        assert_eq!(json["chan_multiSF_2"]["if"], 0);
        assert_eq!(json["chan_Lora_std"]["if"], -200_000);
    }

    #[test]
    fn test_unused_slots_stay_disabled() {
        let plan = vec![RadioChannel {
            frequency: 868_100_000,
            bandwidth: 125_000,
            modulation: ChannelModulation::LoraMultiSf {
                spreading_factors: vec![7],
            },
        }];
        let assignment = assign(&plan).expect("placement should succeed");
        let config = Sx1301Config::from_assignment(&assignment);

        assert!(config.chan_multi_sf_0.enable);
        assert!(!config.chan_multi_sf_1.enable);
        assert!(!config.chan_lora_std.enable);
        assert!(!config.chan_fsk.enable);
        assert!(!config.radio_1.enable);
    }
}
