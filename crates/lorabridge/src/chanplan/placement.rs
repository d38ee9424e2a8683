// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel placement: pack logical channels onto physical radio chains.
//!
//! Each channel needs its radio tuned so that the channel's occupied
//! bandwidth falls inside the slice of spectrum the radio captures. The
//! capturable slice depends on the channel bandwidth (wider channels leave
//! the radio less margin):
//!
//! | channel bandwidth | required radio bandwidth |
//! |-------------------|--------------------------|
//! | 500 kHz           | 1100 kHz                 |
//! | 250 kHz           | 1000 kHz                 |
//! | 125 kHz           |  925 kHz                 |
//!
//! Placement is a greedy left-to-right scan: channels are ordered by the
//! earliest radio center that could still cover them, radios are opened one
//! at a time, and a channel that does not fit the last radio fails the
//! whole plan. A second pass computes each channel's IF offset relative to
//! its (now fixed) radio center and claims a hardware slot.

use super::{ChannelModulation, RadioChannel};
use crate::error::{Error, Result};

/// Radio chains on SX1301-class concentrator boards.
pub const DEFAULT_RADIO_COUNT: usize = 2;
/// Multi-SF demodulator slots.
pub const MAX_MULTI_SF_CHANNELS: usize = 8;

/// A channel bound to a radio chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedChannel {
    pub channel: RadioChannel,
    /// Index of the radio chain the channel is tuned through.
    pub radio: usize,
    /// `channel_freq - radio_center`, in Hz.
    pub if_offset: i32,
}

/// Complete placement result for one channel plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioChainAssignment {
    /// Center frequency per radio chain; `None` = radio unused.
    pub radios: Vec<Option<u32>>,
    /// Multi-SF channels, in caller order, at most [`MAX_MULTI_SF_CHANNELS`].
    pub multi_sf: Vec<AssignedChannel>,
    /// The single "LoRa-STD" slot.
    pub lora_std: Option<AssignedChannel>,
    /// The single FSK slot.
    pub fsk: Option<AssignedChannel>,
}

/// Radio bandwidth required to capture a channel of the given bandwidth.
fn required_radio_bandwidth(channel_bandwidth: u32) -> u32 {
    match channel_bandwidth {
        500_000 => 1_100_000,
        250_000 => 1_000_000,
        _ => 925_000,
    }
}

/// Lowest radio center frequency that still covers the channel, i.e. the
/// center of a radio window whose left edge is aligned with the channel's
/// left edge.
fn min_radio_center(channel: &RadioChannel) -> i64 {
    i64::from(channel.frequency) - i64::from(channel.bandwidth / 2)
        + i64::from(required_radio_bandwidth(channel.bandwidth) / 2)
}

/// Place `channels` onto the conventional two radio chains.
pub fn assign(channels: &[RadioChannel]) -> Result<RadioChainAssignment> {
    assign_channels(channels, DEFAULT_RADIO_COUNT)
}

/// Place `channels` onto `radio_count` radio chains.
///
/// # Errors
///
/// `Error::ChannelDoesNotFit` when a channel cannot be covered by any
/// remaining radio window; `Error::SlotExhausted` when the plan holds more
/// channels of one kind than the hardware has slots. No partial assignment
/// is returned on failure.
pub fn assign_channels(
    channels: &[RadioChannel],
    radio_count: usize,
) -> Result<RadioChainAssignment> {
    crate::trace_fn!("placement::assign_channels");

    // Channels that could start a radio window earliest come first; this is
    // the tie-break rule that makes the greedy pass deterministic.
    let mut sorted: Vec<&RadioChannel> = channels.iter().collect();
    sorted.sort_by_key(|ch| min_radio_center(ch));

    let mut radios: Vec<Option<u32>> = vec![None; radio_count];
    let mut radio_index = 0usize;

    for channel in &sorted {
        let required_bw = i64::from(required_radio_bandwidth(channel.bandwidth));
        let upper_edge = i64::from(channel.frequency) + i64::from(channel.bandwidth / 2);
        loop {
            match radios.get(radio_index).copied().flatten() {
                None => {
                    if radio_index >= radio_count {
                        return Err(Error::ChannelDoesNotFit(channel.frequency));
                    }
                    radios[radio_index] = Some(min_radio_center(channel) as u32);
                    break;
                }
                Some(center) => {
                    if upper_edge <= i64::from(center) + required_bw / 2 {
                        break;
                    }
                    if radio_index + 1 < radio_count {
                        radio_index += 1;
                    } else {
                        return Err(Error::ChannelDoesNotFit(channel.frequency));
                    }
                }
            }
        }
    }

    let mut assignment = RadioChainAssignment {
        radios,
        multi_sf: Vec::new(),
        lora_std: None,
        fsk: None,
    };

    // Radio centers are fixed now; bind every channel (in caller order, which
    // determines hardware slot numbering) and compute its IF offset.
    for channel in channels {
        let assigned = bind_channel(&assignment.radios, channel)?;
        match &channel.modulation {
            ChannelModulation::LoraMultiSf { .. } => {
                if assignment.multi_sf.len() >= MAX_MULTI_SF_CHANNELS {
                    return Err(Error::SlotExhausted("multi_sf"));
                }
                assignment.multi_sf.push(assigned);
            }
            ChannelModulation::LoraStd { .. } => {
                if assignment.lora_std.is_some() {
                    return Err(Error::SlotExhausted("lora_std"));
                }
                assignment.lora_std = Some(assigned);
            }
            ChannelModulation::Fsk { .. } => {
                if assignment.fsk.is_some() {
                    return Err(Error::SlotExhausted("fsk"));
                }
                assignment.fsk = Some(assigned);
            }
        }
    }

    Ok(assignment)
}

/// Find the radio whose window fully contains the channel.
fn bind_channel(radios: &[Option<u32>], channel: &RadioChannel) -> Result<AssignedChannel> {
    let radio_bw = i64::from(required_radio_bandwidth(channel.bandwidth));
    let half_bw = i64::from(channel.bandwidth / 2);
    let channel_min = i64::from(channel.frequency) - half_bw;
    let channel_max = i64::from(channel.frequency) + half_bw;

    for (index, center) in radios.iter().enumerate() {
        let Some(center) = center else { continue };
        let center = i64::from(*center);
        if channel_min >= center - radio_bw / 2 && channel_max <= center + radio_bw / 2 {
            return Ok(AssignedChannel {
                channel: channel.clone(),
                radio: index,
                if_offset: (i64::from(channel.frequency) - center) as i32,
            });
        }
    }
    Err(Error::ChannelDoesNotFit(channel.frequency))
}
