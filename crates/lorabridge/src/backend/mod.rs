// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire backends.
//!
//! A backend owns one protocol stack toward physical gateways and exposes a
//! protocol-agnostic contract to the integration layer: typed events upward
//! (uplinks, stats, acks, connect/disconnect) and two commands downward
//! (send a downlink frame, apply a channel-plan configuration).

pub mod semtech;

use crate::chanplan::RadioChannel;
use crate::error::Result;
use crate::events::Event;
use crate::frames::DownlinkFrame;
use crossbeam::channel::Receiver;

/// Contract every wire backend implements.
pub trait Backend {
    /// Subscribe to backend events. Each call returns a dedicated receiver.
    fn subscribe(&self) -> Receiver<Event>;

    /// Queue a downlink frame toward its target gateway.
    ///
    /// Returns immediately; the retry state machine runs asynchronously and
    /// reports one aggregated `Event::DownlinkAck` when it finishes.
    ///
    /// # Errors
    ///
    /// `Error::GatewayUnknown` when the target gateway has no active
    /// session; `Error::Closed` after `close()`.
    fn send_downlink(&self, frame: DownlinkFrame) -> Result<()>;

    /// Turn a logical channel plan into this backend's vendor-specific
    /// configuration artifact, rendered as JSON.
    ///
    /// # Errors
    ///
    /// Placement errors (`ChannelDoesNotFit`, `SlotExhausted`) are returned
    /// without side effects.
    fn apply_configuration(&self, channels: &[RadioChannel]) -> Result<serde_json::Value>;

    /// Stop all loops and release the socket. Idempotent.
    fn close(&mut self) -> Result<()>;
}
