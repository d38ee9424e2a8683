// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # lorabridge - LoRa gateway wire backend
//!
//! Bridges physical LoRa concentrator gateways speaking the Semtech UDP
//! packet-forwarder protocol to a protocol-agnostic event contract: uplink
//! frames, gateway statistics, downlink acknowledgments, and gateway
//! connect/disconnect notifications.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lorabridge::{Event, SemtechBackend, SemtechConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let mut backend = SemtechBackend::start(SemtechConfig::default())?;
//!     let events = backend.subscribe();
//!
//!     for event in events.iter() {
//!         match event {
//!             Event::Uplink(frame) => println!("uplink: {} bytes", frame.phy_payload.len()),
//!             Event::GatewayConnect(id) => println!("gateway {} connected", id),
//!             _ => {}
//!         }
//!     }
//!     backend.close()
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Integration Layer                       |
//! |        EventBus subscribers | send_downlink | config         |
//! +--------------------------------------------------------------+
//! |                        Wire Backend                          |
//! |  SessionRegistry | DownlinkCorrelator | packet codec (JSON)  |
//! +--------------------------------------------------------------+
//! |                         Transport                            |
//! |     UDP read loop | per-datagram handlers | write loop       |
//! +--------------------------------------------------------------+
//! ```
//!
//! The concurrency model is OS threads and channels: one read loop and one
//! write loop per backend, one short-lived thread per inbound datagram, a
//! bounded outbound queue for backpressure. UDP is inherently lossy; the
//! design compensates with per-downlink retries and bounded-lifetime ack
//! state, not with delivery guarantees.

/// Wire backends (Semtech UDP) and the abstract backend contract.
pub mod backend;
/// Channel-plan placement and SX1301 configuration artifact.
pub mod chanplan;
/// Error taxonomy and crate-wide `Result` alias.
pub mod error;
/// Backend event types and the subscriber bus.
pub mod events;
/// Protocol-agnostic frame and identifier types.
pub mod frames;
/// Call tracing macros (zero-cost unless the `trace` feature is enabled).
pub mod logging;
/// Backend diagnostic counters.
pub mod metrics;

pub use backend::semtech::{SemtechBackend, SemtechConfig};
pub use backend::Backend;
pub use chanplan::{ChannelModulation, RadioChannel, Sx1301Config};
pub use error::{Error, Result};
pub use events::{Event, EventBus};
pub use frames::{
    CrcStatus, DownlinkFrame, DownlinkItem, DownlinkTiming, DownlinkTxAck, GatewayId,
    GatewayStats, ModulationInfo, TxAckStatus, UplinkFrame, UplinkRxInfo, UplinkTxInfo,
};
pub use metrics::{BackendMetrics, MetricsSnapshot};
