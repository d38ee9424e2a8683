// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Downlink acknowledgment correlation and retry state machine.
//!
//! A downlink frame is an ordered list of transmission attempts (item 0 =
//! primary window, item 1 = fallback). Each transmitted frame is keyed by
//! the 16-bit wire token echoed back in TX_ACK:
//!
//! ```text
//! AwaitingAck(i) --ack ok-->  Finalized (statuses[i] = OK, rest IGNORED)
//! AwaitingAck(i) --ack err--> statuses[i] = err
//!                             i+1 exists: transmit item i+1, AwaitingAck(i+1)
//!                             else:       Finalized
//! ```
//!
//! Finalized is terminal: the entry is removed, so duplicate or late acks
//! find nothing and are ignored. Entries also expire after a fixed TTL,
//! which bounds memory growth from gateways that never ack. Tokens are not
//! globally unique; a new frame reusing a live token overwrites the prior
//! entry.

use crate::error::{Error, Result};
use crate::frames::{DownlinkFrame, DownlinkItem, DownlinkTxAck, GatewayId, TxAckStatus};
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default lifetime of a pending-ack entry.
pub const DEFAULT_ACK_TTL: Duration = Duration::from_secs(60);

/// Per-token retry/acknowledgment state.
#[derive(Debug, Clone)]
struct PendingDownlink {
    frame: DownlinkFrame,
    /// Index of the item currently in flight.
    item_index: usize,
    /// Per-item status, initialized to `Ignored`.
    acks: Vec<TxAckStatus>,
    inserted: Instant,
}

/// What the caller must do after an ack has been processed.
#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    /// Retry cycle finished; publish the aggregated acknowledgment.
    Finalized(DownlinkTxAck),
    /// The current item failed and a fallback exists: transmit it, re-using
    /// the same token.
    Retry {
        token: u16,
        gateway_id: GatewayId,
        item: DownlinkItem,
    },
    /// No pending state for this token (late, duplicate, or expired ack).
    Unknown,
}

/// Correlates wire tokens with in-flight downlink frames.
pub struct DownlinkCorrelator {
    pending: Mutex<HashMap<u16, PendingDownlink>>,
    ttl: Duration,
}

#[inline]
fn recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::debug!("[downlink] WARNING: {} poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}

impl DownlinkCorrelator {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Wire token for a frame: the pre-assigned one if present, otherwise
    /// drawn from a cryptographically-random 16-bit space.
    #[must_use]
    pub fn token_for(frame: &DownlinkFrame) -> u16 {
        frame.token.unwrap_or_else(|| OsRng.gen::<u16>())
    }

    /// Begin tracking a frame that is about to be transmitted.
    ///
    /// # Errors
    ///
    /// `Error::EmptyDownlink` when the frame carries no items.
    pub fn track(&self, token: u16, frame: DownlinkFrame) -> Result<()> {
        crate::trace_fn!("DownlinkCorrelator::track");
        if frame.items.is_empty() {
            return Err(Error::EmptyDownlink);
        }

        let mut pending = recover(&self.pending, "DownlinkCorrelator::pending");
        Self::sweep(&mut pending, self.ttl);

        let acks = vec![TxAckStatus::Ignored; frame.items.len()];
        if pending
            .insert(
                token,
                PendingDownlink {
                    frame,
                    item_index: 0,
                    acks,
                    inserted: Instant::now(),
                },
            )
            .is_some()
        {
            log::debug!("[downlink] token 0x{:04x} reused, prior entry overwritten", token);
        }
        Ok(())
    }

    /// Process a TX_ACK for `token`.
    ///
    /// `error_code` is the normalized gateway report: empty means accepted.
    pub fn handle_ack(&self, token: u16, error_code: &str) -> AckOutcome {
        crate::trace_fn!("DownlinkCorrelator::handle_ack");
        let mut pending = recover(&self.pending, "DownlinkCorrelator::pending");
        Self::sweep(&mut pending, self.ttl);

        let Some(entry) = pending.get_mut(&token) else {
            return AckOutcome::Unknown;
        };

        let index = entry.item_index;
        let status = TxAckStatus::from_error_code(error_code);

        if status == TxAckStatus::Ok {
            entry.acks[index] = TxAckStatus::Ok;
        } else {
            entry.acks[index] = status.clone();
            log::debug!(
                "[downlink] item {} rejected token=0x{:04x} error={}",
                index,
                token,
                status
            );

            let next = index + 1;
            if next < entry.frame.items.len() {
                entry.item_index = next;
                let item = entry.frame.items[next].clone();
                return AckOutcome::Retry {
                    token,
                    gateway_id: entry.frame.gateway_id,
                    item,
                };
            }
        }

        // Terminal either way: remove the entry so later acks are ignored.
        match pending.remove(&token) {
            Some(entry) => AckOutcome::Finalized(Self::finalize(entry)),
            None => AckOutcome::Unknown,
        }
    }

    /// Current number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        recover(&self.pending, "DownlinkCorrelator::pending").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn finalize(entry: PendingDownlink) -> DownlinkTxAck {
        DownlinkTxAck {
            downlink_id: entry.frame.downlink_id,
            gateway_id: entry.frame.gateway_id,
            items: entry.acks,
        }
    }

    /// Drop entries older than the TTL. Called lazily on every mutation so
    /// no dedicated sweeper thread is needed.
    fn sweep(pending: &mut HashMap<u16, PendingDownlink>, ttl: Duration) {
        let now = Instant::now();
        pending.retain(|token, entry| {
            let keep = now.duration_since(entry.inserted) < ttl;
            if !keep {
                log::debug!(
                    "[downlink] entry expired token=0x{:04x} downlink_id={}",
                    token,
                    entry.frame.downlink_id
                );
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{DownlinkTiming, GatewayId, ModulationInfo};

    fn item(frequency: u32) -> DownlinkItem {
        DownlinkItem {
            phy_payload: vec![1, 2, 3],
            frequency,
            power: 14,
            modulation: ModulationInfo::Lora {
                bandwidth: 125_000,
                spreading_factor: 12,
                code_rate: "4/5".to_string(),
            },
            timing: DownlinkTiming::Delay { timestamp: 1_000_000 },
            board: 0,
            antenna: 0,
        }
    }

    fn frame(items: Vec<DownlinkItem>) -> DownlinkFrame {
        DownlinkFrame {
            downlink_id: 99,
            token: None,
            gateway_id: GatewayId::new([7; 8]),
            items,
        }
    }

    #[test]
    fn test_track_rejects_empty_frame() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        match correlator.track(1, frame(vec![])) {
            Err(Error::EmptyDownlink) => {}
            other => panic!("expected EmptyDownlink, got {:?}", other),
        }
    }

    #[test]
    fn test_single_item_ok_finalizes() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        correlator.track(1, frame(vec![item(868_100_000)])).expect("track");

        match correlator.handle_ack(1, "") {
            AckOutcome::Finalized(ack) => {
                assert_eq!(ack.downlink_id, 99);
                assert_eq!(ack.items, vec![TxAckStatus::Ok]);
            }
            other => panic!("expected Finalized, got {:?}", other),
        }
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_single_item_error_finalizes() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        correlator.track(2, frame(vec![item(868_100_000)])).expect("track");

        match correlator.handle_ack(2, "TX_FREQ") {
            AckOutcome::Finalized(ack) => {
                assert_eq!(ack.items, vec![TxAckStatus::TxFreq]);
            }
            other => panic!("expected Finalized, got {:?}", other),
        }
    }

    #[test]
    fn test_two_items_error_then_ok() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        correlator
            .track(3, frame(vec![item(868_100_000), item(869_525_000)]))
            .expect("track");

        // Item 0 rejected: the fallback window must be transmitted next.
        match correlator.handle_ack(3, "TOO_LATE") {
            AckOutcome::Retry {
                token,
                gateway_id,
                item,
            } => {
                assert_eq!(token, 3);
                assert_eq!(gateway_id, GatewayId::new([7; 8]));
                assert_eq!(item.frequency, 869_525_000);
            }
            other => panic!("expected Retry, got {:?}", other),
        }

        // Item 1 accepted.
        match correlator.handle_ack(3, "") {
            AckOutcome::Finalized(ack) => {
                assert_eq!(ack.items, vec![TxAckStatus::TooLate, TxAckStatus::Ok]);
            }
            other => panic!("expected Finalized, got {:?}", other),
        }
    }

    #[test]
    fn test_two_items_immediate_ok_leaves_second_ignored() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        correlator
            .track(4, frame(vec![item(868_100_000), item(869_525_000)]))
            .expect("track");

        match correlator.handle_ack(4, "NONE") {
            AckOutcome::Finalized(ack) => {
                assert_eq!(ack.items, vec![TxAckStatus::Ok, TxAckStatus::Ignored]);
            }
            other => panic!("expected Finalized, got {:?}", other),
        }
    }

    #[test]
    fn test_two_items_both_rejected() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        correlator
            .track(5, frame(vec![item(868_100_000), item(869_525_000)]))
            .expect("track");

        match correlator.handle_ack(5, "TOO_EARLY") {
            AckOutcome::Retry { .. } => {}
            other => panic!("expected Retry, got {:?}", other),
        }
        match correlator.handle_ack(5, "COLLISION_PACKET") {
            AckOutcome::Finalized(ack) => {
                assert_eq!(
                    ack.items,
                    vec![TxAckStatus::TooEarly, TxAckStatus::CollisionPacket]
                );
            }
            other => panic!("expected Finalized, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ack_after_finalize_is_unknown() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        correlator.track(6, frame(vec![item(868_100_000)])).expect("track");

        assert!(matches!(
            correlator.handle_ack(6, ""),
            AckOutcome::Finalized(_)
        ));
        assert_eq!(correlator.handle_ack(6, ""), AckOutcome::Unknown);
    }

    #[test]
    fn test_unknown_token_is_ignored() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        assert_eq!(correlator.handle_ack(0xDEAD, ""), AckOutcome::Unknown);
    }

    #[test]
    fn test_entries_expire() {
        let correlator = DownlinkCorrelator::new(Duration::from_millis(1));
        correlator.track(7, frame(vec![item(868_100_000)])).expect("track");
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(correlator.handle_ack(7, ""), AckOutcome::Unknown);
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_token_reuse_overwrites_prior_entry() {
        let correlator = DownlinkCorrelator::new(DEFAULT_ACK_TTL);
        correlator.track(8, frame(vec![item(868_100_000)])).expect("track");

        let mut second = frame(vec![item(869_525_000)]);
        second.downlink_id = 100;
        correlator.track(8, second).expect("track");
        assert_eq!(correlator.len(), 1);

        match correlator.handle_ack(8, "") {
            AckOutcome::Finalized(ack) => assert_eq!(ack.downlink_id, 100),
            other => panic!("expected Finalized, got {:?}", other),
        }
    }

    #[test]
    fn test_token_for_prefers_preassigned() {
        let mut f = frame(vec![item(868_100_000)]);
        f.token = Some(0x1234);
        assert_eq!(DownlinkCorrelator::token_for(&f), 0x1234);
    }
}
