// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event bus for delivering backend events to the integration layer.
//!
//! Producer (the wire backend) calls `publish()`; each consumer calls
//! `subscribe()` to get a dedicated channel receiver. This replaces
//! settable callback fields with an explicit observer seam: there is no
//! nil-callback state, and a consumer that goes away is simply pruned on
//! the next publish.

use crate::frames::{DownlinkTxAck, GatewayId, GatewayStats, UplinkFrame};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

/// Events published by the wire backend, one per occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A radio packet was received and decoded.
    Uplink(UplinkFrame),
    /// A gateway reported its periodic statistics.
    Stats(GatewayStats),
    /// A downlink finished its retry cycle (acked or exhausted).
    DownlinkAck(DownlinkTxAck),
    /// First pull session seen for this gateway.
    GatewayConnect(GatewayId),
    /// A gateway's pull session expired.
    GatewayDisconnect(GatewayId),
}

/// Event bus: single producer side, N subscriber channels.
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<Event>>>,
}

#[inline]
fn recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::debug!("[events] WARNING: {} poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to events (returns a dedicated receiver).
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = unbounded();
        let mut subs = recover(&self.subscribers, "EventBus::subscribers");
        subs.push(tx);
        rx
    }

    /// Publish an event to all live subscribers.
    ///
    /// Subscribers whose receiver has been dropped are removed.
    pub fn publish(&self, event: Event) {
        let mut subs = recover(&self.subscribers, "EventBus::subscribers");
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Current number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        recover(&self.subscribers, "EventBus::subscribers").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_single_subscriber() {
        let bus = EventBus::new();
        let rx = bus.subscribe();

        let id = GatewayId::new([1, 2, 3, 4, 5, 6, 7, 8]);
        bus.publish(Event::GatewayConnect(id));

        let event = rx.try_recv().expect("event should be delivered");
        assert_eq!(event, Event::GatewayConnect(id));
    }

    #[test]
    fn test_publish_broadcasts_to_all() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        let id = GatewayId::new([8; 8]);
        bus.publish(Event::GatewayDisconnect(id));

        assert_eq!(rx1.try_recv().ok(), Some(Event::GatewayDisconnect(id)));
        assert_eq!(rx2.try_recv().ok(), Some(Event::GatewayDisconnect(id)));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx2);
        bus.publish(Event::GatewayConnect(GatewayId::default()));
        assert_eq!(bus.subscriber_count(), 1);

        assert!(rx1.try_recv().is_ok());
    }

    #[test]
    fn test_no_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(Event::GatewayConnect(GatewayId::default()));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
