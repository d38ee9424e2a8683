// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backend counters for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Wire backend metrics.
///
/// All counters are monotonic and updated with relaxed ordering; readers
/// take a point-in-time [`MetricsSnapshot`].
#[derive(Debug)]
pub struct BackendMetrics {
    /// Total datagrams received (all kinds).
    pub packets_received: AtomicU64,
    /// Datagrams dropped (malformed framing or payload).
    pub packets_invalid: AtomicU64,
    /// Total bytes received.
    pub bytes_received: AtomicU64,
    /// PUSH_ACK + PULL_ACK replies enqueued.
    pub acks_sent: AtomicU64,
    /// PULL_RESP transmissions enqueued (including retries).
    pub downlinks_sent: AtomicU64,
    /// TX_ACK packets received.
    pub tx_acks_received: AtomicU64,
    /// Uplink frames published upward.
    pub uplinks_published: AtomicU64,
}

/// Point-in-time copy of [`BackendMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_invalid: u64,
    pub bytes_received: u64,
    pub acks_sent: u64,
    pub downlinks_sent: u64,
    pub tx_acks_received: u64,
    pub uplinks_published: u64,
}

impl BackendMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            packets_received: AtomicU64::new(0),
            packets_invalid: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            acks_sent: AtomicU64::new(0),
            downlinks_sent: AtomicU64::new(0),
            tx_acks_received: AtomicU64::new(0),
            uplinks_published: AtomicU64::new(0),
        })
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_invalid: self.packets_invalid.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            downlinks_sent: self.downlinks_sent.load(Ordering::Relaxed),
            tx_acks_received: self.tx_acks_received.load(Ordering::Relaxed),
            uplinks_published: self.uplinks_published.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_start_at_zero() {
        let metrics = BackendMetrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.packets_received, 0);
        assert_eq!(snap.bytes_received, 0);
    }

    #[test]
    fn test_metrics_increment() {
        let metrics = BackendMetrics::new();
        BackendMetrics::incr(&metrics.packets_received);
        BackendMetrics::incr(&metrics.packets_received);
        BackendMetrics::add(&metrics.bytes_received, 42);
        let snap = metrics.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.bytes_received, 42);
    }
}
