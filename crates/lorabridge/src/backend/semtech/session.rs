// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway session registry.
//!
//! Tracks the last-known address, protocol version, and last-seen time of
//! every gateway with an open pull session. A session is created on the
//! first PULL_DATA from an unseen identifier, refreshed on every subsequent
//! one, and evicted by the periodic cleanup sweep once it goes stale.
//!
//! All three operations run under one exclusive lock so that session state
//! stays consistent with the connect/disconnect events it emits.

use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::frames::GatewayId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Live pull session of one gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySession {
    /// Source address of the last PULL_DATA; downlinks are sent here.
    pub addr: SocketAddr,
    /// Wire protocol version the gateway speaks; echoed in PULL_RESP.
    pub protocol_version: u8,
    pub last_seen: Instant,
}

/// Registry of active gateway sessions.
///
/// Invariant: at most one session per gateway identifier.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<GatewayId, GatewaySession>>,
    events: Arc<EventBus>,
}

#[inline]
fn recover<'a, T>(lock: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::debug!("[session] WARNING: {} poisoned, recovering", context);
            poisoned.into_inner()
        }
    }
}

impl SessionRegistry {
    #[must_use]
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Look up the session for a gateway.
    ///
    /// # Errors
    ///
    /// `Error::GatewayUnknown` when the gateway has no active session.
    pub fn get(&self, id: &GatewayId) -> Result<GatewaySession> {
        let sessions = recover(&self.sessions, "SessionRegistry::sessions");
        sessions.get(id).copied().ok_or(Error::GatewayUnknown(*id))
    }

    /// Create or refresh a session.
    ///
    /// Creation (key previously absent) emits one `GatewayConnect` event.
    pub fn set(&self, id: GatewayId, session: GatewaySession) {
        crate::trace_fn!("SessionRegistry::set");
        let mut sessions = recover(&self.sessions, "SessionRegistry::sessions");
        let created = sessions.insert(id, session).is_none();
        if created {
            log::info!("[session] gateway connected id={} addr={}", id, session.addr);
            self.events.publish(Event::GatewayConnect(id));
        } else {
            log::debug!("[session] session refreshed id={} addr={}", id, session.addr);
        }
    }

    /// Evict sessions whose last-seen time is older than `max_age`.
    ///
    /// Emits one `GatewayDisconnect` event per evicted session. Invoked on a
    /// fixed interval by the backend's cleanup loop.
    pub fn cleanup(&self, max_age: Duration) {
        crate::trace_fn!("SessionRegistry::cleanup");
        let now = Instant::now();
        let mut sessions = recover(&self.sessions, "SessionRegistry::sessions");
        let mut expired = Vec::new();
        sessions.retain(|id, session| {
            if now.duration_since(session.last_seen) > max_age {
                expired.push(*id);
                false
            } else {
                true
            }
        });
        for id in expired {
            log::info!("[session] gateway disconnected id={} (session expired)", id);
            self.events.publish(Event::GatewayDisconnect(id));
        }
    }

    /// Current number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        recover(&self.sessions, "SessionRegistry::sessions").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
