// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Semtech UDP packet-forwarder backend.
//!
//! Owns the UDP socket and three long-lived threads:
//!
//! ```text
//! read loop:    recv_from() -> copy datagram -> spawn handler thread
//! write loop:   bounded outbound queue -> send_to()
//! cleanup loop: SessionRegistry::cleanup() on a fixed interval
//! ```
//!
//! Every inbound datagram is handled by its own short-lived thread, so
//! handling one gateway's traffic never blocks another's (nor the read
//! loop itself). Packets from the same gateway may also be processed out
//! of order; the protocol tolerates this. The outbound queue is bounded:
//! a slow write loop applies backpressure to producers instead of
//! buffering without limit.

pub mod downlink;
pub mod packets;
pub mod payloads;
pub mod session;
pub mod time;

use crate::backend::Backend;
use crate::chanplan::{self, RadioChannel, Sx1301Config};
use crate::error::{Error, Result};
use crate::events::{Event, EventBus};
use crate::frames::DownlinkFrame;
use crate::metrics::BackendMetrics;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use downlink::{AckOutcome, DownlinkCorrelator, DEFAULT_ACK_TTL};
use packets::{Packet, PullAckPacket, PullRespPacket, PushAckPacket, PushDataPacket};
use payloads::PullRespPayload;
use session::{GatewaySession, SessionRegistry};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Maximum UDP datagram we accept. The protocol never comes close; a full
/// 8-packet rxpk burst stays well under 16 KiB.
const RX_BUFFER_SIZE: usize = 65_535;

/// How long blocking calls wait before re-checking the running flag.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Semtech UDP backend configuration.
#[derive(Debug, Clone)]
pub struct SemtechConfig {
    /// UDP bind address (the packet forwarder default port is 1700).
    pub bind: SocketAddr,
    /// Interval between session cleanup sweeps.
    pub cleanup_interval: Duration,
    /// Inactivity window after which a pull session is evicted.
    pub session_timeout: Duration,
    /// Lifetime of pending downlink-ack state.
    pub ack_ttl: Duration,
    /// Depth of the bounded outbound queue.
    pub tx_queue_depth: usize,
    /// Forward uplinks with a failed or missing CRC instead of dropping them.
    pub skip_crc_check: bool,
}

impl Default for SemtechConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 1700)),
            cleanup_interval: Duration::from_secs(60),
            session_timeout: Duration::from_secs(60),
            ack_ttl: DEFAULT_ACK_TTL,
            tx_queue_depth: 64,
            skip_crc_check: false,
        }
    }
}

/// Shared state the read loop hands to each per-datagram handler thread.
struct Handler {
    socket: Arc<UdpSocket>,
    outbound: Sender<(Vec<u8>, SocketAddr)>,
    events: Arc<EventBus>,
    sessions: SessionRegistry,
    correlator: DownlinkCorrelator,
    metrics: Arc<BackendMetrics>,
    skip_crc_check: bool,
}

/// Semtech UDP wire backend.
pub struct SemtechBackend {
    handler: Arc<Handler>,
    running: Arc<AtomicBool>,
    read_handle: Option<JoinHandle<()>>,
    write_handle: Option<JoinHandle<()>>,
    cleanup_handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
    closed: bool,
}

impl SemtechBackend {
    /// Bind the socket and start the read, write, and cleanup loops.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the socket cannot be created or bound.
    pub fn start(config: SemtechConfig) -> Result<Self> {
        crate::trace_fn!("SemtechBackend::start");

        let socket2 = Socket::new(
            Domain::for_address(config.bind),
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket2.set_reuse_address(true)?;
        socket2.bind(&config.bind.into())?;
        let socket: UdpSocket = socket2.into();
        // Bounded read timeout so the read loop can observe close().
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        let local_addr = socket.local_addr()?;
        log::info!("[semtech] backend listening on {}", local_addr);

        let socket = Arc::new(socket);
        let (outbound_tx, outbound_rx) = bounded(config.tx_queue_depth);
        let events = Arc::new(EventBus::new());
        let metrics = BackendMetrics::new();

        let handler = Arc::new(Handler {
            socket: Arc::clone(&socket),
            outbound: outbound_tx,
            events: Arc::clone(&events),
            sessions: SessionRegistry::new(Arc::clone(&events)),
            correlator: DownlinkCorrelator::new(config.ack_ttl),
            metrics: Arc::clone(&metrics),
            skip_crc_check: config.skip_crc_check,
        });

        let running = Arc::new(AtomicBool::new(true));

        let read_handle = {
            let handler = Arc::clone(&handler);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("semtech-udp-rx".to_string())
                .spawn(move || read_loop(&handler, &running))?
        };

        let write_handle = {
            let socket = Arc::clone(&socket);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("semtech-udp-tx".to_string())
                .spawn(move || write_loop(&socket, &outbound_rx, &running))?
        };

        let cleanup_handle = {
            let handler = Arc::clone(&handler);
            let running = Arc::clone(&running);
            let interval = config.cleanup_interval;
            let timeout = config.session_timeout;
            std::thread::Builder::new()
                .name("semtech-session-sweep".to_string())
                .spawn(move || cleanup_loop(&handler, &running, interval, timeout))?
        };

        Ok(Self {
            handler,
            running,
            read_handle: Some(read_handle),
            write_handle: Some(write_handle),
            cleanup_handle: Some(cleanup_handle),
            local_addr,
            closed: false,
        })
    }

    /// Address the socket is actually bound to (relevant with port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Backend counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<BackendMetrics> {
        Arc::clone(&self.handler.metrics)
    }

    /// Subscribe to backend events.
    pub fn subscribe(&self) -> Receiver<Event> {
        self.handler.events.subscribe()
    }

    /// Queue a downlink frame toward its target gateway.
    ///
    /// The first item is transmitted now; further items follow on negative
    /// acknowledgments (see [`DownlinkCorrelator`]). The aggregated outcome
    /// arrives as `Event::DownlinkAck`.
    ///
    /// # Errors
    ///
    /// `Error::Closed` after `close()`; `Error::EmptyDownlink` for a frame
    /// without items; `Error::GatewayUnknown` when the target gateway has
    /// no active session.
    pub fn send_downlink(&self, frame: DownlinkFrame) -> Result<()> {
        crate::trace_fn!("SemtechBackend::send_downlink");
        if self.closed {
            return Err(Error::Closed);
        }
        let first = frame.items.first().ok_or(Error::EmptyDownlink)?.clone();
        let session = self.handler.sessions.get(&frame.gateway_id)?;
        let token = DownlinkCorrelator::token_for(&frame);

        // Track before transmitting so a fast ack cannot race the insert.
        self.handler.correlator.track(token, frame)?;
        self.handler
            .transmit_item(token, session.protocol_version, &first, session.addr)
    }

    /// Turn a channel plan into the SX1301-style configuration artifact.
    ///
    /// # Errors
    ///
    /// Placement errors are returned without side effects; no partial
    /// artifact is produced.
    pub fn generate_configuration(&self, channels: &[RadioChannel]) -> Result<Sx1301Config> {
        crate::trace_fn!("SemtechBackend::generate_configuration");
        let assignment = chanplan::assign(channels)?;
        Ok(Sx1301Config::from_assignment(&assignment))
    }

    /// Stop all loops and release the socket. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        crate::trace_fn!("SemtechBackend::close");
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.running.store(false, Ordering::SeqCst);

        for (name, handle) in [
            ("read", self.read_handle.take()),
            ("write", self.write_handle.take()),
            ("cleanup", self.cleanup_handle.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    log::debug!("[semtech] {} loop panicked during shutdown", name);
                }
            }
        }
        log::info!("[semtech] backend closed addr={}", self.local_addr);
        Ok(())
    }
}

impl Backend for SemtechBackend {
    fn subscribe(&self) -> Receiver<Event> {
        SemtechBackend::subscribe(self)
    }

    fn send_downlink(&self, frame: DownlinkFrame) -> Result<()> {
        SemtechBackend::send_downlink(self, frame)
    }

    fn apply_configuration(&self, channels: &[RadioChannel]) -> Result<serde_json::Value> {
        let config = self.generate_configuration(channels)?;
        serde_json::to_value(config).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        SemtechBackend::close(self)
    }
}

impl Drop for SemtechBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Blocking receive loop. Each datagram is copied and dispatched to its own
/// handler thread; a socket error other than the poll timeout is fatal.
fn read_loop(handler: &Arc<Handler>, running: &Arc<AtomicBool>) {
    let mut buf = vec![0u8; RX_BUFFER_SIZE];
    while running.load(Ordering::SeqCst) {
        match handler.socket.recv_from(&mut buf) {
            Ok((len, src)) => {
                BackendMetrics::incr(&handler.metrics.packets_received);
                BackendMetrics::add(&handler.metrics.bytes_received, len as u64);
                let datagram = buf[..len].to_vec();
                let handler = Arc::clone(handler);
                let spawned = std::thread::Builder::new()
                    .name("semtech-udp-pkt".to_string())
                    .spawn(move || handler.handle_datagram(&datagram, src));
                if let Err(e) = spawned {
                    log::warn!("[semtech] failed to spawn packet handler: {}", e);
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                // Poll timeout: re-check the running flag.
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    // The backend cannot continue without its socket.
                    log::error!("[semtech] read loop socket error: {}", e);
                } else {
                    log::debug!("[semtech] read loop unblocked by close: {}", e);
                }
                break;
            }
        }
    }
    log::debug!("[semtech] read loop exited");
}

/// Drains the outbound queue. A send failure is logged and the loop keeps
/// going; only close() stops it.
fn write_loop(
    socket: &Arc<UdpSocket>,
    outbound: &Receiver<(Vec<u8>, SocketAddr)>,
    running: &Arc<AtomicBool>,
) {
    loop {
        match outbound.recv_timeout(POLL_INTERVAL) {
            Ok((data, dest)) => {
                if let Err(e) = socket.send_to(&data, dest) {
                    log::warn!(
                        "[semtech] send error={} dest={} len={}",
                        e,
                        dest,
                        data.len()
                    );
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::debug!("[semtech] write loop exited");
}

/// Ticks the session registry sweep on a fixed interval.
fn cleanup_loop(
    handler: &Arc<Handler>,
    running: &Arc<AtomicBool>,
    interval: Duration,
    session_timeout: Duration,
) {
    let mut last_sweep = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL.min(interval));
        if last_sweep.elapsed() >= interval {
            handler.sessions.cleanup(session_timeout);
            last_sweep = Instant::now();
        }
    }
    log::debug!("[semtech] cleanup loop exited");
}

impl Handler {
    /// Decode and process one inbound datagram.
    ///
    /// Wire decode failures are logged and the datagram dropped; no reply
    /// is sent for packets we cannot parse.
    fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        crate::trace_fn!("Handler::handle_datagram");
        let packet = match Packet::decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                BackendMetrics::incr(&self.metrics.packets_invalid);
                log::warn!("[semtech] dropping datagram from {}: {}", src, e);
                return;
            }
        };

        let packet_type = packet.packet_type();
        match packet {
            Packet::PushData(p) => self.handle_push_data(p, src),
            Packet::PullData(p) => {
                // Record the session before acknowledging so a downlink
                // issued right after the PULL_ACK finds it.
                self.sessions.set(
                    p.gateway_id,
                    GatewaySession {
                        addr: src,
                        protocol_version: p.protocol_version,
                        last_seen: Instant::now(),
                    },
                );
                self.enqueue_reply(
                    Packet::PullAck(PullAckPacket {
                        protocol_version: p.protocol_version,
                        random_token: p.random_token,
                    }),
                    src,
                );
            }
            Packet::TxAck(p) => {
                BackendMetrics::incr(&self.metrics.tx_acks_received);
                self.handle_tx_ack(p.random_token, p.error_code());
            }
            // Server-to-gateway kinds arriving here are either reflections
            // or misconfigured peers; drop them.
            Packet::PushAck(_) | Packet::PullAck(_) | Packet::PullResp(_) => {
                log::debug!("[semtech] unexpected {:?} from {}, dropping", packet_type, src);
            }
        }
    }

    fn handle_push_data(&self, packet: PushDataPacket, src: SocketAddr) {
        self.enqueue_reply(
            Packet::PushAck(PushAckPacket {
                protocol_version: packet.protocol_version,
                random_token: packet.random_token,
            }),
            src,
        );

        for rxpk in &packet.payload.rxpk {
            if rxpk.crc_status() != crate::frames::CrcStatus::Ok && !self.skip_crc_check {
                log::debug!(
                    "[semtech] dropping uplink with CRC status {:?} gateway={}",
                    rxpk.crc_status(),
                    packet.gateway_id
                );
                continue;
            }
            match rxpk.to_uplink_frame(packet.gateway_id) {
                Ok(frame) => {
                    BackendMetrics::incr(&self.metrics.uplinks_published);
                    self.events.publish(Event::Uplink(frame));
                }
                Err(e) => {
                    BackendMetrics::incr(&self.metrics.packets_invalid);
                    log::warn!(
                        "[semtech] invalid rxpk from gateway {}: {}",
                        packet.gateway_id,
                        e
                    );
                }
            }
        }

        if let Some(stat) = &packet.payload.stat {
            self.events
                .publish(Event::Stats(stat.to_gateway_stats(packet.gateway_id)));
        }
    }

    fn handle_tx_ack(&self, token: u16, error_code: &str) {
        match self.correlator.handle_ack(token, error_code) {
            AckOutcome::Finalized(ack) => {
                log::debug!(
                    "[semtech] downlink finalized id={} statuses={:?}",
                    ack.downlink_id,
                    ack.items
                );
                self.events.publish(Event::DownlinkAck(ack));
            }
            AckOutcome::Retry {
                token,
                gateway_id,
                item,
            } => {
                // The gateway address may have moved between attempts; ask
                // the registry again instead of caching it in the entry.
                match self.sessions.get(&gateway_id) {
                    Ok(session) => {
                        if let Err(e) = self.transmit_item(
                            token,
                            session.protocol_version,
                            &item,
                            session.addr,
                        ) {
                            log::warn!(
                                "[semtech] fallback transmission failed token=0x{:04x}: {}",
                                token,
                                e
                            );
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "[semtech] no session for fallback transmission token=0x{:04x}: {}",
                            token,
                            e
                        );
                    }
                }
            }
            AckOutcome::Unknown => {
                log::debug!("[semtech] ignoring ack for unknown token 0x{:04x}", token);
            }
        }
    }

    /// Encode one downlink item as PULL_RESP and enqueue it.
    fn transmit_item(
        &self,
        token: u16,
        protocol_version: u8,
        item: &crate::frames::DownlinkItem,
        dest: SocketAddr,
    ) -> Result<()> {
        let txpk = payloads::TxPk::from_downlink_item(item)?;
        let packet = Packet::PullResp(PullRespPacket {
            protocol_version,
            random_token: token,
            payload: PullRespPayload { txpk },
        });
        let bytes = packet.encode()?;
        BackendMetrics::incr(&self.metrics.downlinks_sent);
        log::debug!(
            "[semtech] PULL_RESP enqueued token=0x{:04x} dest={} len={}",
            token,
            dest,
            bytes.len()
        );
        self.outbound
            .send((bytes, dest))
            .map_err(|_| Error::Closed)
    }

    /// Enqueue a PUSH_ACK/PULL_ACK reply without blocking the handler for
    /// long; replies are droppable, unlike downlinks.
    fn enqueue_reply(&self, packet: Packet, dest: SocketAddr) {
        match packet.encode() {
            Ok(bytes) => {
                BackendMetrics::incr(&self.metrics.acks_sent);
                if self
                    .outbound
                    .send_timeout((bytes, dest), Duration::from_secs(1))
                    .is_err()
                {
                    log::warn!("[semtech] outbound queue stalled, ack to {} dropped", dest);
                }
            }
            Err(e) => log::warn!("[semtech] failed to encode reply: {}", e),
        }
    }
}
