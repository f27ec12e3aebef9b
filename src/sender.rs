//! Send-side of one reliable message transfer.
//!
//! The transfer is selective repeat with cumulative ACKs, in three phases:
//!
//! ```text
//!  start(base) ──▶ ack(base+1)        handshake, bounded retries
//!  data(base+1 .. base+n) ──▶ ack(a)  sliding window, per-packet timers
//!  end(base+n+1) ──▶ ack(base+n+2)    teardown, bounded retries
//! ```
//!
//! [`SendWindow`] only manages state — which chunk goes out next, what is in
//! flight, what an ACK retires, what a timeout must resend. All socket I/O
//! and waiting lives in [`MessageSender`], which consumes ACKs from the
//! queue the multiplexer routes to it.
//!
//! Retransmission is per packet: on a timeout, only the in-flight entries
//! whose own last transmission has gone stale are resent, never the whole
//! window.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::TransportConfig;
use crate::envelope::{self, Role};
use crate::packet::{Packet, PacketKind};

// ---------------------------------------------------------------------------
// SendWindow
// ---------------------------------------------------------------------------

/// A single in-flight data packet awaiting cumulative acknowledgement.
#[derive(Debug)]
struct InFlight {
    seq: u32,
    packet: Packet,
    /// Wall-clock time of the most recent transmission.
    sent_at: Instant,
}

/// Sliding-window state for one outbound message.
///
/// ```text
///  window_base           next_seq
///      │                    │
///  ────┼────────────────────┼──────────────▶ seq space
///      │ ◀── in flight ──▶  │ ◀─ sendable ─▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Sequence number of the start packet; data starts at `base_seq + 1`.
    base_seq: u32,
    /// Sequence number the next new data packet will carry.
    pub next_seq: u32,
    /// Lowest unacknowledged sequence (left window edge).
    pub window_base: u32,
    window_size: usize,
    chunks: Vec<Vec<u8>>,
    /// In-flight packets ordered by sequence (front = oldest).
    in_flight: VecDeque<InFlight>,
}

impl SendWindow {
    /// Split `payload` into chunks and set up the window.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` or `chunk_size` is zero.
    pub fn new(payload: &[u8], base_seq: u32, window_size: usize, chunk_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        assert!(chunk_size >= 1, "chunk_size must be at least 1");
        let chunks = payload.chunks(chunk_size).map(<[u8]>::to_vec).collect();
        Self {
            base_seq,
            next_seq: base_seq + 1,
            window_base: base_seq + 1,
            window_size,
            chunks,
            in_flight: VecDeque::new(),
        }
    }

    /// Sequence of the last data packet (`base_seq` when the payload is
    /// empty and there are no data packets at all).
    pub fn final_seq(&self) -> u32 {
        self.base_seq + self.chunks.len() as u32
    }

    /// Sequence the end packet will carry.
    pub fn end_seq(&self) -> u32 {
        self.final_seq() + 1
    }

    /// Cumulative ACKs have advanced past the last data packet.
    pub fn is_complete(&self) -> bool {
        self.window_base > self.final_seq()
    }

    /// Number of packets currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Build, record and hand out the next data packet, or `None` when the
    /// window is full or every chunk has been handed out.
    pub fn next_to_send(&mut self, now: Instant) -> Option<Packet> {
        if self.next_seq >= self.window_base + self.window_size as u32 {
            return None;
        }
        let chunk = self.chunks.get((self.next_seq - self.base_seq - 1) as usize)?;
        let packet = Packet::data(self.next_seq, chunk.clone());
        self.in_flight.push_back(InFlight {
            seq: self.next_seq,
            packet: packet.clone(),
            sent_at: now,
        });
        self.next_seq += 1;
        Some(packet)
    }

    /// Process a cumulative ACK: retire every in-flight entry below
    /// `ack_seq` and advance the window base monotonically. Returns the
    /// number of entries retired (0 for duplicate or stale ACKs).
    pub fn on_ack(&mut self, ack_seq: u32) -> usize {
        let mut retired = 0;
        while self.in_flight.front().is_some_and(|e| e.seq < ack_seq) {
            self.in_flight.pop_front();
            retired += 1;
        }
        self.window_base = self.window_base.max(ack_seq);
        retired
    }

    /// Packets whose last transmission is older than `timeout`, their
    /// timestamps refreshed to `now`. The caller must put every returned
    /// packet back on the wire.
    pub fn due_for_retransmit(&mut self, now: Instant, timeout: Duration) -> Vec<Packet> {
        let mut due = Vec::new();
        for entry in self.in_flight.iter_mut() {
            if now.duration_since(entry.sent_at) > timeout {
                entry.sent_at = now;
                due.push(entry.packet.clone());
            }
        }
        due
    }
}

// ---------------------------------------------------------------------------
// MessageSender
// ---------------------------------------------------------------------------

/// How a send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The receiver acknowledged the whole message, end packet included.
    Delivered,
    /// The start or end handshake ran out of retries. Not an error at the
    /// application surface — the peer simply never sees the message.
    Abandoned,
}

/// Drives one message through handshake, sliding window and teardown.
///
/// Constructed by the multiplexer, which also owns the sending half of
/// `ack_rx` and feeds it every ACK addressed to this `(peer, msg_id)`.
pub struct MessageSender {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    msg_id: u32,
    config: TransportConfig,
    ack_rx: mpsc::UnboundedReceiver<Packet>,
}

impl MessageSender {
    pub fn new(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        msg_id: u32,
        config: TransportConfig,
        ack_rx: mpsc::UnboundedReceiver<Packet>,
    ) -> Self {
        Self {
            socket,
            peer,
            msg_id,
            config,
            ack_rx,
        }
    }

    /// Reliably transfer `payload`, blocking until it is delivered or
    /// finally abandoned. Only genuine socket I/O failures are errors.
    pub async fn send_message(mut self, payload: &[u8]) -> io::Result<SendOutcome> {
        let base_seq = rand::thread_rng().gen_range(1000..=9999);
        let mut window = SendWindow::new(
            payload,
            base_seq,
            self.config.window_size,
            self.config.chunk_size,
        );

        // Phase 1: handshake.
        if !self.negotiate(Packet::start(base_seq), base_seq + 1).await? {
            log::warn!(
                "[sender] msg {}: start to {} never acknowledged, abandoning",
                self.msg_id,
                self.peer
            );
            return Ok(SendOutcome::Abandoned);
        }

        // Phase 2: sliding window over the data packets.
        while !window.is_complete() {
            while let Some(pkt) = window.next_to_send(Instant::now()) {
                log::debug!(
                    "[sender] msg {}: → data seq={} len={} in_flight={}",
                    self.msg_id,
                    pkt.seq,
                    pkt.data.len(),
                    window.in_flight()
                );
                self.transmit(&pkt).await?;
            }

            match timeout(self.config.timeout, self.ack_rx.recv()).await {
                Ok(Some(ack)) => {
                    // Corrupt or non-ACK packets are ignored outright; the
                    // per-packet timestamps keep the retransmit clock honest.
                    if ack.is_checksum_valid() && ack.kind == PacketKind::Ack {
                        let retired = window.on_ack(ack.seq);
                        if retired > 0 {
                            log::debug!(
                                "[sender] msg {}: ← ack {} retired {} packet(s)",
                                self.msg_id,
                                ack.seq,
                                retired
                            );
                        }
                    }
                }
                // The multiplexer dropped our ACK route; nothing more can
                // ever arrive.
                Ok(None) => return Ok(SendOutcome::Abandoned),
                Err(_elapsed) => {
                    let due = window.due_for_retransmit(Instant::now(), self.config.timeout);
                    if !due.is_empty() {
                        log::debug!(
                            "[sender] msg {}: timeout, retransmitting {} packet(s)",
                            self.msg_id,
                            due.len()
                        );
                    }
                    for pkt in due {
                        self.transmit(&pkt).await?;
                    }
                }
            }
        }

        // Phase 3: teardown.
        let end_seq = window.end_seq();
        if !self.negotiate(Packet::end(end_seq), end_seq + 1).await? {
            log::warn!(
                "[sender] msg {}: end to {} never acknowledged, abandoning",
                self.msg_id,
                self.peer
            );
            return Ok(SendOutcome::Abandoned);
        }

        log::debug!("[sender] msg {}: delivered to {}", self.msg_id, self.peer);
        Ok(SendOutcome::Delivered)
    }

    /// Control-phase reliability shared by handshake and teardown: emit
    /// `pkt` up to `max_retransmissions` times, each time waiting out one
    /// timeout window for an ACK carrying exactly `want_ack`.
    ///
    /// A stray ACK with the wrong sequence does not consume the attempt;
    /// the wait resumes for the remainder of the window.
    async fn negotiate(&mut self, pkt: Packet, want_ack: u32) -> io::Result<bool> {
        for attempt in 1..=self.config.max_retransmissions {
            log::debug!(
                "[sender] msg {}: → {} seq={} (attempt {attempt})",
                self.msg_id,
                pkt.kind,
                pkt.seq
            );
            self.transmit(&pkt).await?;

            let deadline = Instant::now() + self.config.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match timeout(remaining, self.ack_rx.recv()).await {
                    Ok(Some(ack))
                        if ack.is_checksum_valid()
                            && ack.kind == PacketKind::Ack
                            && ack.seq == want_ack =>
                    {
                        return Ok(true);
                    }
                    Ok(Some(_)) => continue,
                    Ok(None) => return Ok(false),
                    Err(_elapsed) => break,
                }
            }
        }
        Ok(false)
    }

    async fn transmit(&self, pkt: &Packet) -> io::Result<()> {
        let frame = envelope::encode(Role::Sender, self.msg_id, pkt);
        self.socket.send_to(&frame, self.peer).await.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
