//! Reliable, message-oriented socket.
//!
//! [`ReliableSocket`] owns one UDP socket and multiplexes any number of
//! concurrent message transfers over it:
//!
//! ```text
//!  sendto(addr, msg) ──▶ MessageSender ──▶ s:<id>:… datagrams ──▶ peer
//!                              ▲
//!                              │ ack route (mpsc)
//!  ┌───────────────────────────┴───────────────────────────────┐
//!  │ demux loop: r:<id>:… → senders[(peer, id)]                │
//!  │            s:<id>:… → receivers[(peer, id)] → ACK replies │
//!  └───────────────────────────┬───────────────────────────────┘
//!                              │ completed payloads
//!  recv() ◀── shared inbound channel ◀─────────────────────────┘
//! ```
//!
//! Routing key is `(peer address, message id)`. Datagrams tagged `r` are
//! ACKs for one of our senders; datagrams tagged `s` belong to a receiver,
//! constructed on first contact. Completed sender and receiver state is
//! retained for a grace period so late ACKs and retransmitted end packets
//! land somewhere, then reaped.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::TransportConfig;
use crate::envelope::{self, Role};
use crate::packet::Packet;
use crate::receiver::{MessageReceiver, ReceiverEvent};
use crate::sender::{MessageSender, SendOutcome};

/// One logical message transfer: who it is with and which id it carries.
type EndpointKey = (SocketAddr, u32);

/// ACK routes to in-flight (and recently finished) senders.
type AckRoutes = Arc<Mutex<HashMap<EndpointKey, mpsc::UnboundedSender<Packet>>>>;

// ---------------------------------------------------------------------------
// ReliableSocket
// ---------------------------------------------------------------------------

/// A socket that transports whole messages reliably and in order.
pub struct ReliableSocket {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    config: TransportConfig,
    senders: AckRoutes,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<(String, SocketAddr)>>,
    demux_task: JoinHandle<()>,
}

impl ReliableSocket {
    /// Bind to `addr` and start the background demultiplexing loop.
    ///
    /// Passing port 0 lets the OS choose an ephemeral port.
    pub async fn bind(addr: SocketAddr, config: TransportConfig) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        let senders: AckRoutes = Arc::new(Mutex::new(HashMap::new()));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let demux_task = tokio::spawn(demux_loop(
            Arc::clone(&socket),
            Arc::clone(&senders),
            inbound_tx,
            config.clone(),
        ));

        log::debug!("[sock] bound {local_addr}");
        Ok(Self {
            socket,
            local_addr,
            config,
            senders,
            inbound: tokio::sync::Mutex::new(inbound_rx),
            demux_task,
        })
    }

    /// Address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Reliably send `message` to `dest`.
    ///
    /// Blocks the caller for the whole transfer. An abandoned transfer (the
    /// peer never answered the handshake) is not an error here — it is
    /// logged, and the peer simply never delivers the message.
    pub async fn sendto(&self, dest: SocketAddr, message: &str) -> io::Result<()> {
        let (msg_id, ack_rx) = self.register_sender(dest);
        log::debug!(
            "[sock] msg {msg_id}: sending {} bytes to {dest}",
            message.len()
        );

        let sender = MessageSender::new(
            Arc::clone(&self.socket),
            dest,
            msg_id,
            self.config.clone(),
            ack_rx,
        );
        let outcome = sender.send_message(message.as_bytes()).await?;
        if outcome == SendOutcome::Abandoned {
            log::warn!("[sock] msg {msg_id}: abandoned after retry budget");
        }

        // Keep the ACK route alive to absorb late ACKs, then reap it.
        let senders = Arc::clone(&self.senders);
        let grace = self.config.reap_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            senders.lock().unwrap().remove(&(dest, msg_id));
        });
        Ok(())
    }

    /// Receive the next completed message and the address it came from.
    ///
    /// Blocks until one is available. Returns `None` only if the demux loop
    /// has shut down, which cannot happen while the socket is alive.
    pub async fn recv(&self) -> Option<(String, SocketAddr)> {
        self.inbound.lock().await.recv().await
    }

    /// Pick a message id that is unique among this socket's outstanding
    /// transfers to `dest` and install its ACK route.
    fn register_sender(&self, dest: SocketAddr) -> (u32, mpsc::UnboundedReceiver<Packet>) {
        let mut routes = self.senders.lock().unwrap();
        let mut rng = rand::thread_rng();
        let mut msg_id = rng.gen_range(50_000..=99_999);
        while routes.contains_key(&(dest, msg_id)) {
            msg_id = rng.gen_range(50_000..=99_999);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        routes.insert((dest, msg_id), tx);
        (msg_id, rx)
    }
}

impl Drop for ReliableSocket {
    fn drop(&mut self) {
        self.demux_task.abort();
    }
}

// ---------------------------------------------------------------------------
// Demultiplexing loop
// ---------------------------------------------------------------------------

/// Receiver state plus the moment it finished, for grace-period reaping.
struct ReceiverSlot {
    state: MessageReceiver,
    completed_at: Option<Instant>,
}

async fn demux_loop(
    socket: Arc<UdpSocket>,
    senders: AckRoutes,
    inbound: mpsc::UnboundedSender<(String, SocketAddr)>,
    config: TransportConfig,
) {
    // Exclusively owned by this task; no lock needed.
    let mut receivers: HashMap<EndpointKey, ReceiverSlot> = HashMap::new();
    let mut buf = vec![0u8; 4096];

    loop {
        let (n, peer) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[sock] recv error: {e}");
                continue;
            }
        };

        reap_completed(&mut receivers, config.reap_grace());

        let (role, msg_id, body) = match envelope::parse(&buf[..n]) {
            Ok(v) => v,
            Err(e) => {
                log::debug!("[sock] dropping datagram from {peer}: {e}");
                continue;
            }
        };
        let packet = match Packet::decode(body) {
            Ok(p) => p,
            Err(e) => {
                log::debug!("[sock] msg {msg_id}: dropping packet from {peer}: {e}");
                continue;
            }
        };

        match role {
            // The peer's receiver is ACKing one of our senders.
            Role::Receiver => {
                let route = senders.lock().unwrap().get(&(peer, msg_id)).cloned();
                match route {
                    // The sender validates; a closed route just means it
                    // finished and the reaper has not fired yet.
                    Some(tx) => {
                        let _ = tx.send(packet);
                    }
                    None => log::warn!("[sock] msg {msg_id}: no sender for ACK from {peer}"),
                }
            }
            // The peer is transmitting to us.
            Role::Sender => {
                let slot = receivers.entry((peer, msg_id)).or_insert_with(|| {
                    log::debug!("[sock] msg {msg_id}: new receiver for {peer}");
                    ReceiverSlot {
                        state: MessageReceiver::new(),
                        completed_at: None,
                    }
                });
                match slot.state.on_packet(&packet) {
                    ReceiverEvent::Ignore => {}
                    ReceiverEvent::Reply(ack) => {
                        // A reply means the transfer is live again (e.g. the
                        // id was reused for a new message after completion).
                        slot.completed_at = None;
                        send_ack(&socket, msg_id, &ack, peer).await;
                    }
                    ReceiverEvent::Complete { ack, payload } => {
                        send_ack(&socket, msg_id, &ack, peer).await;
                        slot.completed_at = Some(Instant::now());
                        log::debug!(
                            "[sock] msg {msg_id}: completed {} bytes from {peer}",
                            payload.len()
                        );
                        match String::from_utf8(payload) {
                            Ok(message) => {
                                let _ = inbound.send((message, peer));
                            }
                            Err(_) => {
                                log::warn!("[sock] msg {msg_id}: payload is not UTF-8, dropped")
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn send_ack(socket: &UdpSocket, msg_id: u32, ack: &Packet, dest: SocketAddr) {
    let frame = envelope::encode(Role::Receiver, msg_id, ack);
    if let Err(e) = socket.send_to(&frame, dest).await {
        log::warn!("[sock] msg {msg_id}: failed to send ACK to {dest}: {e}");
    }
}

/// Drop receiver state whose completion is older than the grace period.
fn reap_completed(receivers: &mut HashMap<EndpointKey, ReceiverSlot>, grace: Duration) {
    receivers.retain(|key, slot| match slot.completed_at {
        Some(done) if done.elapsed() > grace => {
            log::debug!("[sock] msg {}: reaping completed receiver for {}", key.1, key.0);
            false
        }
        _ => true,
    });
}
