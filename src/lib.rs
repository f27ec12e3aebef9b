//! `chat-over-udp` — a reliable, in-order, message-oriented transport built
//! on UDP, and the small chat application that exercises it.
//!
//! # Architecture
//!
//! ```text
//!  Application (chat client / server)
//!      │  sendto(addr, msg)  /  recv() → (msg, addr)
//!      ▼
//!  ┌───────────────────────────────────────────────┐
//!  │              ReliableSocket                   │
//!  │  demux by (peer, msg id)                      │
//!  │   ├── MessageSender   (per outbound message)  │
//!  │   └── MessageReceiver (per inbound message)   │
//!  └────┬──────────────────────────────────────────┘
//!       │ s:<id>:… / r:<id>:… datagrams
//!  ┌────▼──────┐
//!  │ UdpSocket │
//!  └───────────┘
//! ```
//!
//! Each message is transferred with a selective-repeat sliding window and
//! cumulative ACKs: a `start` handshake, a window of `data` packets with
//! per-packet retransmit timers, and an `end` teardown. Messages are
//! independent — the transport orders bytes *within* a message, never
//! *across* messages.
//!
//! Each module has a single responsibility:
//! - [`packet`]    — wire format and checksum discipline
//! - [`envelope`]  — `<role>:<msg_id>:` datagram framing
//! - [`config`]    — tunable transport parameters
//! - [`sender`]    — send-side window state machine and driver
//! - [`receiver`]  — receive-side reassembly state machine
//! - [`socket`]    — the multiplexing reliable socket
//! - [`simulator`] — lossy/reordering relay for tests
//! - [`message`]   — chat message grammar
//! - [`server`]    — chat server
//! - [`client`]    — interactive chat client

pub mod client;
pub mod config;
pub mod envelope;
pub mod message;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod simulator;
pub mod socket;

pub use config::TransportConfig;
pub use socket::ReliableSocket;
