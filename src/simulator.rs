//! Fault-injecting network simulator for deterministic testing.
//!
//! Real networks drop, reorder, duplicate and corrupt packets. To exercise
//! the reliability mechanisms without depending on actual network
//! conditions, [`Simulator`] plays man-in-the-middle between two endpoints:
//! one endpoint is named up front, the other is whichever peer first speaks
//! to the relay, and every datagram shuttled between them passes through a
//! configurable fault model:
//!
//! | Fault       | Description                                             |
//! |-------------|---------------------------------------------------------|
//! | Loss        | Drop a datagram with probability `loss_rate`.           |
//! | Duplication | Deliver a datagram twice.                               |
//! | Reordering  | Hold a datagram back until the next one has passed.     |
//! | Corruption  | Flip one bit somewhere in the datagram.                 |
//!
//! All probabilities come from a seeded RNG so failing runs reproduce. The
//! relay also enforces the wire-size cap: datagrams larger than
//! [`MAX_DATAGRAM`] never cross the simulated network.
//!
//! Only tests use this module; production endpoints talk directly to each
//! other.

use std::io;
use std::net::SocketAddr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::envelope::MAX_DATAGRAM;

/// Configuration for the fault-injection model.
///
/// All rates are probabilities in `[0.0, 1.0]`. The default is a
/// transparent pass-through.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram is held back and overtaken by the next.
    pub reorder_rate: f64,
    /// Probability that one bit of the datagram is flipped.
    pub corrupt_rate: f64,
    /// RNG seed; the same seed replays the same fault schedule.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            corrupt_rate: 0.0,
            seed: 0,
        }
    }
}

/// A running man-in-the-middle relay.
///
/// Endpoints that should suffer the fault model address the relay's
/// [`local_addr`] instead of each other.
///
/// [`local_addr`]: Simulator::local_addr
pub struct Simulator {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Simulator {
    /// Bind an ephemeral loopback port and start relaying towards
    /// `upstream`. The opposite endpoint is learned from the first datagram
    /// that does not originate at `upstream`.
    pub async fn spawn(upstream: SocketAddr, config: SimulatorConfig) -> io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap()).await?;
        let local_addr = socket.local_addr()?;
        let task = tokio::spawn(relay_loop(socket, upstream, config));
        log::debug!("[relay] listening on {local_addr}, upstream {upstream}");
        Ok(Self { local_addr, task })
    }

    /// Address endpoints should send to in place of the real peer.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn relay_loop(socket: UdpSocket, upstream: SocketAddr, config: SimulatorConfig) {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut downstream: Option<SocketAddr> = None;
    let mut held: Option<(Vec<u8>, SocketAddr)> = None;
    let mut buf = vec![0u8; 4096];

    loop {
        let (n, src) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[relay] recv error: {e}");
                continue;
            }
        };

        let dest = if src == upstream {
            match downstream {
                Some(d) => d,
                // Upstream spoke before any downstream peer exists.
                None => continue,
            }
        } else {
            downstream = Some(src);
            upstream
        };

        if n > MAX_DATAGRAM {
            log::warn!("[relay] dropping {n}-byte datagram (exceeds wire cap)");
            continue;
        }
        let mut frame = buf[..n].to_vec();

        if rng.gen_bool(config.loss_rate) {
            log::debug!("[relay] dropped {n} bytes {src} → {dest}");
            continue;
        }

        if !frame.is_empty() && rng.gen_bool(config.corrupt_rate) {
            let idx = rng.gen_range(0..frame.len());
            let bit = rng.gen_range(0..8u8);
            frame[idx] ^= 1 << bit;
            log::debug!("[relay] corrupted byte {idx} of {n} {src} → {dest}");
        }

        if held.is_none() && rng.gen_bool(config.reorder_rate) {
            log::debug!("[relay] holding {n} bytes {src} → {dest} for reorder");
            held = Some((frame, dest));
            continue;
        }

        let _ = socket.send_to(&frame, dest).await;
        if rng.gen_bool(config.duplicate_rate) {
            log::debug!("[relay] duplicated {n} bytes {src} → {dest}");
            let _ = socket.send_to(&frame, dest).await;
        }

        // Release any datagram the reordering fault held back.
        if let Some((late, late_dest)) = held.take() {
            let _ = socket.send_to(&late, late_dest).await;
        }
    }
}
