//! Tunable transport parameters.
//!
//! The protocol reads all of its knobs from one [`TransportConfig`] record
//! passed at socket construction, so two endpoints in the same process (or
//! the same test) can run with different settings.

use std::time::Duration;

/// Configuration shared by every sender and receiver hanging off one
/// [`crate::socket::ReliableSocket`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Payload bytes carried by one data packet.
    ///
    /// Must be small enough that a fully encoded data packet plus its
    /// envelope stays within [`crate::envelope::MAX_DATAGRAM`].
    pub chunk_size: usize,
    /// How long a sender waits for an ACK before retransmitting, and how
    /// old an in-flight packet must be to qualify for retransmission.
    pub timeout: Duration,
    /// Attempts for the start/end handshakes before a message is abandoned.
    pub max_retransmissions: u32,
    /// Maximum number of in-flight data packets per message.
    pub window_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1400,
            timeout: Duration::from_millis(500),
            max_retransmissions: 3,
            window_size: 3,
        }
    }
}

impl TransportConfig {
    /// Default configuration with the given window size (the one knob the
    /// CLI exposes).
    pub fn with_window(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    /// How long completed sender/receiver state is retained to absorb late
    /// ACKs and retransmitted end packets before it is reaped.
    pub fn reap_grace(&self) -> Duration {
        self.timeout * self.max_retransmissions
    }
}
