//! Datagram framing: `<role>:<msg_id>:<packet>`.
//!
//! Every datagram on the wire carries a two-field prefix naming which
//! in-process endpoint owns it: a role tag (`s` — from the sending side of a
//! message, `r` — from the receiving side) and the message id the datagram
//! belongs to. The multiplexer routes on this pair; the packet body after
//! the second `:` is opaque at this layer.

use crate::packet::Packet;
use thiserror::Error;

/// Hard cap on the size of one datagram, envelope included.
pub const MAX_DATAGRAM: usize = 1500;

/// Which side of a message transfer a datagram originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sent by a message sender (start/data/end packets).
    Sender,
    /// Sent by a message receiver (ACK packets).
    Receiver,
}

impl Role {
    fn tag(self) -> u8 {
        match self {
            Role::Sender => b's',
            Role::Receiver => b'r',
        }
    }
}

/// Errors that can arise when parsing a raw datagram prefix.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("datagram has no `<role>:<msg_id>:` prefix")]
    MissingPrefix,
    #[error("unknown role tag")]
    UnknownRole,
    #[error("message id is not a decimal integer")]
    BadMsgId,
}

/// Frame a packet for the wire.
pub fn encode(role: Role, msg_id: u32, packet: &Packet) -> Vec<u8> {
    let mut raw = Vec::with_capacity(MAX_DATAGRAM);
    raw.push(role.tag());
    raw.push(b':');
    raw.extend_from_slice(msg_id.to_string().as_bytes());
    raw.push(b':');
    raw.extend_from_slice(&packet.encode());
    raw
}

/// Split a datagram into its routing prefix and packet body.
///
/// Only the first two `:` are delimiters — the packet body may contain `:`.
pub fn parse(raw: &[u8]) -> Result<(Role, u32, &[u8]), EnvelopeError> {
    let first = raw
        .iter()
        .position(|&b| b == b':')
        .ok_or(EnvelopeError::MissingPrefix)?;
    let second = raw[first + 1..]
        .iter()
        .position(|&b| b == b':')
        .map(|i| first + 1 + i)
        .ok_or(EnvelopeError::MissingPrefix)?;

    let role = match &raw[..first] {
        b"s" => Role::Sender,
        b"r" => Role::Receiver,
        _ => return Err(EnvelopeError::UnknownRole),
    };

    let msg_id = std::str::from_utf8(&raw[first + 1..second])
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or(EnvelopeError::BadMsgId)?;

    Ok((role, msg_id, &raw[second + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_both_roles() {
        let pkt = Packet::ack(1001);
        for role in [Role::Sender, Role::Receiver] {
            let raw = encode(role, 61234, &pkt);
            let (r, id, body) = parse(&raw).unwrap();
            assert_eq!(r, role);
            assert_eq!(id, 61234);
            assert_eq!(Packet::decode(body).unwrap(), pkt);
        }
    }

    #[test]
    fn body_may_contain_colons() {
        let pkt = Packet::data(2001, b"12:30 meeting".to_vec());
        let raw = encode(Role::Sender, 50000, &pkt);
        let (_, _, body) = parse(&raw).unwrap();
        assert_eq!(Packet::decode(body).unwrap().data, b"12:30 meeting");
    }

    #[test]
    fn malformed_prefixes_rejected() {
        assert_eq!(parse(b""), Err(EnvelopeError::MissingPrefix));
        assert_eq!(parse(b"s:12345"), Err(EnvelopeError::MissingPrefix));
        assert_eq!(parse(b"x:12345:ack|1|2"), Err(EnvelopeError::UnknownRole));
        assert_eq!(parse(b"s:abc:ack|1|2"), Err(EnvelopeError::BadMsgId));
    }

    #[test]
    fn full_size_data_packet_fits_mtu() {
        // Worst case: 5-digit msg id, 4-digit seq, maximal chunk, 10-digit
        // checksum. The default chunk size must keep this under the cap.
        let chunk = vec![b'x'; crate::config::TransportConfig::default().chunk_size];
        let raw = encode(Role::Sender, 99999, &Packet::data(9999, chunk));
        assert!(raw.len() <= MAX_DATAGRAM, "datagram is {} bytes", raw.len());
    }
}
