//! Wire-format definitions for transport packets.
//!
//! Every datagram body exchanged between a message sender and a message
//! receiver is one [`Packet`]. Packets are ASCII-framed, `|`-delimited text:
//!
//! | Kind          | Wire form                        |
//! |---------------|----------------------------------|
//! | `ack`         | `ack\|<seq>\|<checksum>`         |
//! | `start`/`end` | `<kind>\|<seq>\|\|<checksum>`    |
//! | `data`        | `data\|<seq>\|<bytes>\|<checksum>` |
//!
//! The checksum is a CRC-32 over the body up to and including the final `|`
//! before the checksum digits — for every kind, ACKs included, so encoding
//! and validation derive the hashed region from the same function and cannot
//! disagree.
//!
//! Decoding and validation are separate steps: [`Packet::decode`] succeeds
//! whenever the fields are structurally well formed (known kind, numeric seq
//! and checksum), while [`Packet::is_checksum_valid`] answers whether the
//! carried checksum matches the body. Consumers drop packets that fail
//! either test.
//!
//! No I/O happens here — this is pure data transformation.

use crc::Crc;
use std::fmt;
use thiserror::Error;

/// CRC-32 over the packet body.
fn crc32(body: &[u8]) -> u32 {
    let hasher = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);
    hasher.checksum(body)
}

// ---------------------------------------------------------------------------
// PacketKind
// ---------------------------------------------------------------------------

/// The four packet kinds of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Opens a transmission; carries the base sequence number.
    Start,
    /// One chunk of the message payload.
    Data,
    /// Cumulative acknowledgement from the receiver.
    Ack,
    /// Closes a transmission; sequence is one past the last data packet.
    End,
}

impl PacketKind {
    fn as_str(self) -> &'static str {
        match self {
            PacketKind::Start => "start",
            PacketKind::Data => "data",
            PacketKind::Ack => "ack",
            PacketKind::End => "end",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a raw packet body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer than three `|`-delimited fields.
    #[error("packet has fewer fields than the shortest legal form")]
    MissingFields,
    /// The kind token is not one of `start`, `data`, `ack`, `end`.
    #[error("unknown packet kind `{0}`")]
    UnknownKind(String),
    /// The sequence field is not a decimal integer.
    #[error("sequence field is not a decimal integer")]
    BadSeq,
    /// The checksum field is not a decimal integer.
    #[error("checksum field is not a decimal integer")]
    BadChecksum,
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A decoded (or about-to-be-encoded) transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub seq: u32,
    /// Chunk bytes; empty for `start`, `ack` and `end`.
    pub data: Vec<u8>,
    /// Checksum as carried on the wire. Matches the body for packets built
    /// by the constructors below; may not for packets received off the wire.
    pub checksum: u32,
}

/// The hashed region: everything up to and including the final `|`.
fn body_bytes(kind: PacketKind, seq: u32, data: &[u8]) -> Vec<u8> {
    let mut body = match kind {
        PacketKind::Ack => format!("ack|{seq}|").into_bytes(),
        _ => format!("{kind}|{seq}|").into_bytes(),
    };
    if kind != PacketKind::Ack {
        body.extend_from_slice(data);
        body.push(b'|');
    }
    body
}

impl Packet {
    fn build(kind: PacketKind, seq: u32, data: Vec<u8>) -> Self {
        let checksum = crc32(&body_bytes(kind, seq, &data));
        Self {
            kind,
            seq,
            data,
            checksum,
        }
    }

    /// A `start` packet carrying the base sequence number.
    pub fn start(seq: u32) -> Self {
        Self::build(PacketKind::Start, seq, Vec::new())
    }

    /// A `data` packet carrying one chunk.
    pub fn data(seq: u32, chunk: Vec<u8>) -> Self {
        Self::build(PacketKind::Data, seq, chunk)
    }

    /// A cumulative `ack`.
    pub fn ack(seq: u32) -> Self {
        Self::build(PacketKind::Ack, seq, Vec::new())
    }

    /// An `end` packet closing the transmission.
    pub fn end(seq: u32) -> Self {
        Self::build(PacketKind::End, seq, Vec::new())
    }

    /// Serialise this packet into a newly allocated byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut raw = body_bytes(self.kind, self.seq, &self.data);
        raw.extend_from_slice(self.checksum.to_string().as_bytes());
        raw
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// The data field may itself contain `|`: the first two fields and the
    /// last field are fixed, whatever lies between is the data.
    pub fn decode(raw: &[u8]) -> Result<Self, PacketError> {
        let first = raw
            .iter()
            .position(|&b| b == b'|')
            .ok_or(PacketError::MissingFields)?;
        let second = raw[first + 1..]
            .iter()
            .position(|&b| b == b'|')
            .map(|i| first + 1 + i)
            .ok_or(PacketError::MissingFields)?;
        // At least two delimiters exist, so rposition cannot fail.
        let last = raw.iter().rposition(|&b| b == b'|').unwrap();

        let kind = match &raw[..first] {
            b"start" => PacketKind::Start,
            b"data" => PacketKind::Data,
            b"ack" => PacketKind::Ack,
            b"end" => PacketKind::End,
            other => {
                return Err(PacketError::UnknownKind(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };

        let seq = std::str::from_utf8(&raw[first + 1..second])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or(PacketError::BadSeq)?;

        let checksum = std::str::from_utf8(&raw[last + 1..])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or(PacketError::BadChecksum)?;

        let data = if last > second {
            raw[second + 1..last].to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            kind,
            seq,
            data,
            checksum,
        })
    }

    /// Recompute the body hash and compare it with the carried checksum.
    pub fn is_checksum_valid(&self) -> bool {
        crc32(&body_bytes(self.kind, self.seq, &self.data)) == self.checksum
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
