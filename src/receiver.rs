//! Receive-side state machine for one reliable message.
//!
//! [`MessageReceiver`] reassembles the chunks of a single message and
//! decides which cumulative ACK to return for every packet it is shown:
//!
//! - Out-of-order data is buffered; the ACK always names
//!   `highest_contiguous + 1`, never anything beyond it.
//! - Duplicates are deduplicated by sequence and answered with the same
//!   ACK they got the first time.
//! - Packets with a bad checksum, and data/end packets arriving before any
//!   start, produce no ACK at all — the sender's retransmit timer recovers.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility. The multiplexer feeds packets in via [`on_packet`] and
//! acts on the returned [`ReceiverEvent`].
//!
//! [`on_packet`]: MessageReceiver::on_packet

use std::collections::BTreeMap;

use crate::packet::{Packet, PacketKind};

/// What the caller must do after handing the receiver one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// Drop the packet on the floor; send nothing.
    Ignore,
    /// Send this ACK back to the message sender.
    Reply(Packet),
    /// Send the ACK and deliver the completed payload to the application.
    Complete { ack: Packet, payload: Vec<u8> },
}

/// Reassembly state for one inbound message.
#[derive(Debug, Default)]
pub struct MessageReceiver {
    /// Gate: data/end packets arriving before a start are dropped silently.
    started: bool,
    /// Sequence of the start packet; reassembly origin.
    start_seq: u32,
    /// Largest sequence `s` such that every sequence in `(start_seq, s]`
    /// has been received.
    highest_contiguous: u32,
    /// Received chunks keyed by sequence; iteration order is ascending,
    /// which is exactly the reassembly order.
    chunks: BTreeMap<u32, Vec<u8>>,
}

impl MessageReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one packet. Synchronous and non-blocking.
    pub fn on_packet(&mut self, pkt: &Packet) -> ReceiverEvent {
        if !pkt.is_checksum_valid() {
            return ReceiverEvent::Ignore;
        }
        match pkt.kind {
            PacketKind::Start => self.on_start(pkt.seq),
            PacketKind::Data if self.started => self.on_data(pkt),
            PacketKind::End if self.started => self.on_end(pkt.seq),
            // Pre-start data/end, post-end stragglers, and ACKs (which
            // never belong on this side) all fall through here.
            _ => ReceiverEvent::Ignore,
        }
    }

    fn on_start(&mut self, seq: u32) -> ReceiverEvent {
        if self.started && seq == self.start_seq {
            // Retransmitted start for the live transmission: the first ACK
            // was lost. Re-ACK without discarding what already arrived.
            return ReceiverEvent::Reply(Packet::ack(self.highest_contiguous + 1));
        }
        self.started = true;
        self.start_seq = seq;
        self.highest_contiguous = seq;
        self.chunks.clear();
        ReceiverEvent::Reply(Packet::ack(seq + 1))
    }

    fn on_data(&mut self, pkt: &Packet) -> ReceiverEvent {
        self.chunks
            .entry(pkt.seq)
            .or_insert_with(|| pkt.data.clone());
        while self.chunks.contains_key(&(self.highest_contiguous + 1)) {
            self.highest_contiguous += 1;
        }
        ReceiverEvent::Reply(Packet::ack(self.highest_contiguous + 1))
    }

    fn on_end(&mut self, seq: u32) -> ReceiverEvent {
        let payload = self
            .chunks
            .values()
            .flat_map(|chunk| chunk.iter().copied())
            .collect();
        self.started = false;
        ReceiverEvent::Complete {
            ack: Packet::ack(seq + 1),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: unwrap a `Reply` event into its ACK sequence.
    fn ack_seq(event: ReceiverEvent) -> u32 {
        match event {
            ReceiverEvent::Reply(ack) => {
                assert_eq!(ack.kind, PacketKind::Ack);
                ack.seq
            }
            other => panic!("expected Reply, got {other:?}"),
        }
    }

    #[test]
    fn start_is_acked_with_seq_plus_one() {
        let mut r = MessageReceiver::new();
        assert_eq!(ack_seq(r.on_packet(&Packet::start(5000))), 5001);
    }

    #[test]
    fn data_before_start_is_dropped_silently() {
        let mut r = MessageReceiver::new();
        assert_eq!(
            r.on_packet(&Packet::data(5001, b"early".to_vec())),
            ReceiverEvent::Ignore
        );
        assert_eq!(r.on_packet(&Packet::end(5002)), ReceiverEvent::Ignore);
    }

    #[test]
    fn in_order_data_advances_cumulative_ack() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(100));
        assert_eq!(ack_seq(r.on_packet(&Packet::data(101, b"a".to_vec()))), 102);
        assert_eq!(ack_seq(r.on_packet(&Packet::data(102, b"b".to_vec()))), 103);
    }

    #[test]
    fn out_of_order_data_is_buffered_not_acked_ahead() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(100));
        // 103 and 102 arrive before 101: the cumulative ACK must stay put.
        assert_eq!(ack_seq(r.on_packet(&Packet::data(103, b"c".to_vec()))), 101);
        assert_eq!(ack_seq(r.on_packet(&Packet::data(102, b"b".to_vec()))), 101);
        // The gap closes and the ACK jumps over the buffered packets.
        assert_eq!(ack_seq(r.on_packet(&Packet::data(101, b"a".to_vec()))), 104);
    }

    #[test]
    fn duplicate_data_is_idempotent() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(100));
        let first = r.on_packet(&Packet::data(101, b"a".to_vec()));
        let second = r.on_packet(&Packet::data(101, b"a".to_vec()));
        assert_eq!(first, second);

        // The first copy wins even if a duplicate claims different bytes.
        r.on_packet(&Packet::data(102, b"real".to_vec()));
        r.on_packet(&Packet::data(102, b"fake".to_vec()));
        match r.on_packet(&Packet::end(103)) {
            ReceiverEvent::Complete { payload, .. } => assert_eq!(payload, b"areal"),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn end_assembles_chunks_in_sequence_order() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(200));
        for (seq, chunk) in [(203, "rld"), (201, "hello "), (202, "wo")] {
            r.on_packet(&Packet::data(seq, chunk.as_bytes().to_vec()));
        }
        match r.on_packet(&Packet::end(204)) {
            ReceiverEvent::Complete { ack, payload } => {
                assert_eq!(ack.seq, 205);
                assert_eq!(payload, b"hello world");
            }
            other => panic!("expected Complete, got {other:?}"),
        }
        // Stragglers after the end are ignored until a fresh start.
        assert_eq!(
            r.on_packet(&Packet::data(203, b"x".to_vec())),
            ReceiverEvent::Ignore
        );
    }

    #[test]
    fn empty_transmission_delivers_empty_payload() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(300));
        match r.on_packet(&Packet::end(301)) {
            ReceiverEvent::Complete { ack, payload } => {
                assert_eq!(ack.seq, 302);
                assert!(payload.is_empty());
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_start_does_not_reset_reassembly() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(400));
        r.on_packet(&Packet::data(401, b"kept".to_vec()));

        // The same start again (lost ACK): current cumulative ACK, state intact.
        assert_eq!(ack_seq(r.on_packet(&Packet::start(400))), 402);
        match r.on_packet(&Packet::end(402)) {
            ReceiverEvent::Complete { payload, .. } => assert_eq!(payload, b"kept"),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn start_with_new_sequence_begins_fresh_message() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(400));
        r.on_packet(&Packet::data(401, b"old".to_vec()));

        assert_eq!(ack_seq(r.on_packet(&Packet::start(500))), 501);
        r.on_packet(&Packet::data(501, b"new".to_vec()));
        match r.on_packet(&Packet::end(502)) {
            ReceiverEvent::Complete { payload, .. } => assert_eq!(payload, b"new"),
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn corrupt_packets_get_no_ack() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(100));
        let mut bad = Packet::data(101, b"tampered".to_vec());
        bad.checksum = bad.checksum.wrapping_add(1);
        assert_eq!(r.on_packet(&bad), ReceiverEvent::Ignore);
        // And nothing was stored for that sequence.
        assert_eq!(ack_seq(r.on_packet(&Packet::data(102, b"b".to_vec()))), 101);
    }

    #[test]
    fn acks_never_exceed_highest_contiguous_plus_one() {
        let mut r = MessageReceiver::new();
        r.on_packet(&Packet::start(1000));
        let mut highest = 1000;
        // Feed data in a scrambled order and check the bound throughout.
        for seq in [1004, 1001, 1006, 1002, 1003, 1005] {
            let ack = ack_seq(r.on_packet(&Packet::data(seq, b"x".to_vec())));
            while r.chunks.contains_key(&(highest + 1)) {
                highest += 1;
            }
            assert!(ack <= highest + 1);
        }
    }
}
