//! Integration tests for the reliable message transport.
//!
//! Each test binds two in-process reliable sockets on the loopback
//! interface. The adversarial tests route one direction of the exchange
//! through the fault-injecting [`Simulator`] and assert that the delivered
//! payload is byte-identical regardless of what the network did.

use std::net::SocketAddr;
use std::time::Duration;

use chat_over_udp::simulator::{Simulator, SimulatorConfig};
use chat_over_udp::{ReliableSocket, TransportConfig};

/// Small chunks exercise the window even on modest payloads; short timeouts
/// and a generous retry budget keep the adversarial tests fast and stable.
fn test_config() -> TransportConfig {
    TransportConfig {
        chunk_size: 64,
        timeout: Duration::from_millis(100),
        max_retransmissions: 10,
        window_size: 3,
    }
}

async fn ephemeral() -> ReliableSocket {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    ReliableSocket::bind(addr, test_config())
        .await
        .expect("bind failed")
}

/// Deterministic printable payload of the given length.
fn payload(len: usize) -> String {
    (0..len)
        .map(|i| char::from(b'a' + (i * 7 % 26) as u8))
        .collect()
}

// ---------------------------------------------------------------------------
// Test 1: clean path, both directions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_clean_roundtrip() {
    let a = ephemeral().await;
    let b = ephemeral().await;

    a.sendto(b.local_addr(), "hello over udp").await.unwrap();
    let (msg, from) = b.recv().await.unwrap();
    assert_eq!(msg, "hello over udp");
    assert_eq!(from, a.local_addr());

    b.sendto(a.local_addr(), "right back at you").await.unwrap();
    let (msg, from) = a.recv().await.unwrap();
    assert_eq!(msg, "right back at you");
    assert_eq!(from, b.local_addr());
}

// ---------------------------------------------------------------------------
// Test 2: boundary payload sizes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_message() {
    let a = ephemeral().await;
    let b = ephemeral().await;

    a.sendto(b.local_addr(), "").await.unwrap();
    let (msg, from) = b.recv().await.unwrap();
    assert_eq!(msg, "");
    assert_eq!(from, a.local_addr());
}

#[tokio::test]
async fn test_exact_chunk_boundary_sizes() {
    let chunk = test_config().chunk_size;
    let a = ephemeral().await;
    let b = ephemeral().await;

    // Exactly one chunk, and k chunks plus one trailing byte.
    for len in [chunk, 4 * chunk + 1] {
        let msg = payload(len);
        a.sendto(b.local_addr(), &msg).await.unwrap();
        let (got, _) = b.recv().await.unwrap();
        assert_eq!(got, msg, "payload of {len} bytes corrupted");
    }
}

#[tokio::test]
async fn test_large_payload() {
    let a = ephemeral().await;
    let b = ephemeral().await;

    let msg = payload(10_000);
    a.sendto(b.local_addr(), &msg).await.unwrap();
    let (got, _) = b.recv().await.unwrap();
    assert_eq!(got, msg);
}

// ---------------------------------------------------------------------------
// Test 3: concurrent messages between the same pair
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrent_sends_all_delivered() {
    let a = ephemeral().await;
    let b = ephemeral().await;

    let first = payload(500);
    let second = payload(731);
    let (r1, r2) = tokio::join!(
        a.sendto(b.local_addr(), &first),
        a.sendto(b.local_addr(), &second),
    );
    r1.unwrap();
    r2.unwrap();

    // No ordering guarantee across messages; collect both.
    let mut got = vec![b.recv().await.unwrap().0, b.recv().await.unwrap().0];
    got.sort_by_key(|m| m.len());
    assert_eq!(got, vec![first, second]);
}

// ---------------------------------------------------------------------------
// Test 4: adversarial networks
// ---------------------------------------------------------------------------

/// Send `msg` through a relay with the given fault model and assert the
/// receiver delivers it intact.
async fn assert_survives(faults: SimulatorConfig, msg: &str) {
    let a = ephemeral().await;
    let b = ephemeral().await;
    let relay = Simulator::spawn(b.local_addr(), faults).await.unwrap();

    a.sendto(relay.local_addr(), msg).await.unwrap();
    let (got, _) = b.recv().await.unwrap();
    assert_eq!(got, msg);

    // Exactly one application-visible message, no matter how many
    // duplicates the network manufactured.
    let extra = tokio::time::timeout(Duration::from_millis(300), b.recv()).await;
    assert!(extra.is_err(), "spurious duplicate delivery: {extra:?}");
}

#[tokio::test]
async fn test_packet_loss() {
    let faults = SimulatorConfig {
        loss_rate: 0.2,
        seed: 7,
        ..Default::default()
    };
    assert_survives(faults, &payload(2_000)).await;
}

#[tokio::test]
async fn test_duplicate_packets() {
    let faults = SimulatorConfig {
        duplicate_rate: 0.2,
        seed: 11,
        ..Default::default()
    };
    assert_survives(faults, &payload(2_000)).await;
}

#[tokio::test]
async fn test_out_of_order_delivery() {
    let faults = SimulatorConfig {
        reorder_rate: 0.3,
        seed: 13,
        ..Default::default()
    };
    assert_survives(faults, &payload(2_000)).await;
}

#[tokio::test]
async fn test_corrupted_packets() {
    let faults = SimulatorConfig {
        corrupt_rate: 0.1,
        seed: 17,
        ..Default::default()
    };
    assert_survives(faults, &payload(2_000)).await;
}

#[tokio::test]
async fn test_combined_faults() {
    let faults = SimulatorConfig {
        loss_rate: 0.1,
        duplicate_rate: 0.1,
        reorder_rate: 0.1,
        corrupt_rate: 0.05,
        seed: 19,
    };
    assert_survives(faults, &payload(1_000)).await;
}
