//! Connection engine tests against an in-process loopback peer.
//!
//! The peer scripts raw frames on a local TCP socket so every byte the engine
//! emits (and consumes) is observable.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use brickbus::{Connection, ConnectionConfig, Error, Packet, PayloadWriter, WILDCARD_UID};

/// Build a raw frame the way the daemon would.
fn frame(uid: u32, function: u8, seq_and_flags: u8, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut f = Vec::with_capacity(8 + payload.len());
    f.extend_from_slice(&uid.to_le_bytes());
    f.push((8 + payload.len()) as u8);
    f.push(function);
    f.push(seq_and_flags);
    f.push(flags);
    f.extend_from_slice(payload);
    f
}

async fn bind() -> (TcpListener, String) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

// ============================================================================
// Connect / close lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_refused() {
    let (listener, addr) = bind().await;
    drop(listener);

    let result = Connection::connect(&addr).await;
    assert!(matches!(result, Err(Error::ConnectFailed { .. })));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let conn = Connection::connect(&addr).await.unwrap();
    conn.close().await.unwrap();
    conn.close().await.unwrap();

    // Submissions after close fail immediately
    let packet = Packet::new(1, 1, false, Vec::new()).unwrap();
    assert!(matches!(conn.send(packet).await, Err(Error::Closed)));
}

// ============================================================================
// S1: fire-and-forget wire image
// ============================================================================

#[tokio::test]
async fn test_fire_and_forget_bytes_on_the_wire() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 14];
        stream.read_exact(&mut buf).await.unwrap();
        buf
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let mut params = PayloadWriter::new();
    params.push_i16(-239);
    params.push_i16(60);
    params.push_i16(-223);
    let packet = Packet::new(3_631_747_890, 32, false, params.finish()).unwrap();

    let reply = conn.send(packet).await.unwrap();
    assert!(reply.is_none(), "fire-and-forget must not produce a reply");

    let observed = peer.await.unwrap();
    assert_eq!(
        observed,
        [
            0xB2, 0x6C, 0x74, 0xD8, // uid little-endian
            0x0E, // length 14
            0x20, // function 32
            0x10, // sequence 1, no response bit
            0x00, // flags
            0x11, 0xFF, 0x3C, 0x00, 0x21, 0xFF, // three i16 little-endian
        ]
    );

    conn.close().await.unwrap();
}

// ============================================================================
// S2: request / reply correlation
// ============================================================================

#[tokio::test]
async fn test_request_reply() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        stream.read_exact(&mut request).await.unwrap();
        assert_eq!(&request[..4], &100u32.to_le_bytes());
        assert_eq!(request[5], 5);
        assert_eq!(request[6] & 0x08, 0x08, "response bit must be set");

        // Echo uid, function and sequence back with a u16 payload
        let reply = frame(100, 5, request[6], 0, &[0x2A, 0x00]);
        stream.write_all(&reply).await.unwrap();
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let request = Packet::new(100, 5, true, Vec::new()).unwrap();
    let reply = conn.send(request).await.unwrap().unwrap();

    assert_eq!(reply.uid(), 100);
    assert_eq!(reply.function(), 5);
    assert!(reply.error().is_none());
    assert_eq!(reply.reader().read_u16().unwrap(), 42);

    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_unmatched_reply_is_ignored() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        stream.read_exact(&mut request).await.unwrap();

        // A stray reply nobody asked for, then the real one
        let stray = frame(55, 9, 0x50 | 0x08, 0, &[0xFF]);
        stream.write_all(&stray).await.unwrap();
        let reply = frame(100, 5, request[6], 0, &[0x01, 0x00]);
        stream.write_all(&reply).await.unwrap();
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let request = Packet::new(100, 5, true, Vec::new()).unwrap();
    let reply = conn.send(request).await.unwrap().unwrap();
    assert_eq!(reply.reader().read_u16().unwrap(), 1);

    conn.close().await.unwrap();
}

// ============================================================================
// S3: timeout
// ============================================================================

#[tokio::test]
async fn test_silent_peer_times_out() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        let _ = stream.read_exact(&mut request).await;
        // Never reply; keep the socket open
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = ConnectionConfig::new(addr).with_response_timeout(Duration::from_millis(50));
    let conn = Connection::connect_with(config).await.unwrap();

    let start = Instant::now();
    let request = Packet::new(7, 7, true, Vec::new()).unwrap();
    let result = conn.send(request).await;
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(elapsed >= Duration::from_millis(40), "returned too early");
    assert!(elapsed < Duration::from_secs(2), "timeout did not fire");

    conn.close().await.unwrap();
}

// ============================================================================
// S4: callback dispatch with wildcard
// ============================================================================

#[tokio::test]
async fn test_callback_dispatch_exact_and_wildcard() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Let the subscriptions register before the callbacks fly
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream
            .write_all(&frame(123_456, 6, 0, 0, &[0x01]))
            .await
            .unwrap();
        stream
            .write_all(&frame(999, 6, 0, 0, &[0x02]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let (exact_tx, mut exact_rx) = mpsc::channel(4);
    let (wild_tx, mut wild_rx) = mpsc::channel(4);
    conn.subscribe(123_456, 6, exact_tx).await.unwrap();
    conn.subscribe(WILDCARD_UID, 6, wild_tx).await.unwrap();

    // The wildcard sink sees both callbacks
    let first = timeout(Duration::from_secs(1), wild_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((first.uid(), first.payload()), (123_456, &[0x01][..]));
    let second = timeout(Duration::from_secs(1), wild_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!((second.uid(), second.payload()), (999, &[0x02][..]));

    // The exact sink sees only its own device, exactly once
    let only = timeout(Duration::from_secs(1), exact_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(only.uid(), 123_456);
    assert!(exact_rx.try_recv().is_err());

    peer.await.unwrap();
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribed_sink_receives_nothing() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream
            .write_all(&frame(42, 6, 0, 0, &[0xAA]))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let (gone_tx, mut gone_rx) = mpsc::channel(4);
    let (keep_tx, mut keep_rx) = mpsc::channel(4);
    conn.subscribe(42, 6, gone_tx.clone()).await.unwrap();
    conn.subscribe(WILDCARD_UID, 6, keep_tx).await.unwrap();
    conn.unsubscribe(42, 6, &gone_tx).await.unwrap();

    // Deregistering something that is not registered is accepted
    conn.unsubscribe(7, 7, &gone_tx).await.unwrap();

    // The remaining sink proves the callback went out
    let seen = timeout(Duration::from_secs(1), keep_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.uid(), 42);
    assert!(gone_rx.try_recv().is_err());

    conn.close().await.unwrap();
}

// ============================================================================
// S5: protocol error replies
// ============================================================================

#[tokio::test]
async fn test_error_code_reply_is_surfaced() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        stream.read_exact(&mut request).await.unwrap();

        // error_code 1 (InvalidParameter) in the top two flag bits
        let reply = frame(100, 5, request[6], 0x01 << 6, &[0x63, 0x00]);
        stream.write_all(&reply).await.unwrap();
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let request = Packet::new(100, 5, true, Vec::new()).unwrap();
    let reply = conn.send(request).await.unwrap().unwrap();

    assert!(matches!(
        reply.error(),
        Some(brickbus::ProtocolError::InvalidParameter)
    ));
    // The payload is still accessible alongside the error code
    assert_eq!(reply.reader().read_u16().unwrap(), 99);

    conn.close().await.unwrap();
}

// ============================================================================
// S6: close during await
// ============================================================================

#[tokio::test]
async fn test_close_fails_pending_request_with_closed() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        let _ = stream.read_exact(&mut request).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let conn = Arc::new(Connection::connect(&addr).await.unwrap());

    let closer = Arc::clone(&conn);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        closer.close().await.unwrap();
    });

    let request = Packet::new(3, 3, true, Vec::new()).unwrap();
    let result = timeout(Duration::from_secs(2), conn.send(request))
        .await
        .expect("close must release the awaiting caller promptly");
    assert!(matches!(result, Err(Error::Closed)));

    // The engine is down for good
    let request = Packet::new(3, 4, false, Vec::new()).unwrap();
    assert!(matches!(conn.send(request).await, Err(Error::Closed)));
}

// ============================================================================
// FIFO submission order
// ============================================================================

#[tokio::test]
async fn test_submissions_hit_the_wire_in_order() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut frames = Vec::new();
        for _ in 0..5 {
            let mut buf = [0u8; 8];
            stream.read_exact(&mut buf).await.unwrap();
            frames.push(buf);
        }
        frames
    });

    let conn = Connection::connect(&addr).await.unwrap();
    for function in 1..=5u8 {
        let packet = Packet::new(1, function, false, Vec::new()).unwrap();
        conn.send(packet).await.unwrap();
    }

    let observed = peer.await.unwrap();
    for (i, header) in observed.iter().enumerate() {
        assert_eq!(header[5], i as u8 + 1, "function order");
        assert_eq!(header[6] >> 4, i as u8 + 1, "sequence rotation");
    }

    conn.close().await.unwrap();
}

// ============================================================================
// Callbacks interleaving with pending responses
// ============================================================================

#[tokio::test]
async fn test_callback_interleaves_with_pending_response() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        stream.read_exact(&mut request).await.unwrap();

        // A callback lands while the response is still owed
        stream
            .write_all(&frame(77, 6, 0, 0, &[0x05]))
            .await
            .unwrap();
        let reply = frame(10, 2, request[6], 0, &[0x07, 0x00]);
        stream.write_all(&reply).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let (cb_tx, mut cb_rx) = mpsc::channel(4);
    conn.subscribe(WILDCARD_UID, 6, cb_tx).await.unwrap();

    let request = Packet::new(10, 2, true, Vec::new()).unwrap();
    let reply = conn.send(request).await.unwrap().unwrap();
    assert_eq!(reply.reader().read_u16().unwrap(), 7);

    let callback = timeout(Duration::from_secs(1), cb_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(callback.uid(), 77);
    assert!(callback.is_callback());

    conn.close().await.unwrap();
}

// ============================================================================
// Peer disconnect
// ============================================================================

#[tokio::test]
async fn test_peer_disconnect_shuts_the_engine_down() {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 8];
        let _ = stream.read_exact(&mut request).await;
        // Hang up without replying
        drop(stream);
    });

    let conn = Connection::connect(&addr).await.unwrap();

    let request = Packet::new(9, 9, true, Vec::new()).unwrap();
    let result = timeout(Duration::from_secs(2), conn.send(request))
        .await
        .expect("peer disconnect must release the awaiting caller");
    assert!(matches!(result, Err(Error::Closed)));

    conn.close().await.unwrap();
}
