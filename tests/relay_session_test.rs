//! Tests for individual relay sessions

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout, Duration};
use tcprelay::config::RelayConfig;
use tcprelay::relay::{RelayError, RelaySession};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts one connection, records everything it receives until EOF, then
/// answers with `response` after `delay` and closes.
async fn spawn_recording_upstream(
    response: Vec<u8>,
    delay: Duration,
) -> (SocketAddr, oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received_tx, received_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        let _ = received_tx.send(received);

        sleep(delay).await;
        stream.write_all(&response).await.unwrap();
        stream.shutdown().await.unwrap();
    });

    (addr, received_rx)
}

/// Returns the client end and a session owning the accepted end.
async fn connected_session(config: RelayConfig) -> (TcpStream, RelaySession) {
    let front = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = TcpStream::connect(front.local_addr().unwrap()).await.unwrap();
    let (accepted, peer) = front.accept().await.unwrap();

    (client, RelaySession::new(accepted, peer, Arc::new(config)))
}

async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn test_counts_match_bytes_observed_by_upstream() {
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
    let response = vec![7u8; 1234];
    let (upstream_addr, received) =
        spawn_recording_upstream(response.clone(), Duration::ZERO).await;

    let (mut client, session) =
        connected_session(RelayConfig::new("127.0.0.1:0", upstream_addr.to_string())).await;
    let session_handle = tokio::spawn(session.run());

    client.write_all(&payload).await.unwrap();
    client.shutdown().await.unwrap();

    let mut echoed = Vec::new();
    timeout(TEST_TIMEOUT, client.read_to_end(&mut echoed))
        .await
        .unwrap()
        .unwrap();

    let summary = timeout(TEST_TIMEOUT, session_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let observed = received.await.unwrap();

    assert_eq!(observed, payload);
    assert_eq!(echoed, response);
    assert_eq!(summary.client_to_upstream, observed.len() as u64);
    assert_eq!(summary.upstream_to_client, echoed.len() as u64);
    assert_eq!(summary.total_bytes(), 50_000 + 1234);
}

#[tokio::test]
async fn test_half_close_keeps_reverse_direction_open() {
    let (upstream_addr, received) =
        spawn_recording_upstream(b"late response".to_vec(), Duration::from_millis(200)).await;

    let (mut client, session) =
        connected_session(RelayConfig::new("127.0.0.1:0", upstream_addr.to_string())).await;
    let session_handle = tokio::spawn(session.run());

    client.write_all(b"request body").await.unwrap();
    client.shutdown().await.unwrap();

    // The upstream sees exactly the request and then end-of-stream.
    let observed = timeout(TEST_TIMEOUT, received).await.unwrap().unwrap();
    assert_eq!(observed, b"request body");

    let mut response = Vec::new();
    timeout(TEST_TIMEOUT, client.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, b"late response");

    let summary = timeout(TEST_TIMEOUT, session_handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(summary.client_to_upstream, 12);
    assert_eq!(summary.upstream_to_client, 13);
}

#[tokio::test]
async fn test_dial_failure_closes_client() {
    let dead_upstream = unused_addr().await;

    let (mut client, session) =
        connected_session(RelayConfig::new("127.0.0.1:0", dead_upstream.to_string())).await;

    let result = timeout(TEST_TIMEOUT, session.run()).await.unwrap();
    match result {
        Err(RelayError::Dial { upstream, .. }) => {
            assert_eq!(upstream, dead_upstream.to_string());
        }
        other => panic!("expected dial failure, got {:?}", other),
    }

    // The client only ever observes its connection closing.
    let mut buf = [0u8; 16];
    let read = timeout(TEST_TIMEOUT, client.read(&mut buf)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn test_upstream_close_ends_both_directions() {
    // Upstream greets and hangs up without waiting for the client.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"bye").await.unwrap();
    });

    let (mut client, session) =
        connected_session(RelayConfig::new("127.0.0.1:0", upstream_addr.to_string())).await;
    let session_handle = tokio::spawn(session.run());

    let mut greeting = Vec::new();
    timeout(TEST_TIMEOUT, client.read_to_end(&mut greeting))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(greeting, b"bye");

    // The client stays connected and idle; the session must still finish.
    let summary = timeout(TEST_TIMEOUT, session_handle)
        .await
        .expect("session still running after upstream closed")
        .unwrap()
        .unwrap();
    assert_eq!(summary.upstream_to_client, 3);
    assert_eq!(summary.client_to_upstream, 0);

    drop(client);
}

#[tokio::test]
async fn test_upstream_reset_finalizes_with_partial_counts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = listener.local_addr().unwrap();
    let (reset_tx, reset_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4];
        stream.read_exact(&mut request).await.unwrap();
        stream.write_all(b"xy").await.unwrap();

        // Abort the connection with a RST once the client has the reply.
        let _ = reset_rx.await;
        #[allow(deprecated)]
        stream.set_linger(Some(Duration::ZERO)).unwrap();
        drop(stream);
    });

    let (mut client, session) =
        connected_session(RelayConfig::new("127.0.0.1:0", upstream_addr.to_string())).await;
    let session_handle = tokio::spawn(session.run());

    client.write_all(b"abcd").await.unwrap();
    let mut reply = [0u8; 2];
    timeout(TEST_TIMEOUT, client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply, b"xy");
    reset_tx.send(()).unwrap();

    // The client keeps its side open; the failed direction ends the session.
    let summary = timeout(TEST_TIMEOUT, session_handle)
        .await
        .expect("session still running after upstream reset")
        .unwrap()
        .unwrap();
    assert_eq!(summary.client_to_upstream, 4);
    assert_eq!(summary.upstream_to_client, 2);

    let mut rest = [0u8; 8];
    let read = timeout(TEST_TIMEOUT, client.read(&mut rest)).await.unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
}
