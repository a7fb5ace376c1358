//! Relay Session

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info};

use super::copy::{pump, Direction};
use super::RelayError;
use crate::config::RelayConfig;

/// Final accounting for one relayed connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub client_addr: SocketAddr,
    pub upstream_local_addr: SocketAddr,
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
    pub duration: Duration,
}

impl SessionSummary {
    /// Bytes moved in both directions
    pub fn total_bytes(&self) -> u64 {
        self.client_to_upstream + self.upstream_to_client
    }
}

/// A second OS handle on a session socket.
///
/// The owned halves of a stream live in different copy tasks, so neither
/// can close the whole socket. This handle can, which is how a failing
/// direction ends its sibling.
struct SocketHandle(std::net::TcpStream);

impl SocketHandle {
    fn detach(stream: TcpStream) -> io::Result<(TcpStream, SocketHandle)> {
        let stream = stream.into_std()?;
        let handle = stream.try_clone()?;
        Ok((TcpStream::from_std(stream)?, SocketHandle(handle)))
    }

    fn close(&self) {
        if let Err(e) = self.0.shutdown(Shutdown::Both) {
            debug!(error = %e, "socket already closed");
        }
    }
}

/// One client connection paired with one upstream connection
pub struct RelaySession {
    client: TcpStream,
    client_addr: SocketAddr,
    config: Arc<RelayConfig>,
}

impl RelaySession {
    /// Create a session for an accepted client. The session owns the stream
    /// from here on.
    pub fn new(client: TcpStream, client_addr: SocketAddr, config: Arc<RelayConfig>) -> Self {
        Self {
            client,
            client_addr,
            config,
        }
    }

    /// Dial the upstream and relay until both directions have finished.
    ///
    /// A dial failure closes the client and returns an error without
    /// starting any copy task. Copy errors never surface here; they only
    /// shorten the byte counts in the summary.
    pub async fn run(self) -> Result<SessionSummary, RelayError> {
        let client_addr = self.client_addr;
        let config = Arc::clone(&self.config);

        let result = self.relay().await;
        if let Err(e) = &result {
            error!(
                error = %e,
                upstream_addr = %config.upstream_addr,
                client_addr = %client_addr,
                "Failed to relay client connection"
            );
        }
        result
    }

    async fn relay(self) -> Result<SessionSummary, RelayError> {
        let RelaySession {
            client,
            client_addr,
            config,
        } = self;
        let start_time = Instant::now();

        // On failure `client` is dropped on return, closing it.
        let upstream = dial(&config).await?;

        let upstream_local_addr = upstream.local_addr().map_err(RelayError::Socket)?;
        info!(
            client_addr = %client_addr,
            upstream_local_addr = %upstream_local_addr,
            upstream_addr = %config.upstream_addr,
            "New client connection"
        );

        let (client, client_handle) = SocketHandle::detach(client).map_err(RelayError::Socket)?;
        let (upstream, upstream_handle) =
            SocketHandle::detach(upstream).map_err(RelayError::Socket)?;

        let (client_read, client_write) = client.into_split();
        let (upstream_read, upstream_write) = upstream.into_split();

        let client_to_upstream = tokio::spawn(forward(
            Direction::ClientToUpstream,
            client_read,
            upstream_write,
            upstream_handle,
            config.buffer_size,
        ));
        let upstream_to_client = tokio::spawn(forward(
            Direction::UpstreamToClient,
            upstream_read,
            client_write,
            client_handle,
            config.buffer_size,
        ));

        // Both directions must report back, in whichever order they finish.
        let (client_to_upstream, upstream_to_client) =
            tokio::join!(client_to_upstream, upstream_to_client);

        let summary = SessionSummary {
            client_addr,
            upstream_local_addr,
            client_to_upstream: joined_bytes(Direction::ClientToUpstream, client_to_upstream),
            upstream_to_client: joined_bytes(Direction::UpstreamToClient, upstream_to_client),
            duration: start_time.elapsed(),
        };

        info!(
            client_addr = %summary.client_addr,
            bytes_client_to_upstream = summary.client_to_upstream,
            bytes_upstream_to_client = summary.upstream_to_client,
            duration_ms = summary.duration.as_millis() as u64,
            "Client connection closed"
        );

        Ok(summary)
    }
}

async fn dial(config: &RelayConfig) -> Result<TcpStream, RelayError> {
    match timeout(
        config.connect_timeout,
        TcpStream::connect(config.upstream_addr.as_str()),
    )
    .await
    {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(RelayError::Dial {
            upstream: config.upstream_addr.clone(),
            source,
        }),
        Err(_) => Err(RelayError::DialTimeout {
            upstream: config.upstream_addr.clone(),
            timeout: config.connect_timeout,
        }),
    }
}

/// Runs one direction and closes its destination when done.
///
/// When the client finishes sending, the upstream only gets a write
/// shutdown so its response can still drain back. When the upstream
/// finishes, or either direction fails, the destination socket is torn
/// down completely, which wakes the sibling task reading from it.
async fn forward(
    direction: Direction,
    mut source: OwnedReadHalf,
    mut destination: OwnedWriteHalf,
    destination_handle: SocketHandle,
    buffer_size: usize,
) -> u64 {
    let outcome = pump(&mut source, &mut destination, buffer_size).await;

    match &outcome.error {
        None => {
            debug!(%direction, bytes = outcome.bytes, "source reached end of stream");
            if let Err(e) = destination.shutdown().await {
                debug!(%direction, error = %e, "destination already closed");
            }
            if direction == Direction::UpstreamToClient {
                destination_handle.close();
            }
        }
        Some(e) => {
            error!(%direction, error = %e, bytes = outcome.bytes, "Error copying data");
            destination_handle.close();
        }
    }

    outcome.bytes
}

fn joined_bytes(direction: Direction, joined: Result<u64, tokio::task::JoinError>) -> u64 {
    match joined {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(%direction, error = %e, "Copy task did not complete");
            0
        }
    }
}

