//! Copy Task
//!
//! Unidirectional byte pump used for each half of a relay session.

use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// The direction a copy task forwards bytes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Bytes read from the client and written to the upstream.
    ClientToUpstream,

    /// Bytes read from the upstream and written to the client.
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client->upstream"),
            Direction::UpstreamToClient => write!(f, "upstream->client"),
        }
    }
}

/// How a copy loop ended.
#[derive(Debug)]
pub struct CopyOutcome {
    /// Payload bytes the destination accepted.
    pub bytes: u64,

    /// `None` when the source reached end-of-stream.
    pub error: Option<io::Error>,
}

impl CopyOutcome {
    fn finished(bytes: u64) -> Self {
        Self { bytes, error: None }
    }

    fn failed(bytes: u64, error: io::Error) -> Self {
        Self {
            bytes,
            error: Some(error),
        }
    }

    /// True when the source closed cleanly.
    pub fn is_eof(&self) -> bool {
        self.error.is_none()
    }
}

/// Copies from `source` to `destination` until end-of-stream or the first
/// I/O error.
///
/// The count only includes bytes the destination reported as written, so a
/// write that fails halfway through a chunk still yields an exact total.
pub async fn pump<R, W>(source: &mut R, destination: &mut W, buffer_size: usize) -> CopyOutcome
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut transferred: u64 = 0;

    loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return CopyOutcome::failed(transferred, e),
        };

        let mut pending = &buf[..n];
        while !pending.is_empty() {
            match destination.write(pending).await {
                Ok(0) => {
                    return CopyOutcome::failed(
                        transferred,
                        io::Error::from(io::ErrorKind::WriteZero),
                    )
                }
                Ok(written) => {
                    transferred += written as u64;
                    pending = &pending[written..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return CopyOutcome::failed(transferred, e),
            }
        }
    }

    match destination.flush().await {
        Ok(()) => CopyOutcome::finished(transferred),
        Err(e) => CopyOutcome::failed(transferred, e),
    }
}
