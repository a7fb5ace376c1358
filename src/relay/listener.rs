//! Listener Loop

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::{RelayError, RelaySession, SessionSummary};
use crate::config::{normalize_listen_addr, RelayConfig};

/// Source of inbound connections for the listener loop.
pub trait Acceptor: Send + 'static {
    /// Wait for the next inbound connection.
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;

    /// Address the acceptor is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Acceptor for TcpListener {
    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Accepts connections and hands each one to its own relay session
pub struct RelayServer<A = TcpListener> {
    acceptor: A,
    config: Arc<RelayConfig>,
    reports: Option<mpsc::UnboundedSender<SessionSummary>>,
}

impl RelayServer<TcpListener> {
    /// Bind the configured listen address.
    ///
    /// Failure here is fatal for the caller; nothing is retried.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let addr = normalize_listen_addr(&config.listen_addr);

        info!("Binding TCP listener to {}", addr);
        let listener = match TcpListener::bind(addr.as_str()).await {
            Ok(listener) => listener,
            Err(source) => return Err(RelayError::Bind { addr, source }),
        };

        Ok(Self::from_acceptor(listener, config))
    }
}

impl<A: Acceptor> RelayServer<A> {
    /// Build a server around an already bound acceptor
    pub fn from_acceptor(acceptor: A, config: RelayConfig) -> Self {
        Self {
            acceptor,
            config: Arc::new(config),
            reports: None,
        }
    }

    /// Send every finished session's summary to `reports`
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<SessionSummary>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Get the bound address
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.acceptor.local_addr()
    }

    /// Accept connections forever.
    ///
    /// Accept errors are logged and skipped. Each session runs on its own
    /// task, so a slow or failing session never holds up the next accept.
    pub async fn serve(mut self) {
        let listen_addr = self
            .acceptor
            .local_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| self.config.listen_addr.clone());

        info!(
            listen_addr = %listen_addr,
            upstream_addr = %self.config.upstream_addr,
            "Listening and relaying"
        );

        if self.config.use_proxy_protocol {
            warn!("Proxy protocol requested but not supported, relaying raw bytes");
        }

        let mut next_session_id: u64 = 1;

        loop {
            let (stream, client_addr) = match self.acceptor.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    let e = RelayError::Accept(e);
                    error!(error = %e, "Error accepting incoming connection");
                    continue;
                }
            };

            let session_id = next_session_id;
            next_session_id += 1;
            debug!(session_id, client_addr = %client_addr, "Accepted connection");

            let session = RelaySession::new(stream, client_addr, Arc::clone(&self.config));
            let reports = self.reports.clone();

            tokio::spawn(
                async move {
                    // Failures are logged by the session itself.
                    if let Ok(summary) = session.run().await {
                        if let Some(reports) = reports {
                            let _ = reports.send(summary);
                        }
                    }
                }
                .instrument(info_span!("session", id = session_id)),
            );
        }
    }
}
