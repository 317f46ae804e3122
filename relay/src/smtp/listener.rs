//! TCP accept loop for the SMTP stub.
//!
//! Every accepted connection runs its own [`Session`] task. Sessions share
//! nothing but the dispatch queue.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::message::MessageSender;
use crate::smtp::session::{Session, SessionOutcome};

/// A bound SMTP listener.
pub struct Listener {
    inner: TcpListener,
    hostname: Arc<str>,
}

impl Listener {
    /// Bind the listening socket.
    ///
    /// Failing to bind is fatal for the process.
    pub async fn bind(addr: &str, hostname: impl Into<Arc<str>>) -> Result<Self> {
        let inner = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind SMTP listener to {addr}"))?;

        Ok(Self {
            inner,
            hostname: hostname.into(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Sessions already running are not waited for.
    pub async fn serve<F>(self, queue: MessageSender, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        match self.local_addr() {
            Ok(addr) => info!(address = %addr, "smtp_listening"),
            Err(e) => warn!(error = %e, "smtp_local_addr_unavailable"),
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("smtp_listener_stopping");
                    break;
                }
                accepted = self.inner.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(connection) => connection,
                        Err(e) => {
                            warn!(error = %e, "smtp_accept_failed");
                            continue;
                        }
                    };

                    info!(peer = %peer, "smtp_connection_accepted");

                    let hostname = self.hostname.to_string();
                    let queue = queue.clone();

                    tokio::spawn(async move {
                        match Session::new(stream, hostname, queue).run().await {
                            Ok(SessionOutcome::Queued) => {
                                info!(peer = %peer, "smtp_session_queued")
                            }
                            Ok(outcome) => {
                                info!(peer = %peer, outcome = ?outcome, "smtp_session_closed")
                            }
                            Err(e) => {
                                error!(peer = %peer, error = %e, "smtp_session_failed")
                            }
                        }
                    });
                }
            }
        }
    }
}
