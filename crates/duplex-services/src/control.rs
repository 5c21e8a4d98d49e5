//! Control listener.
//!
//! Accepts TCP control connections and hands each one to a fresh
//! [`Coordinator`]. Connections are served one at a time; without
//! `serve_forever` the listener returns after the first one closes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::session::{Coordinator, SessionContext};

pub struct ControlServer {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
    shutdown: CancellationToken,
    serve_forever: bool,
}

impl ControlServer {
    pub async fn bind(
        addr: SocketAddr,
        ctx: Arc<SessionContext>,
        shutdown: CancellationToken,
        serve_forever: bool,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind control listener on {addr}"))?;
        Ok(Self {
            listener,
            ctx,
            shutdown,
            serve_forever,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context("control listener address")
    }

    /// Serve control connections until shutdown, or until the first
    /// connection ends when not serving forever.
    pub async fn run(self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, serve_forever = self.serve_forever, "waiting for control connection");

        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("control listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                },
            };

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "TCP_NODELAY");
            }
            tracing::info!(%peer, "control peer connected");

            let coordinator = Coordinator::new(self.ctx.clone(), self.shutdown.clone());
            if let Err(e) = coordinator.serve(stream).await {
                tracing::warn!(%peer, error = %e, "control session ended with error");
            }
            tracing::info!(%peer, "control session closed");

            if !self.serve_forever || self.shutdown.is_cancelled() {
                return Ok(());
            }
        }
    }
}
