//! Capture forwarding over UDP.
//!
//! A capture is split into datagrams of at most [`MAX_PACKET_SAMPLES`]
//! samples, fc32 little-endian, sent in order with a short pause between
//! them so the receiver keeps up. Send failures are logged and skipped.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use duplex_core::samples::{encode_samples, SAMPLE_BYTES};
use duplex_core::wire::{FORWARD_PACING, MAX_PACKET_SAMPLES};
use duplex_core::Sample;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ForwardReport {
    pub packets: usize,
    pub samples: usize,
    pub send_failures: usize,
}

pub struct Forwarder {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl Forwarder {
    /// Resolve `addr` and open a UDP socket connected to it.
    /// `send_buffer_bytes` of 0 keeps the OS default SO_SNDBUF.
    pub async fn connect(addr: &str, send_buffer_bytes: usize) -> Result<Self> {
        let peer = tokio::net::lookup_host(addr)
            .await
            .with_context(|| format!("failed to resolve forward address {addr}"))?
            .next()
            .with_context(|| format!("no address for {addr}"))?;

        let socket = make_forward_socket(peer, send_buffer_bytes)
            .context("failed to create forwarding socket")?;
        let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;

        tracing::info!(%peer, send_buffer_bytes, "forwarder ready");
        Ok(Self { socket, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send `samples` downstream, in order.
    pub async fn forward(&self, samples: &[Sample]) -> ForwardReport {
        let mut report = ForwardReport::default();
        let mut buf = BytesMut::with_capacity(MAX_PACKET_SAMPLES * SAMPLE_BYTES);

        for (i, packet) in samples.chunks(MAX_PACKET_SAMPLES).enumerate() {
            if i > 0 {
                tokio::time::sleep(FORWARD_PACING).await;
            }
            buf.clear();
            encode_samples(packet, &mut buf);

            match self.socket.send(&buf).await {
                Ok(_) => {
                    report.packets += 1;
                    report.samples += packet.len();
                }
                Err(e) => {
                    tracing::warn!(error = %e, packet = i, "forward send failed");
                    report.send_failures += 1;
                }
            }
        }

        tracing::info!(
            peer = %self.peer,
            packets = report.packets,
            samples = report.samples,
            failures = report.send_failures,
            "capture forwarded"
        );
        report
    }
}

fn make_forward_socket(peer: SocketAddr, send_buffer_bytes: usize) -> Result<std::net::UdpSocket> {
    let domain = Domain::for_address(peer);
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    if send_buffer_bytes > 0 {
        socket
            .set_send_buffer_size(send_buffer_bytes)
            .context("SO_SNDBUF")?;
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;

    let local: SocketAddr = match peer {
        SocketAddr::V4(_) => (std::net::Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    socket.bind(&local.into()).context("bind()")?;
    socket.connect(&peer.into()).context("connect()")?;

    Ok(socket.into())
}
