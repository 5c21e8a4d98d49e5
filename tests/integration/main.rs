//! duplex integration test harness.
//!
//! Each test starts a control server on loopback against a simulated radio,
//! with a UDP socket standing in for the downstream decoder. Tests talk to
//! it over real TCP and UDP exactly as a control peer would.
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use duplex_core::config::{SessionConfig, TddConfig};
use duplex_core::Sample;
use duplex_services::{ControlServer, Forwarder, SessionContext, SimConfig, SimFaults, SimRadio};

mod control;
mod receive;
mod transmit;

pub const SAMPLE_RATE: f64 = 1e6;

/// How long to wait for a status byte before failing.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

// ── Harness ───────────────────────────────────────────────────────────────────

pub struct NodeOptions {
    pub tdd: TddConfig,
    pub faults: SimFaults,
    pub waveform_len: usize,
    pub serve_forever: bool,
    pub rx_file: Option<PathBuf>,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            tdd: tdd(256, 2, 2, 0),
            faults: SimFaults::default(),
            waveform_len: 1000,
            serve_forever: false,
            rx_file: None,
        }
    }
}

pub fn tdd(samples_per_switch: usize, tx_ports: usize, rx_ports: usize, delay: usize) -> TddConfig {
    TddConfig {
        samples_per_switch,
        tx_ports,
        rx_ports,
        delay_samples: delay,
        ..TddConfig::default()
    }
}

/// A running control server plus its downstream endpoint.
pub struct Node {
    pub radio: Arc<SimRadio>,
    pub control: SocketAddr,
    pub downstream: UdpSocket,
    pub shutdown: CancellationToken,
    pub server: JoinHandle<Result<()>>,
}

pub async fn start_node(opts: NodeOptions) -> Result<Node> {
    let radio = Arc::new(SimRadio::new(SimConfig {
        sample_rate: SAMPLE_RATE,
        faults: opts.faults,
        ..SimConfig::default()
    }));

    let downstream = UdpSocket::bind("127.0.0.1:0").await?;
    let forward_addr = downstream.local_addr()?.to_string();
    let forwarder = Forwarder::connect(&forward_addr, 0).await?;

    let waveform: Arc<[Sample]> = (0..opts.waveform_len)
        .map(|i| Sample::new((i as f32 * 0.01).cos(), (i as f32 * 0.01).sin()))
        .collect();

    let ctx = Arc::new(SessionContext {
        radio: radio.clone(),
        sample_rate: SAMPLE_RATE,
        tdd: opts.tdd,
        directions: SessionConfig::default(),
        waveform: Some(waveform),
        forwarder: Arc::new(forwarder),
        rx_file: opts.rx_file,
    });

    let shutdown = CancellationToken::new();
    let server = ControlServer::bind(
        "127.0.0.1:0".parse()?,
        ctx,
        shutdown.clone(),
        opts.serve_forever,
    )
    .await?;
    let control = server.local_addr()?;
    let server = tokio::spawn(server.run());

    Ok(Node {
        radio,
        control,
        downstream,
        shutdown,
        server,
    })
}

impl Node {
    /// Open a control connection and consume the greeting.
    pub async fn connect(&self) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(self.control)
            .await
            .context("control connect failed")?;
        stream.set_nodelay(true)?;
        let greeting = next_status(&mut stream).await?;
        if greeting != b'0' {
            bail!("expected greeting '0', got {:?}", greeting as char);
        }
        Ok(stream)
    }

    /// Datagrams received downstream until the link stays quiet.
    pub async fn drain_downstream(&self, quiet: Duration) -> Vec<Vec<u8>> {
        let mut packets = Vec::new();
        let mut buf = vec![0u8; 65536];
        while let Ok(Ok(n)) = tokio::time::timeout(quiet, self.downstream.recv(&mut buf)).await {
            packets.push(buf[..n].to_vec());
        }
        packets
    }

    /// Wait for the server task to return.
    pub async fn join(self, within: Duration) -> Result<()> {
        tokio::time::timeout(within, self.server)
            .await
            .context("control server did not stop")??
    }
}

pub async fn send(stream: &mut TcpStream, payload: &[u8]) -> Result<()> {
    stream.write_all(payload).await.context("control write failed")
}

pub async fn next_status(stream: &mut TcpStream) -> Result<u8> {
    let mut b = [0u8; 1];
    tokio::time::timeout(STATUS_TIMEOUT, stream.read_exact(&mut b))
        .await
        .context("timed out waiting for status byte")?
        .context("control link closed")?;
    Ok(b[0])
}

/// True if no status byte arrives within `window`.
pub async fn stays_silent(stream: &mut TcpStream, window: Duration) -> bool {
    let mut b = [0u8; 1];
    tokio::time::timeout(window, stream.read(&mut b)).await.is_err()
}

pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("duplex-it-{}-{name}", std::process::id()))
}
