//! duplex-ctl: operator tool for the duplex daemon.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpStream, UdpSocket};

use duplex_core::samples::{decode_samples, write_samples};
use duplex_core::wire::DEFAULT_CONTROL_PORT;
use duplex_core::{ControlOpcode, Sample, StatusNotice};

/// Quiet period after receive-done before a capture of unknown size is
/// considered complete.
const DRAIN_QUIET: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "duplex-ctl")]
#[command(about = "Control a running duplexd")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive control session: tx, stop, rx, quit
    Session {
        /// duplexd control address
        #[arg(long, default_value_t = default_addr())]
        addr: String,
    },
    /// Trigger one capture and write it to a file
    Capture {
        /// duplexd control address
        #[arg(long, default_value_t = default_addr())]
        addr: String,

        /// Local UDP endpoint duplexd forwards to
        #[arg(long, default_value = "0.0.0.0:12345")]
        listen: String,

        /// Expected sample count
        #[arg(long)]
        samples: Option<usize>,

        /// Output file (fc32)
        #[arg(long, default_value = "capture.dat")]
        out: PathBuf,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 10.0)]
        timeout: f64,
    },
}

fn default_addr() -> String {
    format!("127.0.0.1:{DEFAULT_CONTROL_PORT}")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Session { addr } => cmd_session(&addr).await,
        Command::Capture {
            addr,
            listen,
            samples,
            out,
            timeout,
        } => cmd_capture(&addr, &listen, samples, &out, Duration::from_secs_f64(timeout)).await,
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

async fn connect(addr: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to duplexd at {addr} - is it running?"))?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Next status byte, or `None` when the daemon closed the link.
async fn read_notice(reader: &mut OwnedReadHalf) -> Result<Option<StatusNotice>> {
    let mut b = [0u8; 1];
    match reader.read(&mut b).await.context("control read failed")? {
        0 => Ok(None),
        _ => Ok(Some(StatusNotice::try_from(b[0])?)),
    }
}

fn parse_command(line: &str) -> Option<ControlOpcode> {
    match line.trim() {
        "tx" | "start-tx" => Some(ControlOpcode::StartTx),
        "stop" | "stop-tx" => Some(ControlOpcode::StopTx),
        "rx" | "start-rx" => Some(ControlOpcode::StartRx),
        _ => None,
    }
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_session(addr: &str) -> Result<()> {
    let (mut reader, mut writer) = connect(addr).await?.into_split();

    let printer = tokio::spawn(async move {
        loop {
            match read_notice(&mut reader).await {
                Ok(Some(notice)) => println!("< {notice}"),
                Ok(None) => {
                    println!("connection closed by duplexd");
                    break;
                }
                Err(e) => {
                    eprintln!("error: {e:#}");
                    break;
                }
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        match parse_command(line) {
            Some(op) => writer
                .write_all(&[op.as_byte()])
                .await
                .context("control write failed")?,
            None => eprintln!("unknown command {line:?} (tx, stop, rx, quit)"),
        }
    }

    writer.shutdown().await.ok();
    drop(writer);
    printer.await.ok();
    Ok(())
}

async fn cmd_capture(
    addr: &str,
    listen: &str,
    expected: Option<usize>,
    out: &std::path::Path,
    timeout: Duration,
) -> Result<()> {
    let socket = UdpSocket::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    let (mut reader, mut writer) = connect(addr).await?.into_split();

    match read_notice(&mut reader).await? {
        Some(StatusNotice::Connected) => {}
        other => bail!("unexpected greeting {other:?}"),
    }
    writer.write_all(&[ControlOpcode::StartRx.as_byte()]).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = vec![0u8; 65536];
    let mut samples: Vec<Sample> = Vec::new();
    let mut packets = 0usize;
    let mut done = false;

    loop {
        if done && expected.is_some_and(|n| samples.len() >= n) {
            break;
        }
        let quiet = tokio::time::sleep(DRAIN_QUIET);
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                bail!("timed out with {} samples in {packets} packets", samples.len());
            }
            _ = quiet, if done => break,
            received = socket.recv(&mut buf) => {
                let n = received.context("UDP receive failed")?;
                samples.extend(decode_samples(&buf[..n])?);
                packets += 1;
            }
            notice = read_notice(&mut reader), if !done => match notice? {
                Some(StatusNotice::RxDone) => done = true,
                Some(StatusNotice::RxFailed) => bail!("duplexd reported a failed capture"),
                Some(other) => tracing::debug!(%other, "ignoring status"),
                None => bail!("duplexd closed the control link"),
            },
        }
    }

    write_samples(out, &samples)?;
    println!("{packets} packets, {} samples -> {}", samples.len(), out.display());
    Ok(())
}
