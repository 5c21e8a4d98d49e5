//! duplexd: TDD scheduler daemon.
//!
//! Brings up the radio, then serves the TCP control channel. Transmit and
//! receive sessions are started and stopped by the control peer; captures
//! are forwarded downstream over UDP.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use duplex_core::config::DuplexConfig;
use duplex_core::samples::load_samples;
use duplex_core::Sample;
use duplex_services::{ControlServer, Forwarder, SessionContext};

mod cli;
mod device;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if cli.write_default_config {
        let path = DuplexConfig::write_default_if_missing().context("failed to write default config")?;
        println!("{}", path.display());
        return Ok(());
    }

    let mut config = DuplexConfig::load().context("failed to load config")?;
    cli.apply(&mut config);
    let rate = config.validate().context("invalid configuration")?;
    tracing::info!(
        samples_per_switch = config.tdd.samples_per_switch,
        tx_ports = config.tdd.tx_ports,
        rx_ports = config.tdd.rx_ports,
        delay = config.tdd.delay_samples,
        total_samples = config.tdd.total_num_samples(),
        transmit = config.session.transmit,
        receive = config.session.receive,
        "duplexd starting"
    );

    let radio = device::bring_up(&config.device, rate).await?;

    let waveform: Option<Arc<[Sample]>> = if config.session.transmit {
        let samples = load_samples(&config.files.tx_file)
            .with_context(|| format!("failed to load transmit waveform {}", config.files.tx_file.display()))?;
        tracing::info!(
            path = %config.files.tx_file.display(),
            samples = samples.len(),
            chunks_per_burst = config.tdd.chunks_per_burst(samples.len()),
            "transmit waveform loaded"
        );
        Some(samples.into())
    } else {
        None
    };

    let forwarder = Forwarder::connect(&config.network.forward_addr, config.network.send_buffer_bytes)
        .await
        .context("failed to set up capture forwarding")?;

    let ctx = Arc::new(SessionContext {
        radio,
        sample_rate: rate,
        tdd: config.tdd.clone(),
        directions: config.session.clone(),
        waveform,
        forwarder: Arc::new(forwarder),
        rx_file: config.files.rx_file.clone(),
    });

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                shutdown.cancel();
            }
        });
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.network.control_port));
    let server = ControlServer::bind(addr, ctx.clone(), shutdown, config.network.serve_forever).await?;
    tracing::info!(
        control = %addr,
        forward = %ctx.forwarder.peer(),
        serve_forever = config.network.serve_forever,
        "duplexd ready"
    );
    server.run().await?;

    tracing::info!("duplexd stopped");
    Ok(())
}
