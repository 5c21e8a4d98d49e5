//! Command-line flags. Every flag is optional and overrides the matching
//! config value when given.

use std::path::PathBuf;

use clap::Parser;

use duplex_core::config::DuplexConfig;

#[derive(Parser, Debug, Default)]
#[command(name = "duplexd")]
#[command(about = "TDD transmit/receive scheduler for a GPIO-switched antenna array")]
pub struct Cli {
    /// Device address args
    #[arg(long)]
    pub args: Option<String>,

    /// Sample rate in Hz
    #[arg(long)]
    pub rate: Option<f64>,

    /// RF center frequency in Hz
    #[arg(long)]
    pub freq: Option<f64>,

    /// LO offset from the center frequency in Hz
    #[arg(long = "lo-off", allow_hyphen_values = true)]
    pub lo_off: Option<f64>,

    /// Receive gain in dB
    #[arg(long)]
    pub rx_gain: Option<f64>,

    /// Transmit gain in dB
    #[arg(long)]
    pub tx_gain: Option<f64>,

    /// Analog frontend filter bandwidth in Hz
    #[arg(long)]
    pub bw: Option<f64>,

    /// Subdevice specification
    #[arg(long)]
    pub subdev: Option<String>,

    /// Reference source: internal, external, mimo, gpsdo
    #[arg(long = "ref")]
    pub reference: Option<String>,

    /// Over-the-wire sample format: sc8, sc16
    #[arg(long)]
    pub otw: Option<String>,

    /// Channels to use, e.g. "0" or "0,1"
    #[arg(long, value_delimiter = ',')]
    pub channels: Option<Vec<usize>>,

    /// Receive antenna
    #[arg(long = "rx-ant")]
    pub rx_ant: Option<String>,

    /// Transmit antenna
    #[arg(long = "tx-ant")]
    pub tx_ant: Option<String>,

    /// Samples per port window
    #[arg(long)]
    pub samps: Option<usize>,

    /// Number of receive ports
    #[arg(long)]
    pub rx_ports: Option<usize>,

    /// Number of transmit ports
    #[arg(long)]
    pub tx_ports: Option<usize>,

    /// Settle samples dropped from each capture
    #[arg(long)]
    pub delay: Option<usize>,

    /// Downstream UDP host for captures
    #[arg(long)]
    pub addr: Option<String>,

    /// Downstream UDP port for captures
    #[arg(long)]
    pub port: Option<u16>,

    /// TCP control port
    #[arg(long)]
    pub tcp_port: Option<u16>,

    /// Transmit waveform (fc32)
    #[arg(long)]
    pub tx_file: Option<PathBuf>,

    /// Write each capture to this file before forwarding
    #[arg(long)]
    pub rx_file: Option<PathBuf>,

    /// Receive only
    #[arg(long, conflicts_with = "tx_only")]
    pub rx_only: bool,

    /// Transmit only
    #[arg(long)]
    pub tx_only: bool,

    /// Accept a new control connection after the previous one closes
    #[arg(long)]
    pub serve_forever: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Write the default config file and exit
    #[arg(long)]
    pub write_default_config: bool,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut DuplexConfig) {
        let device = &mut config.device;
        if let Some(v) = &self.args {
            device.args = v.clone();
        }
        if self.rate.is_some() {
            device.rate = self.rate;
        }
        if self.freq.is_some() {
            device.freq = self.freq;
        }
        if let Some(v) = self.lo_off {
            device.lo_offset = v;
        }
        if self.rx_gain.is_some() {
            device.rx_gain = self.rx_gain;
        }
        if self.tx_gain.is_some() {
            device.tx_gain = self.tx_gain;
        }
        if self.bw.is_some() {
            device.bw = self.bw;
        }
        if self.subdev.is_some() {
            device.subdev = self.subdev.clone();
        }
        if let Some(v) = &self.reference {
            device.reference = v.clone();
        }
        if let Some(v) = &self.otw {
            device.otw = v.clone();
        }
        if let Some(v) = &self.channels {
            device.channels = v.clone();
        }
        if let Some(v) = &self.rx_ant {
            device.rx_antenna = v.clone();
        }
        if self.tx_ant.is_some() {
            device.tx_antenna = self.tx_ant.clone();
        }

        let tdd = &mut config.tdd;
        if let Some(v) = self.samps {
            tdd.samples_per_switch = v;
        }
        if let Some(v) = self.rx_ports {
            tdd.rx_ports = v;
        }
        if let Some(v) = self.tx_ports {
            tdd.tx_ports = v;
        }
        if let Some(v) = self.delay {
            tdd.delay_samples = v;
        }

        let network = &mut config.network;
        if self.addr.is_some() || self.port.is_some() {
            network.forward_addr = forward_addr(&network.forward_addr, self.addr.as_deref(), self.port);
        }
        if let Some(v) = self.tcp_port {
            network.control_port = v;
        }
        if self.serve_forever {
            network.serve_forever = true;
        }

        if let Some(v) = &self.tx_file {
            config.files.tx_file = v.clone();
        }
        if self.rx_file.is_some() {
            config.files.rx_file = self.rx_file.clone();
        }

        if self.rx_only {
            config.session.transmit = false;
            config.session.receive = true;
        }
        if self.tx_only {
            config.session.transmit = true;
            config.session.receive = false;
        }
    }
}

/// Replace the host and/or port of a "host:port" endpoint.
fn forward_addr(current: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (cur_host, cur_port) = current.rsplit_once(':').unwrap_or((current, ""));
    let host = host.unwrap_or(cur_host);
    let port = port.map(|p| p.to_string()).unwrap_or_else(|| cur_port.to_string());
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}
