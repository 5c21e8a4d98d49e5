//! Configuration system for duplex.
//!
//! Resolution order: defaults → config file → environment variables →
//! command-line flags (applied by the daemon).
//!
//! Config file location:
//!   1. $DUPLEX_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/duplex/config.toml
//!   3. ~/.config/duplex/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::plan::DEFAULT_PORT_MASK;
use crate::wire::{DEFAULT_CONTROL_PORT, DEFAULT_FORWARD_ADDR};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplexConfig {
    pub device: DeviceConfig,
    pub tdd: TddConfig,
    pub session: SessionConfig,
    pub network: NetworkConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device address args passed to the backend.
    pub args: String,
    /// Radio backend. Only "sim" ships with this crate.
    pub backend: String,
    /// Sample rate in Hz. Mandatory.
    pub rate: Option<f64>,
    /// RF center frequency in Hz. Mandatory.
    pub freq: Option<f64>,
    /// LO offset from the center frequency in Hz.
    pub lo_offset: f64,
    pub rx_gain: Option<f64>,
    pub tx_gain: Option<f64>,
    /// Analog frontend filter bandwidth in Hz.
    pub bw: Option<f64>,
    /// internal, external, mimo, gpsdo
    pub reference: String,
    /// Over-the-wire sample format.
    pub otw: String,
    pub subdev: Option<String>,
    pub channels: Vec<usize>,
    pub rx_antenna: String,
    pub tx_antenna: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TddConfig {
    /// Samples per port window (before the interleave factor).
    pub samples_per_switch: usize,
    pub tx_ports: usize,
    pub rx_ports: usize,
    /// Settle samples dropped from the head of every capture.
    pub delay_samples: usize,
    /// GPIO lines owned by the port switch.
    pub port_mask: u32,
    /// Scale in the chunks-per-burst rule. Unverified on hardware.
    pub tx_chunk_scale: usize,
    /// Explicit chunks per burst; overrides the scale rule when set.
    pub tx_chunks_per_burst: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Accept start-tx.
    pub transmit: bool,
    /// Accept start-rx.
    pub receive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// TCP port of the control channel.
    pub control_port: u16,
    /// Downstream UDP endpoint for captures ("host:port").
    pub forward_addr: String,
    /// SO_SNDBUF for the forwarding socket. 0 = OS default.
    pub send_buffer_bytes: usize,
    /// Accept a new control connection after the previous one closes.
    pub serve_forever: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// fc32 waveform sent in every transmit burst.
    pub tx_file: PathBuf,
    /// Optional dump of every successful capture.
    pub rx_file: Option<PathBuf>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DuplexConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            tdd: TddConfig::default(),
            session: SessionConfig::default(),
            network: NetworkConfig::default(),
            files: FilesConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            args: String::new(),
            backend: "sim".to_string(),
            rate: None,
            freq: None,
            lo_offset: -1.0,
            rx_gain: None,
            tx_gain: None,
            bw: None,
            reference: "internal".to_string(),
            otw: "sc16".to_string(),
            subdev: None,
            channels: vec![0],
            rx_antenna: "TX/RX".to_string(),
            tx_antenna: None,
        }
    }
}

impl Default for TddConfig {
    fn default() -> Self {
        Self {
            samples_per_switch: 256,
            tx_ports: 8,
            rx_ports: 8,
            delay_samples: 0,
            port_mask: DEFAULT_PORT_MASK,
            tx_chunk_scale: 10,
            tx_chunks_per_burst: None,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transmit: true,
            receive: true,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            control_port: DEFAULT_CONTROL_PORT,
            forward_addr: DEFAULT_FORWARD_ADDR.to_string(),
            send_buffer_bytes: 4 * 1024 * 1024,
            serve_forever: false,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            tx_file: PathBuf::from("signal.dat"),
            rx_file: None,
        }
    }
}

// ── Derived session parameters ────────────────────────────────────────────────

impl TddConfig {
    /// Samples requested per capture: one interleaved window per tx×rx
    /// combination plus the settle prefix.
    pub fn total_num_samples(&self) -> usize {
        self.samples_per_switch * self.tx_ports * self.rx_ports * 2 + self.delay_samples
    }

    /// Chunks written per transmit burst for a waveform of `tx_len` samples.
    pub fn chunks_per_burst(&self, tx_len: usize) -> usize {
        if let Some(n) = self.tx_chunks_per_burst {
            return n.max(1);
        }
        let ratio = self.total_num_samples() / tx_len.max(1);
        (ratio * self.tx_chunk_scale).max(1)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("duplex")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("please specify {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DuplexConfig {
    /// Load config: file → env vars → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            DuplexConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DUPLEX_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&DuplexConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply DUPLEX_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DUPLEX_DEVICE__ARGS") {
            self.device.args = v;
        }
        if let Ok(v) = std::env::var("DUPLEX_DEVICE__RATE") {
            if let Ok(r) = v.parse() {
                self.device.rate = Some(r);
            }
        }
        if let Ok(v) = std::env::var("DUPLEX_DEVICE__FREQ") {
            if let Ok(f) = v.parse() {
                self.device.freq = Some(f);
            }
        }
        if let Ok(v) = std::env::var("DUPLEX_NETWORK__CONTROL_PORT") {
            if let Ok(p) = v.parse() {
                self.network.control_port = p;
            }
        }
        if let Ok(v) = std::env::var("DUPLEX_NETWORK__FORWARD_ADDR") {
            self.network.forward_addr = v;
        }
        if let Ok(v) = std::env::var("DUPLEX_FILES__TX_FILE") {
            self.files.tx_file = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DUPLEX_FILES__RX_FILE") {
            self.files.rx_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("DUPLEX_SESSION__TRANSMIT") {
            self.session.transmit = v == "true" || v == "1";
        }
        if let Ok(v) = std::env::var("DUPLEX_SESSION__RECEIVE") {
            self.session.receive = v == "true" || v == "1";
        }
    }

    /// Check everything the scheduler relies on. Returns the sample rate.
    pub fn validate(&self) -> Result<f64, ConfigError> {
        let rate = self.device.rate.ok_or(ConfigError::Missing("a sample rate with --rate"))?;
        let freq = self
            .device
            .freq
            .ok_or(ConfigError::Missing("a center frequency with --freq"))?;
        if !(rate > 0.0) {
            return Err(invalid("rate", format!("{rate} is not a positive sample rate")));
        }
        if !(freq > 0.0) {
            return Err(invalid("freq", format!("{freq} is not a positive frequency")));
        }
        if self.device.channels.is_empty() {
            return Err(invalid("channels", "no channel selected".into()));
        }

        let tdd = &self.tdd;
        if tdd.samples_per_switch == 0 {
            return Err(invalid("samples_per_switch", "must be at least 1".into()));
        }
        let lines = tdd.port_mask.count_ones() as usize;
        for (field, ports) in [("tx_ports", tdd.tx_ports), ("rx_ports", tdd.rx_ports)] {
            if ports == 0 {
                return Err(invalid(field, "must be at least 1".into()));
            }
            if ports > lines {
                return Err(invalid(
                    field,
                    format!("{ports} ports exceed the {lines} lines of port_mask 0x{:x}", tdd.port_mask),
                ));
            }
        }

        if !self.session.transmit && !self.session.receive {
            return Err(invalid("session", "both directions are disabled".into()));
        }
        Ok(rate)
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
