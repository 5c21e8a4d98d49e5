//! Control channel wire protocol and transport constants.
//!
//! The control link is a TCP byte stream carrying single ASCII digits in
//! both directions. The server greets with `'0'`; the client sends one
//! opcode per write; the server answers each session outcome with one
//! status byte. There is no framing, versioning or error reporting beyond
//! these bytes.

use std::fmt;
use std::time::Duration;

// ── Opcodes (client → server) ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlOpcode {
    StartTx = 1,
    StopTx = 2,
    StartRx = 3,
}

impl ControlOpcode {
    /// ASCII byte on the wire.
    pub fn as_byte(self) -> u8 {
        b'0' + self as u8
    }

    /// Decode the payload of one control read.
    ///
    /// Trailing ASCII whitespace is ignored so line-oriented clients work;
    /// anything other than exactly one opcode digit is rejected.
    pub fn parse(payload: &[u8]) -> Result<Self, WireError> {
        let trimmed = trim_ascii_end(payload);
        match trimmed {
            [] => Err(WireError::EmptyPayload),
            [b] => ControlOpcode::try_from(*b),
            _ => Err(WireError::UnexpectedPayload(trimmed.len())),
        }
    }
}

impl TryFrom<u8> for ControlOpcode {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'1' => Ok(ControlOpcode::StartTx),
            b'2' => Ok(ControlOpcode::StopTx),
            b'3' => Ok(ControlOpcode::StartRx),
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

impl fmt::Display for ControlOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlOpcode::StartTx => "start-tx",
            ControlOpcode::StopTx => "stop-tx",
            ControlOpcode::StartRx => "start-rx",
        };
        f.write_str(name)
    }
}

// ── Status notices (server → client) ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StatusNotice {
    Connected = 0,
    TxStarted = 1,
    TxStopped = 2,
    RxDone = 3,
    RxFailed = 4,
}

impl StatusNotice {
    pub fn as_byte(self) -> u8 {
        b'0' + self as u8
    }
}

impl TryFrom<u8> for StatusNotice {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'0' => Ok(StatusNotice::Connected),
            b'1' => Ok(StatusNotice::TxStarted),
            b'2' => Ok(StatusNotice::TxStopped),
            b'3' => Ok(StatusNotice::RxDone),
            b'4' => Ok(StatusNotice::RxFailed),
            other => Err(WireError::UnknownStatus(other)),
        }
    }
}

impl fmt::Display for StatusNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusNotice::Connected => "connected",
            StatusNotice::TxStarted => "tx-started",
            StatusNotice::TxStopped => "tx-stopped",
            StatusNotice::RxDone => "rx-done",
            StatusNotice::RxFailed => "rx-failed",
        };
        f.write_str(name)
    }
}

fn trim_ascii_end(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., last] = bytes {
        if last.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Largest control read the server accepts in one go.
pub const CONTROL_READ_BYTES: usize = 10;

/// Default TCP port for the control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 54321;

/// Default downstream endpoint for captured samples.
pub const DEFAULT_FORWARD_ADDR: &str = "127.0.0.1:12345";

/// Samples per forwarded datagram (2000 × 8 bytes = 16 000 bytes payload).
pub const MAX_PACKET_SAMPLES: usize = 2000;

/// Gap between forwarded datagrams so the consumer's ingest keeps up.
pub const FORWARD_PACING: Duration = Duration::from_micros(1);

/// Timeout of the first receive call; covers the wait for the scheduled start.
pub const FIRST_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Timeout of every later receive call.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Timeout for each transmit chunk write and for each ack drain call.
pub const TX_TIMEOUT: Duration = Duration::from_millis(1500);

/// How far ahead of its due time a GPIO event is handed to the device,
/// and how early the transmit sweep wakes before the next tick.
pub const GPIO_ISSUE_LEAD: Duration = Duration::from_millis(100);

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown opcode byte: 0x{0:02x}")]
    UnknownOpcode(u8),

    #[error("unknown status byte: 0x{0:02x}")]
    UnknownStatus(u8),

    #[error("empty control payload")]
    EmptyPayload,

    #[error("control payload carries {0} bytes, expected one opcode")]
    UnexpectedPayload(usize),
}
