//! Radio interface: what the scheduler needs from an SDR front end.
//!
//! Tuning, gain and antenna selection happen once at bring-up and are not
//! part of this trait. What remains is the device clock, the timed GPIO
//! command queue, and raw sample streaming in both directions.
//!
//! All methods block; drivers talk to hardware synchronously. Async callers
//! keep to the cheap methods (`now`, `schedule`) and run streaming on a
//! blocking thread.

use std::time::Duration;

use duplex_core::{DeviceTime, Sample};

/// A command for the device's timed-command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioCommand {
    /// Write the GPIO output register under the switch mask.
    SetPorts(u32),
}

/// Per-call status of a receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxErrorCode {
    None,
    Timeout,
    LateCommand,
    BrokenChain,
    Overflow,
    Alignment,
    BadPacket,
}

impl RxErrorCode {
    pub fn is_error(self) -> bool {
        self != RxErrorCode::None
    }
}

/// Result of one receive call: `len` samples were written to the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxChunk {
    pub len: usize,
    pub error: RxErrorCode,
}

/// Framing of one transmit write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxMetadata {
    /// Start the burst at this device time. Only set on the first chunk.
    pub time_spec: Option<DeviceTime>,
    pub start_of_burst: bool,
    pub end_of_burst: bool,
}

/// Asynchronous transmit-side report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncEvent {
    BurstAck,
    Underflow,
    SeqError,
    TimeError,
    UnderflowInPacket,
    SeqErrorInBurst,
    UserPayload,
}

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("stream setup failed: {0}")]
    StreamSetup(String),
    #[error("device I/O error: {0}")]
    Io(String),
}

/// A bounded receive stream opened by [`Radio::stream_in`].
pub trait RxStream: Send {
    /// Pull at most `buf.len()` samples, waiting up to `timeout`.
    fn recv(&mut self, buf: &mut [Sample], timeout: Duration) -> Result<RxChunk, RadioError>;
}

pub trait Radio: Send + Sync {
    /// Current device time.
    fn now(&self) -> DeviceTime;

    /// Load `time` into the device clock on the next PPS edge.
    fn set_time_next_pps(&self, time: DeviceTime);

    /// Put the switch lines under manual control, driven as outputs.
    fn configure_ports(&self, ddr_mask: u32);

    /// Queue `cmd` to execute at `at`. Fire-and-forget.
    fn schedule(&self, at: DeviceTime, cmd: GpioCommand);

    /// Largest receive transfer the driver performs in one call.
    fn max_rx_samples(&self) -> usize;

    /// Largest transmit transfer the driver accepts in one call.
    fn max_tx_samples(&self) -> usize;

    /// Request exactly `num_samples` samples starting at `start`.
    fn stream_in(
        &self,
        num_samples: usize,
        start: DeviceTime,
    ) -> Result<Box<dyn RxStream + '_>, RadioError>;

    /// Write one transmit chunk. Returns the number of samples accepted.
    fn send_chunk(
        &self,
        samples: &[Sample],
        md: &TxMetadata,
        timeout: Duration,
    ) -> Result<usize, RadioError>;

    /// Next asynchronous transmit report, or `None` once `timeout` expires.
    fn recv_async(&self, timeout: Duration) -> Option<AsyncEvent>;
}
