//! Bounded capture.

use duplex_core::wire::{FIRST_RECV_TIMEOUT, RECV_TIMEOUT};
use duplex_core::{DeviceTime, Sample};

use crate::radio::{Radio, RadioError, RxErrorCode};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    /// Samples requested from the device, settle prefix included.
    pub total_samples: usize,
    /// Settle samples dropped from the head of the capture.
    pub delay_samples: usize,
    pub stream_time: DeviceTime,
}

impl CaptureRequest {
    /// Samples handed back to the caller.
    pub fn payload_samples(&self) -> usize {
        self.total_samples.saturating_sub(self.delay_samples)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShortfallCause {
    #[error("device reported {0:?}")]
    Device(RxErrorCode),
    #[error("{0}")]
    Io(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("receive stream: {0}")]
    Stream(#[from] RadioError),
    #[error("capture stopped at {received} of {expected} samples: {cause}")]
    Shortfall {
        received: usize,
        expected: usize,
        cause: ShortfallCause,
    },
}

/// Capture exactly `req.total_samples` samples starting at
/// `req.stream_time`, then drop the settle prefix. Blocking.
pub fn capture(radio: &dyn Radio, req: &CaptureRequest) -> Result<Vec<Sample>, CaptureError> {
    let target = req.total_samples;
    let mut stream = radio.stream_in(target, req.stream_time)?;
    let mut buf = vec![Sample::default(); radio.max_rx_samples().max(1)];
    let mut samples = Vec::with_capacity(target);
    let mut timeout = FIRST_RECV_TIMEOUT;

    tracing::debug!(target, start = %req.stream_time, "capture started");

    while samples.len() < target {
        let shortfall = |cause| CaptureError::Shortfall {
            received: samples.len(),
            expected: target,
            cause,
        };
        let chunk = match stream.recv(&mut buf, timeout) {
            Ok(chunk) => chunk,
            Err(e) => return Err(shortfall(ShortfallCause::Io(e.to_string()))),
        };
        timeout = RECV_TIMEOUT;

        if chunk.error.is_error() {
            return Err(shortfall(ShortfallCause::Device(chunk.error)));
        }
        let wanted = (target - samples.len()).min(chunk.len).min(buf.len());
        samples.extend_from_slice(&buf[..wanted]);
    }

    samples.drain(..req.delay_samples.min(samples.len()));
    tracing::debug!(samples = samples.len(), "capture complete");
    Ok(samples)
}
