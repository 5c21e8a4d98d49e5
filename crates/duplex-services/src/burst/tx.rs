//! Transmit engine.
//!
//! One burst per tick: the first chunk carries the start time, the rest
//! follow back to back, and an empty end-of-burst write closes it. After
//! each burst the engine waits for the device's acknowledgement before
//! moving on to the next tick.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use duplex_core::time::TICK_SECS;
use duplex_core::wire::TX_TIMEOUT;
use duplex_core::{DeviceTime, Sample};

use crate::radio::{AsyncEvent, Radio, TxMetadata};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TxReport {
    pub bursts: usize,
    pub acked: usize,
    /// Writes where the device accepted fewer samples than offered.
    pub short_chunks: usize,
    pub failed_writes: usize,
}

pub struct TransmitEngine {
    radio: Arc<dyn Radio>,
    waveform: Arc<[Sample]>,
    chunk_len: usize,
    chunks_per_burst: usize,
    cancel: CancellationToken,
}

impl TransmitEngine {
    pub fn new(
        radio: Arc<dyn Radio>,
        waveform: Arc<[Sample]>,
        chunk_len: usize,
        chunks_per_burst: usize,
        cancel: CancellationToken,
    ) -> Self {
        let chunk_len = chunk_len.clamp(1, waveform.len().max(1));
        Self {
            radio,
            waveform,
            chunk_len,
            chunks_per_burst: chunks_per_burst.max(1),
            cancel,
        }
    }

    /// Run bursts from `stream_time` until cancelled. Blocking.
    pub fn run(self, stream_time: DeviceTime) -> TxReport {
        let mut report = TxReport::default();
        let mut burst_time = stream_time;
        let mut scratch = Vec::with_capacity(self.chunk_len);

        if self.waveform.is_empty() {
            tracing::warn!("empty waveform, nothing to transmit");
            return report;
        }

        tracing::info!(
            start = %stream_time,
            chunk_len = self.chunk_len,
            chunks_per_burst = self.chunks_per_burst,
            "transmit engine started"
        );

        while !self.cancel.is_cancelled() {
            self.send_burst(burst_time, &mut scratch, &mut report);
            report.bursts += 1;

            if self.await_ack() {
                report.acked += 1;
            } else {
                tracing::warn!(burst = %burst_time, "no burst acknowledgement");
            }
            burst_time += TICK_SECS;
        }

        tracing::info!(
            bursts = report.bursts,
            acked = report.acked,
            short_chunks = report.short_chunks,
            failed_writes = report.failed_writes,
            "transmit engine stopped"
        );
        report
    }

    fn send_burst(&self, at: DeviceTime, scratch: &mut Vec<Sample>, report: &mut TxReport) {
        let mut offset = 0;

        for i in 0..self.chunks_per_burst {
            let chunk = self.next_chunk(&mut offset, scratch);
            let md = TxMetadata {
                time_spec: (i == 0).then_some(at),
                start_of_burst: i == 0,
                end_of_burst: false,
            };
            match self.radio.send_chunk(chunk, &md, TX_TIMEOUT) {
                Ok(sent) if sent < chunk.len() => {
                    tracing::warn!(sent, offered = chunk.len(), "short transmit write");
                    report.short_chunks += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "transmit write failed");
                    report.failed_writes += 1;
                }
            }
        }

        let eob = TxMetadata {
            time_spec: None,
            start_of_burst: false,
            end_of_burst: true,
        };
        if let Err(e) = self.radio.send_chunk(&[], &eob, TX_TIMEOUT) {
            tracing::warn!(error = %e, "end-of-burst write failed");
            report.failed_writes += 1;
        }
    }

    /// Next `chunk_len` samples of the waveform, wrapping to its start.
    fn next_chunk<'a>(&'a self, offset: &mut usize, scratch: &'a mut Vec<Sample>) -> &'a [Sample] {
        let len = self.waveform.len();
        let start = *offset;
        *offset = (start + self.chunk_len) % len;

        if start + self.chunk_len <= len {
            return &self.waveform[start..start + self.chunk_len];
        }
        scratch.clear();
        scratch.extend_from_slice(&self.waveform[start..]);
        scratch.extend_from_slice(&self.waveform[..self.chunk_len - (len - start)]);
        scratch.as_slice()
    }

    /// Drain async reports until the burst is acknowledged or the link
    /// goes quiet.
    fn await_ack(&self) -> bool {
        while let Some(event) = self.radio.recv_async(TX_TIMEOUT) {
            match event {
                AsyncEvent::BurstAck => return true,
                other => tracing::debug!(event = ?other, "transmit async event"),
            }
        }
        false
    }
}
