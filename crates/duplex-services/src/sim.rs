//! Simulated radio: a software device for bench runs and tests.
//!
//! The clock is the host monotonic clock shifted by the PPS alignment.
//! GPIO commands are recorded instead of executed. Receive streams produce
//! a deterministic ramp (`sample n = n - jn`) starting at the requested
//! device time, paced at the configured sample rate. Transmit bursts are
//! recorded and acknowledged once their airtime has elapsed.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use duplex_core::{DeviceTime, Sample, ScheduleEvent};

use crate::radio::{
    AsyncEvent, GpioCommand, Radio, RadioError, RxChunk, RxErrorCode, RxStream, TxMetadata,
};

/// Faults the simulator can inject.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    /// Report an overflow once this many samples of a capture were delivered.
    pub rx_fail_after: Option<usize>,
    /// Fail the receive call itself once this many samples were delivered.
    pub rx_io_error_after: Option<usize>,
    /// Refuse to open receive streams.
    pub stream_in_fails: bool,
    /// Accept at most this many samples per transmit write.
    pub tx_accept_limit: Option<usize>,
    /// Never acknowledge a burst.
    pub drop_acks: bool,
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub sample_rate: f64,
    pub max_rx_samples: usize,
    pub max_tx_samples: usize,
    pub faults: SimFaults,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1e6,
            max_rx_samples: 2040,
            max_tx_samples: 2040,
            faults: SimFaults::default(),
        }
    }
}

/// One transmit burst as seen by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct TxBurst {
    pub start: Option<DeviceTime>,
    pub chunks: usize,
    pub samples: usize,
    pub first_sample: Option<Sample>,
}

#[derive(Default)]
struct SimState {
    ddr_mask: u32,
    gpio_log: Vec<ScheduleEvent>,
    bursts: Vec<TxBurst>,
    open_burst: Option<TxBurst>,
    pending: VecDeque<(DeviceTime, AsyncEvent)>,
    rx_requests: Vec<(usize, DeviceTime)>,
}

pub struct SimRadio {
    config: SimConfig,
    epoch: Mutex<Instant>,
    state: Mutex<SimState>,
}

impl SimRadio {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            epoch: Mutex::new(Instant::now()),
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep_until(&self, at: DeviceTime) {
        let wait = at.duration_from(self.now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }

    /// Every GPIO event scheduled so far, in issue order.
    pub fn gpio_events(&self) -> Vec<ScheduleEvent> {
        self.state().gpio_log.clone()
    }

    /// Switch lines configured as outputs.
    pub fn ddr_mask(&self) -> u32 {
        self.state().ddr_mask
    }

    /// Completed transmit bursts.
    pub fn bursts(&self) -> Vec<TxBurst> {
        self.state().bursts.clone()
    }

    /// `(num_samples, start)` of every capture requested.
    pub fn rx_requests(&self) -> Vec<(usize, DeviceTime)> {
        self.state().rx_requests.clone()
    }
}

impl Radio for SimRadio {
    fn now(&self) -> DeviceTime {
        let epoch = *self.epoch.lock().unwrap_or_else(|e| e.into_inner());
        DeviceTime::from_secs(epoch.elapsed().as_secs_f64())
    }

    /// No PPS input here: the edge is taken to be the moment of the call.
    fn set_time_next_pps(&self, time: DeviceTime) {
        let mut epoch = self.epoch.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        *epoch = now
            .checked_sub(Duration::from_secs_f64(time.as_secs().max(0.0)))
            .unwrap_or(now);
    }

    fn configure_ports(&self, ddr_mask: u32) {
        self.state().ddr_mask = ddr_mask;
    }

    fn schedule(&self, at: DeviceTime, cmd: GpioCommand) {
        let GpioCommand::SetPorts(mask) = cmd;
        self.state().gpio_log.push(ScheduleEvent {
            due_time: at,
            port_mask: mask,
        });
    }

    fn max_rx_samples(&self) -> usize {
        self.config.max_rx_samples
    }

    fn max_tx_samples(&self) -> usize {
        self.config.max_tx_samples
    }

    fn stream_in(
        &self,
        num_samples: usize,
        start: DeviceTime,
    ) -> Result<Box<dyn RxStream + '_>, RadioError> {
        self.state().rx_requests.push((num_samples, start));
        if self.config.faults.stream_in_fails {
            return Err(RadioError::StreamSetup("receive streamer unavailable".into()));
        }
        Ok(Box::new(SimRxStream {
            radio: self,
            start,
            requested: num_samples,
            delivered: 0,
            started: false,
        }))
    }

    fn send_chunk(
        &self,
        samples: &[Sample],
        md: &TxMetadata,
        _timeout: Duration,
    ) -> Result<usize, RadioError> {
        let accepted = samples
            .len()
            .min(self.config.faults.tx_accept_limit.unwrap_or(usize::MAX));
        let now = self.now();
        let mut state = self.state();

        if md.start_of_burst {
            if let Some(start) = md.time_spec {
                if start < now {
                    state.pending.push_back((now, AsyncEvent::TimeError));
                }
            }
            state.open_burst = Some(TxBurst {
                start: md.time_spec,
                chunks: 0,
                samples: 0,
                first_sample: samples.first().copied(),
            });
        }

        if accepted > 0 {
            let burst = state.open_burst.get_or_insert(TxBurst {
                start: None,
                chunks: 0,
                samples: 0,
                first_sample: samples.first().copied(),
            });
            burst.chunks += 1;
            burst.samples += accepted;
        }

        if md.end_of_burst {
            if let Some(burst) = state.open_burst.take() {
                let airtime = burst.samples as f64 / self.config.sample_rate;
                let done = burst.start.unwrap_or(now).latest(now) + airtime;
                if !self.config.faults.drop_acks {
                    state.pending.push_back((done, AsyncEvent::BurstAck));
                }
                state.bursts.push(burst);
            }
        }
        Ok(accepted)
    }

    fn recv_async(&self, timeout: Duration) -> Option<AsyncEvent> {
        let now = self.now();
        let deadline = now + timeout.as_secs_f64();
        let next = self.state().pending.front().copied();
        match next {
            Some((due, _)) if due <= deadline => {
                self.sleep_until(due);
                self.state().pending.pop_front().map(|(_, event)| event)
            }
            _ => {
                std::thread::sleep(timeout);
                None
            }
        }
    }
}

struct SimRxStream<'a> {
    radio: &'a SimRadio,
    start: DeviceTime,
    requested: usize,
    delivered: usize,
    started: bool,
}

impl RxStream for SimRxStream<'_> {
    fn recv(&mut self, buf: &mut [Sample], timeout: Duration) -> Result<RxChunk, RadioError> {
        let timed_out = RxChunk {
            len: 0,
            error: RxErrorCode::Timeout,
        };
        if self.delivered >= self.requested {
            std::thread::sleep(timeout);
            return Ok(timed_out);
        }

        if !self.started {
            let wait = self.start.duration_from(self.radio.now());
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(timed_out);
            }
            self.started = true;
        }

        let mut len = buf.len().min(self.requested - self.delivered);
        if let Some(limit) = self.radio.config.faults.rx_io_error_after {
            if self.delivered >= limit {
                return Err(RadioError::Io(format!("transport lost after {limit} samples")));
            }
            len = len.min(limit - self.delivered);
        }
        if let Some(limit) = self.radio.config.faults.rx_fail_after {
            if self.delivered >= limit {
                return Ok(RxChunk {
                    len: 0,
                    error: RxErrorCode::Overflow,
                });
            }
            len = len.min(limit - self.delivered);
        }

        // The last sample of this chunk is on the air at start + n / rate.
        let ready = self.start + (self.delivered + len) as f64 / self.radio.config.sample_rate;
        self.radio.sleep_until(ready);

        for (i, slot) in buf[..len].iter_mut().enumerate() {
            let n = (self.delivered + i) as f32;
            *slot = Sample::new(n, -n);
        }
        self.delivered += len;
        Ok(RxChunk {
            len,
            error: RxErrorCode::None,
        })
    }
}
