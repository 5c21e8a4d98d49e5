//! Session coordinator: one per control connection.
//!
//! Reads opcodes from the control link, starts and stops the transmit and
//! receive sessions, and reports progress back as single status bytes.
//! At most one session runs at a time:
//!
//! ```text
//!   Idle ──start-tx──▶ Transmitting ──stop-tx──▶ Idle
//!   Idle ──start-rx──▶ Receiving ──(capture forwarded / failed)──▶ Idle
//! ```
//!
//! Each session owns a child of the coordinator's shutdown token, so a
//! daemon-wide shutdown reaches running workers without going through the
//! control link.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use duplex_core::config::{SessionConfig, TddConfig};
use duplex_core::samples::write_samples;
use duplex_core::time::next_stream_time;
use duplex_core::wire::CONTROL_READ_BYTES;
use duplex_core::{ControlOpcode, DeviceTime, Direction, Sample, StatusNotice, TddPlan};

use crate::burst::{capture, CaptureRequest, TransmitEngine, TxReport};
use crate::forward::Forwarder;
use crate::gpio::GpioSequencer;
use crate::radio::Radio;

/// Everything a session needs, fixed at daemon startup.
pub struct SessionContext {
    pub radio: Arc<dyn Radio>,
    pub sample_rate: f64,
    pub tdd: TddConfig,
    pub directions: SessionConfig,
    /// Transmit waveform. `None` when transmit is disabled.
    pub waveform: Option<Arc<[Sample]>>,
    pub forwarder: Arc<Forwarder>,
    pub rx_file: Option<PathBuf>,
}

impl SessionContext {
    /// Switching plan for a session whose streams start at `stream_time`.
    /// The first switch lands after the settle prefix.
    pub fn plan(&self, direction: Direction, stream_time: DeviceTime) -> TddPlan {
        TddPlan {
            tx_ports: self.tdd.tx_ports,
            rx_ports: self.tdd.rx_ports,
            samples_per_switch: self.tdd.samples_per_switch,
            sample_rate: self.sample_rate,
            base_time: stream_time + self.tdd.delay_samples as f64 / self.sample_rate,
            direction,
            all_ports: self.tdd.port_mask,
        }
    }

    /// Samples per transmit write.
    pub fn tx_chunk_len(&self) -> usize {
        let waveform_len = self.waveform.as_ref().map_or(usize::MAX, |w| w.len());
        self.radio
            .max_tx_samples()
            .min(self.tdd.samples_per_switch)
            .min(waveform_len)
            .max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Transmitting,
    Receiving,
}

/// How a receive session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RxOutcome {
    Delivered { samples: usize, packets: usize },
    Failed(String),
    /// The control link went away before forwarding.
    Aborted,
}

impl RxOutcome {
    fn notice(&self) -> Option<StatusNotice> {
        match self {
            RxOutcome::Delivered { .. } => Some(StatusNotice::RxDone),
            RxOutcome::Failed(_) => Some(StatusNotice::RxFailed),
            RxOutcome::Aborted => None,
        }
    }
}

struct TxSession {
    cancel: CancellationToken,
    gpio: JoinHandle<usize>,
    burst: JoinHandle<TxReport>,
}

struct RxSession {
    cancel: CancellationToken,
    task: JoinHandle<RxOutcome>,
}

enum Active {
    Idle,
    Transmitting(TxSession),
    Receiving(RxSession),
}

pub struct Coordinator {
    ctx: Arc<SessionContext>,
    shutdown: CancellationToken,
    active: Active,
}

impl Coordinator {
    pub fn new(ctx: Arc<SessionContext>, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            shutdown,
            active: Active::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.active {
            Active::Idle => SessionState::Idle,
            Active::Transmitting(_) => SessionState::Transmitting,
            Active::Receiving(_) => SessionState::Receiving,
        }
    }

    /// Drive the control link until the peer disconnects or shutdown is
    /// requested. Any running session is stopped before returning.
    pub async fn serve<S>(mut self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        notify(&mut writer, StatusNotice::Connected)
            .await
            .context("failed to greet control peer")?;

        let mut buf = [0u8; CONTROL_READ_BYTES];
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("shutdown requested, closing control session");
                    break;
                }
                outcome = receive_finished(&mut self.active) => {
                    self.active = Active::Idle;
                    tracing::info!(?outcome, "receive session finished");
                    if let Some(notice) = outcome.notice() {
                        if let Err(e) = notify(&mut writer, notice).await {
                            tracing::warn!(error = %e, "status write failed");
                            break;
                        }
                    }
                }
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::info!("control peer disconnected");
                        break;
                    }
                    Ok(n) => {
                        if let Some(notice) = self.handle(&buf[..n]).await {
                            if let Err(e) = notify(&mut writer, notice).await {
                                tracing::warn!(error = %e, "status write failed");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "control read failed");
                        break;
                    }
                },
            }
        }

        self.teardown().await;
        Ok(())
    }

    /// Apply one control message. Returns the status byte to send, if any.
    async fn handle(&mut self, payload: &[u8]) -> Option<StatusNotice> {
        let opcode = match ControlOpcode::parse(payload) {
            Ok(op) => op,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring control message");
                return None;
            }
        };

        match (opcode, self.state()) {
            (ControlOpcode::StartTx, SessionState::Idle) => self.start_transmit(),
            (ControlOpcode::StartRx, SessionState::Idle) => {
                self.start_receive();
                None
            }
            (ControlOpcode::StopTx, SessionState::Transmitting) => {
                self.stop().await;
                Some(StatusNotice::TxStopped)
            }
            (ControlOpcode::StopTx, SessionState::Idle) => {
                tracing::debug!("stop-tx while idle");
                None
            }
            (opcode, state) => {
                tracing::warn!(%opcode, ?state, "opcode ignored in current state");
                None
            }
        }
    }

    fn start_transmit(&mut self) -> Option<StatusNotice> {
        let waveform = match (&self.ctx.waveform, self.ctx.directions.transmit) {
            (Some(w), true) => w.clone(),
            _ => {
                tracing::warn!("transmit is disabled, ignoring start-tx");
                return None;
            }
        };

        let stream_time = next_stream_time(self.ctx.radio.now());
        let cancel = self.shutdown.child_token();
        let chunk_len = self.ctx.tx_chunk_len();
        let chunks = self.ctx.tdd.chunks_per_burst(waveform.len());

        let plan = self.ctx.plan(Direction::Tx, stream_time);
        let gpio = tokio::spawn(GpioSequencer::new(self.ctx.radio.clone(), plan, cancel.clone()).run());

        let engine = TransmitEngine::new(
            self.ctx.radio.clone(),
            waveform,
            chunk_len,
            chunks,
            cancel.clone(),
        );
        let burst = tokio::task::spawn_blocking(move || engine.run(stream_time));

        tracing::info!(%stream_time, chunk_len, chunks, "transmit session started");
        self.active = Active::Transmitting(TxSession { cancel, gpio, burst });
        Some(StatusNotice::TxStarted)
    }

    fn start_receive(&mut self) {
        if !self.ctx.directions.receive {
            tracing::warn!("receive is disabled, ignoring start-rx");
            return;
        }

        let req = CaptureRequest {
            total_samples: self.ctx.tdd.total_num_samples(),
            delay_samples: self.ctx.tdd.delay_samples,
            stream_time: next_stream_time(self.ctx.radio.now()),
        };
        let cancel = self.shutdown.child_token();
        tracing::info!(
            stream_time = %req.stream_time,
            total_samples = req.total_samples,
            "receive session started"
        );
        let task = tokio::spawn(run_receive(self.ctx.clone(), req, cancel.clone()));
        self.active = Active::Receiving(RxSession { cancel, task });
    }

    /// Cancel the running session, if any, and wait for its workers.
    async fn stop(&mut self) {
        match std::mem::replace(&mut self.active, Active::Idle) {
            Active::Idle => {}
            Active::Transmitting(tx) => {
                tx.cancel.cancel();
                match tx.gpio.await {
                    Ok(issued) => tracing::debug!(issued, "GPIO sequencer joined"),
                    Err(e) => tracing::warn!(error = %e, "GPIO sequencer task failed"),
                }
                match tx.burst.await {
                    Ok(report) => tracing::info!(bursts = report.bursts, acked = report.acked, "transmit session stopped"),
                    Err(e) => tracing::warn!(error = %e, "transmit task failed"),
                }
            }
            Active::Receiving(rx) => {
                rx.cancel.cancel();
                match rx.task.await {
                    Ok(outcome) => tracing::info!(?outcome, "receive session stopped"),
                    Err(e) => tracing::warn!(error = %e, "receive task failed"),
                }
            }
        }
    }

    async fn teardown(&mut self) {
        if !matches!(self.active, Active::Idle) {
            tracing::info!(state = ?self.state(), "stopping session on disconnect");
        }
        self.stop().await;
    }
}

async fn notify<W: AsyncWrite + Unpin>(writer: &mut W, notice: StatusNotice) -> std::io::Result<()> {
    tracing::debug!(%notice, "status");
    writer.write_all(&[notice.as_byte()]).await?;
    writer.flush().await
}

/// Resolves when the running receive session finishes. Pending otherwise.
async fn receive_finished(active: &mut Active) -> RxOutcome {
    match active {
        Active::Receiving(rx) => match (&mut rx.task).await {
            Ok(outcome) => outcome,
            Err(e) => RxOutcome::Failed(format!("receive task failed: {e}")),
        },
        _ => std::future::pending().await,
    }
}

async fn run_receive(ctx: Arc<SessionContext>, req: CaptureRequest, cancel: CancellationToken) -> RxOutcome {
    let plan = ctx.plan(Direction::Rx, req.stream_time);
    let gpio_cancel = cancel.child_token();
    let gpio = tokio::spawn(GpioSequencer::new(ctx.radio.clone(), plan, gpio_cancel.clone()).run());

    let radio = ctx.radio.clone();
    let captured = tokio::task::spawn_blocking(move || capture(radio.as_ref(), &req)).await;
    if !matches!(captured, Ok(Ok(_))) {
        gpio_cancel.cancel();
    }
    if let Err(e) = gpio.await {
        tracing::warn!(error = %e, "GPIO sequencer task failed");
    }

    let samples: Arc<[Sample]> = match captured {
        Ok(Ok(samples)) => samples.into(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "capture failed");
            return RxOutcome::Failed(e.to_string());
        }
        Err(e) => return RxOutcome::Failed(format!("capture task failed: {e}")),
    };

    if let Some(path) = &ctx.rx_file {
        persist(path.clone(), samples.clone()).await;
    }

    if cancel.is_cancelled() {
        tracing::info!(samples = samples.len(), "control link closed, capture not forwarded");
        return RxOutcome::Aborted;
    }

    let report = ctx.forwarder.forward(&samples).await;
    RxOutcome::Delivered {
        samples: report.samples,
        packets: report.packets,
    }
}

async fn persist(path: PathBuf, samples: Arc<[Sample]>) {
    let result = tokio::task::spawn_blocking(move || write_samples(&path, &samples).map(|_| path)).await;
    match result {
        Ok(Ok(path)) => tracing::info!(path = %path.display(), "capture written"),
        Ok(Err(e)) => tracing::warn!(error = %e, "failed to write capture file"),
        Err(e) => tracing::warn!(error = %e, "capture write task failed"),
    }
}
