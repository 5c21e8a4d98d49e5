//! GPIO sequencer: drives the antenna port switch from a [`TddPlan`].
//!
//! Events go to the radio's timed-command queue, each no earlier than
//! [`GPIO_ISSUE_LEAD`] before it is due. A receive plan is a single bounded
//! sweep; a transmit plan repeats one sweep per tick until cancelled. Either
//! way the last command re-enables every port.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use duplex_core::plan::{Direction, ScheduleEvent, TddPlan};
use duplex_core::wire::GPIO_ISSUE_LEAD;
use duplex_core::DeviceTime;

use crate::radio::{GpioCommand, Radio};

pub struct GpioSequencer {
    radio: Arc<dyn Radio>,
    plan: TddPlan,
    cancel: CancellationToken,
}

impl GpioSequencer {
    pub fn new(radio: Arc<dyn Radio>, plan: TddPlan, cancel: CancellationToken) -> Self {
        Self {
            radio,
            plan,
            cancel,
        }
    }

    /// Run the plan to completion (receive) or cancellation (transmit).
    /// Returns the number of events issued, idle event included.
    pub async fn run(self) -> usize {
        self.radio.configure_ports(self.plan.all_ports);

        let issued = match self.plan.direction {
            Direction::Rx => self.run_rx().await,
            Direction::Tx => self.run_tx().await,
        };
        tracing::info!(issued, direction = ?self.plan.direction, "GPIO finished");
        issued
    }

    async fn run_rx(&self) -> usize {
        let events = self.plan.rx_events();
        let mut issued = 0;
        let (sweep, idle) = events.split_at(events.len() - 1);

        for event in sweep {
            if !self.hold_until_due(event.due_time).await {
                tracing::debug!(issued, "receive sweep cut short");
                // idle one step after the last switch that went out
                let cursor = match issued {
                    0 => self.plan.base_time,
                    n => sweep[n - 1].due_time + self.plan.step_secs(),
                };
                self.issue(self.plan.idle_event(cursor));
                return issued + 1;
            }
            self.issue(*event);
            issued += 1;
        }

        self.issue(idle[0]);
        issued + 1
    }

    async fn run_tx(&self) -> usize {
        let mut sweep_base = self.plan.base_time;
        let mut cursor = sweep_base;
        let mut issued = 0;

        while !self.cancel.is_cancelled() {
            let (events, end) = self.plan.tx_sweep(sweep_base);
            for event in events {
                self.issue(event);
                issued += 1;
            }
            cursor = end;
            sweep_base = TddPlan::next_sweep_base(sweep_base);
            tracing::trace!(next = %sweep_base, "transmit sweep queued");

            if !self.hold_until_due(sweep_base).await {
                break;
            }
        }

        self.issue(self.plan.idle_event(cursor));
        issued + 1
    }

    /// Sleep until `due - GPIO_ISSUE_LEAD`. Returns false if cancelled first.
    async fn hold_until_due(&self, due: DeviceTime) -> bool {
        let issue_at = due - GPIO_ISSUE_LEAD.as_secs_f64();
        let wait = issue_at.duration_from(self.radio.now());
        if wait.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    fn issue(&self, event: ScheduleEvent) {
        tracing::trace!(due = %event.due_time, mask = format_args!("0x{:02x}", event.port_mask), "GPIO event");
        self.radio
            .schedule(event.due_time, GpioCommand::SetPorts(event.port_mask));
    }
}
