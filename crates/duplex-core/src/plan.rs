//! TDD switching plan: the deterministic GPIO schedule for one session.
//!
//! A [`TddPlan`] fully determines the ordered sequence of port-switch
//! events. Nothing here talks to a device; the sequencer in
//! `duplex-services` hands these events to the radio's timed-command queue.

use crate::time::{DeviceTime, TICK_SECS};

/// Port enumeration on the paired decoder is interleaved, so each port's
/// window covers twice `samples_per_switch`. Downstream decoders depend on
/// this multiplier; it is part of the wire behaviour.
pub const SWITCH_INTERLEAVE: f64 = 2.0;

/// Default GPIO lines driven by the port switch (front panel bank, 8 lines).
pub const DEFAULT_PORT_MASK: u32 = 0xFF;

/// Which burst a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// One timed write of the GPIO output register.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEvent {
    pub due_time: DeviceTime,
    pub port_mask: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TddPlan {
    pub tx_ports: usize,
    pub rx_ports: usize,
    pub samples_per_switch: usize,
    /// Samples per second.
    pub sample_rate: f64,
    /// Due time of the first switch event.
    pub base_time: DeviceTime,
    pub direction: Direction,
    /// Lines owned by the switch. "All ports enabled" is this mask.
    pub all_ports: u32,
}

impl TddPlan {
    /// Window length of one port in a receive sweep.
    pub fn step_secs(&self) -> f64 {
        self.samples_per_switch as f64 * SWITCH_INTERLEAVE / self.sample_rate
    }

    /// Window length of one transmit port: a transmit port stays selected
    /// while the far end cycles through all of its receive ports.
    pub fn tx_step_secs(&self) -> f64 {
        self.step_secs() * self.rx_ports as f64
    }

    /// Bit of `all_ports` that drives `port`: ports map onto the set bits
    /// of the mask, lowest first.
    pub fn port_line(&self, port: usize) -> Option<u32> {
        (0..u32::BITS)
            .filter(|bit| self.all_ports & (1u32 << bit) != 0)
            .nth(port)
    }

    /// Mask that selects exactly `port` (its line pulled low). A port past
    /// the last line selects nothing.
    pub fn select_mask(&self, port: usize) -> u32 {
        match self.port_line(port) {
            Some(bit) => self.all_ports & !(1u32 << bit),
            None => self.all_ports,
        }
    }

    /// Complete receive-direction schedule: `tx_ports * rx_ports` switch
    /// events followed by the idle event.
    pub fn rx_events(&self) -> Vec<ScheduleEvent> {
        let step = self.step_secs();
        let mut cursor = self.base_time;
        let mut events = Vec::with_capacity(self.tx_ports * self.rx_ports + 1);

        for _ in 0..self.tx_ports {
            for port in 0..self.rx_ports {
                events.push(ScheduleEvent {
                    due_time: cursor,
                    port_mask: self.select_mask(port),
                });
                cursor += step;
            }
        }
        events.push(self.idle_event(cursor));
        events
    }

    /// One transmit sweep starting at `sweep_base`. Returns the events and
    /// the cursor just past the last window.
    pub fn tx_sweep(&self, sweep_base: DeviceTime) -> (Vec<ScheduleEvent>, DeviceTime) {
        let step = self.tx_step_secs();
        let mut cursor = sweep_base;
        let mut events = Vec::with_capacity(self.tx_ports);

        for port in 0..self.tx_ports {
            events.push(ScheduleEvent {
                due_time: cursor,
                port_mask: self.select_mask(port),
            });
            cursor += step;
        }
        (events, cursor)
    }

    /// Base of the sweep that follows the one starting at `sweep_base`.
    pub fn next_sweep_base(sweep_base: DeviceTime) -> DeviceTime {
        sweep_base + TICK_SECS
    }

    /// Final "all ports enabled" event, one step after `cursor`. Issued on
    /// every exit path so the front end is left in a known state.
    pub fn idle_event(&self, cursor: DeviceTime) -> ScheduleEvent {
        ScheduleEvent {
            due_time: cursor + self.step_secs(),
            port_mask: self.all_ports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(tx_ports: usize, rx_ports: usize, direction: Direction) -> TddPlan {
        TddPlan {
            tx_ports,
            rx_ports,
            samples_per_switch: 256,
            sample_rate: 1e6,
            base_time: DeviceTime::from_secs(3.2),
            direction,
            all_ports: DEFAULT_PORT_MASK,
        }
    }

    #[test]
    fn rx_schedule_shape() {
        for (tx, rx) in [(1, 1), (2, 3), (8, 8), (4, 1)] {
            let p = plan(tx, rx, Direction::Rx);
            let events = p.rx_events();
            assert_eq!(events.len(), tx * rx + 1);

            for pair in events.windows(2) {
                assert!(pair[1].due_time > pair[0].due_time, "due times must increase");
            }
            for e in &events[..tx * rx] {
                let cleared = (!e.port_mask & DEFAULT_PORT_MASK).count_ones();
                assert_eq!(cleared, 1, "exactly one port selected");
            }
            assert_eq!(events.last().unwrap().port_mask, DEFAULT_PORT_MASK);
        }
    }

    #[test]
    fn rx_schedule_round_robins_rx_ports() {
        let p = plan(2, 3, Direction::Rx);
        let masks: Vec<u32> = p.rx_events().iter().map(|e| e.port_mask).collect();
        assert_eq!(masks, vec![0xFE, 0xFD, 0xFB, 0xFE, 0xFD, 0xFB, 0xFF]);
    }

    #[test]
    fn rx_step_uses_interleave_factor() {
        let p = plan(1, 2, Direction::Rx);
        let events = p.rx_events();
        let step = events[1].due_time.secs_since(events[0].due_time);
        assert!((step - 512e-6).abs() < 1e-12);
        // idle event lands one step after the cursor, i.e. two after the last switch
        let tail = events[2].due_time.secs_since(events[1].due_time);
        assert!((tail - 2.0 * 512e-6).abs() < 1e-12);
    }

    #[test]
    fn tx_sweep_spans_rx_ports() {
        let p = plan(4, 8, Direction::Tx);
        let (events, cursor) = p.tx_sweep(p.base_time);
        assert_eq!(events.len(), 4);
        assert_eq!(events[2].port_mask, 0xFB);
        let span = cursor.secs_since(p.base_time);
        assert!((span - 4.0 * 8.0 * 512e-6).abs() < 1e-12);
    }

    #[test]
    fn ports_map_onto_mask_lines() {
        let mut p = plan(2, 4, Direction::Rx);
        p.all_ports = 0xF0;
        let events = p.rx_events();
        let masks: Vec<u32> = events.iter().map(|e| e.port_mask).collect();
        assert_eq!(masks, vec![0xE0, 0xD0, 0xB0, 0x70, 0xE0, 0xD0, 0xB0, 0x70, 0xF0]);
        for e in &events[..8] {
            assert_eq!((!e.port_mask & 0xF0).count_ones(), 1);
        }

        p.all_ports = 0b1010_0101;
        assert_eq!(p.port_line(0), Some(0));
        assert_eq!(p.port_line(1), Some(2));
        assert_eq!(p.port_line(3), Some(7));
        assert_eq!(p.port_line(4), None);
        let (tx, _) = p.tx_sweep(p.base_time);
        assert_eq!(tx[1].port_mask, 0b1010_0001);
    }

    #[test]
    fn next_sweep_is_one_tick_later() {
        let base = DeviceTime::from_secs(1.0);
        let next = TddPlan::next_sweep_base(base);
        assert!((next.secs_since(base) - TICK_SECS).abs() < 1e-12);
    }
}
