//! duplex-core: shared types, control wire format, schedule generation and
//! configuration. All other duplex crates depend on this one.

pub mod config;
pub mod plan;
pub mod samples;
pub mod time;
pub mod wire;

pub use plan::{Direction, ScheduleEvent, TddPlan};
pub use samples::Sample;
pub use time::DeviceTime;
pub use wire::{ControlOpcode, StatusNotice};
