//! duplex-services: radio abstraction, schedulers and session handling
//! for the duplex daemon.

pub mod burst;
pub mod control;
pub mod forward;
pub mod gpio;
pub mod radio;
pub mod session;
pub mod sim;

pub use burst::{capture, CaptureError, CaptureRequest, TransmitEngine, TxReport};
pub use control::ControlServer;
pub use forward::{ForwardReport, Forwarder};
pub use gpio::GpioSequencer;
pub use radio::{Radio, RadioError};
pub use session::{Coordinator, RxOutcome, SessionContext, SessionState};
pub use sim::{SimConfig, SimFaults, SimRadio};
