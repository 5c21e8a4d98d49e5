//! Burst engines: timed transmit bursts and bounded captures.
//!
//! Both run on a blocking thread since the radio streaming calls block.

mod rx;
mod tx;

pub use rx::{capture, CaptureError, CaptureRequest, ShortfallCause};
pub use tx::{TransmitEngine, TxReport};
