//! Control events delivered to the shim run loop
//!
//! Everything that can wake the run loop travels over one channel as a
//! [`ShimEvent`]: collection requests and end-of-input from the signal
//! listener, and fatal output failures from the accumulator.

use crate::error::WriteError;

#[derive(Debug)]
pub enum ShimEvent {
    /// A line arrived on the control stream; gather right away
    CollectNow,
    /// The control stream reached end-of-input
    Shutdown,
    /// Writing to the output stream failed; the host is gone
    WriteFailed(WriteError),
}

impl ShimEvent {
    /// Whether this event ends the running state of the loop
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShimEvent::Shutdown | ShimEvent::WriteFailed(_))
    }
}
