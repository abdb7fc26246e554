//! Error types for the pulseline-core crate.

use thiserror::Error;

/// Errors raised while composing a single outbound message.
///
/// Composition errors are scoped to the one message being built; the sender,
/// its address sequence, and any already-scheduled dispatches are unaffected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    /// A pattern element could not be coerced to a numeric argument.
    #[error("parameter '{param}': cannot convert '{token}' to a number")]
    ValueConversion { param: String, token: String },
}

/// Errors raised by the tempo clock.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// The clock is not running; pending waits cannot resolve.
    #[error("clock is stopped")]
    Stopped,
}

/// Errors raised by the OSC transport.
///
/// Delivery is best-effort and at-most-once: a failed send is reported and
/// never retried.
#[derive(Error, Debug)]
pub enum TransportError {
    /// OSC packet encoding failed.
    #[error("OSC encoding failed: {0}")]
    Encode(#[from] rosc::OscError),

    /// The underlying socket send failed.
    #[error("socket send failed: {0}")]
    Io(#[from] std::io::Error),
}
