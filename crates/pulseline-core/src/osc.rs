//! OSC (Open Sound Control) client for message delivery.
//!
//! A simple UDP-based client. Delivery is best-effort and at-most-once:
//! each resolved message is encoded as a bundle timetagged a small nudge
//! ahead of now — so the receiver can align it despite network jitter — and
//! fired exactly once, with no acknowledgment and no retry.

use crate::error::TransportError;
use crate::timing::TempoClock;
use anyhow::Result;
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

/// Default scheduling nudge applied to outbound timetags.
const DEFAULT_NUDGE: Duration = Duration::from_millis(20);

/// UDP-based OSC client.
#[derive(Clone)]
pub struct OscClient {
    /// The underlying UDP socket (None in noop mode).
    sock: Option<Arc<UdpSocket>>,
    /// Target address in "host:port" format.
    pub addr: String,
    /// Latency compensation added to every outbound timetag.
    nudge: Duration,
}

impl OscClient {
    /// Create a new client targeting the given "host:port" address, bound
    /// to an ephemeral local port.
    pub fn new<A: Into<String>>(addr: A) -> Result<Self> {
        let sock = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            sock: Some(Arc::new(sock)),
            addr: addr.into(),
            nudge: DEFAULT_NUDGE,
        })
    }

    /// Create a no-op client for validation and tests.
    ///
    /// All sends succeed but nothing is transmitted.
    pub fn noop() -> Self {
        Self {
            sock: None,
            addr: "noop".to_string(),
            nudge: DEFAULT_NUDGE,
        }
    }

    /// Check if this client is in noop mode.
    pub fn is_noop(&self) -> bool {
        self.sock.is_none()
    }

    /// Override the timetag nudge.
    pub fn with_nudge(mut self, nudge: Duration) -> Self {
        self.nudge = nudge;
        self
    }

    /// Send one resolved message.
    ///
    /// Arguments are sent as 32-bit floats, the numeric type control
    /// surfaces expect. The clock supplies the NTP time for the bundle
    /// timetag.
    pub fn send(
        &self,
        clock: &TempoClock,
        destination: &str,
        args: &[f64],
    ) -> Result<(), TransportError> {
        let sock = match &self.sock {
            Some(s) => s,
            None => return Ok(()), // noop mode
        };
        let msg = OscMessage {
            addr: destination.to_string(),
            args: args.iter().map(|a| OscType::Float(*a as f32)).collect(),
        };
        let bundle = OscBundle {
            timetag: clock.osc_time(self.nudge),
            content: vec![OscPacket::Message(msg)],
        };
        let buf = encoder::encode(&OscPacket::Bundle(bundle))?;
        sock.send_to(&buf, &self.addr)?;
        Ok(())
    }
}

impl std::fmt::Debug for OscClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscClient")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}
