//! Pulseline Core - beat-accurate composition and dispatch of OSC control
//! messages for live performance.
//!
//! This crate provides the building blocks for scheduling timed control
//! messages against a musical clock:
//!
//! - **Timer** - process-wide precision wait substrate, selected once at
//!   startup
//! - **Timing** - tempo clock converting beat offsets to integer ticks
//! - **Pattern** - one-shot tokenizer for parameter and address sequences
//! - **Message** - pure composition of destination-plus-arguments payloads
//! - **Sender** - per-event chainable builder with a trigger gate
//! - **Scheduler** - fire-and-forget delivery tasks and their registry
//! - **OSC** - best-effort UDP transport with timetagged bundles
//!
//! # Architecture
//!
//! A caller installs a [`TimerSubstrate`] once, threads it into a
//! [`TempoClock`], and builds one [`Sender`] per performance event. The
//! sender parses its destination template and pattern parameters up front;
//! [`Sender::out`] resolves them against an optional iteration index into a
//! [`ResolvedMessage`] and spawns an independent background task that waits
//! for the target tick and transmits. Tasks are never joined and cannot be
//! cancelled; delivery is at-most-once, with timing accuracy prioritized
//! over delivery guarantees.
//!
//! Everything runs on a single-threaded cooperative runtime: the only
//! suspension point is the scheduled wait between dispatch and delivery.
//!
//! # Feature Flags
//!
//! - `precision-timer` (default) - spin-tail waits via `spin_sleep` for
//!   sub-millisecond wake-ups

pub mod error;
pub mod message;
pub mod osc;
pub mod pattern;
pub mod scheduler;
pub mod sender;
pub mod timer;
pub mod timing;

pub use error::{ClockError, ComposeError, TransportError};
pub use message::{compose, ParamValue, ResolvedMessage};
pub use osc::OscClient;
pub use pattern::{parse_addresses, parse_numbers, PatternItem};
pub use scheduler::{DispatchId, DispatchRegistry};
pub use sender::{ParamInput, Sender};
pub use timer::{TimerBackend, TimerSubstrate};
pub use timing::{TempoClock, DEFAULT_PPQN};

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::sync::Arc;
    use std::time::Duration;

    fn started_clock(bpm: f64) -> Arc<TempoClock> {
        let clock = Arc::new(TempoClock::new(bpm, Arc::new(TimerSubstrate::install())));
        clock.start();
        clock
    }

    async fn recv_packet(receiver: UdpSocket) -> rosc::OscPacket {
        // recv on the blocking pool so the dispatch task keeps running
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 1536];
            let (size, _) = receiver.recv_from(&mut buf).expect("no packet within timeout");
            rosc::decoder::decode_udp(&buf[..size]).expect("bad packet").1
        })
        .await
        .expect("recv task")
    }

    #[tokio::test]
    async fn test_dispatch_delivers_composed_message_over_udp() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        let target = receiver.local_addr().unwrap().to_string();

        let clock = started_clock(960.0);
        let transport = Arc::new(OscClient::new(&target).unwrap());
        let registry = Arc::new(DispatchRegistry::new());

        let id = Sender::new(Arc::clone(&clock), transport, "/foo")
            .with_registry(Arc::clone(&registry))
            .speed(1.0)
            .note("60 62 64")
            .after(0.25)
            .trig(1.0)
            .out(None)
            .unwrap();
        assert!(id.is_some());

        let packet = recv_packet(receiver).await;
        let bundle = match packet {
            rosc::OscPacket::Bundle(b) => b,
            other => panic!("expected bundle, got {other:?}"),
        };
        match &bundle.content[0] {
            rosc::OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/foo");
                assert_eq!(
                    msg.args,
                    vec![rosc::OscType::Float(1.0), rosc::OscType::Float(60.0)]
                );
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_iterator_mode_end_to_end() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(3)))
            .unwrap();
        let target = receiver.local_addr().unwrap().to_string();

        let clock = started_clock(960.0);
        let transport = Arc::new(OscClient::new(&target).unwrap());

        // note sequence length 3, i = 5: remainder 2 selects element 1
        Sender::new(clock, transport, "/foo")
            .note("60 62 64")
            .trig(1.0)
            .out(Some(5))
            .unwrap();

        let packet = recv_packet(receiver).await;
        let bundle = match packet {
            rosc::OscPacket::Bundle(b) => b,
            other => panic!("expected bundle, got {other:?}"),
        };
        match &bundle.content[0] {
            rosc::OscPacket::Message(msg) => {
                assert_eq!(msg.args, vec![rosc::OscType::Float(62.0)]);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_gate_transmits_nothing() {
        let clock = started_clock(960.0);
        let transport = Arc::new(OscClient::noop());
        let registry = Arc::new(DispatchRegistry::new());

        // trigger omitted entirely
        let out = Sender::new(clock, transport, "/foo")
            .with_registry(Arc::clone(&registry))
            .note("60")
            .out(Some(1))
            .unwrap();
        assert_eq!(out, None);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.spawned(), 0);
        assert_eq!(registry.delivered(), 0);
    }

    #[tokio::test]
    async fn test_failed_dispatch_does_not_poison_the_next() {
        let registry = Arc::new(DispatchRegistry::new());
        let transport = Arc::new(OscClient::noop());

        // first dispatch waits on a clock that never started
        let stopped = Arc::new(TempoClock::new(960.0, Arc::new(TimerSubstrate::install())));
        Sender::new(stopped, Arc::clone(&transport), "/foo")
            .note("60")
            .trig(1.0)
            .with_registry(Arc::clone(&registry))
            .out(None)
            .unwrap();

        // a fresh sender on a running clock succeeds normally
        let clock = started_clock(960.0);
        Sender::new(clock, transport, "/foo")
            .note("60")
            .trig(1.0)
            .with_registry(Arc::clone(&registry))
            .out(None)
            .unwrap();

        for _ in 0..400 {
            if registry.delivered() + registry.failed() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.failed(), 1);
        assert_eq!(registry.delivered(), 1);
        assert_eq!(registry.in_flight(), 0);
    }
}
