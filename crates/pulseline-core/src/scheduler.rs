//! Fire-and-forget dispatch of composed messages.
//!
//! Each dispatch spawns one independent background task that waits for its
//! target tick and then transmits. The engine never joins or awaits these
//! tasks, and no cancellation is exposed: once scheduled, a dispatch cannot
//! be withdrawn. Failures inside a task — a stopped clock, a refused send —
//! are logged and recorded, and never reach the caller or any other pending
//! dispatch.

use crate::message::ResolvedMessage;
use crate::osc::OscClient;
use crate::timing::TempoClock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_DISPATCH: AtomicU64 = AtomicU64::new(0);

fn next_dispatch_id() -> DispatchId {
    DispatchId(NEXT_DISPATCH.fetch_add(1, Ordering::Relaxed) + 1)
}

/// Identifier of one background delivery task. Unique per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DispatchId(u64);

impl DispatchId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DispatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Counters and in-flight ids for scheduled dispatches.
///
/// Purely observational — for tests and status displays. The registry
/// exposes no way to cancel or reschedule anything.
#[derive(Debug, Default)]
pub struct DispatchRegistry {
    in_flight: Mutex<HashSet<u64>>,
    spawned: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn track(&self, id: DispatchId) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.in_flight.lock().unwrap().insert(id.0);
    }

    fn finish(&self, id: DispatchId, delivered: bool) {
        self.in_flight.lock().unwrap().remove(&id.0);
        if delivered {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of dispatches currently waiting or sending.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Ids of dispatches currently waiting or sending.
    pub fn in_flight_ids(&self) -> Vec<DispatchId> {
        self.in_flight.lock().unwrap().iter().copied().map(DispatchId).collect()
    }

    /// Total dispatches ever tracked.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Dispatches that completed their send.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Dispatches that failed in their wait or send.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Spawn the background task for one dispatch.
///
/// Must be called from within a tokio runtime.
pub(crate) fn spawn_dispatch(
    clock: Arc<TempoClock>,
    transport: Arc<OscClient>,
    registry: Option<Arc<DispatchRegistry>>,
    tick: u64,
    message: ResolvedMessage,
) -> DispatchId {
    let id = next_dispatch_id();
    if let Some(reg) = &registry {
        reg.track(id);
    }
    log::debug!("dispatch {id}: {} at tick {tick}", message.destination);

    tokio::spawn(async move {
        let delivered = deliver(&clock, &transport, tick, &message, id).await;
        if let Some(reg) = &registry {
            reg.finish(id, delivered);
        }
    });

    id
}

async fn deliver(
    clock: &TempoClock,
    transport: &OscClient,
    tick: u64,
    message: &ResolvedMessage,
    id: DispatchId,
) -> bool {
    if let Err(e) = clock.wait_until(tick).await {
        log::error!("dispatch {id}: wait for tick {tick} failed: {e}");
        return false;
    }
    if let Err(e) = transport.send(clock, &message.destination, &message.args) {
        log::error!("dispatch {id}: send to {} failed: {e}", message.destination);
        return false;
    }
    log::trace!("dispatch {id}: delivered to {}", message.destination);
    true
}
