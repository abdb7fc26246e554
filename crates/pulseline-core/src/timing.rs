//! Musical clock: beat and tick arithmetic over the installed timer
//! substrate.
//!
//! The clock maintains an anchor (a tick position at a specific instant)
//! and derives monotonic integer ticks from elapsed wall time and tempo.
//! Waits are expressed in ticks and resolved through the process-wide
//! [`TimerSubstrate`]; they resolve in non-decreasing tick order, with
//! equal-tick wake order left to runtime fairness.

use crate::error::ClockError;
use crate::timer::TimerSubstrate;
use rosc::OscTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Default pulses per quarter note.
pub const DEFAULT_PPQN: u32 = 48;

struct ClockState {
    bpm: f64,
    anchor_instant: Instant,
    anchor_tick: u64,
}

/// Tempo-aware tick clock.
///
/// Shared by `Arc` between the caller and in-flight dispatch tasks; the
/// tick counter is read-only from their perspective. Stopping the clock is
/// the only way to abort pending waits.
pub struct TempoClock {
    ppqn: u32,
    state: Mutex<ClockState>,
    running: AtomicBool,
    substrate: Arc<TimerSubstrate>,
}

impl TempoClock {
    /// Create a clock at the given tempo, stopped at tick 0, waiting on the
    /// given substrate.
    pub fn new(bpm: f64, substrate: Arc<TimerSubstrate>) -> Self {
        Self::with_ppqn(bpm, DEFAULT_PPQN, substrate)
    }

    /// Create a clock with an explicit tick density.
    pub fn with_ppqn(bpm: f64, ppqn: u32, substrate: Arc<TimerSubstrate>) -> Self {
        Self {
            ppqn: ppqn.max(1),
            state: Mutex::new(ClockState {
                bpm: bpm.clamp(1.0, 999.0),
                anchor_instant: Instant::now(),
                anchor_tick: 0,
            }),
            running: AtomicBool::new(false),
            substrate,
        }
    }

    /// Start ticking from the current anchor.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        state.anchor_instant = Instant::now();
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stop the clock, freezing the tick counter. Pending waits fail with
    /// [`ClockError::Stopped`] when they wake.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let tick = self.tick_at_locked(&state, now);
        state.anchor_tick = tick;
        state.anchor_instant = now;
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the clock is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.state.lock().unwrap().bpm
    }

    /// Change the tempo, preserving the current tick position.
    pub fn set_bpm(&self, bpm: f64) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        let tick = self.tick_at_locked(&state, now);
        state.anchor_tick = tick;
        state.anchor_instant = now;
        state.bpm = bpm.clamp(1.0, 999.0);
    }

    /// Ticks per quarter-note beat.
    pub fn ppqn(&self) -> u32 {
        self.ppqn
    }

    /// Wake-up resolution of the underlying timer substrate.
    pub fn resolution(&self) -> Duration {
        self.substrate.resolution()
    }

    /// The timer substrate this clock waits on.
    pub fn substrate(&self) -> &TimerSubstrate {
        &self.substrate
    }

    /// The tick position at a given instant.
    pub fn tick_at(&self, time: Instant) -> u64 {
        let state = self.state.lock().unwrap();
        self.tick_at_locked(&state, time)
    }

    /// The tick position now.
    pub fn current_tick(&self) -> u64 {
        self.tick_at(Instant::now())
    }

    fn tick_at_locked(&self, state: &ClockState, time: Instant) -> u64 {
        if !self.running.load(Ordering::SeqCst) || time <= state.anchor_instant {
            return state.anchor_tick;
        }
        let elapsed = time.duration_since(state.anchor_instant).as_secs_f64();
        let ticks = elapsed * (state.bpm / 60.0) * self.ppqn as f64;
        state.anchor_tick + ticks.floor() as u64
    }

    /// Absolute target tick for a beat-relative offset from now.
    ///
    /// With `sync_to_beat` false the offset is purely additive to the
    /// current tick. With it true the target is additionally rounded up to
    /// the next beat boundary.
    pub fn ticks_for(&self, offset_beats: f64, sync_to_beat: bool) -> u64 {
        let state = self.state.lock().unwrap();
        let now_tick = self.tick_at_locked(&state, Instant::now());
        let offset_ticks = (offset_beats.max(0.0) * self.ppqn as f64).round() as u64;
        let target = now_tick + offset_ticks;
        if sync_to_beat {
            let ppqn = self.ppqn as u64;
            ((target + ppqn - 1) / ppqn) * ppqn
        } else {
            target
        }
    }

    fn instant_for(&self, tick: u64) -> Instant {
        let state = self.state.lock().unwrap();
        let ahead = tick.saturating_sub(state.anchor_tick);
        let secs = ahead as f64 * 60.0 / (state.bpm * self.ppqn as f64);
        state.anchor_instant + Duration::from_secs_f64(secs)
    }

    /// Suspend the caller until the given tick is reached.
    ///
    /// Fails with [`ClockError::Stopped`] if the clock is not running when
    /// the wait starts or has been stopped by the time it wakes. A tempo
    /// change during the wait does not retime it.
    pub async fn wait_until(&self, tick: u64) -> Result<(), ClockError> {
        if !self.is_running() {
            return Err(ClockError::Stopped);
        }
        let deadline = self.instant_for(tick);
        self.substrate.sleep_until(deadline).await;
        if !self.is_running() {
            return Err(ClockError::Stopped);
        }
        Ok(())
    }

    /// NTP timetag for "now plus `ahead`", for outbound bundle scheduling.
    pub fn osc_time(&self, ahead: Duration) -> OscTime {
        let elapsed = (SystemTime::now() + ahead)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        let ntp_seconds_total = elapsed.as_secs() + 2_208_988_800;
        let ntp_seconds = (ntp_seconds_total % (u32::MAX as u64 + 1)) as u32;
        let fractional = ((elapsed.subsec_nanos() as u64) << 32) / 1_000_000_000u64;
        OscTime::from((ntp_seconds, fractional as u32))
    }
}

impl std::fmt::Debug for TempoClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempoClock")
            .field("bpm", &self.bpm())
            .field("ppqn", &self.ppqn)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_clock(bpm: f64) -> TempoClock {
        TempoClock::new(bpm, Arc::new(TimerSubstrate::install()))
    }

    #[test]
    fn test_stopped_clock_does_not_tick() {
        let clock = test_clock(120.0);
        assert_eq!(clock.tick_at(Instant::now() + Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_tick_arithmetic_at_known_tempo() {
        let clock = test_clock(120.0);
        clock.start();
        // At 120 BPM one beat is 0.5s: one second ahead is two beats.
        let ahead = Instant::now() + Duration::from_secs(1);
        let ticks = clock.tick_at(ahead);
        let expected = 2 * DEFAULT_PPQN as u64;
        assert!(
            ticks >= expected - 2 && ticks <= expected + 2,
            "got {ticks}, expected ~{expected}"
        );
    }

    #[test]
    fn test_ticks_for_is_additive_without_sync() {
        let clock = test_clock(120.0);
        clock.start();
        let target = clock.ticks_for(1.0, false);
        let now = clock.current_tick();
        let delta = target - now;
        let ppqn = DEFAULT_PPQN as u64;
        assert!(
            delta >= ppqn - 2 && delta <= ppqn + 2,
            "delta {delta} not ~{ppqn}"
        );
    }

    #[test]
    fn test_ticks_for_sync_rounds_to_beat_boundary() {
        let clock = test_clock(120.0);
        clock.start();
        let target = clock.ticks_for(0.5, true);
        assert_eq!(target % DEFAULT_PPQN as u64, 0);
        assert!(target >= clock.current_tick());
    }

    #[test]
    fn test_set_bpm_preserves_tick_position() {
        let clock = test_clock(120.0);
        clock.start();
        let before = clock.current_tick();
        clock.set_bpm(240.0);
        let after = clock.current_tick();
        assert!(after >= before);
        assert!(after - before < DEFAULT_PPQN as u64, "tick jumped on tempo change");
    }

    #[test]
    fn test_stop_freezes_tick() {
        let clock = test_clock(120.0);
        clock.start();
        clock.stop();
        let frozen = clock.current_tick();
        assert_eq!(clock.tick_at(Instant::now() + Duration::from_secs(2)), frozen);
    }

    #[tokio::test]
    async fn test_wait_until_on_stopped_clock_fails() {
        let clock = test_clock(120.0);
        assert_eq!(clock.wait_until(10).await, Err(ClockError::Stopped));
    }

    #[tokio::test]
    async fn test_wait_until_elapses() {
        let clock = test_clock(960.0);
        clock.start();
        // Half a beat at 960 BPM is ~31ms.
        let target = clock.ticks_for(0.5, false);
        let started = Instant::now();
        clock.wait_until(target).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20), "woke early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "woke late: {elapsed:?}");
    }
}
