//! Process-wide precision timer selection.
//!
//! Scheduling accuracy is bounded by how precisely a task can be woken at a
//! target instant. At startup the best available wait substrate is selected
//! by probing candidates in order of expected jitter:
//!
//! 1. **Precision spin** — coarse runtime sleep to just before the deadline,
//!    then a calibrated spin for the tail (`spin_sleep`). Requires the
//!    `precision-timer` feature.
//! 2. **OS native** — absolute-deadline `clock_nanosleep` for the tail
//!    (Linux only).
//! 3. **Runtime** — the tokio timer straight to the deadline, available
//!    everywhere at roughly millisecond granularity.
//!
//! A probe that fails falls through silently to the next candidate. If
//! every probe fails, a best-effort substrate is used and a warning is
//! logged.
//!
//! The selection is process-wide: pick one substrate at startup and thread
//! it into every clock. Installing a second substrate in the same process
//! is unsupported — mixed wait behaviors mid-performance are undefined, and
//! a repeat call only logs a warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Window before the deadline handed to the tail strategy.
const TAIL: Duration = Duration::from_millis(2);

/// How the final stretch of a timed wait is performed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerBackend {
    /// Calibrated spin for the tail of each wait.
    #[cfg(feature = "precision-timer")]
    PrecisionSpin,
    /// OS absolute-deadline sleep for the tail.
    #[cfg(target_os = "linux")]
    OsNative,
    /// Plain runtime timer straight to the deadline.
    Runtime,
    /// Coarse fallback; accuracy is not guaranteed.
    BestEffort,
}

/// The wait substrate shared by every clock in the process.
#[derive(Debug)]
pub struct TimerSubstrate {
    backend: TimerBackend,
}

impl TimerSubstrate {
    /// Probe the candidate substrates, best expected jitter first, and
    /// install the winner for this process.
    pub fn install() -> Self {
        if INSTALLED.swap(true, Ordering::SeqCst) {
            log::warn!("timer substrate installed more than once; mixing substrates is unsupported");
        }

        let probes: [fn() -> Option<TimerBackend>; 3] = [
            Self::probe_precision_spin,
            Self::probe_os_native,
            Self::probe_runtime,
        ];
        for probe in probes {
            if let Some(backend) = probe() {
                let substrate = Self { backend };
                log::info!(
                    "timer substrate: {:?} (resolution ~{:?})",
                    substrate.backend,
                    substrate.resolution()
                );
                return substrate;
            }
        }

        log::warn!("no high-resolution timer available; rhythm accuracy may be degraded");
        Self::best_effort()
    }

    fn best_effort() -> Self {
        Self {
            backend: TimerBackend::BestEffort,
        }
    }

    fn probe_precision_spin() -> Option<TimerBackend> {
        #[cfg(feature = "precision-timer")]
        {
            Some(TimerBackend::PrecisionSpin)
        }
        #[cfg(not(feature = "precision-timer"))]
        {
            log::debug!("precision spin timer not compiled in");
            None
        }
    }

    fn probe_os_native() -> Option<TimerBackend> {
        #[cfg(target_os = "linux")]
        {
            // An absolute deadline in the past returns immediately when the
            // syscall is usable.
            let ts = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &ts,
                    std::ptr::null_mut(),
                )
            };
            if rc == 0 {
                Some(TimerBackend::OsNative)
            } else {
                log::debug!("clock_nanosleep probe failed (rc {rc})");
                None
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            log::debug!("no OS high-resolution timer on this platform");
            None
        }
    }

    fn probe_runtime() -> Option<TimerBackend> {
        Some(TimerBackend::Runtime)
    }

    /// The backend selected for this process.
    pub fn backend(&self) -> TimerBackend {
        self.backend
    }

    /// Expected wake-up resolution of the selected backend.
    pub fn resolution(&self) -> Duration {
        match self.backend {
            #[cfg(feature = "precision-timer")]
            TimerBackend::PrecisionSpin => Duration::from_micros(10),
            #[cfg(target_os = "linux")]
            TimerBackend::OsNative => Duration::from_micros(100),
            TimerBackend::Runtime => Duration::from_millis(1),
            TimerBackend::BestEffort => Duration::from_millis(15),
        }
    }

    /// Suspend the caller until `deadline`.
    ///
    /// The coarse stretch is always a runtime sleep so other tasks keep
    /// running; only the short tail uses the selected backend. Returns
    /// immediately for deadlines in the past.
    pub async fn sleep_until(&self, deadline: Instant) {
        if let Some(coarse) = deadline.checked_sub(TAIL) {
            let now = Instant::now();
            if coarse > now {
                tokio::time::sleep_until(tokio::time::Instant::from_std(coarse)).await;
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return;
        }
        let remaining = deadline - now;

        match self.backend {
            #[cfg(feature = "precision-timer")]
            TimerBackend::PrecisionSpin => {
                spin_sleep::SpinSleeper::default().sleep(remaining);
            }
            #[cfg(target_os = "linux")]
            TimerBackend::OsNative => Self::nanosleep_until(deadline),
            TimerBackend::Runtime | TimerBackend::BestEffort => {
                tokio::time::sleep(remaining).await;
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn nanosleep_until(deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let mut now = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut now);
        }
        let mut sec = now.tv_sec as i64 + remaining.as_secs() as i64;
        let mut nsec = now.tv_nsec as i64 + remaining.subsec_nanos() as i64;
        if nsec >= 1_000_000_000 {
            sec += 1;
            nsec -= 1_000_000_000;
        }
        let target = libc::timespec {
            tv_sec: sec as libc::time_t,
            tv_nsec: nsec as libc::c_long,
        };
        loop {
            let rc = unsafe {
                libc::clock_nanosleep(
                    libc::CLOCK_MONOTONIC,
                    libc::TIMER_ABSTIME,
                    &target,
                    std::ptr::null_mut(),
                )
            };
            if rc != libc::EINTR {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_selects_a_backend() {
        let substrate = TimerSubstrate::install();
        assert!(substrate.resolution() > Duration::ZERO);
        // installing again is tolerated (with a warning) and still usable
        let again = TimerSubstrate::install();
        assert!(again.resolution() > Duration::ZERO);
    }

    #[test]
    fn test_best_effort_fallback() {
        let substrate = TimerSubstrate::best_effort();
        assert_eq!(substrate.backend(), TimerBackend::BestEffort);
        assert_eq!(substrate.resolution(), Duration::from_millis(15));
    }

    #[tokio::test]
    async fn test_sleep_until_past_deadline_returns_immediately() {
        let substrate = TimerSubstrate::install();
        let deadline = Instant::now();
        substrate.sleep_until(deadline).await;
        assert!(deadline.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_sleep_until_reaches_deadline() {
        let substrate = TimerSubstrate::install();
        let deadline = Instant::now() + Duration::from_millis(20);
        substrate.sleep_until(deadline).await;
        assert!(Instant::now() >= deadline);
    }
}
