//! Shared run signal and control flags
//!
//! Every loop in the process polls a single [`RunSignal`]. Cancellation is
//! cooperative: blocking waits are sliced into 1-second sleeps that re-check
//! the signal, bounding shutdown latency to about a second.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Process-wide run/stop signal.
///
/// Set at startup; cleared by the command layer (user stop), the
/// orchestrator (fatal gate failure, exit-after-success), or the process
/// entry point (top-level error). Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct RunSignal {
    running: Arc<AtomicBool>,
}

impl RunSignal {
    /// Create a new signal in the "running" state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the process should keep running.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request a process-wide stop.
    pub fn clear(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Re-arm the signal. Only meaningful in tests.
    pub fn set(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Sleep for `secs` seconds in 1-second slices, re-checking the signal
    /// each slice. Returns `false` if the signal was cleared mid-sleep.
    pub async fn sleep_while_running(&self, secs: u64) -> bool {
        for _ in 0..secs {
            if !self.is_set() {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.is_set()
    }
}

impl Default for RunSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Control surface consumed by the orchestrator loop.
///
/// Producers (an interactive command layer, out of scope here) set flags;
/// the orchestrator polls them between 1-second sleep slices.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    inner: Arc<ControlInner>,
}

#[derive(Debug, Default)]
struct ControlInner {
    run_now: AtomicBool,
    stop: AtomicBool,
}

impl ControlFlags {
    /// Create a fresh set of control flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the orchestrator to short-circuit the inter-cycle wait.
    pub fn request_immediate_cycle(&self) {
        self.inner.run_now.store(true, Ordering::SeqCst);
    }

    /// Ask the orchestrator to stop after the current step.
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    /// Consume a pending run-now request, if any.
    pub fn take_run_now(&self) -> bool {
        self.inner.run_now.swap(false, Ordering::SeqCst)
    }

    /// Whether a stop was requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_starts_set() {
        let signal = RunSignal::new();
        assert!(signal.is_set());
    }

    #[test]
    fn test_clear_is_visible_through_clones() {
        let signal = RunSignal::new();
        let clone = signal.clone();
        clone.clear();
        assert!(!signal.is_set());
    }

    #[tokio::test]
    async fn test_sleep_returns_immediately_when_cleared() {
        let signal = RunSignal::new();
        signal.clear();

        let start = std::time::Instant::now();
        let alive = signal.sleep_while_running(3600).await;
        assert!(!alive);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sleep_zero_reports_signal_state() {
        let signal = RunSignal::new();
        assert!(signal.sleep_while_running(0).await);
        signal.clear();
        assert!(!signal.sleep_while_running(0).await);
    }

    #[test]
    fn test_run_now_is_consumed_once() {
        let flags = ControlFlags::new();
        assert!(!flags.take_run_now());
        flags.request_immediate_cycle();
        assert!(flags.take_run_now());
        assert!(!flags.take_run_now());
    }

    #[test]
    fn test_stop_request_sticks() {
        let flags = ControlFlags::new();
        assert!(!flags.stop_requested());
        flags.request_stop();
        assert!(flags.stop_requested());
        assert!(flags.stop_requested());
    }
}
