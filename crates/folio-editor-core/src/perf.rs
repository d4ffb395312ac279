//! Timing for editor operations that touch the whole document.
//!
//! `web-time` gives us `Performance.now()` in the browser and `Instant` on
//! native builds, so the same code runs in both.

use std::sync::OnceLock;

use web_time::Instant;

/// One animation frame at 60 Hz, in milliseconds.
pub const FRAME_BUDGET_MS: f64 = 16.0;

/// Milliseconds since the first call in this process.
pub fn now() -> f64 {
    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_secs_f64() * 1000.0
}

/// Logs how long an operation took when dropped.
///
/// With a budget set, overruns are logged as warnings instead of debug
/// events. `items` is attached to the event when recorded.
pub struct TimingGuard {
    label: &'static str,
    start: f64,
    budget_ms: Option<f64>,
    items: Option<usize>,
}

impl TimingGuard {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            start: now(),
            budget_ms: None,
            items: None,
        }
    }

    /// Time an operation that should finish within one frame.
    pub fn per_frame(label: &'static str) -> Self {
        Self {
            budget_ms: Some(FRAME_BUDGET_MS),
            ..Self::new(label)
        }
    }

    /// Number of blocks, nodes or bytes the operation handled.
    pub fn record(&mut self, items: usize) {
        self.items = Some(items);
    }

    pub fn elapsed_ms(&self) -> f64 {
        now() - self.start
    }

    fn over_budget(&self, elapsed_ms: f64) -> bool {
        self.budget_ms.is_some_and(|budget| elapsed_ms > budget)
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.elapsed_ms();
        let items = self.items.unwrap_or_default();
        if self.over_budget(elapsed_ms) {
            tracing::warn!(elapsed_ms, items, "{} ran over its frame", self.label);
        } else {
            tracing::debug!(elapsed_ms, items, "{}", self.label);
        }
    }
}
