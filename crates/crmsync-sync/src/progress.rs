//! # Progress Reporting
//!
//! Engines report `start(label, total)`, `advance(n)` and `finish()` through
//! [`ProgressReporter`]. Reporting is advisory: it never fails a stage.

use std::sync::Mutex;

use tracing::info;

// =============================================================================
// Reporter Trait
// =============================================================================

/// Receives progress of the current stage.
pub trait ProgressReporter: Send + Sync {
    /// A stage began; `total` is the expected record count (0 if unknown).
    fn start(&self, label: &str, total: u64);

    /// `n` more records were processed.
    fn advance(&self, n: u64);

    /// The stage ended.
    fn finish(&self);
}

/// Reporter that discards everything.
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    fn start(&self, _label: &str, _total: u64) {}
    fn advance(&self, _n: u64) {}
    fn finish(&self) {}
}

// =============================================================================
// Log Reporter
// =============================================================================

#[derive(Debug, Default)]
struct LogState {
    label: String,
    total: u64,
    done: u64,
    last_decile: u64,
}

/// Reporter that logs each stage at every 10% step.
#[derive(Debug, Default)]
pub struct LogProgress {
    state: Mutex<LogState>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records processed in the current stage so far.
    pub fn done(&self) -> u64 {
        self.state.lock().map(|s| s.done).unwrap_or(0)
    }
}

impl ProgressReporter for LogProgress {
    fn start(&self, label: &str, total: u64) {
        if let Ok(mut state) = self.state.lock() {
            *state = LogState {
                label: label.to_string(),
                total,
                ..Default::default()
            };
        }
        info!(stage = label, total, "Stage started");
    }

    fn advance(&self, n: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.done += n;

        if state.total == 0 {
            return;
        }

        let decile = (state.done.min(state.total) * 10) / state.total;
        if decile > state.last_decile {
            state.last_decile = decile;
            info!(
                stage = %state.label,
                done = state.done,
                total = state.total,
                "{}%",
                decile * 10
            );
        }
    }

    fn finish(&self) {
        if let Ok(state) = self.state.lock() {
            info!(stage = %state.label, done = state.done, "Stage finished");
        }
    }
}
