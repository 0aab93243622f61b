//! Frame timing and load timing instrumentation.
//!
//! [`FrameTiming`] tracks render cadence and surfaces it through the window
//! title. [`TimingBreakdown`] records how long each phase of a model load
//! took; the total always covers at least the sum of the named phases since
//! phases are disjoint slices of the same load.

use instant::{Duration, Instant};
use winit::window::Window;

/// Per-frame render statistics, refreshed into the window title twice a
/// second while the UI is visible.
pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_report_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    base_title: String,
}

impl FrameTiming {
    pub fn new(base_title: impl Into<String>) -> Self {
        Self {
            last_frame_time: None,
            last_report_time: Instant::now(),
            frame_count: 0,
            frame_dt: 1.0 / 60.0,
            base_title: base_title.into(),
        }
    }

    /// Record a presented frame. When `window` is `Some`, the fps summary is
    /// written into its title.
    pub fn frame_presented(&mut self, window: Option<&Window>, now: Instant) {
        let dt = match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::from_millis(16),
        };
        self.last_frame_time = Some(now);
        self.frame_dt = dt.as_secs_f32().max(0.0);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_report_time);
        if elapsed.as_secs_f32() >= 0.5 {
            let fps = self.frame_count as f32 / elapsed.as_secs_f32();
            if let Some(window) = window {
                window.set_title(&format!(
                    "{} - {:.1} fps ({:.2} ms)",
                    self.base_title,
                    fps,
                    (self.frame_dt * 1000.0).max(0.0)
                ));
            }
            self.frame_count = 0;
            self.last_report_time = now;
        }
    }
}

/// Durations of the named load-pipeline phases plus the wall-clock total.
///
/// Invariant: `total >= import + materials + shadows + bounds + freeze`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimingBreakdown {
    pub import: Duration,
    pub materials: Duration,
    pub shadows: Duration,
    pub bounds: Duration,
    pub freeze: Duration,
    pub total: Duration,
}

impl TimingBreakdown {
    pub fn phase_sum(&self) -> Duration {
        self.import + self.materials + self.shadows + self.bounds + self.freeze
    }

    pub fn log_summary(&self, model_name: &str) {
        log::info!(
            "loaded {model_name}: total {:.1}ms (import {:.1}ms, materials {:.1}ms, shadows {:.1}ms, bounds {:.1}ms, freeze {:.1}ms)",
            self.total.as_secs_f64() * 1000.0,
            self.import.as_secs_f64() * 1000.0,
            self.materials.as_secs_f64() * 1000.0,
            self.shadows.as_secs_f64() * 1000.0,
            self.bounds.as_secs_f64() * 1000.0,
            self.freeze.as_secs_f64() * 1000.0,
        );
    }
}

/// Measure one pipeline phase and store it through `slot`.
pub(crate) fn timed<T>(slot: &mut Duration, body: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = body();
    *slot = start.elapsed();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_covers_phase_sum() {
        let mut breakdown = TimingBreakdown::default();
        timed(&mut breakdown.import, || std::thread::sleep(Duration::from_millis(2)));
        timed(&mut breakdown.bounds, || ());
        breakdown.total = breakdown.phase_sum() + Duration::from_micros(50);
        assert!(breakdown.total >= breakdown.phase_sum());
    }

    #[test]
    fn timed_records_elapsed_and_returns_value() {
        let mut slot = Duration::ZERO;
        let value = timed(&mut slot, || 7);
        assert_eq!(value, 7);
    }
}
