//! Auto-quality control loop.
//!
//! Watches the smoothed frame rate and steps render quality down when the
//! target cannot be held, back up when there is headroom. Hysteresis is
//! deliberate: a degradation needs a sustained dip, a recovery needs a much
//! longer stretch of headroom, so the level never oscillates frame to frame.

/// Render quality tiers, best first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityLevel {
    /// 4x MSAA, full-resolution shadows.
    Full,
    /// Shadow map at quarter resolution.
    ReducedShadows,
    /// No MSAA, shadows off.
    Minimal,
}

impl QualityLevel {
    fn lower(self) -> Option<Self> {
        match self {
            QualityLevel::Full => Some(QualityLevel::ReducedShadows),
            QualityLevel::ReducedShadows => Some(QualityLevel::Minimal),
            QualityLevel::Minimal => None,
        }
    }

    fn higher(self) -> Option<Self> {
        match self {
            QualityLevel::Full => None,
            QualityLevel::ReducedShadows => Some(QualityLevel::Full),
            QualityLevel::Minimal => Some(QualityLevel::ReducedShadows),
        }
    }
}

const DEGRADE_FRAMES: u32 = 30;
const RECOVER_FRAMES: u32 = 180;

pub struct QualityOptimizer {
    target_fps: f32,
    running: bool,
    level: QualityLevel,
    smoothed_fps: f32,
    below_streak: u32,
    above_streak: u32,
}

impl QualityOptimizer {
    pub fn new(target_fps: f32) -> Self {
        Self {
            target_fps,
            running: false,
            level: QualityLevel::Full,
            smoothed_fps: target_fps,
            below_streak: 0,
            above_streak: 0,
        }
    }

    pub fn level(&self) -> QualityLevel {
        self.level
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn start(&mut self) {
        self.running = true;
        self.below_streak = 0;
        self.above_streak = 0;
    }

    /// Stop observing. Called before disposal so a stutter during teardown
    /// cannot trigger a level change.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn toggle(&mut self) {
        if self.running { self.stop() } else { self.start() }
    }

    /// Feed one frame interval. Returns the new level when it changed.
    pub fn observe(&mut self, frame_dt: f32) -> Option<QualityLevel> {
        if !self.running || frame_dt <= 0.0 {
            return None;
        }
        let fps = 1.0 / frame_dt;
        self.smoothed_fps = self.smoothed_fps * 0.9 + fps * 0.1;

        if self.smoothed_fps < self.target_fps * 0.9 {
            self.below_streak += 1;
            self.above_streak = 0;
        } else if self.smoothed_fps > self.target_fps * 1.1 {
            self.above_streak += 1;
            self.below_streak = 0;
        } else {
            self.below_streak = 0;
            self.above_streak = 0;
        }

        if self.below_streak >= DEGRADE_FRAMES {
            self.below_streak = 0;
            if let Some(lower) = self.level.lower() {
                self.level = lower;
                log::info!(
                    "frame rate {:.0} below target {:.0}, reducing quality to {:?}",
                    self.smoothed_fps,
                    self.target_fps,
                    lower
                );
                return Some(lower);
            }
        } else if self.above_streak >= RECOVER_FRAMES {
            self.above_streak = 0;
            if let Some(higher) = self.level.higher() {
                self.level = higher;
                log::info!("frame rate recovered, restoring quality to {higher:?}");
                return Some(higher);
            }
        }
        None
    }
}
