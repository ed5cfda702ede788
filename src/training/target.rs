//! Incoming punch targets and their per-tick lifecycle.

use serde::Serialize;

use super::config::TrainingConfig;
use super::motion::MotionMask;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn from_x(x: f64) -> Self {
        if x < 50.0 { Side::Left } else { Side::Right }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetState {
    Pending,
    Approaching,
    InRange,
    Hit,
    /// Passed through the hit window without enough motion.
    Missed,
    /// Flew past without ever being sampled against a real motion mask.
    Expired,
}

impl TargetState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetState::Hit | TargetState::Missed | TargetState::Expired)
    }
}

/// Result of advancing a single target by one tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetEvent {
    None,
    Hit { motion: usize },
    Missed,
    Expired,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    pub id: u64,
    pub label: String,
    pub side: Side,
    /// Percent screen space, fixed at spawn.
    x: f64,
    y: f64,
    scale: f64,
    state: TargetState,
    pub spawned_ms: f64,
    resolved_ms: Option<f64>,
    sampled: bool,
}

impl Target {
    pub fn new(id: u64, label: impl Into<String>, x: f64, y: f64, spawned_ms: f64) -> Self {
        Self {
            id,
            label: label.into(),
            side: Side::from_x(x),
            x,
            y,
            scale: 0.0,
            state: TargetState::Pending,
            spawned_ms,
            resolved_ms: None,
            sampled: false,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn resolved_ms(&self) -> Option<f64> {
        self.resolved_ms
    }

    /// Grid cell under the target. The camera preview is mirrored, so the
    /// x axis is flipped before indexing the mask.
    pub fn grid_point(&self, grid_w: u32, grid_h: u32) -> (f64, f64) {
        let gx = (100.0 - self.x) / 100.0 * grid_w as f64;
        let gy = self.y / 100.0 * grid_h as f64;
        (gx, gy)
    }

    /// Advance one tick. `mask` is `None` on ticks where no motion data was
    /// available; the target still moves but cannot be hit.
    pub fn advance(&mut self, mask: Option<&MotionMask>, cfg: &TrainingConfig, now_ms: f64) -> TargetEvent {
        if self.state.is_terminal() {
            return TargetEvent::None;
        }
        self.scale += cfg.scale_step;

        if self.scale > cfg.visible_max {
            let (state, event) = if self.sampled {
                (TargetState::Missed, TargetEvent::Missed)
            } else {
                (TargetState::Expired, TargetEvent::Expired)
            };
            self.state = state;
            self.resolved_ms = Some(now_ms);
            return event;
        }

        if !cfg.in_hit_window(self.scale) {
            self.state = TargetState::Approaching;
            return TargetEvent::None;
        }

        self.state = TargetState::InRange;
        let Some(mask) = mask else {
            return TargetEvent::None;
        };
        self.sampled = true;
        let (gx, gy) = self.grid_point(mask.width(), mask.height());
        let motion = mask.count_in_circle(gx, gy, cfg.sample_radius * self.scale);
        if motion > cfg.hit_threshold {
            self.state = TargetState::Hit;
            self.resolved_ms = Some(now_ms);
            TargetEvent::Hit { motion }
        } else {
            TargetEvent::None
        }
    }

    /// Whether the target should be dropped from the active set.
    pub fn is_spent(&self, cfg: &TrainingConfig, now_ms: f64) -> bool {
        match (self.state, self.resolved_ms) {
            (TargetState::Hit, Some(at)) => now_ms - at >= cfg.hit_linger_ms,
            (TargetState::Missed | TargetState::Expired, _) => true,
            _ => false,
        }
    }
}
