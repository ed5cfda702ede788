//! Tunables for the targeting loop. Defaults reproduce the shipped game feel;
//! the JS host may override any subset by passing a JSON object.

use serde::{Deserialize, Serialize};

use super::combo::Difficulty;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Combined |dR|+|dG|+|dB| (0..=765) a pixel must exceed to count as motion.
    pub motion_threshold: u16,
    /// Motion cells inside a target's sample circle needed for a hit (strictly more than).
    pub hit_threshold: usize,
    pub scale_step: f64,
    pub hit_window_min: f64,
    pub hit_window_max: f64,
    /// Past this scale a target has flown by the player.
    pub visible_max: f64,
    pub hit_reward: u32,
    pub stagger_ms: f64,
    /// How long a HIT target stays on screen for its burst animation.
    pub hit_linger_ms: f64,
    /// Sample circle radius in grid cells at approach scale 1.0.
    pub sample_radius: f64,
    pub grid_width: u32,
    pub grid_height: u32,
    pub round_secs: u32,
    /// Auto difficulty switches to Intermediate once score is strictly above this.
    pub intermediate_after: u32,
    pub focus: String,
    /// Pinned difficulty; `None` means escalate from score.
    pub difficulty: Option<Difficulty>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 25,
            hit_threshold: 20,
            scale_step: 0.02,
            hit_window_min: 0.6,
            hit_window_max: 1.2,
            visible_max: 1.5,
            hit_reward: 10,
            stagger_ms: 1500.0,
            hit_linger_ms: 300.0,
            sample_radius: 10.0,
            grid_width: 100,
            grid_height: 75,
            round_secs: 180,
            intermediate_after: 50,
            focus: "Speed and Flow".to_string(),
            difficulty: None,
        }
    }
}

impl TrainingConfig {
    /// Parse a (possibly partial) JSON override. Bad input keeps the defaults.
    pub fn from_json(text: &str) -> Self {
        match serde_json::from_str::<TrainingConfig>(text) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("ignoring invalid training config: {e}");
                Self::default()
            }
        }
    }

    pub fn in_hit_window(&self, scale: f64) -> bool {
        scale >= self.hit_window_min && scale <= self.hit_window_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg = TrainingConfig::from_json(r#"{"hit_threshold": 5, "difficulty": "Advanced"}"#);
        assert_eq!(cfg.hit_threshold, 5);
        assert_eq!(cfg.difficulty, Some(Difficulty::Advanced));
        assert_eq!(cfg.motion_threshold, 25);
        assert_eq!(cfg.focus, "Speed and Flow");
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        assert_eq!(TrainingConfig::from_json("{nope"), TrainingConfig::default());
    }

    #[test]
    fn hit_window_is_inclusive() {
        let cfg = TrainingConfig::default();
        assert!(cfg.in_hit_window(0.6));
        assert!(cfg.in_hit_window(1.2));
        assert!(!cfg.in_hit_window(0.58));
        assert!(!cfg.in_hit_window(1.22));
    }
}
