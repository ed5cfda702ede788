//! Combos handed to us by the generator capability, plus the defaulting rules
//! applied to whatever the generator actually returned.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }

    /// Case-insensitive; anything unrecognised is treated as Beginner.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "intermediate" => Difficulty::Intermediate,
            "advanced" => Difficulty::Advanced,
            _ => Difficulty::Beginner,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Combo {
    pub id: String,
    pub name: String,
    pub sequence: Vec<String>,
    pub difficulty: Difficulty,
    pub description: String,
}

pub const FALLBACK_ID: &str = "error-fallback";

impl Combo {
    /// Substituted whenever the generator fails outright.
    pub fn fallback() -> Self {
        Self {
            id: FALLBACK_ID.to_string(),
            name: "Emergency Fallback".to_string(),
            sequence: vec!["Jab".into(), "Cross".into(), "Hook".into()],
            difficulty: Difficulty::Beginner,
            description: "Connection failed. Focus on basics.".to_string(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.id == FALLBACK_ID
    }

    /// Build a combo from generator JSON. Unparseable text yields the
    /// fallback; missing or mistyped fields are defaulted one by one.
    pub fn from_generator_json(text: &str, resolved_at_ms: f64) -> Self {
        let value: Value = match serde_json::from_str(text) {
            Ok(v @ Value::Object(_)) => v,
            Ok(other) => {
                log::warn!("combo generator returned non-object json: {other}");
                return Self::fallback();
            }
            Err(e) => {
                log::warn!("combo generator returned unparseable json: {e}");
                return Self::fallback();
            }
        };
        let text_field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let sequence: Vec<String> = value
            .get("sequence")
            .and_then(Value::as_array)
            .map(|moves| {
                moves
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: format!("{}", resolved_at_ms.max(0.0) as u64),
            name: text_field("name").unwrap_or_else(|| "Custom Combo".to_string()),
            sequence: if sequence.is_empty() {
                vec!["Jab".into(), "Cross".into()]
            } else {
                sequence
            },
            difficulty: text_field("difficulty")
                .map(|d| Difficulty::from_label(&d))
                .unwrap_or_default(),
            description: text_field("description")
                .unwrap_or_else(|| "Focus on technique.".to_string()),
        }
    }
}

pub type ComboFuture = Pin<Box<dyn Future<Output = Combo>>>;

/// External source of combos. Implementations must always resolve to a
/// well-formed combo, substituting [`Combo::fallback`] on failure.
pub trait ComboGenerator {
    fn generate(&self, difficulty: Difficulty, focus: &str) -> ComboFuture;
}

/// Offline generator that serves a fixed rotation of combos.
pub struct DrillBook {
    drills: Vec<Combo>,
    next: std::cell::Cell<usize>,
}

impl DrillBook {
    pub fn new(drills: Vec<Combo>) -> Self {
        Self {
            drills,
            next: std::cell::Cell::new(0),
        }
    }

    pub fn basic() -> Self {
        let drill = |name: &str, moves: &[&str], difficulty, description: &str| Combo {
            id: format!("drill-{}", name.to_ascii_lowercase().replace(' ', "-")),
            name: name.to_string(),
            sequence: moves.iter().map(|m| m.to_string()).collect(),
            difficulty,
            description: description.to_string(),
        };
        Self::new(vec![
            drill("One Two", &["Jab", "Cross"], Difficulty::Beginner, "Snap it back to the guard."),
            drill(
                "Classic Three",
                &["Jab", "Cross", "Left Hook"],
                Difficulty::Beginner,
                "Turn the hip on the hook.",
            ),
            drill(
                "Body Rip",
                &["Jab", "Right Uppercut", "Left Hook", "Cross"],
                Difficulty::Intermediate,
                "Dip the knees before the uppercut.",
            ),
        ])
    }
}

impl ComboGenerator for DrillBook {
    fn generate(&self, difficulty: Difficulty, _focus: &str) -> ComboFuture {
        let combo = if self.drills.is_empty() {
            Combo::fallback()
        } else {
            let start = self.next.get();
            let n = self.drills.len();
            // prefer the next drill at the requested level, else just rotate
            let pick = (0..n)
                .map(|i| (start + i) % n)
                .find(|&i| self.drills[i].difficulty == difficulty)
                .unwrap_or(start % n);
            self.next.set(pick + 1);
            self.drills[pick].clone()
        };
        Box::pin(std::future::ready(combo))
    }
}
