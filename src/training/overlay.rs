//! What the view layer gets each tick. No motion-mask detail leaks out here.

use serde::Serialize;

use super::target::{Side, Target, TargetState};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TargetView {
    pub id: u64,
    pub label: String,
    pub side: Side,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub state: TargetState,
}

impl From<&Target> for TargetView {
    fn from(t: &Target) -> Self {
        let (x, y) = t.position();
        Self {
            id: t.id,
            label: t.label.clone(),
            side: t.side,
            x,
            y,
            scale: t.scale(),
            state: t.state(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OverlaySnapshot {
    pub running: bool,
    pub camera_active: bool,
    pub score: u32,
    pub pattern_name: Option<String>,
    pub difficulty: String,
    pub time_left_secs: u32,
    pub loading: bool,
    pub targets: Vec<TargetView>,
}

impl OverlaySnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::error!("overlay snapshot did not serialize: {e}");
            "{}".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_uses_wire_names() {
        let t = Target::new(3, "Left Hook", 20.0, 50.0, 0.0);
        let snap = OverlaySnapshot {
            running: true,
            score: 10,
            pattern_name: Some("Classic Three".into()),
            targets: vec![TargetView::from(&t)],
            ..Default::default()
        };
        let v: serde_json::Value = serde_json::from_str(&snap.to_json()).unwrap();
        assert_eq!(v["score"], 10);
        assert_eq!(v["pattern_name"], "Classic Three");
        assert_eq!(v["targets"][0]["side"], "LEFT");
        assert_eq!(v["targets"][0]["state"], "PENDING");
        assert_eq!(v["targets"][0]["x"], 20.0);
    }
}
