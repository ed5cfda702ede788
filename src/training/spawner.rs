//! Turning a combo's move labels into screen-placed, time-staggered targets.

use std::collections::VecDeque;

use super::combo::Combo;
use super::target::Target;

/// Where a move label lands on screen, in percent coordinates.
///
/// Case-insensitive substring rules, first match wins:
/// jab / plain left, then cross / right, then hooks, then uppercuts,
/// otherwise dead centre.
pub fn placement(label: &str) -> (f64, f64) {
    let m = label.to_lowercase();
    let left = m.contains("left");
    let hook = m.contains("hook");
    let uppercut = m.contains("uppercut");

    if m.contains("jab") || (left && !hook && !uppercut) {
        (30.0, 40.0)
    } else if m.contains("cross") || m.contains("right") {
        (70.0, 40.0)
    } else if hook {
        (if left { 20.0 } else { 80.0 }, 50.0)
    } else if uppercut {
        (if left { 40.0 } else { 60.0 }, 70.0)
    } else {
        (50.0, 50.0)
    }
}

/// A target waiting for its stagger slot.
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledSpawn {
    pub due_ms: f64,
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Lays combo moves out `stagger_ms` apart and hands them over as they come due.
#[derive(Debug, Default)]
pub struct SpawnQueue {
    pending: VecDeque<ScheduledSpawn>,
    next_id: u64,
}

impl SpawnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every move of `combo`; the first is due at `now_ms`.
    pub fn schedule(&mut self, combo: &Combo, now_ms: f64, stagger_ms: f64) {
        // a combo arriving while another is still dripping in goes after it
        let base = self
            .pending
            .back()
            .map(|last| (last.due_ms + stagger_ms).max(now_ms))
            .unwrap_or(now_ms);
        for (i, label) in combo.sequence.iter().enumerate() {
            let (x, y) = placement(label);
            self.pending.push_back(ScheduledSpawn {
                due_ms: base + i as f64 * stagger_ms,
                label: label.clone(),
                x,
                y,
            });
        }
    }

    /// Pop everything due by `now_ms`, in sequence order. A move released
    /// late pushes everything behind it back by the same lag, so arrivals
    /// stay a full stagger apart after a stall.
    pub fn release_due(&mut self, now_ms: f64) -> Vec<Target> {
        let mut out = Vec::new();
        while self.pending.front().is_some_and(|s| s.due_ms <= now_ms) {
            let Some(s) = self.pending.pop_front() else {
                break;
            };
            let lag = now_ms - s.due_ms;
            if lag > 0.0 {
                for later in self.pending.iter_mut() {
                    later.due_ms += lag;
                }
            }
            self.next_id += 1;
            out.push(Target::new(self.next_id, s.label, s.x, s.y, now_ms));
        }
        out
    }

    /// Drop every scheduled spawn. Ids keep counting so they stay unique.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduledSpawn> {
        self.pending.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::combo::Difficulty;
    use crate::training::target::Side;

    fn combo(moves: &[&str]) -> Combo {
        Combo {
            id: "t".into(),
            name: "Test".into(),
            sequence: moves.iter().map(|m| m.to_string()).collect(),
            difficulty: Difficulty::Beginner,
            description: String::new(),
        }
    }

    #[test]
    fn placement_table() {
        assert_eq!(placement("Jab"), (30.0, 40.0));
        assert_eq!(placement("left jab"), (30.0, 40.0));
        assert_eq!(placement("Lead Left"), (30.0, 40.0));
        assert_eq!(placement("CROSS"), (70.0, 40.0));
        assert_eq!(placement("Right Hook"), (70.0, 40.0));
        assert_eq!(placement("Left Hook"), (20.0, 50.0));
        assert_eq!(placement("Hook"), (80.0, 50.0));
        assert_eq!(placement("Left Uppercut"), (40.0, 70.0));
        assert_eq!(placement("Uppercut"), (60.0, 70.0));
        assert_eq!(placement("Slip"), (50.0, 50.0));
    }

    #[test]
    fn combo_is_staggered_in_order() {
        let mut q = SpawnQueue::new();
        q.schedule(&combo(&["Jab", "Cross", "Left Hook"]), 1000.0, 1500.0);
        let dues: Vec<f64> = q.pending().map(|s| s.due_ms).collect();
        assert_eq!(dues, vec![1000.0, 2500.0, 4000.0]);

        let first = q.release_due(1000.0);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].position(), (30.0, 40.0));
        assert_eq!(first[0].side, Side::Left);
        assert!(q.release_due(2499.0).is_empty());

        let second = q.release_due(2500.0);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].position(), (70.0, 40.0));
        assert_eq!(second[0].side, Side::Right);

        let third = q.release_due(4000.0);
        assert_eq!(third[0].position(), (20.0, 50.0));
        assert_eq!(third[0].side, Side::Left);
        assert!(first[0].id < second[0].id && second[0].id < third[0].id);
        assert!(q.is_empty());
    }

    #[test]
    fn late_release_pushes_the_rest_back() {
        let mut q = SpawnQueue::new();
        q.schedule(&combo(&["Jab", "Cross", "Left Hook"]), 0.0, 1500.0);
        assert_eq!(q.release_due(0.0).len(), 1);

        // nothing polled until well after both remaining moves were due
        let late = q.release_due(5000.0);
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].label, "Cross");
        assert_eq!(late[0].spawned_ms, 5000.0);
        assert_eq!(q.pending().next().map(|s| s.due_ms), Some(6500.0));
        assert!(q.release_due(6499.0).is_empty());
        assert_eq!(q.release_due(6500.0).len(), 1);
    }

    #[test]
    fn zero_stagger_releases_together_even_when_late() {
        let mut q = SpawnQueue::new();
        q.schedule(&combo(&["Jab", "Cross"]), 0.0, 0.0);
        assert_eq!(q.release_due(16.0).len(), 2);
    }

    #[test]
    fn cancelled_spawns_never_release() {
        let mut q = SpawnQueue::new();
        q.schedule(&combo(&["Jab", "Cross"]), 0.0, 1500.0);
        q.cancel_all();
        assert!(q.release_due(10_000.0).is_empty());
    }

    #[test]
    fn second_combo_queues_behind_the_first() {
        let mut q = SpawnQueue::new();
        q.schedule(&combo(&["Jab", "Cross"]), 0.0, 1500.0);
        q.schedule(&combo(&["Hook"]), 100.0, 1500.0);
        let dues: Vec<f64> = q.pending().map(|s| s.due_ms).collect();
        assert_eq!(dues, vec![0.0, 1500.0, 3000.0]);
        assert_eq!(q.len(), 3);
    }
}
