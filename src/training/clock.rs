// --- Round Timing ------------------------------------------------------------

/// RoundClock tracks a fixed-length round relative to `performance.now()`.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundClock {
    length_ms: f64, // full round length
    start_ms: f64,  // timestamp the round began
}

impl RoundClock {
    pub fn new(round_secs: u32, now: f64) -> Self {
        Self {
            length_ms: round_secs as f64 * 1000.0,
            start_ms: now,
        }
    }

    pub fn elapsed_ms(&self, now: f64) -> f64 {
        (now - self.start_ms).max(0.0)
    }

    /// Whole seconds remaining, rounded up so a fresh round reads 3:00.
    pub fn time_left_secs(&self, now: f64) -> u32 {
        let left = (self.length_ms - self.elapsed_ms(now)).max(0.0);
        (left / 1000.0).ceil() as u32
    }

    pub fn is_over(&self, now: f64) -> bool {
        self.elapsed_ms(now) >= self.length_ms
    }
}

/// `m:ss`, e.g. 65 -> "1:05".
pub fn format_clock(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}
