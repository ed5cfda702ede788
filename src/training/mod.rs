//! Combo training: webcam motion targets.
//!
//! Each display frame the loop grabs a downsampled camera frame, differences
//! it against the previous one, advances every live target against the
//! resulting motion mask and tops the board up with a fresh combo once it
//! runs dry. Combo generation is asynchronous and owned by the host: the
//! session only emits a [`SpawnRequest`] and later drains the resolved combo
//! from its [`ComboInbox`] at the start of a tick, so all target mutation
//! happens inside `tick`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub mod clock;
pub mod combo;
pub mod config;
pub mod motion;
pub mod overlay;
pub mod spawner;
pub mod target;

use clock::RoundClock;
use combo::{Combo, Difficulty};
use config::TrainingConfig;
use motion::{Frame, FrameDiffer};
use overlay::{OverlaySnapshot, TargetView};
use spawner::SpawnQueue;
use target::{Target, TargetEvent};

// --- Capabilities -----------------------------------------------------------

/// Anything that can hand us downsampled camera frames.
pub trait FrameSource {
    /// Latest frame, or `None` while the device is not ready. Absence is
    /// transient and never an error.
    fn grab(&mut self) -> Option<Frame>;
    fn is_active(&self) -> bool;
    /// Release the capture device. Must be safe to call repeatedly.
    fn release(&mut self);
    /// Change the downsample grid. Sources with a fixed size may ignore it.
    fn set_grid(&mut self, _width: u32, _height: u32) {}
}

/// Ask the host to generate a combo. `generation` must be echoed back.
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnRequest {
    pub generation: u64,
    pub difficulty: Difficulty,
    pub focus: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComboDelivery {
    pub generation: u64,
    pub combo: Combo,
}

/// Hand-off point between async combo generation and the tick loop.
#[derive(Clone, Default)]
pub struct ComboInbox(Rc<RefCell<VecDeque<ComboDelivery>>>);

impl ComboInbox {
    /// Park a resolved combo for the next tick, tagged with its request's
    /// generation.
    pub fn deliver(&self, request: &SpawnRequest, combo: Combo) {
        self.0.borrow_mut().push_back(ComboDelivery {
            generation: request.generation,
            combo,
        });
    }

    fn take_all(&self) -> Vec<ComboDelivery> {
        self.0.borrow_mut().drain(..).collect()
    }
}

// --- Session ----------------------------------------------------------------

/// What happened during one tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TickReport {
    pub processed: bool,
    pub hits: Vec<u64>,
    pub misses: Vec<u64>,
    pub spawned: Vec<u64>,
    pub spawn_request: Option<SpawnRequest>,
    pub round_over: bool,
}

/// The live run: score, targets and everything pending for them.
pub struct Session {
    cfg: TrainingConfig,
    score: u32,
    pattern_name: Option<String>,
    targets: Vec<Target>,
    running: bool,
    queue: SpawnQueue,
    differ: FrameDiffer,
    inbox: ComboInbox,
    spawn_in_flight: bool,
    generation: u64,
    clock: Option<RoundClock>,
    last_now: f64,
}

impl Session {
    pub fn new(cfg: TrainingConfig) -> Self {
        Self {
            cfg,
            score: 0,
            pattern_name: None,
            targets: Vec::new(),
            running: false,
            queue: SpawnQueue::new(),
            differ: FrameDiffer::new(),
            inbox: ComboInbox::default(),
            spawn_in_flight: false,
            generation: 0,
            clock: None,
            last_now: 0.0,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.cfg
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn pattern_name(&self) -> Option<&str> {
        self.pattern_name.as_deref()
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn spawn_in_flight(&self) -> bool {
        self.spawn_in_flight
    }

    pub fn scheduled_spawns(&self) -> usize {
        self.queue.len()
    }

    pub fn inbox(&self) -> ComboInbox {
        self.inbox.clone()
    }

    /// Begin a fresh round. Any result still in flight from an earlier run
    /// is invalidated.
    pub fn start(&mut self, now: f64) {
        self.generation += 1;
        self.running = true;
        self.score = 0;
        self.pattern_name = None;
        self.targets.clear();
        self.queue.cancel_all();
        self.differ.reset();
        self.spawn_in_flight = false;
        self.clock = Some(RoundClock::new(self.cfg.round_secs, now));
        self.last_now = now;
        log::info!("training session started (generation {})", self.generation);
    }

    /// Halt the run. Staggered spawns are cancelled and late combos dropped.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.generation += 1;
        self.queue.cancel_all();
        self.targets.clear();
        self.spawn_in_flight = false;
        log::info!("training session stopped with score {}", self.score);
    }

    /// Pin the difficulty (`None` returns to score-based escalation).
    pub fn set_difficulty(&mut self, difficulty: Option<Difficulty>) {
        self.cfg.difficulty = difficulty;
    }

    pub fn difficulty(&self) -> Difficulty {
        match self.cfg.difficulty {
            Some(d) => d,
            None if self.score > self.cfg.intermediate_after => Difficulty::Intermediate,
            None => Difficulty::Beginner,
        }
    }

    /// Ask for a combo unless one is already on its way.
    pub fn request_spawn(&mut self) -> Option<SpawnRequest> {
        if !self.running || self.spawn_in_flight {
            return None;
        }
        self.spawn_in_flight = true;
        let req = SpawnRequest {
            generation: self.generation,
            difficulty: self.difficulty(),
            focus: self.cfg.focus.clone(),
        };
        log::debug!("requesting {} combo", req.difficulty.label());
        Some(req)
    }

    /// Queue a resolved combo for the next tick.
    pub fn deliver(&self, request: &SpawnRequest, combo: Combo) {
        self.inbox.deliver(request, combo);
    }

    /// Forget the previous frame, so the next one yields no motion.
    pub fn reset_motion(&mut self) {
        self.differ.reset();
    }

    /// End the round once its clock has run out. Returns `true` on the call
    /// that ends it.
    pub fn expire_if_over(&mut self, now: f64) -> bool {
        if !self.running {
            return false;
        }
        self.last_now = now;
        if self.clock.as_ref().is_some_and(|c| c.is_over(now)) {
            log::info!("round over");
            self.stop();
            return true;
        }
        false
    }

    fn drain_inbox(&mut self, now: f64) {
        for d in self.inbox.take_all() {
            if d.generation != self.generation {
                log::debug!("discarding stale combo '{}'", d.combo.name);
                continue;
            }
            self.spawn_in_flight = false;
            log::info!(
                "combo '{}' ({} moves{})",
                d.combo.name,
                d.combo.sequence.len(),
                if d.combo.is_fallback() { ", fallback" } else { "" }
            );
            self.queue.schedule(&d.combo, now, self.cfg.stagger_ms);
            self.pattern_name = Some(d.combo.name);
        }
    }

    /// One frame of the targeting loop. `frame` is `None` when the camera is
    /// not ready, in which case nothing moves this tick and the last good
    /// frame is dropped.
    pub fn tick(&mut self, frame: Option<Frame>, now: f64) -> TickReport {
        let mut report = TickReport::default();
        if !self.running {
            return report;
        }
        if self.expire_if_over(now) {
            report.round_over = true;
            return report;
        }
        let Some(frame) = frame else {
            self.differ.reset();
            return report;
        };
        report.processed = true;

        self.drain_inbox(now);

        let mask = self.differ.push(frame, self.cfg.motion_threshold);
        for t in self.targets.iter_mut() {
            match t.advance(mask.as_ref(), &self.cfg, now) {
                TargetEvent::Hit { motion } => {
                    self.score += self.cfg.hit_reward;
                    report.hits.push(t.id);
                    log::info!("hit target {} ({}) with {} motion cells", t.id, t.label, motion);
                }
                TargetEvent::Missed | TargetEvent::Expired => {
                    report.misses.push(t.id);
                    log::debug!("target {} ({}) got away: {:?}", t.id, t.label, t.state());
                }
                TargetEvent::None => {}
            }
        }

        let cfg = &self.cfg;
        self.targets.retain(|t| !t.is_spent(cfg, now));

        for t in self.queue.release_due(now) {
            report.spawned.push(t.id);
            self.targets.push(t);
        }

        if self.targets.is_empty() && self.queue.is_empty() {
            report.spawn_request = self.request_spawn();
        }
        report
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        OverlaySnapshot {
            running: self.running,
            camera_active: false,
            score: self.score,
            pattern_name: self.pattern_name.clone(),
            difficulty: self.difficulty().label().to_string(),
            time_left_secs: self
                .clock
                .as_ref()
                .map(|c| c.time_left_secs(self.last_now))
                .unwrap_or(self.cfg.round_secs),
            loading: self.spawn_in_flight,
            targets: self.targets.iter().map(TargetView::from).collect(),
        }
    }
}

// --- Loop Controller --------------------------------------------------------

/// Whether the driver should schedule another animation frame.
#[derive(Clone, Debug, PartialEq)]
pub enum LoopStep {
    Continue(TickReport),
    Halt,
}

/// Owns the session and the frame source and runs one iteration per frame.
pub struct TrainingLoop<S: FrameSource> {
    session: Session,
    source: S,
}

impl<S: FrameSource> TrainingLoop<S> {
    pub fn new(session: Session, source: S) -> Self {
        Self { session, source }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn start(&mut self, now: f64) {
        self.session.start(now);
    }

    /// Swap in a session built from `cfg`, keeping the camera. A difficulty
    /// pinned on the old session carries over unless `cfg` pins its own.
    /// Combos still in flight for the old session land in its own inbox and
    /// are never seen.
    pub fn reconfigure(&mut self, mut cfg: TrainingConfig) {
        let old = self.session.config();
        let old_grid = (old.grid_width, old.grid_height);
        if cfg.difficulty.is_none() {
            cfg.difficulty = old.difficulty;
        }
        if old_grid != (cfg.grid_width, cfg.grid_height) {
            self.source.set_grid(cfg.grid_width, cfg.grid_height);
        }
        self.session.stop();
        self.session = Session::new(cfg);
    }

    /// End the run and give the camera back.
    pub fn stop(&mut self) {
        self.session.stop();
        self.session.reset_motion();
        self.source.release();
    }

    /// Turn the camera off. This alone is enough to halt scheduling.
    pub fn deactivate_camera(&mut self) {
        self.source.release();
        self.session.reset_motion();
        log::info!("camera released");
    }

    /// Run the round clock on its own, for when frames are not flowing.
    /// Returns `true` once the round has ended; the camera is released then.
    pub fn poll_clock(&mut self, now: f64) -> bool {
        if !self.session.expire_if_over(now) {
            return false;
        }
        self.session.reset_motion();
        self.source.release();
        true
    }

    pub fn step(&mut self, now: f64) -> LoopStep {
        if !self.session.is_running() || self.poll_clock(now) || !self.source.is_active() {
            return LoopStep::Halt;
        }
        let frame = self.source.grab();
        LoopStep::Continue(self.session.tick(frame, now))
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        OverlaySnapshot {
            camera_active: self.source.is_active(),
            ..self.session.snapshot()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        frames: VecDeque<Option<Frame>>,
        active: bool,
        releases: usize,
        grid: Option<(u32, u32)>,
    }

    impl Scripted {
        fn new(frames: Vec<Option<Frame>>) -> Self {
            Self {
                frames: frames.into(),
                active: true,
                releases: 0,
                grid: None,
            }
        }
    }

    impl FrameSource for Scripted {
        fn grab(&mut self) -> Option<Frame> {
            self.frames.pop_front().flatten()
        }
        fn is_active(&self) -> bool {
            self.active
        }
        fn release(&mut self) {
            self.active = false;
            self.releases += 1;
        }
        fn set_grid(&mut self, width: u32, height: u32) {
            self.grid = Some((width, height));
        }
    }

    fn dark() -> Frame {
        Frame::filled(100, 75, [0, 0, 0])
    }

    #[test]
    fn empty_board_requests_exactly_once() {
        let mut s = Session::new(TrainingConfig::default());
        s.start(0.0);
        let first = s.tick(Some(dark()), 0.0);
        assert!(first.spawn_request.is_some());
        for i in 1..50 {
            let r = s.tick(Some(dark()), i as f64 * 16.0);
            assert!(r.spawn_request.is_none());
        }
        assert!(s.spawn_in_flight());
    }

    #[test]
    fn stale_generation_is_discarded() {
        let mut s = Session::new(TrainingConfig::default());
        s.start(0.0);
        let req = s.tick(Some(dark()), 0.0).spawn_request.unwrap();
        s.stop();
        s.start(100.0);
        s.deliver(&req, Combo::fallback());
        let r = s.tick(Some(dark()), 100.0);
        assert!(r.spawned.is_empty());
        assert!(s.pattern_name().is_none());
    }

    #[test]
    fn difficulty_escalates_past_fifty() {
        let mut s = Session::new(TrainingConfig::default());
        s.score = 50;
        assert_eq!(s.difficulty(), Difficulty::Beginner);
        s.score = 60;
        assert_eq!(s.difficulty(), Difficulty::Intermediate);
        s.set_difficulty(Some(Difficulty::Advanced));
        assert_eq!(s.difficulty(), Difficulty::Advanced);
    }

    #[test]
    fn unready_camera_skips_but_keeps_looping() {
        let mut lp = TrainingLoop::new(Session::new(TrainingConfig::default()), Scripted::new(vec![None, None]));
        lp.start(0.0);
        match lp.step(0.0) {
            LoopStep::Continue(r) => assert!(!r.processed && r.spawn_request.is_none()),
            LoopStep::Halt => panic!("unready camera must not halt"),
        }
        assert!(matches!(lp.step(16.0), LoopStep::Continue(_)));
    }

    #[test]
    fn camera_off_halts_and_stop_releases() {
        let mut lp = TrainingLoop::new(Session::new(TrainingConfig::default()), Scripted::new(vec![]));
        lp.start(0.0);
        lp.deactivate_camera();
        assert_eq!(lp.step(0.0), LoopStep::Halt);
        assert!(lp.session().is_running());
        lp.stop();
        assert!(!lp.session().is_running());
        assert_eq!(lp.source().releases, 2);
    }

    #[test]
    fn round_end_stops_and_releases_camera() {
        let cfg = TrainingConfig {
            round_secs: 1,
            ..TrainingConfig::default()
        };
        let mut lp = TrainingLoop::new(Session::new(cfg), Scripted::new(vec![Some(dark()), Some(dark())]));
        lp.start(0.0);
        assert!(matches!(lp.step(10.0), LoopStep::Continue(_)));
        assert_eq!(lp.step(1_000.0), LoopStep::Halt);
        assert!(!lp.session().is_running());
        assert!(!lp.source().is_active());
        assert_eq!(lp.snapshot().time_left_secs, 0);
    }

    #[test]
    fn reacquired_camera_starts_without_a_previous_frame() {
        let frames = (0..60).map(|_| Some(dark())).collect();
        let mut lp = TrainingLoop::new(Session::new(TrainingConfig::default()), Scripted::new(frames));
        lp.start(0.0);
        let LoopStep::Continue(r) = lp.step(0.0) else {
            panic!("loop halted with the camera on");
        };
        lp.session().deliver(&r.spawn_request.unwrap(), Combo::fallback());
        let mut now = 0.0;
        while lp.session().targets().first().is_none_or(|t| t.state() != target::TargetState::InRange) {
            now += 16.0;
            assert!(now < 1_000.0, "jab never came into range");
            lp.step(now);
        }

        // camera comes back on a different, perfectly still scene
        lp.deactivate_camera();
        let bright = Frame::filled(100, 75, [255, 255, 255]);
        lp.source_mut().frames = vec![Some(bright.clone()), Some(bright)].into();
        lp.source_mut().active = true;
        lp.step(now + 16.0);
        lp.step(now + 32.0);
        assert_eq!(lp.session().score(), 0);
        assert_eq!(lp.session().targets()[0].state(), target::TargetState::InRange);
    }

    #[test]
    fn round_runs_out_while_camera_is_off() {
        let cfg = TrainingConfig {
            round_secs: 1,
            ..TrainingConfig::default()
        };
        let mut lp = TrainingLoop::new(Session::new(cfg), Scripted::new(vec![]));
        lp.start(0.0);
        lp.deactivate_camera();
        assert_eq!(lp.step(500.0), LoopStep::Halt);
        assert!(lp.session().is_running());
        assert_eq!(lp.snapshot().time_left_secs, 1);

        assert!(!lp.poll_clock(900.0));
        assert_eq!(lp.step(1_000.0), LoopStep::Halt);
        assert!(!lp.session().is_running());
        assert_eq!(lp.snapshot().time_left_secs, 0);
        assert!(!lp.poll_clock(2_000.0), "ends only once");
    }

    #[test]
    fn reconfigure_keeps_pin_and_resizes_the_grid() {
        let mut lp = TrainingLoop::new(Session::new(TrainingConfig::default()), Scripted::new(vec![]));
        lp.session_mut().set_difficulty(Some(Difficulty::Advanced));
        lp.reconfigure(TrainingConfig {
            round_secs: 60,
            ..TrainingConfig::default()
        });
        assert_eq!(lp.session().difficulty(), Difficulty::Advanced);
        assert_eq!(lp.session().config().round_secs, 60);
        assert_eq!(lp.source().grid, None);

        lp.reconfigure(TrainingConfig {
            grid_width: 160,
            grid_height: 120,
            difficulty: Some(Difficulty::Beginner),
            ..TrainingConfig::default()
        });
        assert_eq!(lp.session().difficulty(), Difficulty::Beginner);
        assert_eq!(lp.source().grid, Some((160, 120)));
        assert!(lp.source().is_active(), "camera kept");
    }
}
