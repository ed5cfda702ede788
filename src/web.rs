//! Browser side of the trainer: webcam capture, the requestAnimationFrame
//! driver, JS-backed capabilities and the HUD overlay.

use std::cell::RefCell;
use std::rc::Rc;

use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{
    CanvasRenderingContext2d, Document, HtmlCanvasElement, HtmlVideoElement, MediaStream,
    MediaStreamConstraints, MediaStreamTrack, window,
};

use crate::coach::{self, ChatTurn, CornerLog, Cornerman, ReplyFuture};
use crate::error::{TrainingError, js_message};
use crate::training::combo::{Combo, ComboFuture, ComboGenerator, Difficulty, DrillBook};
use crate::training::config::TrainingConfig;
use crate::training::motion::Frame;
use crate::training::overlay::OverlaySnapshot;
use crate::training::target::{Side, TargetState};
use crate::training::{
    ComboInbox, FrameSource, LoopStep, Session, SpawnRequest, TrainingLoop,
};

const VIDEO_ID: &str = "sb-video";
const OVERLAY_ID: &str = "sb-overlay";
const HUD_ID: &str = "sb-hud";
// HTMLMediaElement.HAVE_CURRENT_DATA
const HAVE_CURRENT_DATA: u16 = 2;

pub(crate) fn now_ms() -> f64 {
    window()
        .and_then(|w| w.performance())
        .map(|p| p.now())
        .unwrap_or(0.0)
}

fn document() -> Result<Document, TrainingError> {
    window()
        .ok_or(TrainingError::NoWindow)?
        .document()
        .ok_or(TrainingError::NoDocument)
}

// --- Camera -----------------------------------------------------------------

/// Webcam frames, downsampled through a small scratch canvas.
pub struct CameraSource {
    video: HtmlVideoElement,
    scratch: CanvasRenderingContext2d,
    width: u32,
    height: u32,
    stream: Option<MediaStream>,
}

impl CameraSource {
    pub fn new(doc: &Document, width: u32, height: u32) -> Result<Self, TrainingError> {
        let video: HtmlVideoElement = match doc.get_element_by_id(VIDEO_ID) {
            Some(el) => el.dyn_into().map_err(|_| TrainingError::Canvas(VIDEO_ID.into()))?,
            None => {
                let v: HtmlVideoElement = doc
                    .create_element("video")?
                    .dyn_into()
                    .map_err(|_| TrainingError::Canvas(VIDEO_ID.into()))?;
                v.set_id(VIDEO_ID);
                v.set_attribute("playsinline", "").ok();
                // mirrored preview; the hit test flips x to match
                v.set_attribute("style", "position:fixed; inset:0; width:100%; height:100%; object-fit:cover; transform:scaleX(-1); filter:grayscale(1); opacity:0.5; background:#000; z-index:0;").ok();
                let body = doc.body().ok_or(TrainingError::NoDocument)?;
                body.append_child(&v)?;
                v
            }
        };
        video.set_muted(true);
        video.set_autoplay(true);

        let canvas: HtmlCanvasElement = doc
            .create_element("canvas")?
            .dyn_into()
            .map_err(|_| TrainingError::Canvas("scratch".into()))?;
        canvas.set_width(width);
        canvas.set_height(height);
        let scratch: CanvasRenderingContext2d = canvas
            .get_context("2d")?
            .ok_or_else(|| TrainingError::Canvas("no 2d context".into()))?
            .dyn_into()
            .map_err(|_| TrainingError::Canvas("no 2d context".into()))?;

        Ok(Self {
            video,
            scratch,
            width,
            height,
            stream: None,
        })
    }

    pub fn attach(&mut self, stream: MediaStream) {
        self.release();
        self.video.set_src_object(Some(&stream));
        if let Ok(p) = self.video.play() {
            // a blocked autoplay just leaves grab() returning None
            spawn_local(async move {
                let _ = JsFuture::from(p).await;
            });
        }
        self.stream = Some(stream);
        log::info!("camera acquired");
    }
}

/// Prompt for the webcam. Denial is reported, never panics.
pub async fn request_stream() -> Result<MediaStream, TrainingError> {
    let win = window().ok_or(TrainingError::NoWindow)?;
    let devices = win
        .navigator()
        .media_devices()
        .map_err(|_| TrainingError::MediaDevicesUnavailable)?;
    let constraints = MediaStreamConstraints::new();
    constraints.set_video(&JsValue::TRUE);
    let promise = devices
        .get_user_media_with_constraints(&constraints)
        .map_err(|e| TrainingError::CameraDenied(js_message(&e)))?;
    let stream = JsFuture::from(promise)
        .await
        .map_err(|e| TrainingError::CameraDenied(js_message(&e)))?;
    stream
        .dyn_into::<MediaStream>()
        .map_err(|_| TrainingError::CameraDenied("not a media stream".into()))
}

impl FrameSource for CameraSource {
    fn grab(&mut self) -> Option<Frame> {
        self.stream.as_ref()?;
        if self.video.ready_state() < HAVE_CURRENT_DATA || self.video.video_width() == 0 {
            return None;
        }
        let (w, h) = (self.width as f64, self.height as f64);
        self.scratch
            .draw_image_with_html_video_element_and_dw_and_dh(&self.video, 0.0, 0.0, w, h)
            .ok()?;
        let data = self.scratch.get_image_data(0.0, 0.0, w, h).ok()?;
        Some(Frame::new(self.width, self.height, data.data().0))
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    fn release(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        for track in stream.get_tracks().iter() {
            if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
                track.stop();
            }
        }
        self.video.set_src_object(None);
    }

    fn set_grid(&mut self, width: u32, height: u32) {
        if let Some(canvas) = self.scratch.canvas() {
            canvas.set_width(width);
            canvas.set_height(height);
        }
        self.width = width;
        self.height = height;
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

// --- JS capabilities --------------------------------------------------------

async fn call_js(f: &js_sys::Function, a: &JsValue, b: &JsValue) -> Result<JsValue, JsValue> {
    let out = f.call2(&JsValue::NULL, a, b)?;
    JsFuture::from(js_sys::Promise::resolve(&out)).await
}

fn js_text(value: &JsValue) -> Option<String> {
    if value.is_undefined() || value.is_null() {
        return None;
    }
    value
        .as_string()
        .or_else(|| js_sys::JSON::stringify(value).ok().and_then(|s| s.as_string()))
}

/// Host function `(difficulty, focus) => Promise<string | object>`.
pub struct JsComboGenerator {
    fetch: js_sys::Function,
}

impl ComboGenerator for JsComboGenerator {
    fn generate(&self, difficulty: Difficulty, focus: &str) -> ComboFuture {
        let fetch = self.fetch.clone();
        let focus = focus.to_string();
        Box::pin(async move {
            match call_js(&fetch, &difficulty.label().into(), &focus.into()).await {
                Ok(v) => match js_text(&v) {
                    Some(text) => Combo::from_generator_json(&text, now_ms()),
                    None => Combo::fallback(),
                },
                Err(e) => {
                    log::error!("combo generator failed: {}", js_message(&e));
                    Combo::fallback()
                }
            }
        })
    }
}

/// Host function `(historyJson, message) => Promise<string>`.
pub struct JsCornerman {
    ask: js_sys::Function,
}

impl Cornerman for JsCornerman {
    fn advise(&self, history: &[ChatTurn], message: &str) -> ReplyFuture {
        let ask = self.ask.clone();
        let history = coach::history_json(history);
        let message = message.to_string();
        Box::pin(async move {
            let raw = call_js(&ask, &history.into(), &message.into())
                .await
                .map(|v| v.as_string())
                .map_err(|e| js_message(&e));
            coach::settle_reply(raw)
        })
    }
}

// --- Runtime state ----------------------------------------------------------

struct Trainer {
    lp: TrainingLoop<CameraSource>,
    overlay: HtmlCanvasElement,
    ctx: CanvasRenderingContext2d,
    looping: bool,
    snapshot: OverlaySnapshot,
}

thread_local! {
    static TRAINER: RefCell<Option<Trainer>> = const { RefCell::new(None) };
    static GENERATOR: RefCell<Rc<dyn ComboGenerator>> = RefCell::new(Rc::new(DrillBook::basic()));
    static CORNERMAN: RefCell<Option<Rc<dyn Cornerman>>> = const { RefCell::new(None) };
    static CORNER_LOG: RefCell<CornerLog> = RefCell::new(CornerLog::default());
    static FRAME_CB: RefCell<Option<Closure<dyn FnMut(f64)>>> = const { RefCell::new(None) };
    static CLOCK_CB: RefCell<Option<Closure<dyn FnMut()>>> = const { RefCell::new(None) };
}

fn build_trainer(cfg: TrainingConfig) -> Result<Trainer, TrainingError> {
    let doc = document()?;
    let source = CameraSource::new(&doc, cfg.grid_width, cfg.grid_height)?;

    let overlay: HtmlCanvasElement = if let Some(el) = doc.get_element_by_id(OVERLAY_ID) {
        el.dyn_into().map_err(|_| TrainingError::Canvas(OVERLAY_ID.into()))?
    } else {
        let c: HtmlCanvasElement = doc
            .create_element("canvas")?
            .dyn_into()
            .map_err(|_| TrainingError::Canvas(OVERLAY_ID.into()))?;
        c.set_id(OVERLAY_ID);
        c.set_width(960);
        c.set_height(720);
        c.set_attribute("style", "position:fixed; inset:0; width:100%; height:100%; pointer-events:none; z-index:20;").ok();
        doc.body().ok_or(TrainingError::NoDocument)?.append_child(&c)?;
        c
    };
    let ctx: CanvasRenderingContext2d = overlay
        .get_context("2d")?
        .ok_or_else(|| TrainingError::Canvas("no 2d context".into()))?
        .dyn_into()
        .map_err(|_| TrainingError::Canvas("no 2d context".into()))?;
    ctx.set_text_align("center");

    if doc.get_element_by_id(HUD_ID).is_none() {
        if let Some(body) = doc.body() {
            let div = doc.create_element("div")?;
            div.set_id(HUD_ID);
            div.set_attribute("style", "position:fixed; top:12px; left:16px; font-family:'Fira Code', monospace; font-size:18px; padding:6px 12px; background:rgba(0,0,0,0.7); border:1px solid #00f3ff; border-radius:0 0 14px 0; color:#00f3ff; z-index:30; letter-spacing:1px;").ok();
            body.append_child(&div)?;
        }
    }

    let snapshot = OverlaySnapshot::default();
    Ok(Trainer {
        lp: TrainingLoop::new(Session::new(cfg), source),
        overlay,
        ctx,
        looping: false,
        snapshot,
    })
}

fn with_trainer<R>(f: impl FnOnce(&mut Trainer) -> R) -> Result<R, TrainingError> {
    TRAINER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(build_trainer(TrainingConfig::default())?);
        }
        match slot.as_mut() {
            Some(t) => Ok(f(t)),
            None => Err(TrainingError::NoDocument),
        }
    })
}

fn fire_spawn(req: SpawnRequest, inbox: ComboInbox) {
    let generator = GENERATOR.with(|g| Rc::clone(&g.borrow()));
    spawn_local(async move {
        let combo = generator.generate(req.difficulty, &req.focus).await;
        inbox.deliver(&req, combo);
    });
}

// --- Loop -------------------------------------------------------------------

fn schedule_frame() {
    FRAME_CB.with(|cb| {
        if cb.borrow().is_none() {
            *cb.borrow_mut() = Some(Closure::wrap(Box::new(on_frame) as Box<dyn FnMut(f64)>));
        }
        if let (Some(w), Some(closure)) = (window(), cb.borrow().as_ref()) {
            let _ = w.request_animation_frame(closure.as_ref().unchecked_ref());
        }
    });
}

fn on_frame(ts: f64) {
    let outcome = TRAINER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let t = slot.as_mut()?;
        let step = t.lp.step(ts);
        t.snapshot = t.lp.snapshot();
        render_overlay(t);
        match step {
            LoopStep::Continue(report) => {
                let inbox = t.lp.session().inbox();
                Some((true, report.spawn_request.map(|r| (r, inbox))))
            }
            LoopStep::Halt => {
                t.looping = false;
                Some((false, None))
            }
        }
    });
    if let Some((keep_going, spawn)) = outcome {
        if let Some((req, inbox)) = spawn {
            fire_spawn(req, inbox);
        }
        if keep_going {
            schedule_frame();
        }
    }
}

/// Kick the frame loop if it is idle and there is something to drive.
fn ensure_loop() {
    let should_start = TRAINER.with(|cell| {
        let mut slot = cell.borrow_mut();
        match slot.as_mut() {
            Some(t) if !t.looping && t.lp.session().is_running() && t.lp.source().is_active() => {
                t.looping = true;
                true
            }
            _ => false,
        }
    });
    if should_start {
        schedule_frame();
    }
}

/// Once-a-second round clock. The frame loop parks while the camera is off,
/// but the round keeps running out.
fn ensure_clock_timer() {
    CLOCK_CB.with(|cb| {
        if cb.borrow().is_some() {
            return;
        }
        let Some(w) = window() else {
            return;
        };
        let closure = Closure::wrap(Box::new(on_clock) as Box<dyn FnMut()>);
        match w.set_interval_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), 1_000) {
            Ok(_) => *cb.borrow_mut() = Some(closure),
            Err(e) => log::error!("round timer unavailable: {}", js_message(&e)),
        }
    });
}

fn on_clock() {
    TRAINER.with(|cell| {
        let mut slot = cell.borrow_mut();
        let Some(t) = slot.as_mut() else {
            return;
        };
        // the frame loop checks the clock itself
        if t.looping || !t.lp.session().is_running() {
            return;
        }
        t.lp.poll_clock(now_ms());
        t.snapshot = t.lp.snapshot();
        render_overlay(t);
    });
}

// --- Rendering --------------------------------------------------------------

fn target_color(state: TargetState, side: Side) -> &'static str {
    match state {
        TargetState::Hit => "#39ff14",
        TargetState::InRange => "#ffe600",
        TargetState::Missed | TargetState::Expired => "#555555",
        _ if side == Side::Left => "#00f3ff",
        _ => "#ff003c",
    }
}

fn render_overlay(t: &Trainer) {
    let ctx = &t.ctx;
    let (w, h) = (t.overlay.width() as f64, t.overlay.height() as f64);
    ctx.clear_rect(0.0, 0.0, w, h);
    for target in &t.snapshot.targets {
        let cx = target.x / 100.0 * w;
        let cy = target.y / 100.0 * h;
        let r = (60.0 * target.scale).max(2.0);
        let color = target_color(target.state, target.side);
        ctx.set_global_alpha(if target.state == TargetState::Hit { 0.6 } else { 1.0 });
        ctx.set_stroke_style_str(color);
        ctx.set_line_width(if target.state == TargetState::InRange { 6.0 } else { 3.0 });
        ctx.begin_path();
        let _ = ctx.arc(cx, cy, r, 0.0, std::f64::consts::TAU);
        ctx.stroke();
        ctx.set_fill_style_str(color);
        ctx.set_font(&format!("{}px 'Fira Code', monospace", (12.0 + 10.0 * target.scale) as u32));
        let _ = ctx.fill_text(&target.label.to_uppercase(), cx, cy + 6.0);
    }
    ctx.set_global_alpha(1.0);

    if let Ok(doc) = document() {
        if let Some(el) = doc.get_element_by_id(HUD_ID) {
            let s = &t.snapshot;
            let mut line = format!(
                "{}  SCORE {}",
                crate::training::clock::format_clock(s.time_left_secs),
                s.score
            );
            if let Some(name) = &s.pattern_name {
                line.push_str(&format!("  [{}]", name.to_uppercase()));
            }
            if s.loading {
                line.push_str("  ACQUIRING TARGET DATA...");
            }
            if !s.camera_active {
                line.push_str("  [ CAMERA OFFLINE ]");
            }
            el.set_text_content(Some(&line));
        }
    }
}

// --- Entry points (wrapped by lib.rs) ---------------------------------------

pub fn start(config_json: Option<String>) -> Result<(), TrainingError> {
    let cfg = config_json.as_deref().map(TrainingConfig::from_json);
    TRAINER.with(|cell| -> Result<(), TrainingError> {
        let mut slot = cell.borrow_mut();
        match (slot.as_mut(), cfg) {
            // keep the camera, swap in a session built from the new config
            (Some(t), Some(cfg)) => t.lp.reconfigure(cfg),
            (Some(_), None) => {}
            (None, cfg) => *slot = Some(build_trainer(cfg.unwrap_or_default())?),
        }
        Ok(())
    })?;
    with_trainer(|t| {
        t.lp.start(now_ms());
        t.snapshot = t.lp.snapshot();
        render_overlay(t);
    })?;
    ensure_clock_timer();
    ensure_loop();
    Ok(())
}

pub fn stop() -> Result<(), TrainingError> {
    with_trainer(|t| {
        t.lp.stop();
        t.snapshot = t.lp.snapshot();
        render_overlay(t);
    })
}

/// Flip the camera. Resolves to whether it is now on.
pub async fn toggle_camera() -> Result<bool, TrainingError> {
    let active = with_trainer(|t| t.lp.source().is_active())?;
    if active {
        with_trainer(|t| {
            t.lp.deactivate_camera();
            t.snapshot = t.lp.snapshot();
            render_overlay(t);
        })?;
        return Ok(false);
    }
    match request_stream().await {
        Ok(stream) => {
            with_trainer(|t| {
                t.lp.session_mut().reset_motion();
                t.lp.source_mut().attach(stream);
            })?;
            ensure_loop();
            Ok(true)
        }
        Err(e) => {
            log::error!("camera error: {e}");
            if let Some(w) = window() {
                let _ = w.alert_with_message("Camera permission denied or unavailable.");
            }
            Err(e)
        }
    }
}

pub fn set_difficulty(label: Option<String>) -> Result<(), TrainingError> {
    let pinned = label.as_deref().map(Difficulty::from_label);
    with_trainer(|t| t.lp.session_mut().set_difficulty(pinned))
}

/// Manual "new combo". Ignored while one is already on its way.
pub fn request_combo() -> Result<bool, TrainingError> {
    let req = with_trainer(|t| {
        let session = t.lp.session_mut();
        session.request_spawn().map(|r| (r, session.inbox()))
    })?;
    Ok(match req {
        Some((r, inbox)) => {
            fire_spawn(r, inbox);
            true
        }
        None => false,
    })
}

pub fn snapshot_json() -> String {
    TRAINER.with(|cell| {
        cell.borrow()
            .as_ref()
            .map(|t| t.snapshot.to_json())
            .unwrap_or_else(|| OverlaySnapshot::default().to_json())
    })
}

pub fn set_combo_generator(fetch: js_sys::Function) {
    GENERATOR.with(|g| *g.borrow_mut() = Rc::new(JsComboGenerator { fetch }));
}

pub fn set_cornerman(ask: js_sys::Function) {
    CORNERMAN.with(|c| *c.borrow_mut() = Some(Rc::new(JsCornerman { ask })));
}

/// One exchange with the cornerman. Blank input resolves to `None`.
pub async fn ask_cornerman(text: String) -> Option<String> {
    let history = CORNER_LOG.with(|l| l.borrow_mut().push_user(&text))?;
    let corner = CORNERMAN.with(|c| c.borrow().clone());
    let reply = match corner {
        Some(corner) => corner.advise(&history, text.trim()).await,
        None => coach::settle_reply(Err("no cornerman configured".into())),
    };
    CORNER_LOG.with(|l| l.borrow_mut().push_reply(reply.clone()));
    Some(reply)
}
