//! ShadowBox AR core crate.
//!
//! The combo trainer samples the webcam every animation frame, differences
//! consecutive downsampled frames into a motion mask and scores incoming
//! punch targets against it. Gameplay logic lives in [`training`] and is
//! plain Rust, testable natively; the private `web` module binds it to the
//! browser.

use wasm_bindgen::prelude::*;

pub mod coach;
pub mod error;
pub mod training;
mod web;

// Optional small allocator for size (feature gated)
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn wasm_start() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

// -----------------------------------------------------------------------------
// Training view entrypoints
// -----------------------------------------------------------------------------

/// Start (or restart) a round. `config_json` may override any tunable.
#[wasm_bindgen]
pub fn start_training(config_json: Option<String>) -> Result<(), JsValue> {
    web::start(config_json)?;
    Ok(())
}

#[wasm_bindgen]
pub fn stop_training() -> Result<(), JsValue> {
    web::stop()?;
    Ok(())
}

/// Resolves to `true` when the camera is now on.
#[wasm_bindgen]
pub async fn toggle_camera() -> Result<bool, JsValue> {
    Ok(web::toggle_camera().await?)
}

/// Pin "Beginner" / "Intermediate" / "Advanced"; pass nothing to follow the score.
#[wasm_bindgen]
pub fn set_difficulty(label: Option<String>) -> Result<(), JsValue> {
    web::set_difficulty(label)?;
    Ok(())
}

/// Returns `false` when a combo is already being generated.
#[wasm_bindgen]
pub fn request_combo() -> Result<bool, JsValue> {
    Ok(web::request_combo()?)
}

/// Latest published overlay state as JSON.
#[wasm_bindgen]
pub fn overlay_snapshot() -> String {
    web::snapshot_json()
}

// -----------------------------------------------------------------------------
// Host capabilities
// -----------------------------------------------------------------------------

/// `(difficulty, focus) => Promise<string | object>` producing combo JSON.
#[wasm_bindgen]
pub fn set_combo_generator(fetch: js_sys::Function) {
    web::set_combo_generator(fetch);
}

/// `(historyJson, message) => Promise<string>` producing a coach reply.
#[wasm_bindgen]
pub fn set_cornerman(ask: js_sys::Function) {
    web::set_cornerman(ask);
}

#[wasm_bindgen]
pub async fn ask_cornerman(text: String) -> Result<JsValue, JsValue> {
    Ok(match web::ask_cornerman(text).await {
        Some(reply) => JsValue::from_str(&reply),
        None => JsValue::UNDEFINED,
    })
}
