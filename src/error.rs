//! Errors surfaced to the JS host. The targeting loop itself has none.

use thiserror::Error;
use wasm_bindgen::JsValue;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no window found")]
    NoWindow,
    #[error("no document found")]
    NoDocument,
    #[error("camera capture is not supported in this browser")]
    MediaDevicesUnavailable,
    #[error("camera permission denied or unavailable: {0}")]
    CameraDenied(String),
    #[error("canvas setup failed: {0}")]
    Canvas(String),
    #[error("javascript error: {0}")]
    Js(String),
}

/// Best-effort text for a thrown JS value.
pub fn js_message(value: &JsValue) -> String {
    value.as_string().unwrap_or_else(|| format!("{value:?}"))
}

impl From<TrainingError> for JsValue {
    fn from(err: TrainingError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}

impl From<JsValue> for TrainingError {
    fn from(value: JsValue) -> Self {
        TrainingError::Js(js_message(&value))
    }
}
