pub mod config;
pub mod error;
pub mod pattern;
pub mod preset;
pub mod scheduler;
pub mod sequencer;
pub mod web;

use std::sync::OnceLock;

use serde::Serialize;
use wasm_bindgen::prelude::*;

use crate::error::HaosError;
use crate::preset::PresetCatalog;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

static FACTORY: OnceLock<PresetCatalog> = OnceLock::new();

/// The embedded factory catalog, parsed and validated on first use.
pub fn factory_catalog() -> Result<&'static PresetCatalog, HaosError> {
    if let Some(catalog) = FACTORY.get() {
        return Ok(catalog);
    }
    let catalog = PresetCatalog::factory()?;
    Ok(FACTORY.get_or_init(|| catalog))
}

/// Serialize to a plain JS value (objects rather than `Map`s, `null` for `None`).
pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: return the haos-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: sixteenth-note step length in milliseconds for a tempo.
#[wasm_bindgen(js_name = stepIntervalMs)]
pub fn step_interval_ms(bpm: f64) -> f64 {
    sequencer::step_interval_ms(bpm)
}

/// WASM-exposed: the named preset, the instrument's first preset when the
/// name is unknown, or `null` when the instrument is unknown.
#[wasm_bindgen(js_name = getPreset)]
pub fn get_preset(instrument: &str, name: &str) -> Result<JsValue, JsValue> {
    let catalog = factory_catalog().map_err(|e| JsValue::from_str(&format!("{e}")))?;
    match catalog.get_preset(instrument, name) {
        Some(preset) => to_js(preset),
        None => Ok(JsValue::NULL),
    }
}

/// WASM-exposed: all presets for an instrument, `[]` when unknown.
#[wasm_bindgen(js_name = getAllPresets)]
pub fn get_all_presets(instrument: &str) -> Result<JsValue, JsValue> {
    let catalog = factory_catalog().map_err(|e| JsValue::from_str(&format!("{e}")))?;
    to_js(catalog.get_all_presets(instrument))
}

/// WASM-exposed: presets of one category (e.g. "Bass", "FX", "Hip-Hop").
/// Unknown categories yield `[]`.
#[wasm_bindgen(js_name = getPresetsInCategory)]
pub fn get_presets_in_category(instrument: &str, category: &str) -> Result<JsValue, JsValue> {
    let catalog = factory_catalog().map_err(|e| JsValue::from_str(&format!("{e}")))?;
    let presets = preset::PresetCategory::from_name(category)
        .map(|c| catalog.presets_in_category(instrument, c))
        .unwrap_or_default();
    to_js(&presets)
}
