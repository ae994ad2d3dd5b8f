//! Browser-facing sequencer.
//!
//! The page keeps ownership of the real clock: it calls
//! [`WebSequencer::advance`] on every fire of its own timer, then reads
//! [`WebSequencer::next_interval_ms`] to schedule the next one (swung steps
//! are longer). Each call returns the step events that fired so the page can
//! trigger its Web Audio voices.

use std::sync::{Arc, Mutex, PoisonError};

use wasm_bindgen::prelude::*;

use crate::config::SequencerConfig;
use crate::pattern::{BassHit, DrumHit, Track, TrackSteps};
use crate::scheduler::ManualScheduler;
use crate::sequencer::{Sequencer, StepEvent, step_interval_ms};
use crate::{factory_catalog, to_js};

#[derive(Default)]
struct Pending {
    bass: Option<BassHit>,
    drums: Option<DrumHit>,
    fired: Vec<StepEvent>,
}

#[wasm_bindgen]
pub struct WebSequencer {
    sequencer: Sequencer<ManualScheduler>,
    clock: ManualScheduler,
    pending: Arc<Mutex<Pending>>,
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{e}"))
}

fn parse_track(track: &str) -> Option<Track> {
    match track {
        "bass" => Some(Track::Bass),
        "drums" => Some(Track::Drums),
        _ => None,
    }
}

#[wasm_bindgen]
impl WebSequencer {
    #[wasm_bindgen(constructor)]
    pub fn new(bpm: f64) -> Result<WebSequencer, JsValue> {
        let clock = ManualScheduler::new();
        let config = SequencerConfig { bpm, ..Default::default() };
        let sequencer = Sequencer::with_scheduler(config, clock.clone()).map_err(js_err)?;
        let pending = Arc::new(Mutex::new(Pending::default()));

        // tick() reports bass, then drums, then the step itself.
        let p = Arc::clone(&pending);
        sequencer.on_bass_note(move |hit| {
            p.lock().unwrap_or_else(PoisonError::into_inner).bass = Some(hit.clone());
        });
        let p = Arc::clone(&pending);
        sequencer.on_drums(move |hit| {
            p.lock().unwrap_or_else(PoisonError::into_inner).drums = Some(hit.clone());
        });
        let p = Arc::clone(&pending);
        sequencer.on_step(move |step| {
            let mut p = p.lock().unwrap_or_else(PoisonError::into_inner);
            let event = StepEvent {
                step,
                bass: p.bass.take(),
                drums: p.drums.take(),
            };
            p.fired.push(event);
        });

        Ok(WebSequencer {
            sequencer,
            clock,
            pending,
        })
    }

    pub fn start(&mut self) -> Result<(), JsValue> {
        self.sequencer.start().map_err(js_err)
    }

    pub fn stop(&mut self) {
        self.sequencer.stop();
    }

    pub fn pause(&mut self) {
        self.sequencer.pause();
    }

    pub fn resume(&mut self) -> Result<(), JsValue> {
        self.sequencer.resume().map_err(js_err)
    }

    #[wasm_bindgen(js_name = setBPM)]
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), JsValue> {
        self.sequencer.set_bpm(bpm).map_err(js_err)
    }

    /// Straight sixteenth-note interval at the current tempo.
    #[wasm_bindgen(js_name = stepIntervalMs)]
    pub fn step_interval_ms(&self) -> f64 {
        step_interval_ms(self.sequencer.transport().bpm)
    }

    /// Delay before the next `advance()`, swing included. Falls back to the
    /// straight interval while stopped.
    #[wasm_bindgen(js_name = nextIntervalMs)]
    pub fn next_interval_ms(&self) -> f64 {
        match self.clock.period() {
            Some(gap) => gap.as_secs_f64() * 1000.0,
            None => self.step_interval_ms(),
        }
    }

    /// Shuffle amount, clamped to [0, 1].
    #[wasm_bindgen(js_name = setSwing)]
    pub fn set_swing(&mut self, swing: f64) {
        self.sequencer.set_swing(swing);
    }

    /// Run one clock fire. Returns an array of step events (empty when stopped).
    pub fn advance(&mut self) -> Result<JsValue, JsValue> {
        self.clock.fire(1);
        let fired = std::mem::take(
            &mut self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .fired,
        );
        to_js(&fired)
    }

    /// Replace a track from a JS array of hits (or nulls).
    #[wasm_bindgen(js_name = setPattern)]
    pub fn set_pattern(&mut self, track: &str, steps: JsValue) -> Result<(), JsValue> {
        let steps = match parse_track(track) {
            Some(Track::Bass) => TrackSteps::Bass(serde_wasm_bindgen::from_value(steps)?),
            Some(Track::Drums) => TrackSteps::Drums(serde_wasm_bindgen::from_value(steps)?),
            None => return Err(JsValue::from_str(&format!("unknown track '{track}'"))),
        };
        self.sequencer.set_pattern(steps);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.sequencer.clear();
    }

    /// Unknown tracks and out-of-range steps are ignored.
    #[wasm_bindgen(js_name = toggleStep)]
    pub fn toggle_step(&mut self, track: &str, step: usize) {
        if let Some(track) = parse_track(track) {
            self.sequencer.toggle_step(track, step);
        }
    }

    /// Load the demo pattern of a factory preset (with the usual name fallback).
    #[wasm_bindgen(js_name = loadPreset)]
    pub fn load_preset(&mut self, instrument: &str, name: &str) -> Result<bool, JsValue> {
        let catalog = factory_catalog().map_err(js_err)?;
        Ok(catalog
            .get_preset(instrument, name)
            .is_some_and(|preset| self.sequencer.load_preset(preset)))
    }

    pub fn status(&self) -> Result<JsValue, JsValue> {
        to_js(&self.sequencer.status())
    }

    pub fn pattern(&self) -> Result<JsValue, JsValue> {
        to_js(&self.sequencer.pattern())
    }
}
