//! Sequencer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HaosError;
use crate::sequencer::step_interval_ms;

pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_STEPS: usize = 16;

/// Construction-time settings for a [`Sequencer`](crate::sequencer::Sequencer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SequencerConfig {
    /// Initial tempo in beats per minute.
    pub bpm: f64,
    /// Number of sixteenth-note steps in the grid. Fixed for the sequencer's lifetime.
    pub steps: usize,
    /// Keep cycling after the last step. When false (and no chain is queued)
    /// the sequencer stops itself after one pass.
    pub loop_pattern: bool,
    /// Shuffle amount in [0, 1]. Odd steps are held up to 50% longer.
    /// Out-of-range values are clamped.
    pub swing: f64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        SequencerConfig {
            bpm: DEFAULT_BPM,
            steps: DEFAULT_STEPS,
            loop_pattern: true,
            swing: 0.0,
        }
    }
}

impl SequencerConfig {
    pub fn from_json(json: &str) -> Result<Self, HaosError> {
        let config: SequencerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HaosError> {
        validate_bpm(self.bpm)?;
        if self.steps == 0 {
            return Err(HaosError::InvalidStepCount { steps: self.steps });
        }
        Ok(())
    }
}

/// Any positive tempo whose step interval fits in a `Duration` is accepted.
/// There is no upper bound.
pub fn validate_bpm(bpm: f64) -> Result<(), HaosError> {
    let usable = bpm.is_finite()
        && bpm > 0.0
        && Duration::try_from_secs_f64(step_interval_ms(bpm) / 1000.0).is_ok();
    if usable {
        Ok(())
    } else {
        Err(HaosError::InvalidTempo { bpm })
    }
}

/// Clamp a swing amount into [0, 1]; NaN means straight time.
pub fn clamp_swing(swing: f64) -> f64 {
    if swing.is_nan() {
        0.0
    } else {
        swing.clamp(0.0, 1.0)
    }
}
