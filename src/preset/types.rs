//! Typed factory preset format.
//!
//! One struct per instrument family, with named numeric fields. These map
//! directly onto `assets/factory_presets.json`; all keys are camelCase and a
//! TB-303 preset's synth parameters sit flat next to its name and category.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::{BassHit, DrumHit, DrumVoice};

// ── Instruments & categories ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Tb303,
    Tr909,
    Tr808,
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [Instrument::Tb303, Instrument::Tr909, Instrument::Tr808];

    /// Parse a catalog identifier ("tb303", "tr909", "tr808"). Unknown ids are `None`.
    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "tb303" => Some(Instrument::Tb303),
            "tr909" => Some(Instrument::Tr909),
            "tr808" => Some(Instrument::Tr808),
            _ => None,
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Instrument::Tb303 => "tb303",
            Instrument::Tr909 => "tr909",
            Instrument::Tr808 => "tr808",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Instrument::Tb303 => "TB-303",
            Instrument::Tr909 => "TR-909",
            Instrument::Tr808 => "TR-808",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Closed set of preset categories. Used for filtering only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresetCategory {
    Classic,
    Bass,
    Lead,
    #[serde(rename = "FX")]
    Fx,
    Techno,
    House,
    Kick,
    #[serde(rename = "Hip-Hop")]
    HipHop,
    #[serde(rename = "Lo-Fi")]
    LoFi,
    Electronic,
}

impl PresetCategory {
    pub const ALL: [PresetCategory; 10] = [
        PresetCategory::Classic,
        PresetCategory::Bass,
        PresetCategory::Lead,
        PresetCategory::Fx,
        PresetCategory::Techno,
        PresetCategory::House,
        PresetCategory::Kick,
        PresetCategory::HipHop,
        PresetCategory::LoFi,
        PresetCategory::Electronic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetCategory::Classic => "Classic",
            PresetCategory::Bass => "Bass",
            PresetCategory::Lead => "Lead",
            PresetCategory::Fx => "FX",
            PresetCategory::Techno => "Techno",
            PresetCategory::House => "House",
            PresetCategory::Kick => "Kick",
            PresetCategory::HipHop => "Hip-Hop",
            PresetCategory::LoFi => "Lo-Fi",
            PresetCategory::Electronic => "Electronic",
        }
    }

    /// Case-insensitive lookup by display name ("fx", "hip-hop", "Lo-Fi").
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for PresetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── TB-303 ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sawtooth,
    Square,
}

/// Bass-line synth voice parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tb303Params {
    pub waveform: Waveform,
    /// Filter cutoff in Hz.
    pub cutoff: f64,
    /// Filter resonance (Q).
    pub resonance: f64,
    /// Envelope modulation depth [0, 1].
    pub env_mod: f64,
    /// Envelope decay in seconds.
    pub decay: f64,
    /// Portamento time in seconds for slid notes.
    pub slide_time: f64,
}

/// One step of a preset's demo bass line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tb303Step {
    pub note: String,
    pub active: bool,
    #[serde(default)]
    pub accent: bool,
    #[serde(default)]
    pub slide: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tb303Preset {
    pub name: String,
    pub category: PresetCategory,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub params: Tb303Params,
    /// Demo bass line; may be shorter than the step grid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Vec<Tb303Step>>,
}

impl Tb303Preset {
    /// The demo bass line laid out over `steps` slots, repeating a shorter
    /// line until the grid is full. `None` if the preset has no line.
    pub fn bass_steps(&self, steps: usize) -> Option<Vec<Option<BassHit>>> {
        let line = self.pattern.as_ref().filter(|p| !p.is_empty())?;
        Some(
            (0..steps)
                .map(|i| {
                    let step = &line[i % line.len()];
                    BassHit::new(&step.note).map(|hit| BassHit {
                        active: step.active,
                        accent: step.accent,
                        slide: step.slide,
                        ..hit
                    })
                })
                .collect(),
        )
    }
}

// ── Drum machines ───────────────────────────────────────────

/// Per-voice drum parameters. Which fields apply depends on the machine
/// and the voice; absent fields keep the engine's default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrumVoiceParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tune: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snappy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
}

/// A drum-machine kit: voice settings, a suggested tempo and an optional
/// one-bar trigger pattern (one 16-entry 0/1 row per voice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrumKitPreset {
    pub name: String,
    pub category: PresetCategory,
    #[serde(default)]
    pub description: String,
    pub bpm: f64,
    pub voices: BTreeMap<DrumVoice, DrumVoiceParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<BTreeMap<DrumVoice, Vec<u8>>>,
}

impl DrumKitPreset {
    /// Merge the per-voice rows into one drum hit per step. Steps where no
    /// voice fires stay empty. `None` if the kit has no pattern.
    pub fn drum_steps(&self, steps: usize) -> Option<Vec<Option<DrumHit>>> {
        let rows = self.pattern.as_ref().filter(|p| !p.is_empty())?;
        Some(
            (0..steps)
                .map(|i| {
                    let voices: Vec<DrumVoice> = rows
                        .iter()
                        .filter(|(_, row)| !row.is_empty() && row[i % row.len()] != 0)
                        .map(|(voice, _)| *voice)
                        .collect();
                    (!voices.is_empty()).then(|| DrumHit::new(voices))
                })
                .collect(),
        )
    }
}

// ── Preset ──────────────────────────────────────────────────

/// Any catalog preset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Preset {
    Tb303(Tb303Preset),
    DrumKit(DrumKitPreset),
}

impl Preset {
    pub fn name(&self) -> &str {
        match self {
            Preset::Tb303(p) => &p.name,
            Preset::DrumKit(p) => &p.name,
        }
    }

    pub fn category(&self) -> PresetCategory {
        match self {
            Preset::Tb303(p) => p.category,
            Preset::DrumKit(p) => p.category,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Preset::Tb303(p) => &p.description,
            Preset::DrumKit(p) => &p.description,
        }
    }

    pub fn has_pattern(&self) -> bool {
        match self {
            Preset::Tb303(p) => p.pattern.as_ref().is_some_and(|l| !l.is_empty()),
            Preset::DrumKit(p) => p.pattern.as_ref().is_some_and(|r| !r.is_empty()),
        }
    }
}
