//! Step grid: a fixed number of sixteenth-note slots holding bass and drum hits.

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_STEPS;

/// Steps in a standard one-bar pattern.
pub const STEP_COUNT: usize = DEFAULT_STEPS;

/// Note assigned to a bass step switched on from an empty slot.
pub const DEFAULT_BASS_NOTE: &str = "C2";

// ── Tracks ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Bass,
    Drums,
}

/// A full step array for one track, used to replace that track wholesale.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSteps {
    Bass(Vec<Option<BassHit>>),
    Drums(Vec<Option<DrumHit>>),
}

impl TrackSteps {
    pub fn track(&self) -> Track {
        match self {
            TrackSteps::Bass(_) => Track::Bass,
            TrackSteps::Drums(_) => Track::Drums,
        }
    }
}

// ── Hits ────────────────────────────────────────────────────

/// A bass-line note on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BassHit {
    pub active: bool,
    /// Note name as written ("C2", "D#2", "Bb1").
    pub note: String,
    /// MIDI note number for `note`.
    pub midi: u8,
    #[serde(default)]
    pub accent: bool,
    #[serde(default)]
    pub slide: bool,
    /// Velocity in [0, 1].
    #[serde(default = "full_velocity")]
    pub velocity: f64,
}

fn full_velocity() -> f64 {
    1.0
}

impl BassHit {
    /// An active, unaccented, unslid note. `None` if the note name does not parse.
    pub fn new(note: &str) -> Option<Self> {
        Some(BassHit {
            active: true,
            note: note.to_string(),
            midi: note_to_midi(note)?,
            accent: false,
            slide: false,
            velocity: 1.0,
        })
    }

    pub fn with_accent(mut self, accent: bool) -> Self {
        self.accent = accent;
        self
    }

    pub fn with_slide(mut self, slide: bool) -> Self {
        self.slide = slide;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DrumVoice {
    Kick,
    Snare,
    Clap,
    Hat,
    HatClosed,
    HatOpen,
    Perc,
    Ride,
    Crash,
}

impl DrumVoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrumVoice::Kick => "kick",
            DrumVoice::Snare => "snare",
            DrumVoice::Clap => "clap",
            DrumVoice::Hat => "hat",
            DrumVoice::HatClosed => "hatClosed",
            DrumVoice::HatOpen => "hatOpen",
            DrumVoice::Perc => "perc",
            DrumVoice::Ride => "ride",
            DrumVoice::Crash => "crash",
        }
    }
}

/// Everything the drum machine plays on one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrumHit {
    pub active: bool,
    /// Voices triggered together on this step, in voice order.
    pub voices: Vec<DrumVoice>,
    /// Velocity in [0, 1].
    #[serde(default = "full_velocity")]
    pub velocity: f64,
}

impl DrumHit {
    pub fn new(voices: Vec<DrumVoice>) -> Self {
        DrumHit {
            active: true,
            voices,
            velocity: 1.0,
        }
    }
}

// ── Pattern ─────────────────────────────────────────────────

/// Per-track step arrays of a fixed length chosen at construction.
///
/// Track arrays handed in through [`Pattern::set_track`] are truncated or
/// padded with empty slots, so every index in `0..len()` is always valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    bass: Vec<Option<BassHit>>,
    drums: Vec<Option<DrumHit>>,
}

impl Default for Pattern {
    fn default() -> Self {
        Pattern::with_steps(STEP_COUNT)
    }
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: usize) -> Self {
        Pattern {
            bass: vec![None; steps],
            drums: vec![None; steps],
        }
    }

    /// Number of steps. Never changes after construction.
    pub fn len(&self) -> usize {
        self.bass.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bass.iter().all(Option::is_none) && self.drums.iter().all(Option::is_none)
    }

    pub fn bass(&self, step: usize) -> Option<&BassHit> {
        self.bass.get(step).and_then(Option::as_ref)
    }

    pub fn drums(&self, step: usize) -> Option<&DrumHit> {
        self.drums.get(step).and_then(Option::as_ref)
    }

    pub fn bass_track(&self) -> &[Option<BassHit>] {
        &self.bass
    }

    pub fn drum_track(&self) -> &[Option<DrumHit>] {
        &self.drums
    }

    pub fn set_track(&mut self, steps: TrackSteps) {
        let len = self.len();
        match steps {
            TrackSteps::Bass(mut bass) => {
                bass.resize(len, None);
                self.bass = bass;
            }
            TrackSteps::Drums(mut drums) => {
                drums.resize(len, None);
                self.drums = drums;
            }
        }
    }

    pub fn set_bass(&mut self, step: usize, hit: Option<BassHit>) {
        if let Some(slot) = self.bass.get_mut(step) {
            *slot = hit;
        }
    }

    pub fn set_drums(&mut self, step: usize, hit: Option<DrumHit>) {
        if let Some(slot) = self.drums.get_mut(step) {
            *slot = hit;
        }
    }

    /// Flip a step's `active` flag. An empty slot gets a default hit
    /// (bass: [`DEFAULT_BASS_NOTE`], drums: kick). Out-of-range steps are ignored.
    pub fn toggle(&mut self, track: Track, step: usize) {
        match track {
            Track::Bass => {
                if let Some(slot) = self.bass.get_mut(step) {
                    match slot {
                        Some(hit) => hit.active = !hit.active,
                        None => *slot = BassHit::new(DEFAULT_BASS_NOTE),
                    }
                }
            }
            Track::Drums => {
                if let Some(slot) = self.drums.get_mut(step) {
                    match slot {
                        Some(hit) => hit.active = !hit.active,
                        None => *slot = Some(DrumHit::new(vec![DrumVoice::Kick])),
                    }
                }
            }
        }
    }

    /// Empty both tracks. The length is kept.
    pub fn clear(&mut self) {
        self.bass.iter_mut().for_each(|s| *s = None);
        self.drums.iter_mut().for_each(|s| *s = None);
    }
}

// ── Note names ──────────────────────────────────────────────

/// Parse a note name (e.g. "C2", "D#2", "Bb1") into a MIDI note number.
/// C4 = 60. Returns `None` for malformed names or notes outside 0..=127.
pub fn note_to_midi(note: &str) -> Option<u8> {
    let bytes = note.as_bytes();
    let base_semitone: i32 = match bytes.first()? {
        b'C' => 0,
        b'D' => 2,
        b'E' => 4,
        b'F' => 5,
        b'G' => 7,
        b'A' => 9,
        b'B' => 11,
        _ => return None,
    };

    let mut idx = 1;
    let mut semitone = base_semitone;
    match bytes.get(idx) {
        Some(b'#') => {
            semitone += 1;
            idx += 1;
        }
        Some(b'b') => {
            semitone -= 1;
            idx += 1;
        }
        _ => {}
    }

    let octave: i32 = note[idx..].parse().ok()?;
    let midi = octave.checked_add(1)?.checked_mul(12)?.checked_add(semitone)?;
    u8::try_from(midi).ok().filter(|m| *m <= 127)
}
