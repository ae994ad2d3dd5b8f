use std::fmt;

#[derive(Debug)]
pub enum HaosError {
    /// Tempo that cannot produce a step interval: NaN, infinite, zero,
    /// negative, or so slow the interval overflows a `Duration`.
    InvalidTempo { bpm: f64 },
    /// A step grid must hold at least one step.
    InvalidStepCount { steps: usize },
    Catalog(CatalogError),
    /// The clock driving playback could not be started.
    Clock(std::io::Error),
}

#[derive(Debug)]
pub enum CatalogError {
    Json(serde_json::Error),
    DuplicateName {
        instrument: String,
        name: String,
    },
    BadPatternRow {
        preset: String,
        voice: String,
        len: usize,
    },
    UnknownNote {
        preset: String,
        note: String,
    },
}

impl fmt::Display for HaosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaosError::InvalidTempo { bpm } => write!(f, "Invalid tempo: {bpm} BPM"),
            HaosError::InvalidStepCount { steps } => write!(f, "Invalid step count: {steps}"),
            HaosError::Catalog(e) => write!(f, "Catalog error: {e}"),
            HaosError::Clock(e) => write!(f, "Could not start sequencer clock: {e}"),
        }
    }
}

impl std::error::Error for HaosError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HaosError::Catalog(e) => Some(e),
            HaosError::Clock(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Json(e) => write!(f, "malformed catalog JSON: {e}"),
            CatalogError::DuplicateName { instrument, name } => {
                write!(f, "duplicate preset '{name}' for {instrument}")
            }
            CatalogError::BadPatternRow { preset, voice, len } => {
                write!(f, "preset '{preset}': {voice} row has {len} steps, expected 16")
            }
            CatalogError::UnknownNote { preset, note } => {
                write!(f, "preset '{preset}': unknown note '{note}'")
            }
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CatalogError> for HaosError {
    fn from(e: CatalogError) -> Self {
        HaosError::Catalog(e)
    }
}

impl From<serde_json::Error> for HaosError {
    fn from(e: serde_json::Error) -> Self {
        HaosError::Catalog(CatalogError::Json(e))
    }
}
