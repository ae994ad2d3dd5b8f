use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, HaosError};
use crate::pattern::{STEP_COUNT, note_to_midi};
use crate::preset::types::{DrumKitPreset, Instrument, Preset, PresetCategory, Tb303Preset};

/// Factory presets shipped with the crate.
pub const FACTORY_JSON: &str = include_str!("../../assets/factory_presets.json");

/// On-disk catalog layout: one ordered list per instrument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub tb303: Vec<Tb303Preset>,
    #[serde(default)]
    pub tr909: Vec<DrumKitPreset>,
    #[serde(default)]
    pub tr808: Vec<DrumKitPreset>,
}

/// Read-only, ordered presets per instrument.
#[derive(Debug, Clone, Default)]
pub struct PresetCatalog {
    presets: BTreeMap<Instrument, Vec<Preset>>,
}

impl PresetCatalog {
    /// Load and validate the embedded factory catalog.
    pub fn factory() -> Result<Self, HaosError> {
        Self::from_json(FACTORY_JSON)
    }

    /// Parse a catalog and check it: preset names unique per instrument,
    /// drum rows exactly one bar long, bass-line notes parseable.
    pub fn from_json(json: &str) -> Result<Self, HaosError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        Self::from_file(file)
    }

    pub fn from_file(file: CatalogFile) -> Result<Self, HaosError> {
        for preset in &file.tb303 {
            validate_bass_line(preset)?;
        }
        for kit in file.tr909.iter().chain(&file.tr808) {
            validate_drum_rows(kit)?;
        }

        let mut presets: BTreeMap<Instrument, Vec<Preset>> = BTreeMap::new();
        presets.insert(Instrument::Tb303, file.tb303.into_iter().map(Preset::Tb303).collect());
        presets.insert(Instrument::Tr909, file.tr909.into_iter().map(Preset::DrumKit).collect());
        presets.insert(Instrument::Tr808, file.tr808.into_iter().map(Preset::DrumKit).collect());

        for (instrument, list) in &presets {
            validate_unique_names(*instrument, list)?;
        }

        let catalog = PresetCatalog { presets };
        log::debug!("loaded preset catalog with {} presets", catalog.total_count());
        Ok(catalog)
    }

    /// The named preset, or the instrument's first preset when the name is
    /// not found, or `None` when the instrument is unknown.
    pub fn get_preset(&self, instrument: &str, name: &str) -> Option<&Preset> {
        let list = self.get_all_presets(instrument);
        match list.iter().find(|p| p.name() == name) {
            Some(preset) => Some(preset),
            None => {
                let first = list.first()?;
                log::debug!(
                    "no {instrument} preset named '{name}', defaulting to '{}'",
                    first.name()
                );
                Some(first)
            }
        }
    }

    /// Every preset for the instrument in catalog order; empty when unknown.
    pub fn get_all_presets(&self, instrument: &str) -> &[Preset] {
        Instrument::from_id(instrument)
            .map(|i| self.presets(i))
            .unwrap_or(&[])
    }

    pub fn presets(&self, instrument: Instrument) -> &[Preset] {
        self.presets.get(&instrument).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Exact-name lookup, no fallback.
    pub fn find(&self, instrument: Instrument, name: &str) -> Option<&Preset> {
        self.presets(instrument).iter().find(|p| p.name() == name)
    }

    pub fn presets_in_category(&self, instrument: &str, category: PresetCategory) -> Vec<&Preset> {
        self.get_all_presets(instrument)
            .iter()
            .filter(|p| p.category() == category)
            .collect()
    }

    /// Categories used by the instrument's presets, in order of first appearance.
    pub fn categories(&self, instrument: &str) -> Vec<PresetCategory> {
        let mut seen = Vec::new();
        for preset in self.get_all_presets(instrument) {
            if !seen.contains(&preset.category()) {
                seen.push(preset.category());
            }
        }
        seen
    }

    pub fn instruments(&self) -> impl Iterator<Item = Instrument> + '_ {
        self.presets.keys().copied()
    }

    pub fn total_count(&self) -> usize {
        self.presets.values().map(Vec::len).sum()
    }
}

fn validate_unique_names(instrument: Instrument, list: &[Preset]) -> Result<(), CatalogError> {
    let mut names = HashSet::new();
    for preset in list {
        if !names.insert(preset.name()) {
            return Err(CatalogError::DuplicateName {
                instrument: instrument.id().to_string(),
                name: preset.name().to_string(),
            });
        }
    }
    Ok(())
}

fn validate_drum_rows(kit: &DrumKitPreset) -> Result<(), CatalogError> {
    for (voice, row) in kit.pattern.iter().flatten() {
        if row.len() != STEP_COUNT {
            return Err(CatalogError::BadPatternRow {
                preset: kit.name.clone(),
                voice: voice.as_str().to_string(),
                len: row.len(),
            });
        }
    }
    Ok(())
}

fn validate_bass_line(preset: &Tb303Preset) -> Result<(), CatalogError> {
    for step in preset.pattern.iter().flatten() {
        if note_to_midi(&step.note).is_none() {
            return Err(CatalogError::UnknownNote {
                preset: preset.name.clone(),
                note: step.note.clone(),
            });
        }
    }
    Ok(())
}
