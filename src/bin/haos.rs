//! Browse the factory presets and audition their patterns as a text step grid.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use haos_core::config::SequencerConfig;
use haos_core::pattern::DrumVoice;
use haos_core::preset::{Instrument, Preset, PresetCatalog, PresetCategory};
use haos_core::sequencer::{Sequencer, StepEvent, step_interval};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List presets for an instrument (tb303, tr909, tr808)
    List {
        instrument: String,

        /// Only presets in this category (e.g. Bass, FX, Hip-Hop)
        #[clap(short, long)]
        category: Option<String>,
    },
    /// Print one preset as JSON (unknown names fall back to the first preset)
    Show { instrument: String, name: String },
    /// Run a preset's pattern through the sequencer and print each step
    Play {
        instrument: String,
        name: String,

        /// Tempo; defaults to the kit's suggested BPM, or 120
        #[clap(short, long)]
        bpm: Option<f64>,

        /// Number of bars to play
        #[clap(long, default_value_t = 1)]
        bars: usize,

        /// Shuffle amount from 0 (straight) to 1
        #[clap(short, long, default_value_t = 0.0)]
        swing: f64,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let catalog = match PresetCatalog::factory() {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match args.command {
        Command::List { instrument, category } => list(&catalog, &instrument, category.as_deref()),
        Command::Show { instrument, name } => show(&catalog, &instrument, &name),
        Command::Play {
            instrument,
            name,
            bpm,
            bars,
            swing,
        } => play(&catalog, &instrument, &name, bpm, bars, swing),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn known_instrument(instrument: &str) -> Result<Instrument, String> {
    Instrument::from_id(instrument).ok_or_else(|| {
        let known: Vec<&str> = Instrument::ALL.iter().map(Instrument::id).collect();
        format!("unknown instrument '{instrument}' (expected one of {})", known.join(", "))
    })
}

fn list(catalog: &PresetCatalog, instrument: &str, category: Option<&str>) -> Result<(), String> {
    let id = known_instrument(instrument)?;
    let presets: Vec<&Preset> = match category {
        Some(name) => {
            let category = PresetCategory::from_name(name)
                .ok_or_else(|| format!("unknown category '{name}'"))?;
            catalog.presets_in_category(instrument, category)
        }
        None => catalog.get_all_presets(instrument).iter().collect(),
    };

    println!("{} presets ({}):", id.display_name(), presets.len());
    for preset in presets {
        let marker = if preset.has_pattern() { "*" } else { " " };
        println!(
            "  {marker} {:<20} {:<10} {}",
            preset.name(),
            preset.category(),
            preset.description()
        );
    }
    Ok(())
}

fn show(catalog: &PresetCatalog, instrument: &str, name: &str) -> Result<(), String> {
    known_instrument(instrument)?;
    let preset = catalog
        .get_preset(instrument, name)
        .ok_or_else(|| format!("no presets for {instrument}"))?;
    let json = serde_json::to_string_pretty(preset).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn play(
    catalog: &PresetCatalog,
    instrument: &str,
    name: &str,
    bpm: Option<f64>,
    bars: usize,
    swing: f64,
) -> Result<(), String> {
    known_instrument(instrument)?;
    let preset = catalog
        .get_preset(instrument, name)
        .ok_or_else(|| format!("no presets for {instrument}"))?;

    let bpm = bpm.unwrap_or(match preset {
        Preset::DrumKit(kit) => kit.bpm,
        Preset::Tb303(_) => 120.0,
    });
    let config = SequencerConfig {
        bpm,
        loop_pattern: bars > 1,
        swing,
        ..Default::default()
    };
    let mut sequencer = Sequencer::new(config).map_err(|e| e.to_string())?;
    if !sequencer.load_preset(preset) {
        return Err(format!("preset '{}' has no pattern", preset.name()));
    }

    let total = bars * sequencer.step_count();
    let (events, received) = crossbeam_channel::unbounded();
    let pattern = sequencer.pattern();
    sequencer.on_step(move |step| {
        let _ = events.send(StepEvent {
            step,
            bass: pattern.bass(step).filter(|h| h.active).cloned(),
            drums: pattern.drums(step).filter(|h| h.active).cloned(),
        });
    });

    println!("{} ({}) at {bpm} BPM", preset.name(), preset.category());
    sequencer.start().map_err(|e| e.to_string())?;
    let timeout = step_interval(bpm)
        .saturating_mul(4)
        .saturating_add(Duration::from_secs(1));
    for _ in 0..total {
        match received.recv_timeout(timeout) {
            Ok(event) => println!("{}", render(&event)),
            Err(_) => break,
        }
    }
    sequencer.stop();
    Ok(())
}

fn render(event: &StepEvent) -> String {
    let bass = match &event.bass {
        Some(hit) => {
            let mut note = hit.note.clone();
            if hit.accent {
                note.push('!');
            }
            if hit.slide {
                note.push('~');
            }
            note
        }
        None => "·".to_string(),
    };
    let drums = match &event.drums {
        Some(hit) => hit
            .voices
            .iter()
            .map(DrumVoice::as_str)
            .collect::<Vec<_>>()
            .join("+"),
        None => "·".to_string(),
    };
    format!("{:>2} | {bass:<6} | {drums}", event.step + 1)
}
