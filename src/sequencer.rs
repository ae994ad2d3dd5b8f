//! 16-step sequencer: a transport clock that walks the pattern grid and
//! dispatches each step's hits to registered callbacks.
//!
//! State shared with the running timer lives behind one mutex. Callbacks run
//! on the timer's thread while that lock is held, so they must not call back
//! into the [`Sequencer`].

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::config::{SequencerConfig, clamp_swing, validate_bpm};
use crate::error::HaosError;
use crate::pattern::{BassHit, DrumHit, Pattern, Track, TrackSteps};
use crate::preset::Preset;
use crate::scheduler::{Scheduler, ThreadScheduler, TimerHandle};

/// Length of one sixteenth-note step in milliseconds.
pub fn step_interval_ms(bpm: f64) -> f64 {
    (60.0 / bpm) * 1000.0 / 4.0
}

/// [`step_interval_ms`] as a `Duration`. Saturates at `Duration::MAX` for
/// tempos [`validate_bpm`] rejects.
pub fn step_interval(bpm: f64) -> Duration {
    to_duration(step_interval_ms(bpm))
}

/// Gap after `step` with swing applied: odd steps are held
/// `1 + swing / 2` times longer, even steps stay straight.
pub fn swung_interval_ms(bpm: f64, swing: f64, step: usize) -> f64 {
    let straight = step_interval_ms(bpm);
    if swing > 0.0 && step % 2 == 1 {
        straight * (1.0 + swing * 0.5)
    } else {
        straight
    }
}

pub fn swung_interval(bpm: f64, swing: f64, step: usize) -> Duration {
    to_duration(swung_interval_ms(bpm, swing, step))
}

fn to_duration(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
}

// ── Public state ────────────────────────────────────────────

/// Play/stop/tempo/position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportState {
    pub bpm: f64,
    pub current_step: usize,
    pub is_playing: bool,
    /// Stopped by `pause()`; `resume()` continues from `current_step`.
    pub is_paused: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencerStatus {
    #[serde(flatten)]
    pub transport: TransportState,
    pub steps: usize,
    pub swing: f64,
    pub loop_pattern: bool,
    pub chain_length: usize,
}

/// What fired on one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub step: usize,
    pub bass: Option<BassHit>,
    pub drums: Option<DrumHit>,
}

// ── Shared state ────────────────────────────────────────────

type StepFn = Box<dyn FnMut(usize) + Send>;
type BassFn = Box<dyn FnMut(&BassHit) + Send>;
type DrumsFn = Box<dyn FnMut(&DrumHit) + Send>;
type PatternEndFn = Box<dyn FnMut() + Send>;

#[derive(Default)]
struct Callbacks {
    on_step: Option<StepFn>,
    on_bass_note: Option<BassFn>,
    on_drums: Option<DrumsFn>,
    on_pattern_end: Option<PatternEndFn>,
}

struct SequencerState {
    transport: TransportState,
    swing: f64,
    loop_pattern: bool,
    pattern: Pattern,
    chain: Vec<Pattern>,
    chain_index: usize,
    callbacks: Callbacks,
    /// Bumped whenever the timer is (re)armed or disarmed; a fire carrying an
    /// older value belongs to a cancelled timer and is dropped.
    session: u64,
}

impl SequencerState {
    /// Dispatch the current step. Reads only index `current_step` of each track.
    fn tick(&mut self) -> StepEvent {
        let step = self.transport.current_step;
        let bass = self.pattern.bass(step).filter(|h| h.active);
        let drums = self.pattern.drums(step).filter(|h| h.active);

        if let (Some(hit), Some(cb)) = (bass, self.callbacks.on_bass_note.as_mut()) {
            cb(hit);
        }
        if let (Some(hit), Some(cb)) = (drums, self.callbacks.on_drums.as_mut()) {
            cb(hit);
        }
        if let Some(cb) = self.callbacks.on_step.as_mut() {
            cb(step);
        }

        StepEvent {
            step,
            bass: bass.cloned(),
            drums: drums.cloned(),
        }
    }

    /// Move to the next step, handling the wrap at the end of the grid.
    fn advance(&mut self) -> ControlFlow<()> {
        let steps = self.pattern.len();
        self.transport.current_step = (self.transport.current_step + 1) % steps;
        if self.transport.current_step != 0 {
            return ControlFlow::Continue(());
        }

        if let Some(cb) = self.callbacks.on_pattern_end.as_mut() {
            cb();
        }

        if !self.chain.is_empty() {
            self.pattern = self.chain[self.chain_index].clone();
            log::debug!("chained pattern {} of {}", self.chain_index + 1, self.chain.len());
            self.chain_index = (self.chain_index + 1) % self.chain.len();
        } else if !self.loop_pattern {
            self.transport.is_playing = false;
            self.session += 1;
            log::info!("sequencer finished single pass");
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

fn lock(shared: &Mutex<SequencerState>) -> MutexGuard<'_, SequencerState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resize `pattern` to `steps` slots, keeping whatever fits.
fn conform(pattern: Pattern, steps: usize) -> Pattern {
    if pattern.len() == steps {
        return pattern;
    }
    let mut fitted = Pattern::with_steps(steps);
    fitted.set_track(TrackSteps::Bass(pattern.bass_track().to_vec()));
    fitted.set_track(TrackSteps::Drums(pattern.drum_track().to_vec()));
    fitted
}

// ── Sequencer ───────────────────────────────────────────────

/// Step sequencer driven by a [`Scheduler`].
///
/// ```
/// use haos_core::config::SequencerConfig;
/// use haos_core::scheduler::ManualScheduler;
/// use haos_core::sequencer::Sequencer;
///
/// let clock = ManualScheduler::new();
/// let mut seq = Sequencer::with_scheduler(SequencerConfig::default(), clock.clone()).unwrap();
/// seq.start().unwrap();
/// clock.fire(3);
/// assert_eq!(seq.transport().current_step, 3);
/// seq.stop();
/// assert_eq!(seq.transport().current_step, 0);
/// ```
pub struct Sequencer<S: Scheduler = ThreadScheduler> {
    shared: Arc<Mutex<SequencerState>>,
    scheduler: S,
    timer: Option<Box<dyn TimerHandle>>,
}

impl Sequencer<ThreadScheduler> {
    /// A sequencer clocked by its own timer thread.
    pub fn new(config: SequencerConfig) -> Result<Self, HaosError> {
        Self::with_scheduler(config, ThreadScheduler)
    }
}

impl<S: Scheduler> Sequencer<S> {
    pub fn with_scheduler(config: SequencerConfig, scheduler: S) -> Result<Self, HaosError> {
        config.validate()?;
        let state = SequencerState {
            transport: TransportState {
                bpm: config.bpm,
                current_step: 0,
                is_playing: false,
                is_paused: false,
            },
            swing: clamp_swing(config.swing),
            loop_pattern: config.loop_pattern,
            pattern: Pattern::with_steps(config.steps),
            chain: Vec::new(),
            chain_index: 0,
            callbacks: Callbacks::default(),
            session: 0,
        };
        Ok(Sequencer {
            shared: Arc::new(Mutex::new(state)),
            scheduler,
            timer: None,
        })
    }

    fn state(&self) -> MutexGuard<'_, SequencerState> {
        lock(&self.shared)
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
    }

    fn arm_timer(&mut self, session: u64, bpm: f64) -> Result<(), HaosError> {
        let shared = Arc::clone(&self.shared);
        let task = Box::new(move || -> ControlFlow<(), Duration> {
            let mut state = lock(&shared);
            if state.session != session || !state.transport.is_playing {
                return ControlFlow::Break(());
            }
            let played = state.transport.current_step;
            state.tick();
            if state.advance().is_break() {
                return ControlFlow::Break(());
            }
            ControlFlow::Continue(swung_interval(state.transport.bpm, state.swing, played))
        });
        self.timer = Some(self.scheduler.schedule(step_interval(bpm), task)?);
        Ok(())
    }

    /// Undo a transport change whose timer could not be armed.
    fn disarm(&self, paused: bool) {
        let mut state = self.state();
        state.transport.is_playing = false;
        state.transport.is_paused = paused;
        state.session += 1;
    }

    // ── Transport ──

    /// Start from step 0. No-op while already playing. Fails only when the
    /// clock cannot be started, in which case the sequencer stays stopped.
    pub fn start(&mut self) -> Result<(), HaosError> {
        if self.state().transport.is_playing {
            return Ok(());
        }
        // A single-pass run or a pause can leave a finished timer behind.
        self.cancel_timer();

        let (session, bpm) = {
            let mut state = self.state();
            state.transport.current_step = 0;
            state.transport.is_playing = true;
            state.transport.is_paused = false;
            state.session += 1;
            (state.session, state.transport.bpm)
        };
        if let Err(e) = self.arm_timer(session, bpm) {
            self.disarm(false);
            return Err(e);
        }
        log::info!("sequencer started at {bpm} BPM ({:.3} ms/step)", step_interval_ms(bpm));
        Ok(())
    }

    /// Stop and rewind to step 0. No-op unless playing or paused.
    pub fn stop(&mut self) {
        {
            let state = self.state();
            if !state.transport.is_playing && !state.transport.is_paused {
                return;
            }
        }
        // Cancel before locking: an in-flight fire needs the lock to finish.
        self.cancel_timer();

        let mut state = self.state();
        state.transport.is_playing = false;
        state.transport.is_paused = false;
        state.transport.current_step = 0;
        state.session += 1;
        log::info!("sequencer stopped");
    }

    /// Stop the clock but keep the position.
    pub fn pause(&mut self) {
        if !self.state().transport.is_playing {
            return;
        }
        self.cancel_timer();

        let mut state = self.state();
        state.transport.is_playing = false;
        state.transport.is_paused = true;
        state.session += 1;
        log::info!("sequencer paused at step {}", state.transport.current_step);
    }

    /// Continue from the paused position. No-op unless paused. If the clock
    /// cannot be started the sequencer stays paused.
    pub fn resume(&mut self) -> Result<(), HaosError> {
        let (session, bpm) = {
            let mut state = self.state();
            if !state.transport.is_paused {
                return Ok(());
            }
            state.transport.is_playing = true;
            state.transport.is_paused = false;
            state.session += 1;
            (state.session, state.transport.bpm)
        };
        if let Err(e) = self.arm_timer(session, bpm) {
            self.disarm(true);
            return Err(e);
        }
        log::info!("sequencer resumed");
        Ok(())
    }

    /// Change tempo. While playing this stops and restarts the clock, so the
    /// position returns to step 0 and the new tempo applies from a fresh cycle.
    /// Non-finite or non-positive tempos are rejected and leave state untouched.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), HaosError> {
        validate_bpm(bpm)?;
        let playing = self.state().transport.is_playing;
        if playing {
            self.stop();
        }
        self.state().transport.bpm = bpm;
        log::debug!("tempo set to {bpm} BPM");
        if playing {
            self.start()?;
        }
        Ok(())
    }

    /// Set the shuffle amount, clamped to [0, 1]. Applies from the next gap
    /// without restarting the clock.
    pub fn set_swing(&self, swing: f64) {
        let swing = clamp_swing(swing);
        self.state().swing = swing;
        log::debug!("swing set to {swing}");
    }

    /// Dispatch the current step's hits without advancing. Returns what fired.
    pub fn tick(&self) -> StepEvent {
        self.state().tick()
    }

    // ── Pattern editing ──

    /// Replace one track's steps. The array is fitted to the grid length.
    pub fn set_pattern(&self, steps: TrackSteps) {
        let track = steps.track();
        self.state().pattern.set_track(steps);
        log::debug!("{track:?} track replaced");
    }

    /// Empty both tracks.
    pub fn clear(&self) {
        self.state().pattern.clear();
        log::debug!("pattern cleared");
    }

    pub fn toggle_step(&self, track: Track, step: usize) {
        self.state().pattern.toggle(track, step);
    }

    /// Install a preset's demo pattern on the matching track. Returns false
    /// when the preset has none. A drum kit's suggested tempo is not applied.
    pub fn load_preset(&self, preset: &Preset) -> bool {
        let mut state = self.state();
        let steps = state.pattern.len();
        let track = match preset {
            Preset::Tb303(p) => p.bass_steps(steps).map(TrackSteps::Bass),
            Preset::DrumKit(p) => p.drum_steps(steps).map(TrackSteps::Drums),
        };
        match track {
            Some(track) => {
                state.pattern.set_track(track);
                log::debug!("loaded pattern from preset '{}'", preset.name());
                true
            }
            None => false,
        }
    }

    /// Append a pattern to the chain. At every wrap the next chained pattern
    /// replaces the active one, round robin. The first wrap loads the first
    /// queued pattern (`chain[0]`), not the second.
    pub fn queue_pattern(&self, pattern: Pattern) {
        let mut state = self.state();
        let steps = state.pattern.len();
        state.chain.push(conform(pattern, steps));
    }

    pub fn clear_chain(&self) {
        let mut state = self.state();
        state.chain.clear();
        state.chain_index = 0;
    }

    // ── Callbacks ──

    pub fn on_step(&self, f: impl FnMut(usize) + Send + 'static) {
        self.state().callbacks.on_step = Some(Box::new(f));
    }

    pub fn on_bass_note(&self, f: impl FnMut(&BassHit) + Send + 'static) {
        self.state().callbacks.on_bass_note = Some(Box::new(f));
    }

    pub fn on_drums(&self, f: impl FnMut(&DrumHit) + Send + 'static) {
        self.state().callbacks.on_drums = Some(Box::new(f));
    }

    pub fn on_pattern_end(&self, f: impl FnMut() + Send + 'static) {
        self.state().callbacks.on_pattern_end = Some(Box::new(f));
    }

    // ── Inspection ──

    pub fn transport(&self) -> TransportState {
        self.state().transport
    }

    pub fn status(&self) -> SequencerStatus {
        let state = self.state();
        SequencerStatus {
            transport: state.transport,
            steps: state.pattern.len(),
            swing: state.swing,
            loop_pattern: state.loop_pattern,
            chain_length: state.chain.len(),
        }
    }

    pub fn pattern(&self) -> Pattern {
        self.state().pattern.clone()
    }

    pub fn step_count(&self) -> usize {
        self.state().pattern.len()
    }
}

impl<S: Scheduler> Drop for Sequencer<S> {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{DrumVoice, STEP_COUNT};
    use crate::preset::PresetCatalog;
    use crate::scheduler::{ManualScheduler, StepTask};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manual(config: SequencerConfig) -> (Sequencer<ManualScheduler>, ManualScheduler) {
        let clock = ManualScheduler::new();
        let seq = Sequencer::with_scheduler(config, clock.clone()).unwrap();
        (seq, clock)
    }

    fn recorder<T: Send + 'static>() -> Arc<Mutex<Vec<T>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Hands timers to a manual clock until `remaining` runs out, then fails
    /// the way a thread spawn does when the process is out of threads.
    struct RationedClock {
        clock: ManualScheduler,
        remaining: AtomicUsize,
    }

    impl Scheduler for RationedClock {
        fn schedule(&self, first: Duration, task: StepTask) -> Result<Box<dyn TimerHandle>, HaosError> {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 0 {
                self.remaining.store(0, Ordering::SeqCst);
                return Err(HaosError::Clock(std::io::Error::other("out of threads")));
            }
            self.clock.schedule(first, task)
        }
    }

    /// A distinct bass note and drum hit on every step.
    fn full_pattern() -> (TrackSteps, TrackSteps) {
        let bass = (0..STEP_COUNT)
            .map(|i| BassHit::new(&format!("C{}", i % 8)))
            .collect();
        let drums = (0..STEP_COUNT)
            .map(|i| {
                let mut hit = DrumHit::new(vec![DrumVoice::Kick]);
                hit.velocity = i as f64 / 16.0;
                Some(hit)
            })
            .collect();
        (TrackSteps::Bass(bass), TrackSteps::Drums(drums))
    }

    #[test]
    fn interval_at_128_bpm() {
        assert_eq!(step_interval_ms(128.0), 117.1875);
        assert_eq!(step_interval(128.0), Duration::from_micros(117_187) + Duration::from_nanos(500));
        assert_eq!(step_interval_ms(120.0), 125.0);
    }

    #[test]
    fn start_arms_timer_at_step_interval() {
        let (mut seq, clock) = manual(SequencerConfig { bpm: 128.0, ..Default::default() });
        seq.start().unwrap();
        assert!(seq.transport().is_playing);
        assert_eq!(clock.period(), Some(step_interval(128.0)));
    }

    #[test]
    fn start_then_stop_rewinds() {
        for ticks in [0, 1, 7, 16, 37] {
            let (mut seq, clock) = manual(SequencerConfig::default());
            seq.start().unwrap();
            clock.fire(ticks);
            assert_eq!(seq.transport().current_step, ticks % 16);
            seq.stop();
            let transport = seq.transport();
            assert_eq!(transport.current_step, 0);
            assert!(!transport.is_playing);
            assert!(!clock.is_armed());
        }
    }

    #[test]
    fn start_is_idempotent() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        seq.start().unwrap();
        clock.fire(5);
        seq.start().unwrap();
        assert_eq!(seq.transport().current_step, 5);
    }

    #[test]
    fn stop_when_idle_is_noop() {
        let (mut seq, _clock) = manual(SequencerConfig::default());
        seq.stop();
        assert_eq!(seq.transport().current_step, 0);
        assert!(!seq.transport().is_playing);
    }

    #[test]
    fn tick_touches_only_current_index() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        let (bass, drums) = full_pattern();
        seq.set_pattern(bass);
        seq.set_pattern(drums);

        let notes = recorder::<u8>();
        let velocities = recorder::<f64>();
        let steps = recorder::<usize>();
        {
            let notes = Arc::clone(&notes);
            seq.on_bass_note(move |hit| notes.lock().unwrap().push(hit.midi));
        }
        {
            let velocities = Arc::clone(&velocities);
            seq.on_drums(move |hit| velocities.lock().unwrap().push(hit.velocity));
        }
        {
            let steps = Arc::clone(&steps);
            seq.on_step(move |step| steps.lock().unwrap().push(step));
        }

        seq.start().unwrap();
        clock.fire(STEP_COUNT);

        let expected_notes: Vec<u8> = (0..STEP_COUNT)
            .map(|i| crate::pattern::note_to_midi(&format!("C{}", i % 8)).unwrap())
            .collect();
        let expected_velocities: Vec<f64> = (0..STEP_COUNT).map(|i| i as f64 / 16.0).collect();
        assert_eq!(*notes.lock().unwrap(), expected_notes);
        assert_eq!(*velocities.lock().unwrap(), expected_velocities);
        assert_eq!(*steps.lock().unwrap(), (0..STEP_COUNT).collect::<Vec<_>>());
    }

    #[test]
    fn inactive_and_empty_steps_skip_callbacks() {
        let (seq, _clock) = manual(SequencerConfig::default());
        let mut bass = vec![None; STEP_COUNT];
        bass[0] = BassHit::new("C2").map(BassHit::inactive);
        seq.set_pattern(TrackSteps::Bass(bass));

        let notes = recorder::<u8>();
        let steps = recorder::<usize>();
        {
            let notes = Arc::clone(&notes);
            seq.on_bass_note(move |hit| notes.lock().unwrap().push(hit.midi));
        }
        {
            let steps = Arc::clone(&steps);
            seq.on_step(move |step| steps.lock().unwrap().push(step));
        }

        let event = seq.tick();
        assert_eq!(event, StepEvent { step: 0, bass: None, drums: None });
        assert!(notes.lock().unwrap().is_empty());
        assert_eq!(*steps.lock().unwrap(), vec![0]);
    }

    #[test]
    fn ticks_without_callbacks() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        let (bass, _) = full_pattern();
        seq.set_pattern(bass);
        seq.start().unwrap();
        assert_eq!(clock.fire(20), 20);
        assert_eq!(seq.transport().current_step, 4);
    }

    #[test]
    fn set_bpm_while_playing_restarts() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        seq.start().unwrap();
        clock.fire(3);
        assert_eq!(seq.transport().current_step, 3);

        seq.set_bpm(128.0).unwrap();
        let transport = seq.transport();
        assert_eq!(transport.current_step, 0);
        assert!(transport.is_playing);
        assert_eq!(transport.bpm, 128.0);
        assert_eq!(clock.period(), Some(step_interval(128.0)));

        clock.fire(2);
        assert_eq!(seq.transport().current_step, 2);
    }

    #[test]
    fn set_bpm_while_stopped_does_not_start() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        seq.set_bpm(90.0).unwrap();
        assert!(!seq.transport().is_playing);
        assert!(!clock.is_armed());
        seq.start().unwrap();
        assert_eq!(clock.period(), Some(step_interval(90.0)));
    }

    #[test]
    fn set_bpm_rejects_unusable_tempo() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        seq.start().unwrap();
        clock.fire(2);
        for bpm in [0.0, -10.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(seq.set_bpm(bpm), Err(HaosError::InvalidTempo { .. })));
        }
        let transport = seq.transport();
        assert_eq!(transport.bpm, 120.0);
        assert_eq!(transport.current_step, 2);
        assert!(transport.is_playing);
    }

    #[test]
    fn set_bpm_rejects_tempo_too_slow_to_schedule() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        assert!(matches!(seq.set_bpm(1e-30), Err(HaosError::InvalidTempo { .. })));
        assert_eq!(seq.transport().bpm, 120.0);
        seq.start().unwrap();
        assert_eq!(clock.period(), Some(step_interval(120.0)));

        assert!(Sequencer::new(SequencerConfig { bpm: 1e-30, ..Default::default() }).is_err());
    }

    #[test]
    fn step_interval_saturates_instead_of_panicking() {
        assert_eq!(step_interval(1e-30), Duration::MAX);
        assert_eq!(step_interval(f64::NAN), Duration::MAX);
        assert_eq!(step_interval(-1.0), Duration::MAX);
    }

    #[test]
    fn swing_stretches_odd_steps() {
        assert_eq!(swung_interval_ms(120.0, 0.5, 0), 125.0);
        assert_eq!(swung_interval_ms(120.0, 0.5, 1), 156.25);
        assert_eq!(swung_interval_ms(120.0, 1.0, 3), 187.5);
        assert_eq!(swung_interval_ms(120.0, 0.0, 1), 125.0);

        let (mut seq, clock) = manual(SequencerConfig { swing: 0.5, ..Default::default() });
        seq.start().unwrap();
        assert_eq!(clock.period(), Some(Duration::from_millis(125)));
        clock.fire(1);
        assert_eq!(clock.period(), Some(Duration::from_millis(125)));
        clock.fire(1);
        assert_eq!(clock.period(), Some(Duration::from_micros(156_250)));
        clock.fire(1);
        assert_eq!(clock.period(), Some(Duration::from_millis(125)));
        assert_eq!(seq.transport().current_step, 3);
    }

    #[test]
    fn straight_time_by_default() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        seq.start().unwrap();
        for _ in 0..STEP_COUNT {
            clock.fire(1);
            assert_eq!(clock.period(), Some(step_interval(120.0)));
        }
    }

    #[test]
    fn set_swing_clamps_and_applies_while_playing() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        seq.start().unwrap();
        clock.fire(1);
        seq.set_swing(2.0);
        assert_eq!(seq.status().swing, 1.0);
        assert!(seq.transport().is_playing);
        assert_eq!(seq.transport().current_step, 1);

        clock.fire(1);
        assert_eq!(clock.period(), Some(Duration::from_micros(187_500)));

        seq.set_swing(-3.0);
        assert_eq!(seq.status().swing, 0.0);
    }

    #[test]
    fn failed_clock_leaves_sequencer_stopped() {
        let rationed = RationedClock {
            clock: ManualScheduler::new(),
            remaining: AtomicUsize::new(0),
        };
        let mut seq = Sequencer::with_scheduler(SequencerConfig::default(), rationed).unwrap();
        assert!(matches!(seq.start(), Err(HaosError::Clock(_))));
        let transport = seq.transport();
        assert!(!transport.is_playing);
        assert!(!transport.is_paused);
    }

    #[test]
    fn failed_clock_on_resume_stays_paused() {
        let clock = ManualScheduler::new();
        let rationed = RationedClock {
            clock: clock.clone(),
            remaining: AtomicUsize::new(1),
        };
        let mut seq = Sequencer::with_scheduler(SequencerConfig::default(), rationed).unwrap();
        seq.start().unwrap();
        clock.fire(5);
        seq.pause();

        assert!(matches!(seq.resume(), Err(HaosError::Clock(_))));
        let transport = seq.transport();
        assert!(!transport.is_playing);
        assert!(transport.is_paused);
        assert_eq!(transport.current_step, 5);
        assert!(!clock.is_armed());
    }

    #[test]
    fn wrap_fires_pattern_end() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        let ends = Arc::new(Mutex::new(0usize));
        {
            let ends = Arc::clone(&ends);
            seq.on_pattern_end(move || *ends.lock().unwrap() += 1);
        }
        seq.start().unwrap();
        clock.fire(15);
        assert_eq!(*ends.lock().unwrap(), 0);
        clock.fire(1);
        assert_eq!(*ends.lock().unwrap(), 1);
        assert_eq!(seq.transport().current_step, 0);
        clock.fire(32);
        assert_eq!(*ends.lock().unwrap(), 3);
    }

    #[test]
    fn single_pass_stops_itself() {
        let (mut seq, clock) = manual(SequencerConfig { loop_pattern: false, ..Default::default() });
        seq.start().unwrap();
        assert_eq!(clock.fire(100), 16);
        let transport = seq.transport();
        assert!(!transport.is_playing);
        assert_eq!(transport.current_step, 0);
        assert!(!clock.is_armed());

        seq.start().unwrap();
        assert!(seq.transport().is_playing);
        assert_eq!(clock.fire(3), 3);
    }

    #[test]
    fn pause_and_resume_keep_position() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        seq.start().unwrap();
        clock.fire(6);
        seq.pause();
        let transport = seq.transport();
        assert!(!transport.is_playing);
        assert!(transport.is_paused);
        assert_eq!(transport.current_step, 6);
        assert_eq!(clock.fire(4), 0);

        seq.resume().unwrap();
        clock.fire(2);
        assert_eq!(seq.transport().current_step, 8);

        seq.pause();
        seq.stop();
        assert_eq!(seq.transport().current_step, 0);
        assert!(!seq.transport().is_paused);
    }

    #[test]
    fn chain_replaces_pattern_at_wrap() {
        let (mut seq, clock) = manual(SequencerConfig::default());
        let mut first = Pattern::new();
        first.set_bass(0, BassHit::new("C2"));
        let mut second = Pattern::with_steps(8);
        second.set_bass(0, BassHit::new("G2"));
        seq.queue_pattern(first);
        seq.queue_pattern(second);
        assert_eq!(seq.status().chain_length, 2);

        let notes = recorder::<String>();
        {
            let notes = Arc::clone(&notes);
            seq.on_bass_note(move |hit| notes.lock().unwrap().push(hit.note.clone()));
        }

        seq.start().unwrap();
        clock.fire(16);
        assert!(notes.lock().unwrap().is_empty());
        clock.fire(16);
        clock.fire(16);
        clock.fire(16);
        assert_eq!(*notes.lock().unwrap(), vec!["C2", "G2", "C2"]);
        assert_eq!(seq.pattern().len(), 16);

        seq.clear_chain();
        assert_eq!(seq.status().chain_length, 0);
    }

    #[test]
    fn clear_empties_both_tracks() {
        let (seq, _clock) = manual(SequencerConfig::default());
        let (bass, drums) = full_pattern();
        seq.set_pattern(bass);
        seq.set_pattern(drums);
        seq.clear();
        let pattern = seq.pattern();
        assert!(pattern.is_empty());
        assert_eq!(pattern.len(), 16);
    }

    #[test]
    fn toggle_step_edits_active_pattern() {
        let (seq, _clock) = manual(SequencerConfig::default());
        seq.toggle_step(Track::Drums, 4);
        assert!(seq.pattern().drums(4).unwrap().active);
        seq.toggle_step(Track::Drums, 4);
        assert!(!seq.pattern().drums(4).unwrap().active);
    }

    #[test]
    fn loads_preset_patterns() {
        let catalog = PresetCatalog::factory().unwrap();
        let (seq, _clock) = manual(SequencerConfig::default());

        assert!(seq.load_preset(catalog.get_preset("tb303", "Acid Squelch").unwrap()));
        assert!(seq.load_preset(catalog.get_preset("tr909", "Four on the Floor").unwrap()));
        assert!(!seq.load_preset(catalog.get_preset("tr808", "808 Sub Bass").unwrap()));

        let pattern = seq.pattern();
        assert_eq!(pattern.bass(1).unwrap().note, "D#2");
        assert_eq!(pattern.bass(9).unwrap().note, "D#2");
        assert_eq!(
            pattern.drums(0).unwrap().voices,
            vec![DrumVoice::Kick, DrumVoice::HatClosed]
        );
        assert_eq!(pattern.drums(7).unwrap().voices, vec![DrumVoice::HatOpen]);
        assert_eq!(seq.transport().bpm, 120.0);
    }

    #[test]
    fn status_serializes_flat() {
        let (seq, _clock) = manual(SequencerConfig { steps: 8, ..Default::default() });
        let json = serde_json::to_value(seq.status()).unwrap();
        assert_eq!(json["bpm"], 120.0);
        assert_eq!(json["currentStep"], 0);
        assert_eq!(json["isPlaying"], false);
        assert_eq!(json["steps"], 8);
        assert_eq!(json["swing"], 0.0);
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(matches!(
            Sequencer::with_scheduler(SequencerConfig { steps: 0, ..Default::default() }, ManualScheduler::new()),
            Err(HaosError::InvalidStepCount { .. })
        ));
    }

    #[test]
    fn thread_clock_runs_and_stops() {
        // 6000 BPM: 2.5 ms per step.
        let mut seq = Sequencer::new(SequencerConfig { bpm: 6000.0, ..Default::default() }).unwrap();
        let steps = recorder::<usize>();
        {
            let steps = Arc::clone(&steps);
            seq.on_step(move |step| steps.lock().unwrap().push(step));
        }
        seq.start().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        seq.stop();

        let transport = seq.transport();
        assert_eq!(transport.current_step, 0);
        assert!(!transport.is_playing);

        let seen = steps.lock().unwrap().clone();
        assert!(!seen.is_empty(), "clock never ticked");
        for (i, step) in seen.iter().enumerate() {
            assert_eq!(*step, i % STEP_COUNT);
        }

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(steps.lock().unwrap().len(), seen.len(), "ticked after stop");
    }
}
