//! The preamp controller.
//!
//! [`Preamp`] is the explicit context every operation runs against: config,
//! loudspeaker profile, curve tables, state store, engine handle and the EQ
//! worker. Commands are serialized by the caller; one command fully
//! completes (including the engine settle delay) before the next.
//!
//! Gain-affecting mutations run the composite apply machine:
//!
//! ```text
//! Idle -> Validating -> Compiling -> Committing -> Persisting -> Idle
//! ```
//!
//! A failure while validating or compiling returns to Idle with no mutation.
//! A failure while committing discards the candidate but leaves the
//! persisted state unchanged; engine and controller may then diverge until
//! the next successful apply, which is accepted rather than rolled back.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::commands::{Command, GainControl, Reply, SwitchArg};
use crate::config::{AppConfig, LOUDNESS_REF_LEVEL};
use crate::curves::{CurveTables, EqBuffers, EqSettings, EqWorker};
use crate::engine::{shared, wait_running, DspEngine, SharedEngine};
use crate::error::Result;
use crate::headroom;
use crate::pipeline::{
    clear_drc, insert_drc, preamp_mixer, set_xo_flavour, MixerMode, PipelineCompiler, Selections,
    BAL_POL_L, BAL_POL_R, DRC_GAIN, LU_OFFSET, PREAMP_MIXER,
};
use crate::speaker::LoudspeakerProfile;
use crate::state::{AuxInfo, Midside, Polarity, PreampState, Solo, StateStore};

const STARTUP_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Phases of the composite apply machine, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApplyPhase {
    Validating,
    Compiling,
    Committing,
    Persisting,
}

/// One gain-affecting mutation flowing through the apply machine.
#[derive(Debug, Clone)]
enum LevelsCmd {
    Gain(GainControl, f32),
    Target(String),
    ToneDefeat(bool),
}

/// The preamp controller context.
pub struct Preamp {
    config: AppConfig,
    profile: LoudspeakerProfile,
    tables: Arc<CurveTables>,
    target_sets: Vec<String>,
    store: StateStore,
    state: PreampState,
    engine: SharedEngine,
    eq: EqWorker,
}

impl Preamp {
    /// Bring the controller up: scan the profile, load tables and state,
    /// compile and apply the full engine configuration, verify health and
    /// replay the persisted controls. Engine trouble here is fatal.
    pub fn start(config: AppConfig, engine: Box<dyn DspEngine>) -> Result<Self> {
        let profile = LoudspeakerProfile::scan(&config)?;
        let tables = Arc::new(CurveTables::load(
            &config.curves_folder(),
            LOUDNESS_REF_LEVEL,
        )?);
        let target_sets = tables.target_sets();

        let store = StateStore::new(config.state_path());
        let mut state = store.load();
        sanitize_state(&mut state, &profile, &target_sets);
        apply_overrides(&mut state, &config, &profile, &target_sets);

        // forced init settings
        state.loudspeaker = config.loudspeaker.clone();
        state.fs = config.fs;
        state.polarity = Polarity::PlusPlus;

        let taps = 2 * (tables.bins() - 1);
        let buffers = EqBuffers::prepare(config.eq_folder(), taps)?;

        let engine = shared(engine);
        let aux = AuxInfo::new(config.aux_info_path());
        let eq = EqWorker::spawn(
            Arc::clone(&tables),
            buffers,
            Arc::clone(&engine),
            aux,
        );

        let mut preamp = Self {
            config,
            profile,
            tables,
            target_sets,
            store,
            state,
            engine,
            eq,
        };

        preamp.apply_full_config()?;
        preamp.resume_audio()?;
        preamp.store.persist(&preamp.state)?;

        info!(
            "preamp up: loudspeaker '{}', headroom {} dB",
            preamp.state.loudspeaker, preamp.state.gain_headroom
        );
        Ok(preamp)
    }

    pub fn state(&self) -> &PreampState {
        &self.state
    }

    /// Parse and run one request phrase.
    pub fn handle_phrase(&mut self, phrase: &str) -> Reply {
        match crate::commands::parse_phrase(phrase) {
            Ok(command) => self.handle(command),
            Err(e) => Reply::from_error(&e),
        }
    }

    /// Run one command to completion and produce its reply.
    pub fn handle(&mut self, command: Command) -> Reply {
        match command {
            Command::State => self.json_reply(serde_json::to_value(&self.state)),
            Command::GetInputs => self.json_reply(serde_json::to_value(self.config.input_names())),
            Command::GetTargetSets => self.json_reply(serde_json::to_value(&self.target_sets)),
            Command::GetDrcSets => self.json_reply(serde_json::to_value(&self.profile.drc_sets)),
            Command::GetXoSets => self.json_reply(serde_json::to_value(&self.profile.xo_sets)),
            Command::GetEngineConfig => self.engine_json(|config| serde_json::to_value(config)),
            Command::GetPreampMixer => {
                self.engine_json(|config| serde_json::to_value(config.mixers.get(PREAMP_MIXER)))
            }
            Command::GetPipeline => {
                self.engine_json(|config| serde_json::to_value(&config.pipeline))
            }
            Command::GetDrcGain => {
                self.engine_json(|config| serde_json::to_value(config.filters.get(DRC_GAIN)))
            }

            Command::SetInput(name) => self.set_input(name),
            Command::Mono(arg) => self.mono(arg),
            Command::Midside(mode) => self.set_midside(mode),
            Command::Solo(mode) => self.set_solo(mode),
            Command::Polarity(polarity) => self.set_polarity(polarity),
            Command::Mute(arg) => self.set_mute(arg),
            Command::EqualLoudness(arg) => self.set_equal_loudness(arg),
            Command::SetDrc(id) => self.set_drc(id),
            Command::SetXo(id) => self.set_xo(id),
            Command::Target(id) => self.set_target(id),
            Command::ToneDefeat(arg) => {
                let new = arg.apply(self.state.tone_defeat);
                if new == self.state.tone_defeat {
                    return Reply::Nothing;
                }
                self.do_levels(LevelsCmd::ToneDefeat(new))
            }
            Command::Gain { control, db, add } => {
                let absolute = if add {
                    db + self.current_gain(control)
                } else {
                    db
                };
                self.do_levels(LevelsCmd::Gain(control, absolute))
            }
        }
    }

    // ------------------------------------------------------------------
    // Level-family commands: the composite apply machine
    // ------------------------------------------------------------------

    fn do_levels(&mut self, cmd: LevelsCmd) -> Reply {
        debug!("apply phase {:?}: {:?}", ApplyPhase::Validating, cmd);

        // build the candidate, clamping tones to the configured span
        let mut candidate = self.state.clone();
        let mut clamped: Option<f32> = None;

        match &cmd {
            LevelsCmd::Gain(control, db) => {
                let mut db = *db;
                if matches!(control, GainControl::Bass | GainControl::Treble) {
                    let clamp = headroom::clamp_tone(db, self.config.tones_span_db);
                    // the curve tables are stepped per whole dB
                    let stepped = clamp.value.round();
                    if clamp.clamped || stepped != db {
                        clamped = Some(stepped);
                    }
                    db = stepped;
                }
                match control {
                    GainControl::Level => candidate.level = db,
                    GainControl::LuOffset => candidate.lu_offset = db,
                    GainControl::Bass => candidate.bass = db,
                    GainControl::Treble => candidate.treble = db,
                    GainControl::Balance => candidate.balance = db,
                }
            }
            LevelsCmd::Target(id) => candidate.target = id.clone(),
            LevelsCmd::ToneDefeat(mode) => candidate.tone_defeat = *mode,
        }

        let hr = match headroom::validate(&candidate, self.config.drcs_offset) {
            Ok(hr) => hr,
            Err(e) => return Reply::from_error(&e),
        };

        debug!("apply phase {:?}", ApplyPhase::Committing);
        if let Err(e) = self.commit_levels(&cmd, &candidate) {
            warn!("commit failed, candidate discarded: {e}");
            return Reply::from_error(&e);
        }

        debug!("apply phase {:?}", ApplyPhase::Persisting);
        candidate.gain_headroom = hr;
        self.state = candidate;
        if let Err(e) = self.store.persist(&self.state) {
            warn!("state persist failed: {e}");
        }

        match clamped {
            Some(value) => Reply::Clamped(value),
            None => Reply::Done,
        }
    }

    /// Push one validated level-family change to the engine / EQ worker.
    fn commit_levels(&mut self, cmd: &LevelsCmd, candidate: &PreampState) -> Result<()> {
        match cmd {
            LevelsCmd::Gain(GainControl::Level, _) => {
                // the engine clamps its main fader at 0 dB
                if candidate.level <= 0.0 {
                    self.with_engine(|engine| engine.set_volume(candidate.level))?;
                } else {
                    debug!("level {} above engine fader range", candidate.level);
                }
                // loudness compensation tracks the listening level
                self.submit_eq(candidate);
                Ok(())
            }
            LevelsCmd::Gain(GainControl::Balance, _) => {
                let db = candidate.balance;
                self.with_engine(|engine| {
                    let mut config = engine.active_config()?;
                    config.update_gain(BAL_POL_L, |gain, _, _| *gain = -db / 2.0)?;
                    config.update_gain(BAL_POL_R, |gain, _, _| *gain = db / 2.0)?;
                    engine.apply(&config)
                })
            }
            LevelsCmd::Gain(GainControl::LuOffset, _) => {
                let db = candidate.lu_offset;
                self.with_engine(|engine| {
                    let mut config = engine.active_config()?;
                    // the offset compensates mastering loudness, so the
                    // stage gain is its negation
                    config.update_gain(LU_OFFSET, |gain, _, _| *gain = -db)?;
                    engine.apply(&config)
                })
            }
            LevelsCmd::Gain(GainControl::Bass | GainControl::Treble, _) => {
                if !candidate.tone_defeat {
                    self.submit_eq(candidate);
                }
                Ok(())
            }
            LevelsCmd::Target(_) | LevelsCmd::ToneDefeat(_) => {
                self.submit_eq(candidate);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Other mutations
    // ------------------------------------------------------------------

    fn set_input(&mut self, name: String) -> Reply {
        if self.state.input == name {
            return Reply::Nothing;
        }
        if !self.config.inputs.contains_key(&name) {
            return Reply::Error(format!("must be in: {:?}", self.config.input_names()));
        }
        // source routing is the sound server's business
        self.state.input = name;
        self.persist_and_done()
    }

    fn mono(&mut self, arg: SwitchArg) -> Reply {
        let new = match arg {
            SwitchArg::On => Midside::Mid,
            SwitchArg::Off => Midside::Off,
            SwitchArg::Toggle => match self.state.midside {
                Midside::Off => Midside::Mid,
                Midside::Mid | Midside::Side => Midside::Off,
            },
        };
        self.set_midside(new)
    }

    fn set_midside(&mut self, mode: Midside) -> Reply {
        if self.state.midside == mode {
            return Reply::Nothing;
        }
        let mixer = preamp_mixer(MixerMode::from_state(mode, Solo::Off));
        let result = self.with_engine(|engine| {
            let mut config = engine.active_config()?;
            config.mixers.insert(PREAMP_MIXER.into(), mixer);
            engine.apply(&config)
        });
        if let Err(e) = result {
            return Reply::from_error(&e);
        }
        self.state.midside = mode;
        self.persist_and_done()
    }

    fn set_solo(&mut self, mode: Solo) -> Reply {
        if self.state.solo == mode {
            return Reply::Nothing;
        }
        let mixer_mode = match mode {
            Solo::L => MixerMode::SoloLeft,
            Solo::R => MixerMode::SoloRight,
            Solo::Off => MixerMode::Normal,
        };
        let mixer = preamp_mixer(mixer_mode);
        let result = self.with_engine(|engine| {
            let mut config = engine.active_config()?;
            config.mixers.insert(PREAMP_MIXER.into(), mixer);
            engine.apply(&config)
        });
        if let Err(e) = result {
            return Reply::from_error(&e);
        }
        self.state.solo = mode;
        self.persist_and_done()
    }

    fn set_polarity(&mut self, polarity: Polarity) -> Reply {
        if self.state.polarity == polarity {
            return Reply::Nothing;
        }
        let (inv_l, inv_r) = polarity.inversions();
        let result = self.with_engine(|engine| {
            let mut config = engine.active_config()?;
            config.update_gain(BAL_POL_L, |_, inverted, _| *inverted = inv_l)?;
            config.update_gain(BAL_POL_R, |_, inverted, _| *inverted = inv_r)?;
            engine.apply(&config)
        });
        if let Err(e) = result {
            return Reply::from_error(&e);
        }
        self.state.polarity = polarity;
        self.persist_and_done()
    }

    fn set_mute(&mut self, arg: SwitchArg) -> Reply {
        let new = arg.apply(self.state.muted);
        if new == self.state.muted {
            return Reply::Nothing;
        }
        if let Err(e) = self.with_engine(|engine| engine.set_mute(new)) {
            return Reply::from_error(&e);
        }
        self.state.muted = new;
        self.persist_and_done()
    }

    fn set_equal_loudness(&mut self, arg: SwitchArg) -> Reply {
        let new = arg.apply(self.state.equal_loudness);
        if new == self.state.equal_loudness {
            return Reply::Nothing;
        }
        let mut candidate = self.state.clone();
        candidate.equal_loudness = new;
        self.submit_eq(&candidate);
        self.state = candidate;
        self.persist_and_done()
    }

    fn set_drc(&mut self, id: String) -> Reply {
        if self.state.drc_set == id {
            return Reply::Nothing;
        }
        if self.profile.drc_sets.is_empty() {
            return Reply::Error("not available".into());
        }
        if id != "none" && !self.profile.has_drc_set(&id) {
            return Reply::Error(format!("must be in: {:?}", self.profile.drc_sets));
        }

        let drcs_offset = self.config.drcs_offset;
        let result = self.with_engine(|engine| {
            let mut config = engine.active_config()?;
            if id == "none" {
                // DRC sets carry a non-positive working offset, so the gain
                // goes down before the correction disappears
                config.update_gain(DRC_GAIN, |gain, _, _| *gain = drcs_offset)?;
                clear_drc(&mut config)?;
            } else {
                insert_drc(&mut config, &id)?;
                config.update_gain(DRC_GAIN, |gain, _, _| *gain = 0.0)?;
            }
            config.validate()?;
            engine.apply(&config)
        });
        if let Err(e) = result {
            return Reply::from_error(&e);
        }
        self.state.drc_set = id;
        self.persist_and_done()
    }

    fn set_xo(&mut self, id: String) -> Reply {
        if self.state.xo_set == id {
            return Reply::Nothing;
        }
        if self.profile.xo_sets.is_empty() {
            return Reply::Error("not available".into());
        }
        if !self.profile.has_xo_set(&id) {
            return Reply::Error(format!("must be in: {:?}", self.profile.xo_sets));
        }

        let result = self.with_engine(|engine| {
            let mut config = engine.active_config()?;
            set_xo_flavour(&mut config, &id);
            config.validate()?;
            engine.apply(&config)
        });
        if let Err(e) = result {
            return Reply::from_error(&e);
        }
        self.state.xo_set = id;
        self.persist_and_done()
    }

    fn set_target(&mut self, id: String) -> Reply {
        if !self.tables.has_target(&id) {
            return Reply::Error(format!("must be in: {:?}", self.target_sets));
        }
        if self.state.target == id {
            return Reply::Nothing;
        }
        self.do_levels(LevelsCmd::Target(id))
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    /// Compile the full graph from the current state and push it.
    fn apply_full_config(&mut self) -> Result<()> {
        debug!("apply phase {:?}: full config", ApplyPhase::Compiling);
        let compiler = PipelineCompiler::new(
            &self.profile,
            self.config.chunksize,
            self.config.dither_bits,
        );
        let selections = Selections {
            mixer_mode: MixerMode::from_state(self.state.midside, self.state.solo),
            drc_set: self.state.drc_set.clone(),
            xo_set: self.state.xo_set.clone(),
            eq_path: self.config.eq_folder().join("eq_flat.pcm"),
        };
        let compiled = compiler.compile(&selections)?;

        let log_path = self.config.engine_log_path();
        self.with_engine(|engine| {
            engine.apply(&compiled)?;
            wait_running(engine, STARTUP_HEALTH_TIMEOUT, &log_path)
        })
    }

    /// Replay the persisted controls onto the freshly configured engine.
    fn resume_audio(&mut self) -> Result<()> {
        let state = &mut self.state;

        // tones can be clamped when persisted out of the configured span
        for (value, name) in [(&mut state.bass, "bass"), (&mut state.treble, "treble")] {
            let clamp = headroom::clamp_tone(*value, self.config.tones_span_db);
            let stepped = clamp.value.round();
            if stepped != *value {
                info!("{name} {} clamped to {} on resume", *value, stepped);
                *value = stepped;
            }
        }

        let level = state.level;
        let muted = state.muted;
        let balance = state.balance;
        let lu_offset = state.lu_offset;
        let (inv_l, inv_r) = state.polarity.inversions();
        let drc_gain = if state.drc_set == "none" {
            self.config.drcs_offset
        } else {
            0.0
        };

        self.with_engine(|engine| {
            if level <= 0.0 {
                engine.set_volume(level)?;
            }
            engine.set_mute(muted)?;

            let mut config = engine.active_config()?;
            config.update_gain(BAL_POL_L, |gain, inverted, _| {
                *gain = -balance / 2.0;
                *inverted = inv_l;
            })?;
            config.update_gain(BAL_POL_R, |gain, inverted, _| {
                *gain = balance / 2.0;
                *inverted = inv_r;
            })?;
            config.update_gain(LU_OFFSET, |gain, _, _| *gain = -lu_offset)?;
            config.update_gain(DRC_GAIN, |gain, _, _| *gain = drc_gain)?;
            engine.apply(&config)
        })?;

        let candidate = self.state.clone();
        self.submit_eq(&candidate);

        self.state.gain_headroom = headroom::headroom(&self.state, self.config.drcs_offset);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn current_gain(&self, control: GainControl) -> f32 {
        match control {
            GainControl::Level => self.state.level,
            GainControl::LuOffset => self.state.lu_offset,
            GainControl::Bass => self.state.bass,
            GainControl::Treble => self.state.treble,
            GainControl::Balance => self.state.balance,
        }
    }

    /// Queue an EQ synthesis for the candidate settings. Commands drop the
    /// returned completion channel: the write is fire and forget.
    fn submit_eq(&self, candidate: &PreampState) -> std::sync::mpsc::Receiver<Result<std::path::PathBuf>> {
        let (bass, treble) = if candidate.tone_defeat {
            (0.0, 0.0)
        } else {
            (candidate.bass, candidate.treble)
        };
        self.eq.submit(EqSettings {
            bass,
            treble,
            spl: candidate.level + LOUDNESS_REF_LEVEL,
            equal_loudness: candidate.equal_loudness,
            target: candidate.target.clone(),
        })
    }

    /// Wait until every queued EQ synthesis has completed. Test hook; the
    /// command path never blocks on the worker.
    pub fn drain_eq(&self) {
        self.eq.flush();
    }

    fn with_engine<R>(&self, f: impl FnOnce(&mut dyn DspEngine) -> Result<R>) -> Result<R> {
        let mut engine = self.engine.lock().expect("engine mutex poisoned");
        f(engine.as_mut())
    }

    fn persist_and_done(&mut self) -> Reply {
        if let Err(e) = self.store.persist(&self.state) {
            warn!("state persist failed: {e}");
        }
        Reply::Done
    }

    fn json_reply(
        &self,
        value: std::result::Result<serde_json::Value, serde_json::Error>,
    ) -> Reply {
        match value {
            Ok(value) => Reply::Json(value),
            Err(e) => Reply::Error(format!("internal error: {e}")),
        }
    }

    fn engine_json(
        &self,
        f: impl FnOnce(
            &crate::pipeline::EngineConfig,
        ) -> std::result::Result<serde_json::Value, serde_json::Error>,
    ) -> Reply {
        match self.with_engine(|engine| engine.active_config()) {
            Ok(config) => self.json_reply(f(&config)),
            Err(e) => Reply::from_error(&e),
        }
    }
}

/// Drop selections the profile can no longer satisfy.
fn sanitize_state(state: &mut PreampState, profile: &LoudspeakerProfile, targets: &[String]) {
    if state.drc_set != "none" && !profile.has_drc_set(&state.drc_set) {
        warn!("persisted drc_set '{}' not available, using none", state.drc_set);
        state.drc_set = "none".into();
    }
    if state.xo_set != "none" && !profile.has_xo_set(&state.xo_set) {
        warn!("persisted xo_set '{}' not available, using none", state.xo_set);
        state.xo_set = "none".into();
    }
    if state.target != "none" && !targets.contains(&state.target) {
        warn!("persisted target '{}' not available, using none", state.target);
        state.target = "none".into();
    }
}

/// User configuration wins over the persisted state at startup, with the
/// same membership validation a command would get.
fn apply_overrides(
    state: &mut PreampState,
    config: &AppConfig,
    profile: &LoudspeakerProfile,
    targets: &[String],
) {
    let o = &config.overrides;
    if let Some(level) = o.level {
        state.level = level;
    }
    if let Some(balance) = o.balance {
        state.balance = balance;
    }
    if let Some(bass) = o.bass {
        state.bass = bass;
    }
    if let Some(treble) = o.treble {
        state.treble = treble;
    }
    if let Some(tone_defeat) = o.tone_defeat {
        state.tone_defeat = tone_defeat;
    }
    if let Some(lu_offset) = o.lu_offset {
        state.lu_offset = lu_offset;
    }
    if let Some(equal_loudness) = o.equal_loudness {
        state.equal_loudness = equal_loudness;
    }
    if let Some(target) = &o.target {
        if target == "none" || targets.contains(target) {
            state.target = target.clone();
        } else {
            warn!("ignoring config target '{}'", target);
        }
    }
    if let Some(drc_set) = &o.drc_set {
        if drc_set == "none" || profile.has_drc_set(drc_set) {
            state.drc_set = drc_set.clone();
        } else {
            warn!("ignoring config drc_set '{}'", drc_set);
        }
    }
}
