//! ADSR amplitude envelope driven by a voice's gate.
//!
//! The [`Envelope`] holds the shared settings; each voice carries its own
//! [`EnvelopeState`], which [`Envelope::apply`] consumes and returns once
//! per block.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::knob::{Curve, Descriptor, Knob, KnobValue, KnobVisitor, Tunable, Unit};
use crate::error::SynthError;

/// Gate state of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gate {
    /// Key held.
    #[default]
    On,
    /// Key released; the envelope is running its release stage.
    Releasing,
    /// Fully released and silent.
    Off,
}

/// Envelope stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// How the envelope shapes a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnvelopeMode {
    /// Full attack/decay/sustain/release state machine.
    #[default]
    Adsr,
    /// Multiply by the gain only. Durations and gate are ignored.
    ///
    /// `PolySynth` passes `volume / OSCILLATOR_COUNT` as the gain, so a
    /// voice here is the plain oscillator sum scaled to a third of the
    /// volume.
    ConstantGain,
}

pub const ATTACK: Descriptor =
    Descriptor::continuous(Unit::Milliseconds, 0.0, 1000.0, Curve::Linear);
pub const DECAY: Descriptor =
    Descriptor::continuous(Unit::Milliseconds, 0.0, 1000.0, Curve::Linear);
pub const SUSTAIN: Descriptor = Descriptor::continuous(Unit::None, 0.0, 1.0, Curve::Linear);
pub const RELEASE: Descriptor =
    Descriptor::continuous(Unit::Milliseconds, 0.0, 1000.0, Curve::Linear);

/// ADSR settings with linear attack/decay/release ramps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    attack_ms: f64,
    decay_ms: f64,
    sustain: f64,
    release_ms: f64,
    mode: EnvelopeMode,
}

impl Default for Envelope {
    /// Instant attack and release at full sustain.
    fn default() -> Self {
        Envelope {
            attack_ms: 0.0,
            decay_ms: 0.0,
            sustain: 1.0,
            release_ms: 0.0,
            mode: EnvelopeMode::Adsr,
        }
    }
}

impl Envelope {
    pub fn new(
        attack_ms: f64,
        decay_ms: f64,
        sustain: f64,
        release_ms: f64,
    ) -> Result<Self, SynthError> {
        let mut env = Envelope::default();
        env.set_attack_ms(attack_ms)?;
        env.set_decay_ms(decay_ms)?;
        env.set_sustain(sustain)?;
        env.set_release_ms(release_ms)?;
        Ok(env)
    }

    /// The pass-through envelope: every sample is scaled by the gain alone.
    pub fn constant_gain() -> Self {
        Envelope {
            mode: EnvelopeMode::ConstantGain,
            ..Default::default()
        }
    }

    pub fn attack_ms(&self) -> f64 {
        self.attack_ms
    }

    pub fn decay_ms(&self) -> f64 {
        self.decay_ms
    }

    pub fn sustain(&self) -> f64 {
        self.sustain
    }

    pub fn release_ms(&self) -> f64 {
        self.release_ms
    }

    pub fn mode(&self) -> EnvelopeMode {
        self.mode
    }

    pub fn set_attack_ms(&mut self, ms: f64) -> Result<(), SynthError> {
        ATTACK.check("attack", ms)?;
        self.attack_ms = ms;
        Ok(())
    }

    pub fn set_decay_ms(&mut self, ms: f64) -> Result<(), SynthError> {
        DECAY.check("decay", ms)?;
        self.decay_ms = ms;
        Ok(())
    }

    pub fn set_sustain(&mut self, level: f64) -> Result<(), SynthError> {
        SUSTAIN.check("sustain", level)?;
        self.sustain = level;
        Ok(())
    }

    pub fn set_release_ms(&mut self, ms: f64) -> Result<(), SynthError> {
        RELEASE.check("release", ms)?;
        self.release_ms = ms;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: EnvelopeMode) {
        self.mode = mode;
    }

    /// Scale `buffer` by the envelope level times `gain`, advancing `state`
    /// by one sample per buffer entry. Returns the updated state.
    pub fn apply(
        &self,
        buffer: &mut [f64],
        mut state: EnvelopeState,
        rate: f64,
        gain: f64,
    ) -> EnvelopeState {
        match self.mode {
            EnvelopeMode::ConstantGain => {
                for s in buffer.iter_mut() {
                    *s *= gain;
                }
            }
            EnvelopeMode::Adsr => {
                let lengths = StageLengths::new(self, rate);
                for s in buffer.iter_mut() {
                    *s *= state.next_level(&lengths, self.sustain) * gain;
                }
            }
        }
        state.elapsed += buffer.len() as u64;
        state
    }
}

impl Tunable for Envelope {
    fn visit_knobs(&self, visitor: &mut dyn KnobVisitor) {
        for (name, descriptor, value) in [
            ("attack", ATTACK, self.attack_ms),
            ("decay", DECAY, self.decay_ms),
            ("sustain", SUSTAIN, self.sustain),
            ("release", RELEASE, self.release_ms),
        ] {
            visitor.knob(Knob {
                name,
                type_name: "f64",
                descriptor,
                value: KnobValue::Float(value),
            });
        }
    }
}

/// Stage durations in samples at one sample rate.
struct StageLengths {
    attack: u64,
    decay: u64,
    release: u64,
}

impl StageLengths {
    fn new(env: &Envelope, rate: f64) -> Self {
        let samples = |ms: f64| (ms * 0.001 * rate) as u64;
        StageLengths {
            attack: samples(env.attack_ms),
            decay: samples(env.decay_ms),
            release: samples(env.release_ms),
        }
    }
}

/// Per-voice envelope progress.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvelopeState {
    /// Samples rendered since the voice was created.
    elapsed: u64,
    gate: Gate,
    stage: Stage,
    level: f64,
    /// Level when the current stage began (release ramps down from it).
    start_level: f64,
    stage_counter: u64,
}

impl EnvelopeState {
    /// Gate on, not yet started.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn elapsed_samples(&self) -> u64 {
        self.elapsed
    }

    /// Time rendered so far at `rate` samples per second. A rate that is
    /// not positive and finite yields zero.
    pub fn elapsed(&self, rate: f64) -> Duration {
        Duration::try_from_secs_f64(self.elapsed as f64 / rate).unwrap_or_default()
    }

    /// Gate off. A no-op unless the gate is currently on.
    pub fn release(&mut self) {
        if self.gate == Gate::On {
            self.gate = Gate::Releasing;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.gate == Gate::Off
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.stage_counter = 0;
        self.start_level = self.level;
    }

    fn next_level(&mut self, lengths: &StageLengths, sustain: f64) -> f64 {
        match (self.gate, self.stage) {
            (Gate::On, Stage::Idle) => self.enter(Stage::Attack),
            (Gate::Releasing, Stage::Attack | Stage::Decay | Stage::Sustain) => {
                self.enter(Stage::Release)
            }
            // Released before it ever sounded.
            (Gate::Releasing, Stage::Idle) => self.gate = Gate::Off,
            (Gate::Off, _) => self.stage = Stage::Idle,
            _ => {}
        }

        match self.stage {
            Stage::Idle => {
                self.level = 0.0;
            }
            Stage::Attack => {
                if self.ramp(lengths.attack) {
                    self.level = 1.0;
                    self.enter(Stage::Decay);
                } else {
                    let t = self.progress(lengths.attack);
                    self.level = self.start_level + (1.0 - self.start_level) * t;
                }
            }
            Stage::Decay => {
                if self.ramp(lengths.decay) {
                    self.level = sustain;
                    self.enter(Stage::Sustain);
                } else {
                    let t = self.progress(lengths.decay);
                    self.level = 1.0 - (1.0 - sustain) * t;
                }
            }
            Stage::Sustain => {
                self.level = sustain;
            }
            Stage::Release => {
                if self.ramp(lengths.release) {
                    self.level = 0.0;
                    self.enter(Stage::Idle);
                    self.gate = Gate::Off;
                } else {
                    let t = self.progress(lengths.release);
                    self.level = self.start_level * (1.0 - t);
                }
            }
        }
        self.level
    }

    /// Count one sample into the current stage; true once it is complete.
    fn ramp(&mut self, length: u64) -> bool {
        self.stage_counter += 1;
        self.stage_counter >= length
    }

    fn progress(&self, length: u64) -> f64 {
        self.stage_counter as f64 / length as f64
    }
}
