//! Patch documents — serialisable synth settings.
//!
//! A patch is the JSON form of everything tunable on a
//! [`PolySynth`]: the oscillator bank, the envelope and the master volume.
//! Loading is lenient about missing fields (they take their defaults) but
//! strict about values: anything out of range fails [`Patch::build`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dsp::envelope::{Envelope, EnvelopeMode};
use crate::dsp::mixer::{DEFAULT_MAX_VOICES, PolySynth};
use crate::dsp::oscillator::{OSCILLATOR_COUNT, Oscillator, Waveform};
use crate::dsp::wavebank::WaveSet;
use crate::error::SynthError;

/// Top-level patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Patch {
    /// Up to three oscillator slots; missing slots are untuned sines.
    pub oscillators: Vec<OscillatorPatch>,
    pub envelope: EnvelopePatch,
    /// Master volume, linear amplitude in [0, 1].
    pub volume: f64,
    pub max_voices: usize,
}

/// One oscillator slot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OscillatorPatch {
    pub wave: Waveform,
    pub octave: i32,
    pub semitone: i32,
    pub cents: i32,
}

/// Envelope times in milliseconds, sustain as a level in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvelopePatch {
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub mode: EnvelopeMode,
}

impl Default for Patch {
    /// Three detuned saws: unison, +10 cents, and an octave down.
    fn default() -> Self {
        let saw = |octave, cents| OscillatorPatch {
            wave: Waveform::Saw,
            octave,
            semitone: 0,
            cents,
        };
        Patch {
            oscillators: vec![saw(0, 0), saw(0, 10), saw(-1, 0)],
            envelope: EnvelopePatch::default(),
            volume: 0.2,
            max_voices: DEFAULT_MAX_VOICES,
        }
    }
}

impl Default for EnvelopePatch {
    fn default() -> Self {
        EnvelopePatch::from(&Envelope::default())
    }
}

impl From<&Oscillator> for OscillatorPatch {
    fn from(osc: &Oscillator) -> Self {
        OscillatorPatch {
            wave: osc.wave(),
            octave: osc.octave(),
            semitone: osc.semitone(),
            cents: osc.cents(),
        }
    }
}

impl From<&Envelope> for EnvelopePatch {
    fn from(env: &Envelope) -> Self {
        EnvelopePatch {
            attack: env.attack_ms(),
            decay: env.decay_ms(),
            sustain: env.sustain(),
            release: env.release_ms(),
            mode: env.mode(),
        }
    }
}

impl TryFrom<OscillatorPatch> for Oscillator {
    type Error = SynthError;

    fn try_from(p: OscillatorPatch) -> Result<Self, Self::Error> {
        Oscillator::new(p.wave, p.octave, p.semitone, p.cents)
    }
}

impl TryFrom<EnvelopePatch> for Envelope {
    type Error = SynthError;

    fn try_from(p: EnvelopePatch) -> Result<Self, Self::Error> {
        let mut env = Envelope::new(p.attack, p.decay, p.sustain, p.release)?;
        env.set_mode(p.mode);
        Ok(env)
    }
}

impl Patch {
    pub fn from_json(json: &str) -> Result<Self, SynthError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SynthError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Snapshot the current settings of `synth`.
    pub fn from_synth(synth: &PolySynth) -> Self {
        Patch {
            oscillators: synth.oscillators().iter().map(OscillatorPatch::from).collect(),
            envelope: EnvelopePatch::from(synth.envelope()),
            volume: synth.volume(),
            max_voices: synth.max_voices(),
        }
    }

    /// Validate every field and build a synth sharing `waves`.
    pub fn build(&self, waves: Arc<WaveSet>) -> Result<PolySynth, SynthError> {
        if self.oscillators.len() > OSCILLATOR_COUNT {
            return Err(SynthError::NoSuchSlot {
                slot: OSCILLATOR_COUNT,
                count: OSCILLATOR_COUNT,
            });
        }

        let mut synth = PolySynth::with_max_voices(waves, self.max_voices)?;
        for (slot, osc) in self.oscillators.iter().enumerate() {
            synth.set_oscillator(slot, Oscillator::try_from(*osc)?)?;
        }
        synth.set_envelope(Envelope::try_from(self.envelope)?);
        synth.set_volume(self.volume)?;

        info!(
            oscillators = self.oscillators.len(),
            volume = self.volume,
            max_voices = self.max_voices,
            "built synth from patch"
        );
        Ok(synth)
    }
}
