//! Pitch-tunable wavetable oscillators.
//!
//! An [`Oscillator`] is stateless with respect to time: it holds a waveform
//! and a pitch offset, and the caller passes in (and gets back) the phase.
//! This lets one oscillator bank serve every voice of the synth.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::knob::{Descriptor, Knob, KnobValue, KnobVisitor, Tunable};
use super::wavebank::WaveSet;
use crate::error::SynthError;

/// Oscillator slots per patch.
pub const OSCILLATOR_COUNT: usize = 3;

/// Supported waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
    #[serde(alias = "sawtooth")]
    Saw,
}

impl Waveform {
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Square,
        Waveform::Saw,
    ];

    pub const NAMES: [&'static str; 4] = ["sine", "triangle", "square", "saw"];

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Waveform {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sine" => Ok(Waveform::Sine),
            "triangle" => Ok(Waveform::Triangle),
            "square" => Ok(Waveform::Square),
            "saw" | "sawtooth" => Ok(Waveform::Saw),
            _ => Err(SynthError::UnknownWaveform(s.to_string())),
        }
    }
}

impl TryFrom<u8> for Waveform {
    type Error = SynthError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| SynthError::UnknownWaveform(index.to_string()))
    }
}

pub const WAVE: Descriptor = Descriptor::Choice {
    choices: &Waveform::NAMES,
};
pub const OCTAVE: Descriptor = Descriptor::integer(-2, 2);
pub const SEMITONE: Descriptor = Descriptor::integer(-12, 12);
pub const CENTS: Descriptor = Descriptor::integer(-100, 100);

/// A waveform plus an equal-tempered pitch offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Oscillator {
    wave: Waveform,
    octave: i32,
    semitone: i32,
    cents: i32,
}

impl Oscillator {
    pub fn new(wave: Waveform, octave: i32, semitone: i32, cents: i32) -> Result<Self, SynthError> {
        let mut osc = Oscillator {
            wave,
            ..Default::default()
        };
        osc.set_octave(octave)?;
        osc.set_semitone(semitone)?;
        osc.set_cents(cents)?;
        Ok(osc)
    }

    pub fn wave(&self) -> Waveform {
        self.wave
    }

    pub fn octave(&self) -> i32 {
        self.octave
    }

    pub fn semitone(&self) -> i32 {
        self.semitone
    }

    pub fn cents(&self) -> i32 {
        self.cents
    }

    pub fn set_wave(&mut self, wave: Waveform) {
        self.wave = wave;
    }

    pub fn set_octave(&mut self, octave: i32) -> Result<(), SynthError> {
        OCTAVE.check("octave", octave as f64)?;
        self.octave = octave;
        Ok(())
    }

    pub fn set_semitone(&mut self, semitone: i32) -> Result<(), SynthError> {
        SEMITONE.check("semitone", semitone as f64)?;
        self.semitone = semitone;
        Ok(())
    }

    pub fn set_cents(&mut self, cents: i32) -> Result<(), SynthError> {
        CENTS.check("cents", cents as f64)?;
        self.cents = cents;
        Ok(())
    }

    /// Frequency multiplier for the configured offset: `2^(semitones / 12)`.
    pub fn pitch_ratio(&self) -> f64 {
        let semitones = (12 * self.octave + self.semitone) as f64 + self.cents as f64 / 100.0;
        (semitones / 12.0).exp2()
    }

    pub fn effective_frequency(&self, base_freq: f64) -> f64 {
        base_freq * self.pitch_ratio()
    }

    /// Accumulate `out.len()` samples for a note at `base_freq` into `out`,
    /// starting from `phase`. Returns the phase to resume from.
    pub fn produce(
        &self,
        out: &mut [f64],
        phase: f64,
        base_freq: f64,
        rate: f64,
        waves: &WaveSet,
    ) -> f64 {
        waves
            .bank(self.wave)
            .advance(out, phase, self.effective_frequency(base_freq), rate)
    }
}

impl Tunable for Oscillator {
    fn visit_knobs(&self, visitor: &mut dyn KnobVisitor) {
        visitor.knob(Knob {
            name: "wave",
            type_name: "Waveform",
            descriptor: WAVE,
            value: KnobValue::Choice(self.wave.name()),
        });
        for (name, descriptor, value) in [
            ("octave", OCTAVE, self.octave),
            ("semitone", SEMITONE, self.semitone),
            ("cents", CENTS, self.cents),
        ] {
            visitor.knob(Knob {
                name,
                type_name: "i32",
                descriptor,
                value: KnobValue::Integer(value as i64),
            });
        }
    }
}
