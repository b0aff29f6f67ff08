//! Voice — one sounding note with its own phases and envelope progress.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::envelope::{EnvelopeState, Gate};
use super::oscillator::OSCILLATOR_COUNT;
use crate::error::SynthError;

/// Stable handle for a voice, unique for the lifetime of a synth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// A single note: fundamental frequency, one phase per oscillator slot,
/// and the envelope state (gate, elapsed time).
#[derive(Debug, Clone)]
pub struct Voice {
    id: VoiceId,
    frequency: f64,
    /// Phase in radians per oscillator slot, always in `[0, 2π)`.
    pub(crate) phases: [f64; OSCILLATOR_COUNT],
    pub(crate) envelope: EnvelopeState,
}

impl Voice {
    pub fn new(id: VoiceId, frequency: f64) -> Result<Self, SynthError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(SynthError::InvalidFrequency(frequency));
        }
        Ok(Voice {
            id,
            frequency,
            phases: [0.0; OSCILLATOR_COUNT],
            envelope: EnvelopeState::new(),
        })
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn phases(&self) -> &[f64; OSCILLATOR_COUNT] {
        &self.phases
    }

    pub fn gate(&self) -> Gate {
        self.envelope.gate()
    }

    pub fn envelope(&self) -> &EnvelopeState {
        &self.envelope
    }

    /// Time rendered since the voice was added.
    pub fn elapsed(&self, rate: f64) -> Duration {
        self.envelope.elapsed(rate)
    }

    /// Start the release stage (gate off).
    pub fn release(&mut self) {
        self.envelope.release();
    }

    /// Released and silent; ready to be retired from the pool.
    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished()
    }
}
