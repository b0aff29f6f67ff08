//! Control surface for a synth running on another thread.
//!
//! A [`SynthController`] validates updates on the control thread and pushes
//! them through a lock-free single-producer/single-consumer ring. The
//! [`PolySynth`](super::mixer::PolySynth) drains the ring at the top of each
//! `render` call, so settings only ever change between blocks and the audio
//! thread never reads a half-written value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::warn;

use super::envelope::Envelope;
use super::oscillator::{OSCILLATOR_COUNT, Oscillator};
use super::voice::VoiceId;
use crate::error::SynthError;

/// An update applied by the synth at the next block boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    SetOscillator { slot: usize, oscillator: Oscillator },
    SetEnvelope(Envelope),
    /// Master volume as linear amplitude.
    SetVolume(f64),
    AddVoice { id: VoiceId, frequency: f64 },
    ReleaseVoice(VoiceId),
    ReleaseAll,
}

/// Voice ids are handed out from one counter shared by the synth and its
/// controller, so ids allocated on either side never collide.
pub(crate) type IdCounter = Arc<AtomicU64>;

pub(crate) fn next_voice_id(counter: &IdCounter) -> VoiceId {
    VoiceId(counter.fetch_add(1, Ordering::Relaxed))
}

/// Sending half, owned by the control thread (UI, MIDI handler, ...).
pub struct SynthController {
    producer: HeapProd<ControlMessage>,
    ids: IdCounter,
}

/// Receiving half, owned by the synth.
pub struct ControlReceiver {
    consumer: HeapCons<ControlMessage>,
}

pub(crate) fn control_channel(
    capacity: usize,
    ids: IdCounter,
) -> (SynthController, ControlReceiver) {
    let (producer, consumer) = HeapRb::<ControlMessage>::new(capacity.max(1)).split();
    (SynthController { producer, ids }, ControlReceiver { consumer })
}

impl ControlReceiver {
    pub(crate) fn pop(&mut self) -> Option<ControlMessage> {
        self.consumer.try_pop()
    }
}

impl SynthController {
    fn send(&mut self, message: ControlMessage) -> Result<(), SynthError> {
        self.producer.try_push(message).map_err(|dropped| {
            warn!(?dropped, "control queue full");
            SynthError::ControlQueueFull
        })
    }

    pub fn set_oscillator(
        &mut self,
        slot: usize,
        oscillator: Oscillator,
    ) -> Result<(), SynthError> {
        if slot >= OSCILLATOR_COUNT {
            return Err(SynthError::NoSuchSlot {
                slot,
                count: OSCILLATOR_COUNT,
            });
        }
        self.send(ControlMessage::SetOscillator { slot, oscillator })
    }

    pub fn set_envelope(&mut self, envelope: Envelope) -> Result<(), SynthError> {
        self.send(ControlMessage::SetEnvelope(envelope))
    }

    pub fn set_volume(&mut self, amplitude: f64) -> Result<(), SynthError> {
        super::mixer::check_volume(amplitude)?;
        self.send(ControlMessage::SetVolume(amplitude))
    }

    pub fn set_volume_db(&mut self, db: f64) -> Result<(), SynthError> {
        super::mixer::VOLUME.check("volume", db)?;
        self.send(ControlMessage::SetVolume(super::mixer::db_to_amplitude(db)))
    }

    /// Queue a new note. The returned id is valid immediately and can be
    /// used to release the voice later.
    pub fn add_voice(&mut self, frequency: f64) -> Result<VoiceId, SynthError> {
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(SynthError::InvalidFrequency(frequency));
        }
        let id = next_voice_id(&self.ids);
        self.send(ControlMessage::AddVoice { id, frequency })?;
        Ok(id)
    }

    pub fn release_voice(&mut self, id: VoiceId) -> Result<(), SynthError> {
        self.send(ControlMessage::ReleaseVoice(id))
    }

    pub fn release_all(&mut self) -> Result<(), SynthError> {
        self.send(ControlMessage::ReleaseAll)
    }
}
