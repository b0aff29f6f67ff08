//! PolySynth — sums every active voice into the output buffer.
//!
//! All voices share one oscillator bank and one envelope: the synth models
//! a single multi-oscillator patch played polyphonically. Each voice keeps
//! only its own phases and envelope progress.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tracing::{debug, warn};

use super::control::{self, ControlMessage, ControlReceiver, IdCounter, SynthController};
use super::envelope::Envelope;
use super::knob::{Curve, Descriptor, Knob, KnobValue, KnobVisitor, Tunable, Unit};
use super::oscillator::{OSCILLATOR_COUNT, Oscillator};
use super::voice::{Voice, VoiceId};
use super::wavebank::WaveSet;
use crate::error::SynthError;

/// Default size of the voice pool.
pub const DEFAULT_MAX_VOICES: usize = 64;
/// Largest voice pool a synth will allocate.
pub const MAX_VOICES: usize = 1024;

const VOLUME_FLOOR_DB: f64 = -40.0;

/// Master volume as exposed to controls. The synth stores linear amplitude.
/// Silence reports as the bottom of the range.
pub const VOLUME: Descriptor =
    Descriptor::continuous(Unit::Decibels, VOLUME_FLOOR_DB, 0.0, Curve::Logarithmic);

pub fn db_to_amplitude(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

pub fn amplitude_to_db(amplitude: f64) -> f64 {
    20.0 * amplitude.log10()
}

pub(crate) fn check_volume(amplitude: f64) -> Result<(), SynthError> {
    if amplitude.is_finite() && (0.0..=1.0).contains(&amplitude) {
        Ok(())
    } else {
        Err(SynthError::ParameterOutOfRange {
            name: "volume",
            value: amplitude,
            min: 0.0,
            max: 1.0,
        })
    }
}

/// Polyphonic wavetable synth.
pub struct PolySynth {
    oscillators: [Oscillator; OSCILLATOR_COUNT],
    envelope: Envelope,
    /// Master gain, linear amplitude in `[0, 1]`.
    volume: f64,
    voices: Vec<Voice>,
    max_voices: usize,
    waves: Arc<WaveSet>,
    scratch: Vec<f64>,
    ids: IdCounter,
    controls: Option<ControlReceiver>,
}

impl PolySynth {
    pub fn new(waves: Arc<WaveSet>) -> Self {
        Self::build(waves, DEFAULT_MAX_VOICES)
    }

    /// A synth with room for `max_voices` simultaneous voices, which must be
    /// in `1..=MAX_VOICES`.
    pub fn with_max_voices(waves: Arc<WaveSet>, max_voices: usize) -> Result<Self, SynthError> {
        if !(1..=MAX_VOICES).contains(&max_voices) {
            return Err(SynthError::ParameterOutOfRange {
                name: "maxVoices",
                value: max_voices as f64,
                min: 1.0,
                max: MAX_VOICES as f64,
            });
        }
        Ok(Self::build(waves, max_voices))
    }

    fn build(waves: Arc<WaveSet>, max_voices: usize) -> Self {
        PolySynth {
            oscillators: [Oscillator::default(); OSCILLATOR_COUNT],
            envelope: Envelope::default(),
            volume: 0.0,
            voices: Vec::with_capacity(max_voices),
            max_voices,
            waves,
            scratch: Vec::new(),
            ids: Arc::new(AtomicU64::new(0)),
            controls: None,
        }
    }

    /// Pre-size the scratch buffer so `render` never allocates for blocks
    /// up to `block_len` samples.
    pub fn prepare(&mut self, block_len: usize) {
        if self.scratch.len() < block_len {
            self.scratch.resize(block_len, 0.0);
        }
    }

    /// Create the control channel for this synth. Any previous controller
    /// is disconnected. The queue holds at least one message.
    pub fn controller(&mut self, capacity: usize) -> SynthController {
        let (tx, rx) = control::control_channel(capacity, self.ids.clone());
        self.controls = Some(rx);
        tx
    }

    // ── Settings ────────────────────────────────────────────

    pub fn oscillators(&self) -> &[Oscillator; OSCILLATOR_COUNT] {
        &self.oscillators
    }

    pub fn set_oscillator(
        &mut self,
        slot: usize,
        oscillator: Oscillator,
    ) -> Result<(), SynthError> {
        let target = self.oscillators.get_mut(slot).ok_or(SynthError::NoSuchSlot {
            slot,
            count: OSCILLATOR_COUNT,
        })?;
        *target = oscillator;
        Ok(())
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn set_envelope(&mut self, envelope: Envelope) {
        self.envelope = envelope;
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn volume_db(&self) -> f64 {
        amplitude_to_db(self.volume)
    }

    pub fn set_volume(&mut self, amplitude: f64) -> Result<(), SynthError> {
        check_volume(amplitude)?;
        self.volume = amplitude;
        Ok(())
    }

    pub fn set_volume_db(&mut self, db: f64) -> Result<(), SynthError> {
        VOLUME.check("volume", db)?;
        self.volume = db_to_amplitude(db);
        Ok(())
    }

    pub fn waves(&self) -> &Arc<WaveSet> {
        &self.waves
    }

    // ── Voices ──────────────────────────────────────────────

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voice(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.iter().find(|v| v.id() == id)
    }

    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    /// Start a new note at `frequency` Hz.
    pub fn add_voice(&mut self, frequency: f64) -> Result<VoiceId, SynthError> {
        let id = control::next_voice_id(&self.ids);
        self.push_voice(id, frequency)?;
        Ok(id)
    }

    fn push_voice(&mut self, id: VoiceId, frequency: f64) -> Result<(), SynthError> {
        if self.voices.len() >= self.max_voices {
            return Err(SynthError::VoicePoolFull(self.max_voices));
        }
        self.voices.push(Voice::new(id, frequency)?);
        Ok(())
    }

    /// Gate off the voice with `id`. Returns false if it is not playing.
    pub fn release_voice(&mut self, id: VoiceId) -> bool {
        match self.voices.iter_mut().find(|v| v.id() == id) {
            Some(voice) => {
                voice.release();
                true
            }
            None => false,
        }
    }

    pub fn release_all(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.release();
        }
    }

    // ── Rendering ───────────────────────────────────────────

    /// Mix one block of every voice into `out`.
    ///
    /// Samples are added to what `out` already holds and are never clipped;
    /// each voice contributes at most `volume` in magnitude. Voices that
    /// finished their release during this block are retired afterwards.
    pub fn render(&mut self, out: &mut [f64], rate: f64) {
        debug_assert!(rate.is_finite() && rate > 0.0, "invalid sample rate {rate}");
        self.apply_controls();
        self.prepare(out.len());

        let scratch = &mut self.scratch[..out.len()];
        // Oscillator slots are averaged so a voice peaks at `volume`.
        let gain = self.volume / OSCILLATOR_COUNT as f64;
        for voice in self.voices.iter_mut() {
            scratch.fill(0.0);
            let freq = voice.frequency();
            for (osc, phase) in self.oscillators.iter().zip(voice.phases.iter_mut()) {
                *phase = osc.produce(scratch, *phase, freq, rate, &self.waves);
            }
            voice.envelope = self.envelope.apply(scratch, voice.envelope, rate, gain);
            for (o, s) in out.iter_mut().zip(scratch.iter()) {
                *o += *s;
            }
        }

        self.retire_finished();
    }

    fn retire_finished(&mut self) {
        self.voices.retain(|voice| {
            if voice.is_finished() {
                debug!(id = %voice.id(), "retiring voice");
                false
            } else {
                true
            }
        });
    }

    fn apply_controls(&mut self) {
        let Some(mut controls) = self.controls.take() else {
            return;
        };
        while let Some(message) = controls.pop() {
            self.apply(message);
        }
        self.controls = Some(controls);
    }

    fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::SetOscillator { slot, oscillator } => {
                if let Err(e) = self.set_oscillator(slot, oscillator) {
                    warn!(%e, "ignoring oscillator update");
                }
            }
            ControlMessage::SetEnvelope(envelope) => self.envelope = envelope,
            ControlMessage::SetVolume(amplitude) => {
                if let Err(e) = self.set_volume(amplitude) {
                    warn!(%e, "ignoring volume update");
                }
            }
            ControlMessage::AddVoice { id, frequency } => {
                if let Err(e) = self.push_voice(id, frequency) {
                    warn!(%id, %e, "dropping queued voice");
                }
            }
            ControlMessage::ReleaseVoice(id) => {
                if !self.release_voice(id) {
                    debug!(%id, "release for voice that is no longer playing");
                }
            }
            ControlMessage::ReleaseAll => self.release_all(),
        }
    }
}

impl Tunable for PolySynth {
    fn visit_knobs(&self, visitor: &mut dyn KnobVisitor) {
        for (i, osc) in self.oscillators.iter().enumerate() {
            visitor.enter("oscillators", Some(i));
            osc.visit_knobs(visitor);
            visitor.leave();
        }
        visitor.enter("envelope", None);
        self.envelope.visit_knobs(visitor);
        visitor.leave();
        visitor.knob(Knob {
            name: "volume",
            type_name: "f64",
            descriptor: VOLUME,
            value: KnobValue::Float(self.volume_db().max(VOLUME_FLOOR_DB)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::Gate;
    use crate::dsp::knob::collect_knobs;
    use crate::dsp::oscillator::Waveform;
    use crate::dsp::wavebank::tests::shared_waves;
    use std::f64::consts::TAU;

    const RATE: f64 = 44_100.0;

    fn synth() -> PolySynth {
        let mut s = PolySynth::new(shared_waves());
        s.set_volume(0.2).unwrap();
        s
    }

    fn peak(buf: &[f64]) -> f64 {
        buf.iter().fold(0.0_f64, |m, s| m.max(s.abs()))
    }

    #[test]
    fn empty_synth_renders_nothing() {
        let mut s = synth();
        let mut out = vec![0.25; 128];
        s.render(&mut out, RATE);
        assert!(out.iter().all(|&x| x == 0.25), "no voices must leave the buffer untouched");
    }

    #[test]
    fn three_voice_block_is_bounded() {
        let mut s = synth();
        for slot in 0..OSCILLATOR_COUNT {
            s.set_oscillator(slot, Oscillator::new(Waveform::Saw, 0, 0, 0).unwrap())
                .unwrap();
        }
        s.add_voice(110.0).unwrap();
        s.add_voice(440.0 * (7.0_f64 / 12.0).exp2()).unwrap();
        s.add_voice(880.0).unwrap();

        let mut out = vec![0.0; 2048];
        s.render(&mut out, RATE);
        let p = peak(&out);
        assert!(p > 0.0, "should produce sound");
        assert!(p <= 3.0 * 0.2 * 1.0 + 1e-12, "peak {p} exceeds voice worst case");
    }

    #[test]
    fn classic_patch_is_bounded_over_many_blocks() {
        let mut s = synth();
        s.set_oscillator(0, Oscillator::new(Waveform::Saw, 0, 0, 0).unwrap()).unwrap();
        s.set_oscillator(1, Oscillator::new(Waveform::Saw, 0, 0, 10).unwrap()).unwrap();
        s.set_oscillator(2, Oscillator::new(Waveform::Saw, -1, 0, 0).unwrap()).unwrap();
        for freq in [110.0, 659.25, 880.0] {
            s.add_voice(freq).unwrap();
        }
        for _ in 0..20 {
            let mut out = vec![0.0; 2048];
            s.render(&mut out, RATE);
            assert!(out.iter().all(|x| x.is_finite()));
            assert!(peak(&out) <= 0.6 + 1e-12);
        }
    }

    #[test]
    fn render_accumulates_into_output() {
        let mut s = synth();
        s.add_voice(440.0).unwrap();
        let mut fresh = vec![0.0; 64];
        s.render(&mut fresh, RATE);

        let mut s = synth();
        s.add_voice(440.0).unwrap();
        let mut offset = vec![1.0; 64];
        s.render(&mut offset, RATE);

        for (a, b) in fresh.iter().zip(&offset) {
            assert!((a + 1.0 - b).abs() < 1e-12);
        }
    }

    #[test]
    fn voice_phases_persist_between_blocks() {
        let mut whole = synth();
        whole.add_voice(330.0).unwrap();
        let mut one = vec![0.0; 512];
        whole.render(&mut one, RATE);

        let mut split = synth();
        split.add_voice(330.0).unwrap();
        let mut two = vec![0.0; 512];
        let (a, b) = two.split_at_mut(256);
        split.render(a, RATE);
        split.render(b, RATE);

        for (x, y) in one.iter().zip(&two) {
            assert!((x - y).abs() < 1e-9, "block split changed output: {x} vs {y}");
        }
        for phase in split.voices()[0].phases() {
            assert!((0.0..TAU).contains(phase));
        }
    }

    #[test]
    fn renders_are_deterministic() {
        let render = || {
            let mut s = synth();
            s.set_oscillator(1, Oscillator::new(Waveform::Square, 1, 3, -20).unwrap())
                .unwrap();
            s.add_voice(123.0).unwrap();
            s.add_voice(456.0).unwrap();
            let mut out = vec![0.0; 1024];
            s.render(&mut out, 48_000.0);
            out
        };
        let a = render();
        let b = render();
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn constant_gain_mode_matches_plain_sum() {
        let mut s = synth();
        s.set_envelope(Envelope::constant_gain());
        s.add_voice(440.0).unwrap();
        let mut out = vec![0.0; 256];
        s.render(&mut out, RATE);

        let waves = shared_waves();
        let mut expected = vec![0.0; 256];
        for osc in s.oscillators() {
            osc.produce(&mut expected, 0.0, 440.0, RATE, &waves);
        }
        for (o, e) in out.iter().zip(&expected) {
            assert!((o - e * 0.2 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn released_voices_are_retired() {
        let mut s = synth();
        s.set_envelope(Envelope::new(0.0, 0.0, 1.0, 5.0).unwrap());
        let keep = s.add_voice(220.0).unwrap();
        let gone = s.add_voice(440.0).unwrap();
        assert!(s.release_voice(gone));
        assert_eq!(s.voice(gone).unwrap().gate(), Gate::Releasing);

        // 5 ms release is 220 samples.
        let mut out = vec![0.0; 512];
        s.render(&mut out, RATE);
        assert_eq!(s.voices().len(), 1);
        assert!(s.voice(gone).is_none());
        assert_eq!(s.voice(keep).unwrap().gate(), Gate::On);
        assert!(!s.release_voice(gone));
    }

    #[test]
    fn release_all_empties_the_pool() {
        let mut s = synth();
        for f in [110.0, 220.0, 330.0] {
            s.add_voice(f).unwrap();
        }
        s.release_all();
        let mut out = vec![0.0; 64];
        s.render(&mut out, RATE);
        assert!(s.voices().is_empty());
    }

    #[test]
    fn voice_pool_is_bounded() {
        let mut s = PolySynth::with_max_voices(shared_waves(), 2).unwrap();
        s.add_voice(100.0).unwrap();
        s.add_voice(200.0).unwrap();
        assert!(matches!(s.add_voice(300.0), Err(SynthError::VoicePoolFull(2))));
        assert!(matches!(s.add_voice(-3.0), Err(SynthError::VoicePoolFull(2))));
    }

    #[test]
    fn elapsed_time_advances() {
        let mut s = synth();
        let id = s.add_voice(440.0).unwrap();
        let mut out = vec![0.0; 4410];
        for _ in 0..5 {
            out.fill(0.0);
            s.render(&mut out, RATE);
        }
        let elapsed = s.voice(id).unwrap().elapsed(RATE);
        assert!((elapsed.as_secs_f64() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn controller_updates_apply_at_block_boundary() {
        let mut s = synth();
        let mut ctl = s.controller(16);
        ctl.set_volume_db(-6.0).unwrap();
        ctl.set_oscillator(2, Oscillator::new(Waveform::Triangle, -1, 0, 0).unwrap())
            .unwrap();
        let id = ctl.add_voice(440.0).unwrap();

        assert!(s.voices().is_empty(), "nothing applies before render");
        let mut out = vec![0.0; 128];
        s.render(&mut out, RATE);
        assert!(s.voice(id).is_some());
        assert_eq!(s.oscillators()[2].wave(), Waveform::Triangle);
        assert!((s.volume_db() + 6.0).abs() < 1e-9);

        ctl.release_voice(id).unwrap();
        s.render(&mut out, RATE);
        assert!(s.voices().is_empty());

        let direct = s.add_voice(100.0).unwrap();
        assert_ne!(direct, id, "ids are shared with the controller");
    }

    #[test]
    fn volume_limits() {
        let mut s = synth();
        assert!(s.set_volume(1.01).is_err());
        assert!(s.set_volume_db(-41.0).is_err());
        s.set_volume_db(0.0).unwrap();
        assert_eq!(s.volume(), 1.0);
        assert!(matches!(
            s.set_oscillator(5, Oscillator::default()),
            Err(SynthError::NoSuchSlot { slot: 5, .. })
        ));
    }

    #[test]
    fn exposes_all_tunables() {
        let s = synth();
        let knobs = collect_knobs(&s);
        let paths: Vec<&str> = knobs.iter().map(|k| k.path.as_str()).collect();
        assert_eq!(knobs.len(), 3 * 4 + 4 + 1);
        assert_eq!(paths[0], "oscillators[0].wave");
        assert_eq!(paths[11], "oscillators[2].cents");
        assert_eq!(paths[12], "envelope.attack");
        assert_eq!(paths[15], "envelope.release");
        assert_eq!(paths[16], "volume");
        assert_eq!(knobs[16].descriptor, VOLUME);
        match knobs[16].value {
            KnobValue::Float(db) => assert!((db - amplitude_to_db(0.2)).abs() < 1e-12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn voice_pool_size_is_validated() {
        for max in [0, MAX_VOICES + 1, usize::MAX] {
            assert!(
                matches!(
                    PolySynth::with_max_voices(shared_waves(), max),
                    Err(SynthError::ParameterOutOfRange { name: "maxVoices", .. })
                ),
                "pool of {max} voices should be rejected"
            );
        }
        let s = PolySynth::with_max_voices(shared_waves(), MAX_VOICES).unwrap();
        assert_eq!(s.max_voices(), MAX_VOICES);
    }

    #[test]
    fn extreme_frequencies_render_finite() {
        let mut s = synth();
        s.add_voice(1.0e20).unwrap();
        s.add_voice(f64::MIN_POSITIVE).unwrap();
        let mut out = vec![0.0; 2048];
        s.render(&mut out, RATE);
        assert!(out.iter().all(|x| x.is_finite()));
        assert!(peak(&out) <= 2.0 * 0.2 + 1e-12);
        for voice in s.voices() {
            for phase in voice.phases() {
                assert!((0.0..TAU).contains(phase), "phase {phase} escaped");
            }
        }
    }

    #[test]
    fn tuned_up_oscillator_above_nyquist_keeps_phase_wrapped() {
        let mut s = synth();
        s.set_oscillator(0, Oscillator::new(Waveform::Sine, 2, 0, 0).unwrap())
            .unwrap();
        // 12 kHz two octaves up runs at 48 kHz, faster than the sample rate.
        s.add_voice(12_000.0).unwrap();
        let mut out = vec![0.0; 2048];
        for _ in 0..10 {
            out.fill(0.0);
            s.render(&mut out, RATE);
            for phase in s.voices()[0].phases() {
                assert!((0.0..TAU).contains(phase), "phase {phase} escaped");
            }
        }
        assert!(out.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn zero_capacity_controller_still_delivers() {
        let mut s = synth();
        let mut ctl = s.controller(0);
        let id = ctl.add_voice(220.0).unwrap();
        assert!(matches!(ctl.add_voice(330.0), Err(SynthError::ControlQueueFull)));
        let mut out = vec![0.0; 64];
        s.render(&mut out, RATE);
        assert!(s.voice(id).is_some());
    }

    #[test]
    fn silent_volume_reports_range_floor() {
        let s = PolySynth::new(shared_waves());
        assert_eq!(s.volume(), 0.0);
        let knobs = collect_knobs(&s);
        let volume = knobs.iter().find(|k| k.path == "volume").unwrap();
        assert_eq!(volume.value, KnobValue::Float(-40.0));
        let json = serde_json::to_value(volume).unwrap();
        assert_eq!(json["value"], -40.0);
    }
}
