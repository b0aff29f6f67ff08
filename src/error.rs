use thiserror::Error;

/// Every failure the synth core can report.
///
/// All of these are configuration or control errors: rendering itself
/// never fails once a [`PolySynth`](crate::dsp::mixer::PolySynth) is built.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("wave bank expects {expected} harmonic amplitudes, got {found}")]
    SpectrumLength { expected: usize, found: usize },

    #[error("unknown waveform '{0}'")]
    UnknownWaveform(String),

    #[error("{name} = {value} is outside [{min}, {max}]")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("oscillator slot {slot} does not exist (patch has {count})")]
    NoSuchSlot { slot: usize, count: usize },

    #[error("invalid voice frequency {0} Hz")]
    InvalidFrequency(f64),

    #[error("voice pool is full ({0} voices)")]
    VoicePoolFull(usize),

    #[error("control queue is full")]
    ControlQueueFull,

    #[error("invalid patch: {0}")]
    Patch(#[from] serde_json::Error),
}
