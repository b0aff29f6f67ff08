//! DSP — band-limited wavetable synthesis and polyphonic mixing.
//!
//! Everything here is plain computation over in-memory state: wave banks
//! are built once and shared read-only, and a [`mixer::PolySynth`] renders
//! blocks on whatever thread owns it without blocking or doing I/O.

pub mod control;
pub mod envelope;
pub mod harmonic;
pub mod knob;
pub mod mixer;
pub mod oscillator;
pub mod renderer;
pub mod voice;
pub mod wavebank;
