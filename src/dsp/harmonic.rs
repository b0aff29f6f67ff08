//! Band-limited single-cycle tables built from harmonic spectra.
//!
//! Each table is an additive-synthesis render of one waveform cycle that
//! contains only the harmonics a given frequency band can play without
//! aliasing. The four classic spectra are derived analytically.

use std::f64::consts::TAU;

/// Number of harmonic amplitudes in a full spectrum (harmonics 1..=20000).
pub const HARMONIC_COUNT: usize = 20_000;

/// Smallest table ever generated. Must be a power of two.
pub const MIN_TABLE_SIZE: usize = 256;

/// Table oversampling relative to the Nyquist length of the top harmonic.
pub const OVERSAMPLE: usize = 2;

/// One precomputed waveform cycle spanning `0..2π`.
#[derive(Debug, Clone)]
pub struct HarmonicTable {
    samples: Box<[f64]>,
    size_mask: usize,
    phase_table_ratio: f64,
}

impl HarmonicTable {
    /// Additively synthesise the first `harmonics` entries of `amplitudes`
    /// and normalise the result to a peak of 1.0.
    ///
    /// `amplitudes[i]` is the weight of harmonic `i + 1`. Harmonics past the
    /// end of the slice are treated as silent.
    pub fn from_spectrum(amplitudes: &[f64], harmonics: usize) -> Self {
        let mut samples = vec![0.0; table_size(harmonics)];
        for (i, &amp) in amplitudes.iter().take(harmonics).enumerate() {
            if amp != 0.0 {
                add_sine(&mut samples, i + 1, amp);
            }
        }
        normalize(&mut samples);

        let len = samples.len();
        HarmonicTable {
            samples: samples.into_boxed_slice(),
            size_mask: len - 1,
            phase_table_ratio: len as f64 / TAU,
        }
    }

    /// Linearly interpolated sample at `phase` radians.
    ///
    /// The table is circular: the right-hand neighbour of the last sample
    /// is the first one. Phases outside `[0, 2π)` still read inside the
    /// table.
    #[inline]
    pub fn lerp(&self, phase: f64) -> f64 {
        let findex = phase * self.phase_table_ratio;
        let index = (findex as usize) & self.size_mask;
        let left = self.samples[index];
        let right = self.samples[(index + 1) & self.size_mask];
        left + (right - left) * (findex - findex.floor())
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest absolute sample value (1.0 for any non-silent table).
    pub fn peak(&self) -> f64 {
        self.samples.iter().fold(0.0_f64, |m, s| m.max(s.abs()))
    }
}

/// Table length for a band holding `harmonics` harmonics.
///
/// Smallest power of two that is at least [`MIN_TABLE_SIZE`] and at least
/// `OVERSAMPLE` times the Nyquist length of the highest harmonic.
pub fn table_size(harmonics: usize) -> usize {
    let nyquist = harmonics * 2;
    (nyquist * OVERSAMPLE).max(MIN_TABLE_SIZE).next_power_of_two()
}

fn add_sine(samples: &mut [f64], harmonic: usize, amp: f64) {
    let index_phase_ratio = harmonic as f64 * TAU / samples.len() as f64;
    for (i, s) in samples.iter_mut().enumerate() {
        *s += amp * (i as f64 * index_phase_ratio).sin();
    }
}

fn normalize(samples: &mut [f64]) {
    let peak = samples.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
    if peak == 0.0 {
        return;
    }
    let scale = 1.0 / peak;
    for s in samples.iter_mut() {
        *s *= scale;
    }
}

// ── Analytic spectra ────────────────────────────────────────

/// A lone fundamental.
pub fn sine_spectrum() -> Vec<f64> {
    let mut amp = vec![0.0; HARMONIC_COUNT];
    amp[0] = 1.0;
    amp
}

/// Odd harmonics at 1/h², alternating in sign starting positive.
pub fn triangle_spectrum() -> Vec<f64> {
    let mut amp = vec![0.0; HARMONIC_COUNT];
    let mut sign = 1.0;
    for h in (1..=HARMONIC_COUNT).step_by(2) {
        amp[h - 1] = sign / (h * h) as f64;
        sign = -sign;
    }
    amp
}

/// Odd harmonics at 1/h.
pub fn square_spectrum() -> Vec<f64> {
    let mut amp = vec![0.0; HARMONIC_COUNT];
    for h in (1..=HARMONIC_COUNT).step_by(2) {
        amp[h - 1] = 1.0 / h as f64;
    }
    amp
}

/// Every harmonic at 1/h.
pub fn saw_spectrum() -> Vec<f64> {
    (1..=HARMONIC_COUNT).map(|h| 1.0 / h as f64).collect()
}
