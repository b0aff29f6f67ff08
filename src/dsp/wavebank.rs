//! Wave banks — one band-limited table per half-octave band.
//!
//! Bands start at 20 Hz and are spaced by √2. Each band's table holds only
//! the harmonics that stay below 20 kHz when played at the top of the band,
//! so any frequency inside a band renders alias-free.

use std::f64::consts::{SQRT_2, TAU};

use tracing::debug;

use super::harmonic::{
    HARMONIC_COUNT, HarmonicTable, saw_spectrum, sine_spectrum, square_spectrum,
    triangle_spectrum,
};
use super::oscillator::Waveform;
use crate::error::SynthError;

/// Lower bound of the first band, in Hz.
pub const LOWEST_FREQUENCY: f64 = 20.0;
/// Upper limit of the audible range; no table holds harmonics past this.
pub const HIGHEST_FREQUENCY: f64 = 20_000.0;

/// A sequence of band-limited tables covering 20 Hz .. 20 kHz.
#[derive(Debug, Clone)]
pub struct WaveBank {
    tables: Vec<HarmonicTable>,
}

impl WaveBank {
    /// Build a bank from a harmonic spectrum of exactly
    /// [`HARMONIC_COUNT`] amplitudes (`amplitudes[i]` weights harmonic `i + 1`).
    pub fn new(amplitudes: &[f64]) -> Result<Self, SynthError> {
        if amplitudes.len() != HARMONIC_COUNT {
            return Err(SynthError::SpectrumLength {
                expected: HARMONIC_COUNT,
                found: amplitudes.len(),
            });
        }

        let mut tables = Vec::new();
        let mut freq = LOWEST_FREQUENCY;
        while freq < HIGHEST_FREQUENCY {
            let harmonics = (HIGHEST_FREQUENCY / (freq * SQRT_2)).max(1.0) as usize;
            tables.push(HarmonicTable::from_spectrum(amplitudes, harmonics));
            freq *= SQRT_2;
        }

        debug!(
            bands = tables.len(),
            largest_table = tables.first().map_or(0, HarmonicTable::len),
            "built wave bank"
        );
        Ok(WaveBank { tables })
    }

    pub fn tables(&self) -> &[HarmonicTable] {
        &self.tables
    }

    /// Index of the table used for `freq`.
    ///
    /// Frequencies under 20 Hz (and anything non-finite) use the lowest
    /// band; frequencies past the top band use the last one.
    pub fn band_index(&self, freq: f64) -> usize {
        let last = self.tables.len() - 1;
        let band = ((freq / LOWEST_FREQUENCY).log2() * 2.0).floor();
        if band.is_nan() || band <= 0.0 {
            0
        } else {
            (band as usize).min(last)
        }
    }

    pub fn table_for(&self, freq: f64) -> &HarmonicTable {
        &self.tables[self.band_index(freq)]
    }

    /// Interpolated sample at `phase` radians from the band serving `freq`.
    #[inline]
    pub fn lookup(&self, phase: f64, freq: f64) -> f64 {
        self.table_for(freq).lerp(phase)
    }

    /// Accumulate `out.len()` samples of `freq` into `out`, starting at
    /// `phase`, and return the phase after the last sample.
    ///
    /// Given a starting phase in `[0, 2π)`, the returned phase stays in
    /// `[0, 2π)` for any positive `freq`, including frequencies above
    /// `rate`.
    pub fn advance(&self, out: &mut [f64], mut phase: f64, freq: f64, rate: f64) -> f64 {
        let table = self.table_for(freq);
        // Whole turns per sample don't change the output.
        let dphase = (freq * TAU / rate).rem_euclid(TAU);
        for s in out.iter_mut() {
            *s += table.lerp(phase);
            phase += dphase;
            if phase >= TAU {
                phase -= TAU;
            }
        }
        phase
    }
}

/// The four standard wave banks, built once and shared read-only.
#[derive(Debug)]
pub struct WaveSet {
    sine: WaveBank,
    triangle: WaveBank,
    square: WaveBank,
    saw: WaveBank,
}

impl WaveSet {
    pub fn new() -> Result<Self, SynthError> {
        Ok(WaveSet {
            sine: WaveBank::new(&sine_spectrum())?,
            triangle: WaveBank::new(&triangle_spectrum())?,
            square: WaveBank::new(&square_spectrum())?,
            saw: WaveBank::new(&saw_spectrum())?,
        })
    }

    pub fn bank(&self, wave: Waveform) -> &WaveBank {
        match wave {
            Waveform::Sine => &self.sine,
            Waveform::Triangle => &self.triangle,
            Waveform::Square => &self.square,
            Waveform::Saw => &self.saw,
        }
    }
}
