pub mod dsp;
pub mod error;
pub mod patch;

use std::sync::{Arc, OnceLock};

use crate::dsp::knob::{KnobInfo, collect_knobs};
use crate::dsp::mixer::PolySynth;
use crate::dsp::wavebank::WaveSet;
use crate::error::SynthError;
use crate::patch::Patch;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the wavesynth-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// The four standard wave banks, built on first use and reused by every
/// WASM call afterwards.
pub fn standard_waves() -> Result<Arc<WaveSet>, SynthError> {
    static WAVES: OnceLock<Arc<WaveSet>> = OnceLock::new();
    if let Some(waves) = WAVES.get() {
        return Ok(waves.clone());
    }
    let waves = Arc::new(WaveSet::new()?);
    Ok(WAVES.get_or_init(|| waves).clone())
}

/// Build a synth from a JSON patch and start one voice per frequency.
pub fn synth_from_patch(patch_json: &str, frequencies: &[f64]) -> Result<PolySynth, SynthError> {
    let mut synth = Patch::from_json(patch_json)?.build(standard_waves()?)?;
    for &freq in frequencies {
        synth.add_voice(freq)?;
    }
    Ok(synth)
}

/// Render `frames` mono samples of a patch playing `frequencies`.
pub fn render_patch(
    patch_json: &str,
    frequencies: &[f64],
    sample_rate: u32,
    frames: usize,
) -> Result<Vec<f64>, SynthError> {
    let mut synth = synth_from_patch(patch_json, frequencies)?;
    Ok(dsp::renderer::render_blocks(
        &mut synth,
        frames,
        dsp::renderer::BLOCK_SIZE,
        sample_rate as f64,
    ))
}

/// Every tunable of a patch with its descriptor and current value.
pub fn patch_knob_table(patch_json: &str) -> Result<Vec<KnobInfo>, SynthError> {
    let synth = synth_from_patch(patch_json, &[])?;
    Ok(collect_knobs(&synth))
}

/// WASM-exposed: render a patch to mono f32 samples (unclipped).
#[wasm_bindgen]
pub fn render_patch_samples(
    patch_json: &str,
    frequencies: &[f64],
    sample_rate: u32,
    frames: usize,
) -> Result<Vec<f32>, JsValue> {
    let samples = render_patch(patch_json, frequencies, sample_rate, frames)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(samples.iter().map(|&s| s as f32).collect())
}

/// WASM-exposed: render a patch to a mono 16-bit WAV byte array.
#[wasm_bindgen]
pub fn render_patch_wav(
    patch_json: &str,
    frequencies: &[f64],
    sample_rate: u32,
    frames: usize,
) -> Result<Vec<u8>, JsValue> {
    let mut synth = synth_from_patch(patch_json, frequencies)
        .map_err(|e| JsValue::from_str(&format!("{e}")))?;
    Ok(dsp::renderer::render_wav(&mut synth, frames, sample_rate))
}

/// WASM-exposed: the knob table of a patch, for building a UI.
#[wasm_bindgen]
pub fn patch_knobs(patch_json: &str) -> Result<JsValue, JsValue> {
    let knobs = patch_knob_table(patch_json).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    serde_wasm_bindgen::to_value(&knobs).map_err(|e| JsValue::from_str(&format!("{e}")))
}
