//! Offline renderer — drives a synth block by block and converts the mix
//! to 16-bit PCM, the way an audio device callback would.

use super::mixer::PolySynth;

/// Frames per block, matching a typical device buffer.
pub const BLOCK_SIZE: usize = 2048;

/// Render `frames` mono samples in blocks of `block_size`.
pub fn render_blocks(
    synth: &mut PolySynth,
    frames: usize,
    block_size: usize,
    rate: f64,
) -> Vec<f64> {
    let block_size = block_size.max(1);
    synth.prepare(block_size);
    let mut output = vec![0.0; frames];
    for block in output.chunks_mut(block_size) {
        synth.render(block, rate);
    }
    output
}

/// Clamp to [-1, 1] and scale to the `i16` range.
pub fn to_pcm_i16(samples: &[f64]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f64) as i16)
        .collect()
}

/// Render `frames` samples and encode them as a mono 16-bit WAV file.
pub fn render_wav(synth: &mut PolySynth, frames: usize, sample_rate: u32) -> Vec<u8> {
    let mix = render_blocks(synth, frames, BLOCK_SIZE, sample_rate as f64);
    PcmFormat::mono(sample_rate).encode(&to_pcm_i16(&mix))
}

const PCM_TAG: u16 = 1;
const BYTES_PER_SAMPLE: u16 = 2;

/// Layout of a 16-bit PCM stream, as written into the `fmt ` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PcmFormat {
    channels: u16,
    sample_rate: u32,
}

impl PcmFormat {
    fn mono(sample_rate: u32) -> Self {
        PcmFormat {
            channels: 1,
            sample_rate,
        }
    }

    fn block_align(self) -> u16 {
        self.channels * BYTES_PER_SAMPLE
    }

    fn fmt_chunk(self) -> [u8; 16] {
        let byte_rate = self.sample_rate * self.block_align() as u32;
        let mut body = [0u8; 16];
        body[0..2].copy_from_slice(&PCM_TAG.to_le_bytes());
        body[2..4].copy_from_slice(&self.channels.to_le_bytes());
        body[4..8].copy_from_slice(&self.sample_rate.to_le_bytes());
        body[8..12].copy_from_slice(&byte_rate.to_le_bytes());
        body[12..14].copy_from_slice(&self.block_align().to_le_bytes());
        body[14..16].copy_from_slice(&(BYTES_PER_SAMPLE * 8).to_le_bytes());
        body
    }

    /// A RIFF/WAVE file holding interleaved `samples`.
    fn encode(self, samples: &[i16]) -> Vec<u8> {
        let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let mut riff = Vec::with_capacity(44 + data.len());
        riff.extend_from_slice(b"WAVE");
        write_chunk(&mut riff, b"fmt ", &self.fmt_chunk());
        write_chunk(&mut riff, b"data", &data);

        let mut file = Vec::with_capacity(8 + riff.len());
        write_chunk(&mut file, b"RIFF", &riff);
        file
    }
}

fn write_chunk(out: &mut Vec<u8>, id: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(id);
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::wavebank::tests::shared_waves;
    use crate::patch::Patch;

    fn classic_synth() -> PolySynth {
        let mut synth = Patch::default().build(shared_waves()).unwrap();
        synth.add_voice(110.0).unwrap();
        synth.add_voice(440.0 * (7.0_f64 / 12.0).exp2()).unwrap();
        synth.add_voice(880.0).unwrap();
        synth
    }

    #[test]
    fn pcm_conversion_clamps() {
        let pcm = to_pcm_i16(&[0.0, 0.5, 1.0, -1.0, 3.0, -7.5]);
        assert_eq!(pcm, [0, 16383, i16::MAX, -i16::MAX, i16::MAX, -i16::MAX]);
    }

    #[test]
    fn block_size_does_not_change_the_mix() {
        let a = render_blocks(&mut classic_synth(), 5000, 2048, 44_100.0);
        let b = render_blocks(&mut classic_synth(), 5000, 64, 44_100.0);
        assert_eq!(a.len(), 5000);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn wav_header_valid() {
        let wav = render_wav(&mut classic_synth(), 1000, 22_050);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(&wav[36..40], b"data");

        let ch = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(ch, 1);
        let sr = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(sr, 22_050);
        let data_size = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
        assert_eq!(data_size, 2000);
        assert_eq!(wav.len(), 44 + 2000);
        let riff_size = u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]);
        assert_eq!(riff_size as usize, wav.len() - 8);
    }

    #[test]
    fn fmt_chunk_describes_mono_pcm16() {
        let fmt = PcmFormat::mono(48_000).fmt_chunk();
        assert_eq!(u16::from_le_bytes([fmt[0], fmt[1]]), 1, "PCM tag");
        assert_eq!(u32::from_le_bytes([fmt[8], fmt[9], fmt[10], fmt[11]]), 96_000, "byte rate");
        assert_eq!(u16::from_le_bytes([fmt[12], fmt[13]]), 2, "block align");
        assert_eq!(u16::from_le_bytes([fmt[14], fmt[15]]), 16, "bits per sample");
    }

    #[test]
    fn samples_are_little_endian() {
        let wav = PcmFormat::mono(8_000).encode(&[1, -2]);
        assert_eq!(&wav[44..], [0x01, 0x00, 0xFE, 0xFF]);
    }

    #[test]
    fn rendered_wav_is_not_silent() {
        let wav = render_wav(&mut classic_synth(), 2048, 44_100);
        let has_sound = wav[44..]
            .chunks_exact(2)
            .any(|b| i16::from_le_bytes([b[0], b[1]]) != 0);
        assert!(has_sound, "Rendered WAV should contain non-silent audio");
    }
}
