//! Level and coarse frequency analysis for visualization
//!
//! Band energies come from the Goertzel algorithm at fixed centre
//! frequencies, which is all a waveform/bar UI needs.

use serde::Serialize;
use std::f32::consts::PI;
use tokio::sync::watch;

/// Centre frequencies of the reported bands, in Hz
pub const BAND_FREQUENCIES: [f32; 8] = [125.0, 250.0, 500.0, 1000.0, 2000.0, 3000.0, 4000.0, 6000.0];

/// One analysis snapshot. All values are normalized to 0.0..=1.0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LevelFrame {
    pub rms: f32,
    pub peak: f32,
    pub bands: [f32; 8],
}

impl LevelFrame {
    /// Analyse interleaved samples; multi-channel input is averaged to mono
    pub fn analyse(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let channels = usize::from(channels.max(1));
        let mono: Vec<f32> = samples
            .chunks(channels)
            .map(|frame| frame.iter().map(|&s| f32::from(s)).sum::<f32>() / frame.len() as f32 / 32768.0)
            .collect();
        if mono.is_empty() {
            return Self::default();
        }

        let peak = mono.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        let rms = (mono.iter().map(|s| s * s).sum::<f32>() / mono.len() as f32).sqrt();

        let mut bands = [0.0f32; 8];
        let nyquist = sample_rate as f32 / 2.0;
        for (band, &freq) in bands.iter_mut().zip(BAND_FREQUENCIES.iter()) {
            if freq < nyquist {
                *band = goertzel_magnitude(&mono, freq, sample_rate as f32).min(1.0);
            }
        }

        Self {
            rms: rms.min(1.0),
            peak: peak.min(1.0),
            bands,
        }
    }
}

/// Normalized magnitude of `freq` in `samples` (a full-scale sine gives ~1.0)
fn goertzel_magnitude(samples: &[f32], freq: f32, sample_rate: f32) -> f32 {
    let n = samples.len() as f32;
    let k = (n * freq / sample_rate).round();
    let omega = 2.0 * PI * k / n;
    let coeff = 2.0 * omega.cos();

    let (mut s1, mut s2) = (0.0f32, 0.0f32);
    for &x in samples {
        let s0 = x + coeff * s1 - s2;
        s2 = s1;
        s1 = s0;
    }
    let power = s1 * s1 + s2 * s2 - coeff * s1 * s2;
    2.0 * power.max(0.0).sqrt() / n
}

/// Write side of an analysis channel
#[derive(Debug, Clone)]
pub struct LevelTap {
    tx: watch::Sender<LevelFrame>,
}

impl LevelTap {
    pub fn new(tx: watch::Sender<LevelFrame>) -> Self {
        Self { tx }
    }

    pub fn observe(&self, samples: &[i16], sample_rate: u32, channels: u16) {
        self.tx.send_replace(LevelFrame::analyse(samples, sample_rate, channels));
    }

    /// Back to silence
    pub fn reset(&self) {
        self.tx.send_replace(LevelFrame::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                ((2.0 * PI * freq * t).sin() * amplitude * 32767.0) as i16
            })
            .collect()
    }

    #[test]
    fn test_silence_is_zero() {
        let frame = LevelFrame::analyse(&[0; 1024], 16000, 1);
        assert_eq!(frame.rms, 0.0);
        assert_eq!(frame.peak, 0.0);
        assert!(frame.bands.iter().all(|b| *b == 0.0));
    }

    #[test]
    fn test_tone_lands_in_its_band() {
        let samples = sine(1000.0, 16000, 1600, 0.5);
        let frame = LevelFrame::analyse(&samples, 16000, 1);

        let loudest = frame
            .bands
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(3));
        assert!((frame.bands[3] - 0.5).abs() < 0.05, "band 3 = {}", frame.bands[3]);
        assert!((frame.peak - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_bands_above_nyquist_stay_silent() {
        let samples = sine(1000.0, 8000, 800, 0.5);
        let frame = LevelFrame::analyse(&samples, 8000, 1);
        assert_eq!(frame.bands[7], 0.0);
    }
}
