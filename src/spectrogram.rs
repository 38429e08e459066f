//! C2: STFT magnitude spectrogram in decibels.

use crate::config::{SpectrogramBackend, SpectrogramConfig};
use crate::error::Result;
use crate::fft::{self, complex::Complex};

/// `db[f][t]` is the power (in dB) at frequency bin `f`, time frame `t`.
/// Zero power is represented as `f32::NEG_INFINITY` so threshold comparisons
/// downstream don't need a branch for it.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub db: Vec<Vec<f32>>,
    pub times: Vec<f32>,
    pub freqs: Vec<f32>,
}

impl Spectrogram {
    pub fn num_freq_bins(&self) -> usize {
        self.freqs.len()
    }

    pub fn num_time_bins(&self) -> usize {
        self.times.len()
    }
}

/// Compute the magnitude spectrogram of `samples` in decibels.
pub fn compute_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    cfg: &SpectrogramConfig,
) -> Result<Spectrogram> {
    cfg.validate()?;

    let win_size = cfg.win_size;
    let overlap = (win_size as f32 * cfg.win_overlap_ratio) as usize;
    let hop = win_size - overlap;
    let half_n = win_size / 2 + 1;

    let mut times = Vec::new();
    let mut frames: Vec<Vec<f32>> = Vec::new();

    let mut position = 0;
    while position + win_size <= samples.len() {
        let chunk = &samples[position..position + win_size];
        let windowed = fft::hann_window(chunk);
        let spectrum = match cfg.backend {
            SpectrogramBackend::HannStft => {
                let mut buf = fft::to_complex_buffer(&windowed);
                fft::cooley_tukey_fft(&mut buf);
                buf
            }
            SpectrogramBackend::Alt => fft::direct_dft(&fft::to_complex_buffer(&windowed)),
        };

        let frame: Vec<f32> = spectrum[..half_n]
            .iter()
            .map(|c: &Complex| power_to_db(c.norm_sqr()))
            .collect();

        frames.push(frame);
        times.push((position + win_size / 2) as f32 / sample_rate as f32);

        position += hop.max(1);
    }

    // Transpose frames (time-major) into db[freq][time] as spec.md's [F, T] shape.
    let num_time = frames.len();
    let mut db = vec![vec![f32::NEG_INFINITY; num_time]; half_n];
    for (t, frame) in frames.iter().enumerate() {
        for (f, &val) in frame.iter().enumerate() {
            db[f][t] = val;
        }
    }

    let freqs: Vec<f32> = (0..half_n)
        .map(|f| f as f32 * sample_rate as f32 / win_size as f32)
        .collect();

    Ok(Spectrogram { db, times, freqs })
}

fn power_to_db(power: f32) -> f32 {
    if power <= 0.0 {
        f32::NEG_INFINITY
    } else {
        10.0 * power.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpectrogramBackend;

    fn sine(freq: f32, sample_rate: u32, duration_secs: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * duration_secs) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn axes_are_monotonic_and_nyquist_bounded() {
        let sample_rate = 8000u32;
        let samples = sine(440.0, sample_rate, 2.0);
        let cfg = SpectrogramConfig {
            win_size: 512,
            win_overlap_ratio: 0.5,
            backend: SpectrogramBackend::HannStft,
        };
        let spec = compute_spectrogram(&samples, sample_rate, &cfg).unwrap();

        assert!(spec.times.windows(2).all(|w| w[0] < w[1]));
        assert!(spec.freqs.windows(2).all(|w| w[0] < w[1]));
        assert!((spec.freqs.last().unwrap() - sample_rate as f32 / 2.0).abs() < 1e-3);
    }

    #[test]
    fn alt_backend_matches_shape_for_non_power_of_two() {
        let sample_rate = 8000u32;
        let samples = sine(440.0, sample_rate, 1.0);
        let cfg = SpectrogramConfig {
            win_size: 300,
            win_overlap_ratio: 0.5,
            backend: SpectrogramBackend::Alt,
        };
        let spec = compute_spectrogram(&samples, sample_rate, &cfg).unwrap();
        assert_eq!(spec.num_freq_bins(), 300 / 2 + 1);
    }

    #[test]
    fn rejects_non_power_of_two_for_hann_backend() {
        let cfg = SpectrogramConfig {
            win_size: 300,
            win_overlap_ratio: 0.5,
            backend: SpectrogramBackend::HannStft,
        };
        assert!(compute_spectrogram(&[0.0; 1000], 8000, &cfg).is_err());
    }
}
