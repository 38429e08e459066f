//! Fourier transform backends used by the spectrogram module.
//!
//! `cooley_tukey_fft` requires a power-of-two buffer length; `direct_dft` has
//! no such restriction and backs [`SpectrogramBackend::Alt`](crate::config::SpectrogramBackend::Alt).

pub mod complex;

use complex::Complex;
use std::f32::consts::PI;

/// In-place radix-2 Cooley-Tukey FFT. `buf.len()` must be a power of two.
pub fn cooley_tukey_fft(buf: &mut [Complex]) {
    let n = buf.len();

    if n <= 1 {
        return;
    }

    let mut even: Vec<Complex> = Vec::with_capacity(n / 2);
    let mut odd: Vec<Complex> = Vec::with_capacity(n / 2);

    for (i, &sample) in buf.iter().enumerate() {
        if i % 2 == 0 {
            even.push(sample);
        } else {
            odd.push(sample);
        }
    }

    cooley_tukey_fft(&mut even);
    cooley_tukey_fft(&mut odd);

    // P(omega)  = Pe(omega^2) + omega * Po(omega^2)
    // P(-omega) = Pe(omega^2) - omega * Po(omega^2)
    for j in 0..n / 2 {
        let theta = (2.0 * PI * (j as f32)) / (n as f32);
        let omega = Complex::from_polar(1.0, -theta);

        buf[j] = even[j] + (omega * odd[j]);
        buf[j + n / 2] = even[j] - (omega * odd[j]);
    }
}

/// Naive O(n^2) DFT, used for window sizes that aren't powers of two.
pub fn direct_dft(buf: &[Complex]) -> Vec<Complex> {
    let n = buf.len();
    let mut out = Vec::with_capacity(n);

    for k in 0..n {
        let mut sum = Complex::new(0.0, 0.0);
        for (t, &sample) in buf.iter().enumerate() {
            let theta = (2.0 * PI * (k as f32) * (t as f32)) / (n as f32);
            sum = sum + sample * Complex::from_polar(1.0, -theta);
        }
        out.push(sum);
    }

    out
}

/// Hann window, `w[n] = 0.5 * (1 - cos(2*pi*n / (N-1)))`.
pub fn hann_window(chunk: &[f32]) -> Vec<f32> {
    let n = chunk.len();
    if n <= 1 {
        return chunk.to_vec();
    }
    chunk
        .iter()
        .enumerate()
        .map(|(i, &sample)| {
            let multiplier = 0.5 * (1.0 - (2.0 * PI * (i as f32) / (n as f32 - 1.0)).cos());
            sample * multiplier
        })
        .collect()
}

pub fn to_complex_buffer(buffer: &[f32]) -> Vec<Complex> {
    buffer.iter().map(|&sample| Complex::new(sample, 0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooley_tukey_matches_direct_dft() {
        let samples: Vec<f32> = (0..16).map(|i| (i as f32 * 0.37).sin()).collect();
        let mut ct = to_complex_buffer(&samples);
        cooley_tukey_fft(&mut ct);
        let direct = direct_dft(&to_complex_buffer(&samples));

        for (a, b) in ct.iter().zip(direct.iter()) {
            assert!((a.re - b.re).abs() < 1e-2, "{} vs {}", a.re, b.re);
            assert!((a.im - b.im).abs() < 1e-2, "{} vs {}", a.im, b.im);
        }
    }

    #[test]
    fn hann_window_tapers_edges() {
        let chunk = vec![1.0f32; 8];
        let windowed = hann_window(&chunk);
        assert!(windowed[0] < 0.01);
        assert!(windowed[windowed.len() - 1] < 0.01);
        assert!(windowed[4] > 0.9);
    }
}
