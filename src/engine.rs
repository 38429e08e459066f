//! C5: composes the decoder, spectrogram, peak picker and hasher into a
//! per-file/per-signal fingerprinter.

use std::path::Path;

use crate::config::EngineConfig;
use crate::decoder::Decoder;
use crate::error::Result;
use crate::hasher::{self, Landmark};
use crate::peaks;
use crate::spectrogram;

/// A single stored/query fingerprint: a hash paired with its anchor offset
/// (in seconds) from the start of the audio.
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub hash: String,
    pub offset: f32,
}

impl From<Landmark> for Fingerprint {
    fn from(l: Landmark) -> Self {
        Fingerprint {
            hash: l.hash,
            offset: l.anchor_time,
        }
    }
}

/// The result of fingerprinting one audio file: its landmarks, file hash,
/// and decoded duration.
#[derive(Debug, Clone)]
pub struct FingerprintedSong {
    pub fingerprints: Vec<Fingerprint>,
    pub file_hash: String,
    pub duration: f32,
}

#[derive(Default)]
pub struct FingerprintEngine {
    decoder: Decoder,
}

impl FingerprintEngine {
    pub fn new() -> Self {
        Self {
            decoder: Decoder::new(),
        }
    }

    /// Fingerprint an audio file on disk.
    pub fn fingerprint_file(&self, path: &Path, cfg: &EngineConfig) -> Result<FingerprintedSong> {
        cfg.validate()?;

        let decoded = self.decoder.decode(path)?;
        let file_hash = self.decoder.file_hash(path)?;
        let duration = decoded.channels[0].len() as f32 / decoded.sample_rate as f32;

        let mut fingerprints = Vec::new();
        for channel in &decoded.channels {
            fingerprints.extend(fingerprint_channel(channel, decoded.sample_rate, cfg)?);
        }

        Ok(FingerprintedSong {
            fingerprints,
            file_hash,
            duration,
        })
    }

    /// Fingerprint in-memory i16 PCM samples (single channel), used by tests
    /// and by callers that already have decoded audio in hand. `file_hash`
    /// is empty since there's no backing file.
    pub fn fingerprint_samples(
        &self,
        samples: &[i16],
        sample_rate: u32,
        cfg: &EngineConfig,
    ) -> Result<FingerprintedSong> {
        cfg.validate()?;
        let duration = samples.len() as f32 / sample_rate as f32;
        let fingerprints = fingerprint_channel(samples, sample_rate, cfg)?;
        Ok(FingerprintedSong {
            fingerprints,
            file_hash: String::new(),
            duration,
        })
    }
}

fn fingerprint_channel(
    samples: &[i16],
    sample_rate: u32,
    cfg: &EngineConfig,
) -> Result<Vec<Fingerprint>> {
    let floats: Vec<f32> = samples.iter().map(|&s| s as f32 / i16::MAX as f32).collect();

    let spec = spectrogram::compute_spectrogram(&floats, sample_rate, &cfg.spectrogram)?;
    let peak_coords = peaks::find_peaks(&spec, &cfg.peaks);

    let mut peak_times = Vec::with_capacity(peak_coords.len());
    let mut peak_freqs = Vec::with_capacity(peak_coords.len());
    for (f, t) in peak_coords {
        peak_times.push(spec.times[t]);
        peak_freqs.push(spec.freqs[f]);
    }

    let landmarks = hasher::hash_peaks(&peak_times, &peak_freqs, &cfg.hash)?;
    Ok(landmarks.into_iter().map(Fingerprint::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn sawtooth(freq: f32, sample_rate: u32, duration_secs: f32, amplitude: f32) -> Vec<i16> {
        let n = (sample_rate as f32 * duration_secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let phase = (t * freq).fract();
                let value = amplitude * (2.0 * phase - 1.0);
                (value * i16::MAX as f32) as i16
            })
            .collect()
    }

    #[test]
    fn determinism_same_samples_same_fingerprints() {
        let samples = sawtooth(10_000.0, 44_100, 4.0, 0.6);
        let cfg = EngineConfig::default();
        let engine = FingerprintEngine::new();

        let a = engine.fingerprint_samples(&samples, 44_100, &cfg).unwrap();
        let b = engine.fingerprint_samples(&samples, 44_100, &cfg).unwrap();

        assert_eq!(a.fingerprints, b.fingerprints);
    }

    #[test]
    fn fingerprints_are_ordered_by_ascending_anchor_time() {
        let samples = sawtooth(10_000.0, 44_100, 4.0, 0.6);
        let cfg = EngineConfig::default();
        let engine = FingerprintEngine::new();
        let result = engine.fingerprint_samples(&samples, 44_100, &cfg).unwrap();

        assert!(
            result
                .fingerprints
                .windows(2)
                .all(|w| w[0].offset <= w[1].offset)
        );
    }
}
