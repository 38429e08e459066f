//! C4: pair anchor peaks with nearby peaks in a target zone, emit
//! (hash, anchor-time) landmarks.

use crate::config::HashConfig;
use crate::error::Result;
use sha1::{Digest, Sha1};

/// A single (hash, anchor-time) landmark.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    pub hash: String,
    pub anchor_time: f32,
}

/// Hash peaks into landmarks.
///
/// `peak_times`/`peak_freqs` must have equal length; they're sorted here by
/// time ascending (stable tie-break by frequency) before pairing, as
/// required by spec.md's anchor-time ordering guarantee.
pub fn hash_peaks(peak_times: &[f32], peak_freqs: &[f32], cfg: &HashConfig) -> Result<Vec<Landmark>> {
    cfg.validate()?;
    debug_assert_eq!(peak_times.len(), peak_freqs.len());

    let mut peaks: Vec<(f32, f32)> = peak_times
        .iter()
        .copied()
        .zip(peak_freqs.iter().copied())
        .collect();
    peaks.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap()
            .then(a.1.partial_cmp(&b.1).unwrap())
    });

    let mut landmarks = Vec::new();

    for i in 0..peaks.len() {
        let (t_i, f_i) = peaks[i];
        let end = (i + 1 + cfg.fanout).min(peaks.len());

        for &(t_j, f_j) in &peaks[(i + 1)..end] {
            let delta_t = t_j - t_i;
            if delta_t < cfg.min_time_delta || delta_t > cfg.max_time_delta {
                continue;
            }

            let q_delta_t = (delta_t / cfg.time_bin).floor() as i64;
            let q_f_i = (f_i / cfg.freq_bin).floor() as i64;
            let q_f_j = (f_j / cfg.freq_bin).floor() as i64;

            let canonical = format!("{q_f_i}{q_f_j}{q_delta_t}");
            let mut hasher = Sha1::new();
            hasher.update(canonical.as_bytes());
            let digest = hasher.finalize();
            let hex = hex_encode(&digest);
            let truncated = hex[..cfg.hash_length.min(hex.len())].to_string();

            landmarks.push(Landmark {
                hash: truncated,
                anchor_time: t_i,
            });
        }
    }

    Ok(landmarks)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(s, "{:02x}", b).unwrap();
    }
    s
}
