//! C3: local-maximum peak picking over a 2-D spectrogram.
//!
//! Ported from the dilation/erosion "local max XOR eroded background"
//! technique (`scipy.ndimage`-style morphology) rather than the per-band
//! dynamic-threshold approach used elsewhere in this corpus; spec.md names
//! this algorithm exactly, step by step.

use crate::config::{Connectivity, PeakPickerConfig};
use crate::spectrogram::Spectrogram;

/// A structuring element: the set of (d_freq, d_time) offsets relative to a
/// center cell that make up the neighborhood.
#[derive(Debug, Clone)]
struct Kernel(Vec<(isize, isize)>);

impl Kernel {
    fn base(connectivity: Connectivity) -> Self {
        let offsets = match connectivity {
            Connectivity::Four => vec![(0, 0), (-1, 0), (1, 0), (0, -1), (0, 1)],
            Connectivity::Eight => {
                let mut v = Vec::with_capacity(9);
                for df in -1..=1 {
                    for dt in -1..=1 {
                        v.push((df, dt));
                    }
                }
                v
            }
        };
        Kernel(offsets)
    }

    /// Minkowski-sum this kernel with `other` (one dilation step).
    fn dilate_with(&self, other: &Kernel) -> Kernel {
        use std::collections::BTreeSet;
        let mut set: BTreeSet<(isize, isize)> = BTreeSet::new();
        for &(df1, dt1) in &self.0 {
            for &(df2, dt2) in &other.0 {
                set.insert((df1 + df2, dt1 + dt2));
            }
        }
        Kernel(set.into_iter().collect())
    }

    /// Iteratively dilate the base structure `d` times (d=1 is the base shape).
    fn iterate(connectivity: Connectivity, d: usize) -> Kernel {
        let base = Kernel::base(connectivity);
        let mut kernel = base.clone();
        for _ in 1..d.max(1) {
            kernel = kernel.dilate_with(&base);
        }
        kernel
    }
}

fn get(mask: &[Vec<bool>], f: isize, t: isize, out_of_bounds: bool) -> bool {
    if f < 0 || t < 0 || f as usize >= mask.len() {
        return out_of_bounds;
    }
    let row = &mask[f as usize];
    if t as usize >= row.len() {
        return out_of_bounds;
    }
    row[t as usize]
}

fn get_val(db: &[Vec<f32>], f: isize, t: isize) -> f32 {
    if f < 0 || t < 0 || f as usize >= db.len() {
        return f32::NEG_INFINITY;
    }
    let row = &db[f as usize];
    if t as usize >= row.len() {
        return f32::NEG_INFINITY;
    }
    row[t as usize]
}

fn erode(mask: &[Vec<bool>], kernel: &Kernel, border_value: bool) -> Vec<Vec<bool>> {
    let num_f = mask.len();
    let num_t = if num_f > 0 { mask[0].len() } else { 0 };

    (0..num_f)
        .map(|f| {
            (0..num_t)
                .map(|t| {
                    kernel.0.iter().all(|&(df, dt)| {
                        get(mask, f as isize + df, t as isize + dt, border_value)
                    })
                })
                .collect()
        })
        .collect()
}

/// Find local-maximum peaks in `spec` above `cfg.min_amplitude`.
///
/// Returns `(freq_bin, time_bin)` coordinates, in no particular order;
/// callers sort by time before hashing (C4's requirement).
pub fn find_peaks(spec: &Spectrogram, cfg: &PeakPickerConfig) -> Vec<(usize, usize)> {
    let num_f = spec.num_freq_bins();
    let num_t = spec.num_time_bins();
    if num_f == 0 || num_t == 0 {
        return Vec::new();
    }

    let kernel = Kernel::iterate(cfg.connectivity, cfg.dilation);

    // Step 1-2: local maximum mask.
    let mut local_max = vec![vec![false; num_t]; num_f];
    for f in 0..num_f {
        for t in 0..num_t {
            let center = spec.db[f][t];
            let is_max = kernel.0.iter().all(|&(df, dt)| {
                if df == 0 && dt == 0 {
                    return true;
                }
                get_val(&spec.db, f as isize + df, t as isize + dt) <= center
            });
            local_max[f][t] = is_max;
        }
    }

    // Step 3: background mask (cells equal to the global minimum).
    let global_min = spec
        .db
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::INFINITY, f32::min);
    let global_min = if global_min.is_finite() {
        global_min
    } else {
        f32::NEG_INFINITY
    };

    let mut bg_mask = vec![vec![false; num_t]; num_f];
    for f in 0..num_f {
        for t in 0..num_t {
            bg_mask[f][t] = spec.db[f][t] == global_min
                || (!spec.db[f][t].is_finite() && !global_min.is_finite());
        }
    }

    // Step 4: erode the background mask, out-of-bounds treated as background.
    let mut eroded_bg = bg_mask;
    for _ in 0..cfg.erosion_iterations {
        eroded_bg = erode(&eroded_bg, &kernel, true);
    }

    // Step 5: local_max XOR eroded_bg, AND (S >= min_amplitude).
    let mut peaks = Vec::new();
    for f in 0..num_f {
        for t in 0..num_t {
            let is_peak = local_max[f][t] ^ eroded_bg[f][t];
            if is_peak && spec.db[f][t] >= cfg.min_amplitude {
                peaks.push((f, t));
            }
        }
    }

    peaks
}
