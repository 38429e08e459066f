//! C7: offset-histogram alignment between a query's fingerprints and
//! candidate fingerprints retrieved from the store.

use std::collections::HashMap;

use crate::config::AlignConfig;
use crate::engine::Fingerprint;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub song_id: i32,
    pub num_matching_fingerprints: usize,
    pub relative_offset: f32,
}

/// Align a query against candidate fingerprints pulled from the store for
/// the set of query hashes. Returns `None` if no (song_id, hash) pair
/// overlapped between query and candidates.
pub fn align(
    query_fps: &[Fingerprint],
    candidate_fps: &[(i32, String, f32)],
    cfg: &AlignConfig,
) -> Result<Option<MatchResult>> {
    cfg.validate()?;

    if query_fps.is_empty() {
        return Ok(None);
    }

    // Q[hash] -> [binned offset...]
    let mut q: HashMap<&str, Vec<i64>> = HashMap::new();
    for fp in query_fps {
        q.entry(fp.hash.as_str())
            .or_default()
            .push(bin(fp.offset, cfg.bin_size));
    }

    // C[song_id][hash] -> [binned offset...]
    let mut c: HashMap<i32, HashMap<&str, Vec<i64>>> = HashMap::new();
    for (song_id, hash, offset) in candidate_fps {
        c.entry(*song_id)
            .or_default()
            .entry(hash.as_str())
            .or_default()
            .push(bin(*offset, cfg.bin_size));
    }

    let mut best: Option<(i32, usize, i64)> = None; // (song_id, peak_count, peak_delta)

    for (&song_id, song_hashes) in &c {
        let mut deltas: HashMap<i64, usize> = HashMap::new();
        let mut order: Vec<i64> = Vec::new();

        for (hash, c_offsets) in song_hashes {
            let Some(q_offsets) = q.get(hash) else {
                continue;
            };
            for &q_off in q_offsets {
                for &c_off in c_offsets {
                    let delta = c_off - q_off;
                    if !deltas.contains_key(&delta) {
                        order.push(delta);
                    }
                    *deltas.entry(delta).or_insert(0) += 1;
                }
            }
        }

        if deltas.is_empty() {
            continue;
        }

        let (peak_delta, peak_count) = order
            .iter()
            .map(|d| (*d, deltas[d]))
            .max_by_key(|&(_, count)| count)
            .unwrap();

        let better = match best {
            None => true,
            Some((best_song_id, best_count, _)) => {
                peak_count > best_count || (peak_count == best_count && song_id < best_song_id)
            }
        };
        if better {
            best = Some((song_id, peak_count, peak_delta));
        }
    }

    Ok(best.map(|(song_id, peak_count, peak_delta)| MatchResult {
        song_id,
        num_matching_fingerprints: peak_count.min(query_fps.len()),
        relative_offset: peak_delta as f32 * cfg.bin_size,
    }))
}

fn bin(offset: f32, bin_size: f32) -> i64 {
    (offset / bin_size).floor() as i64
}

/// Confidence and intersection-over-union for a reported match. Caller
/// computation, per spec: not part of `align` itself.
pub fn confidence_and_iou(result: &MatchResult, query_len: usize, match_len: usize) -> (f32, f32) {
    let confidence = result.num_matching_fingerprints as f32 / query_len as f32;
    let union = query_len + match_len - result.num_matching_fingerprints;
    let iou = if union == 0 {
        0.0
    } else {
        result.num_matching_fingerprints as f32 / union as f32
    };
    (confidence, iou)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(hash: &str, offset: f32) -> Fingerprint {
        Fingerprint {
            hash: hash.to_string(),
            offset,
        }
    }

    #[test]
    fn upper_bound_never_exceeds_query_length() {
        let query = vec![fp("a", 0.0), fp("a", 0.2)];
        let candidates = vec![
            (1, "a".to_string(), 0.0),
            (1, "a".to_string(), 0.2),
            (1, "a".to_string(), 0.4),
            (1, "a".to_string(), 0.6),
        ];
        let cfg = AlignConfig::default();
        let result = align(&query, &candidates, &cfg).unwrap().unwrap();
        assert!(result.num_matching_fingerprints <= query.len());
    }

    #[test]
    fn disjoint_hashes_yield_no_match() {
        let query = vec![fp("a", 0.0)];
        let candidates = vec![(1, "b".to_string(), 0.0)];
        let cfg = AlignConfig::default();
        let result = align(&query, &candidates, &cfg).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn self_match_has_zero_relative_offset() {
        let query = vec![fp("a", 0.0), fp("b", 1.0), fp("c", 2.0)];
        let candidates: Vec<_> = query
            .iter()
            .map(|f| (1, f.hash.clone(), f.offset))
            .collect();
        let cfg = AlignConfig::default();
        let result = align(&query, &candidates, &cfg).unwrap().unwrap();
        assert_eq!(result.song_id, 1);
        assert_eq!(result.relative_offset, 0.0);
        assert_eq!(result.num_matching_fingerprints, 3);
    }

    #[test]
    fn shifted_query_reports_the_shift_as_relative_offset() {
        let reference = vec![fp("a", 0.0), fp("b", 1.0), fp("c", 2.0), fp("d", 3.0)];
        let candidates: Vec<_> = reference
            .iter()
            .map(|f| (1, f.hash.clone(), f.offset))
            .collect();

        // Query equals a 1.0s-shifted slice of the reference.
        let query = vec![fp("a", 0.0), fp("b", 1.0), fp("c", 2.0)]
            .into_iter()
            .map(|f| Fingerprint {
                hash: f.hash,
                offset: f.offset - 1.0,
            })
            .collect::<Vec<_>>();

        let cfg = AlignConfig::default();
        let result = align(&query, &candidates, &cfg).unwrap().unwrap();
        assert!((result.relative_offset - 1.0).abs() < cfg.bin_size);
    }

    #[test]
    fn ties_break_on_smallest_song_id() {
        let query = vec![fp("a", 0.0)];
        let candidates = vec![(5, "a".to_string(), 0.0), (2, "a".to_string(), 0.0)];
        let cfg = AlignConfig::default();
        let result = align(&query, &candidates, &cfg).unwrap().unwrap();
        assert_eq!(result.song_id, 2);
    }
}
