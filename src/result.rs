//! The match-result JSON object handed back to CLI/API callers (spec.md
//! section 6). Built from a [`ProcessedSong`](crate::pipeline::ProcessedSong)
//! once the terminal stage has run; carries `matching_song`/`match_stats` as
//! nested objects only when a match was actually reported.

use serde::Serialize;

use crate::pipeline::ProcessedSong;
use crate::store::StoredSong;

#[derive(Debug, Clone, Serialize)]
pub struct MatchedSongJson {
    pub id: i32,
    pub title: Option<String>,
    pub source_id: Option<String>,
    pub duration: Option<f32>,
    pub filehash: Option<String>,
    pub num_fingerprints: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchStatsJson {
    pub num_matching_fingerprints: usize,
    pub confidence: f32,
    pub iou: f32,
    pub relative_offset: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResultJson {
    pub source_id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f32>,
    pub path: String,
    pub filehash: String,
    pub num_fingerprints: usize,
    pub matching_song: Option<MatchedSongJson>,
    pub match_stats: Option<MatchStatsJson>,
}

/// Build the JSON-serializable result for one processed query, given the
/// matching song's own stored record (fetched separately, since the
/// pipeline's [`MatchResult`](crate::aligner::MatchResult) only carries an
/// id). `matched_song` is `None` when there was no match or the lookup of
/// the matched song's record itself failed.
pub fn to_match_result_json(
    processed: &ProcessedSong,
    matched_song: Option<&StoredSong>,
) -> MatchResultJson {
    let fingerprinted = processed.fingerprinted.as_ref();
    let num_fingerprints = fingerprinted.map(|f| f.fingerprints.len()).unwrap_or(0);

    let matching_song = matched_song.map(|s| MatchedSongJson {
        id: s.id,
        title: s.title.clone(),
        source_id: s.source_id.clone(),
        duration: s.duration,
        filehash: s.filehash.clone().unwrap_or_default(),
        num_fingerprints: s.fingerprints.as_ref().map(Vec::len).unwrap_or(0),
    });

    let match_stats = processed.match_result.as_ref().map(|m| {
        let query_len = num_fingerprints;
        let match_len = matching_song
            .as_ref()
            .map(|s| s.num_fingerprints)
            .unwrap_or(m.num_matching_fingerprints);
        let (confidence, iou) = crate::aligner::confidence_and_iou(m, query_len, match_len);
        MatchStatsJson {
            num_matching_fingerprints: m.num_matching_fingerprints,
            confidence,
            iou,
            relative_offset: m.relative_offset,
        }
    });

    MatchResultJson {
        source_id: processed.input.source_id.clone(),
        title: processed.input.title.clone(),
        duration: fingerprinted.map(|f| f.duration).or(processed.input.duration),
        path: processed
            .input
            .path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default(),
        filehash: fingerprinted.map(|f| f.file_hash.clone()).unwrap_or_default(),
        num_fingerprints,
        matching_song,
        match_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FingerprintedSong;
    use crate::pipeline::SongInput;

    fn base_processed() -> ProcessedSong {
        ProcessedSong {
            input: SongInput {
                path: Some("query.wav".into()),
                title: Some("query".into()),
                source_id: Some("q1".into()),
                duration: None,
                source_url: None,
            },
            fingerprinted: Some(FingerprintedSong {
                fingerprints: Vec::new(),
                file_hash: "deadbeef".into(),
                duration: 4.0,
            }),
            song_id: None,
            match_result: None,
            confidence: None,
            error: None,
        }
    }

    #[test]
    fn no_match_serializes_with_null_fields() {
        let processed = base_processed();
        let json = to_match_result_json(&processed, None);
        assert!(json.matching_song.is_none());
        assert!(json.match_stats.is_none());
        assert_eq!(json.filehash, "deadbeef");

        let serialized = serde_json::to_string(&json).unwrap();
        assert!(serialized.contains("\"matching_song\":null"));
    }

    #[test]
    fn a_match_carries_nested_song_and_stats() {
        use crate::aligner::MatchResult;
        use crate::store::StoredSong;

        let mut processed = base_processed();
        processed.match_result = Some(MatchResult {
            song_id: 7,
            num_matching_fingerprints: 3,
            relative_offset: 0.0,
        });

        let matched = StoredSong {
            id: 7,
            duration: Some(4.0),
            filepath: Some("ref.wav".into()),
            filehash: Some("beefdead".into()),
            title: Some("reference".into()),
            source_id: None,
            fingerprints: Some(Vec::new()),
        };

        let json = to_match_result_json(&processed, Some(&matched));
        assert_eq!(json.matching_song.as_ref().unwrap().id, 7);
        assert_eq!(
            json.match_stats.as_ref().unwrap().num_matching_fingerprints,
            3
        );
    }
}
