//! Landmark acoustic fingerprinting and matching: decode audio, derive a
//! sparse set of hash-based fingerprints from its spectrogram, store them,
//! and align a query's fingerprints against stored candidates to identify
//! the source recording.

pub mod aligner;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod fft;
pub mod hasher;
pub mod peaks;
pub mod pipeline;
pub mod result;
pub mod spectrogram;
pub mod store;

pub use aligner::{align, MatchResult};
pub use engine::{Fingerprint, FingerprintEngine, FingerprintedSong};
pub use error::{Result, SabiError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineMode, PipelineOutcome, ProcessedSong, SongInput};
pub use result::{to_match_result_json, MatchResultJson};
pub use store::{FingerprintStore, SongStore};
