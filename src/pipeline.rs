//! C8: the acquire -> fingerprint -> store/match staged pipeline.
//!
//! Reframes the source's coroutine/process-pool control flow as
//! message-passing over typed, bounded `tokio::sync::mpsc` channels. Each
//! stage terminates by forwarding an explicit end-of-stream sentinel once
//! its own in-flight work has drained, matching spec.md's completion
//! protocol.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::Stream;
use futures::StreamExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aligner::{self, MatchResult};
use crate::config::{AlignConfig, EngineConfig};
use crate::engine::{FingerprintEngine, FingerprintedSong};
use crate::error::{Result, SabiError};
use crate::store::{SongDescriptor, SongStore};

/// One item flowing through a pipeline stage's queue.
enum Message<T> {
    Item(T),
    End,
}

/// The "acquired-song" message: a descriptor for one audio input, produced
/// either by a local-path source or the external acquisition collaborator.
/// `path` is `None` when acquisition failed.
#[derive(Debug, Clone)]
pub struct SongInput {
    pub path: Option<PathBuf>,
    pub title: Option<String>,
    pub source_id: Option<String>,
    pub duration: Option<f32>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum PipelineMode {
    Ingest,
    Identify { conf_thresh: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub cpu_workers: usize,
    pub queue_capacity: usize,
    pub mode: PipelineMode,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cpu_workers == 0 {
            return Err(SabiError::InvalidConfig(
                "cpu_workers must be positive".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(SabiError::InvalidConfig(
                "queue_capacity must be positive".into(),
            ));
        }
        if let PipelineMode::Identify { conf_thresh } = self.mode {
            if !(0.0..=1.0).contains(&conf_thresh) {
                return Err(SabiError::InvalidConfig(
                    "conf_thresh must be in [0, 1]".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Everything the pipeline learned about one input by the time it reached
/// the terminal stage.
#[derive(Debug, Clone)]
pub struct ProcessedSong {
    pub input: SongInput,
    pub fingerprinted: Option<FingerprintedSong>,
    pub song_id: Option<i32>,
    pub match_result: Option<MatchResult>,
    pub confidence: Option<f32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub processed: Vec<ProcessedSong>,
    pub cancelled: bool,
}

pub struct Pipeline {
    cfg: PipelineConfig,
    engine_cfg: EngineConfig,
    align_cfg: AlignConfig,
    store: Arc<dyn SongStore>,
}

impl Pipeline {
    pub fn new(
        cfg: PipelineConfig,
        engine_cfg: EngineConfig,
        align_cfg: AlignConfig,
        store: Arc<dyn SongStore>,
    ) -> Result<Self> {
        cfg.validate()?;
        engine_cfg.validate()?;
        align_cfg.validate()?;
        Ok(Self {
            cfg,
            engine_cfg,
            align_cfg,
            store,
        })
    }

    /// Run the pipeline to completion (or until cancelled) over `sources`.
    pub async fn run(
        &self,
        sources: impl Stream<Item = SongInput> + Send + 'static,
        cancel: CancellationToken,
    ) -> PipelineOutcome {
        let (tx_fp, rx_fp) = mpsc::channel::<Message<SongInput>>(self.cfg.queue_capacity);
        let (tx_db, mut rx_db) = mpsc::channel::<Message<ProcessedSong>>(self.cfg.queue_capacity);

        let source_cancel = cancel.clone();
        let source_task = tokio::spawn(async move {
            tokio::pin!(sources);
            loop {
                tokio::select! {
                    _ = source_cancel.cancelled() => break,
                    item = sources.next() => {
                        match item {
                            Some(input) => {
                                if tx_fp.send(Message::Item(input)).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            let _ = tx_fp.send(Message::End).await;
        });

        let engine_cfg = self.engine_cfg;
        let fp_cancel = cancel.clone();
        let cpu_workers = self.cfg.cpu_workers;
        let fingerprint_task = tokio::spawn(fingerprint_stage(
            rx_fp, tx_db, engine_cfg, cpu_workers, fp_cancel,
        ));

        // Stay a live consumer of `rx_db` until the fingerprint stage's
        // sentinel actually arrives, rather than racing `cancel` against
        // `recv()`: the fingerprint stage keeps sending completed items
        // after cancellation (it drains its own in-flight tasks before
        // forwarding `Message::End`), and a consumer that stops early
        // would leave those sends with nobody to receive them, blocking
        // the channel once it fills and hanging `fingerprint_task.await`
        // below. Draining fully is what actually retains work acquired
        // before cancellation (spec.md section 4.8/7).
        let mut processed = Vec::new();
        while let Some(msg) = rx_db.recv().await {
            match msg {
                Message::Item(song) => processed.push(song),
                Message::End => break,
            }
        }

        let _ = source_task.await;
        let _ = fingerprint_task.await;

        // Terminal stage: store or align, depending on mode.
        let terminal_processed = self.run_terminal_stage(processed).await;

        PipelineOutcome {
            processed: terminal_processed,
            cancelled: cancel.is_cancelled(),
        }
    }

    async fn run_terminal_stage(&self, items: Vec<ProcessedSong>) -> Vec<ProcessedSong> {
        let mut out = Vec::with_capacity(items.len());
        for mut item in items {
            match self.cfg.mode {
                PipelineMode::Ingest => self.store_item(&mut item).await,
                PipelineMode::Identify { conf_thresh } => {
                    self.match_item(&mut item, conf_thresh).await
                }
            }
            out.push(item);
        }
        out
    }

    async fn store_item(&self, item: &mut ProcessedSong) {
        let Some(fingerprinted) = item.fingerprinted.clone() else {
            return;
        };

        let store = self.store.clone();
        let desc = SongDescriptor {
            duration: Some(fingerprinted.duration),
            filepath: item.input.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            filehash: Some(fingerprinted.file_hash.clone()),
            title: item.input.title.clone(),
            source_id: item.input.source_id.clone(),
        };

        let fps = fingerprinted.fingerprints.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<i32> {
            let song_id = store.insert_song(&desc)?;
            store.insert_fingerprints(song_id, &fps)?;
            Ok(song_id)
        })
        .await;

        match result {
            Ok(Ok(song_id)) => item.song_id = Some(song_id),
            Ok(Err(e)) => {
                warn!(source_id = ?item.input.source_id, error = %e, "store insert failed");
                item.error = Some(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "store insert task panicked");
                item.error = Some(e.to_string());
            }
        }
    }

    async fn match_item(&self, item: &mut ProcessedSong, conf_thresh: f32) {
        let Some(fingerprinted) = item.fingerprinted.clone() else {
            return;
        };

        let hashes: HashSet<String> = fingerprinted
            .fingerprints
            .iter()
            .map(|fp| fp.hash.clone())
            .collect();

        let store = self.store.clone();
        let align_cfg = self.align_cfg;
        let query_fps = fingerprinted.fingerprints.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<Option<MatchResult>> {
            let candidates = store.lookup(&hashes)?;
            aligner::align(&query_fps, &candidates, &align_cfg)
        })
        .await;

        match result {
            Ok(Ok(Some(m))) => {
                let confidence = m.num_matching_fingerprints as f32 / fingerprinted.fingerprints.len().max(1) as f32;
                if confidence >= conf_thresh {
                    item.confidence = Some(confidence);
                    item.match_result = Some(m);
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                warn!(source_id = ?item.input.source_id, error = %e, "lookup/align failed");
                item.error = Some(e.to_string());
            }
            Err(e) => {
                warn!(error = %e, "align task panicked");
                item.error = Some(e.to_string());
            }
        }
    }
}

async fn fingerprint_stage(
    mut rx_fp: mpsc::Receiver<Message<SongInput>>,
    tx_db: mpsc::Sender<Message<ProcessedSong>>,
    engine_cfg: EngineConfig,
    cpu_workers: usize,
    cancel: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(cpu_workers));
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = rx_fp.recv() => {
                match msg {
                    Some(Message::Item(input)) => {
                        let permit = semaphore.clone().acquire_owned().await.unwrap();
                        let engine_cfg = engine_cfg;
                        let tx_db = tx_db.clone();
                        tasks.spawn(async move {
                            let processed = fingerprint_one(input, engine_cfg).await;
                            drop(permit);
                            let _ = tx_db.send(Message::Item(processed)).await;
                        });
                    }
                    Some(Message::End) | None => break,
                }
            }
        }
    }

    // Drain in-flight tasks before forwarding the sentinel (§4.8
    // completion contract): partial results acquired before cancellation
    // are retained because we await them rather than aborting.
    while tasks.join_next().await.is_some() {}

    let _ = tx_db.send(Message::End).await;
    info!("fingerprint stage finished");
}

async fn fingerprint_one(input: SongInput, engine_cfg: EngineConfig) -> ProcessedSong {
    let Some(path) = input.path.clone() else {
        return ProcessedSong {
            input,
            fingerprinted: None,
            song_id: None,
            match_result: None,
            confidence: None,
            error: Some("acquisition failed: no path".into()),
        };
    };

    let engine_cfg = engine_cfg;
    let result = tokio::task::spawn_blocking(move || {
        let engine = FingerprintEngine::new();
        engine.fingerprint_file(&path, &engine_cfg)
    })
    .await;

    match result {
        Ok(Ok(fingerprinted)) => ProcessedSong {
            input,
            fingerprinted: Some(fingerprinted),
            song_id: None,
            match_result: None,
            confidence: None,
            error: None,
        },
        Ok(Err(e)) => {
            warn!(source_id = ?input.source_id, error = %e, "fingerprinting failed");
            ProcessedSong {
                input,
                fingerprinted: None,
                song_id: None,
                match_result: None,
                confidence: None,
                error: Some(e.to_string()),
            }
        }
        Err(e) => ProcessedSong {
            input,
            fingerprinted: None,
            song_id: None,
            match_result: None,
            confidence: None,
            error: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures::stream;

    use crate::config::{AlignConfig, EngineConfig};
    use crate::engine::Fingerprint;

    /// An in-memory double so pipeline tests never need a live Postgres.
    #[derive(Default)]
    struct MemoryStore {
        songs: Mutex<Vec<(i32, Vec<Fingerprint>)>>,
    }

    impl SongStore for MemoryStore {
        fn insert_song(&self, _desc: &SongDescriptor) -> Result<i32> {
            let mut songs = self.songs.lock().unwrap();
            let id = songs.len() as i32 + 1;
            songs.push((id, Vec::new()));
            Ok(id)
        }

        fn insert_fingerprints(&self, song_id: i32, fingerprints: &[Fingerprint]) -> Result<usize> {
            let mut songs = self.songs.lock().unwrap();
            let entry = songs.iter_mut().find(|(id, _)| *id == song_id).unwrap();
            entry.1.extend_from_slice(fingerprints);
            Ok(fingerprints.len())
        }

        fn lookup(&self, hashes: &HashSet<String>) -> Result<Vec<(i32, String, f32)>> {
            let songs = self.songs.lock().unwrap();
            Ok(songs
                .iter()
                .flat_map(|(id, fps)| {
                    fps.iter()
                        .filter(|fp| hashes.contains(&fp.hash))
                        .map(move |fp| (*id, fp.hash.clone(), fp.offset))
                })
                .collect())
        }
    }

    fn sawtooth(freq: f32, sample_rate: u32, duration_secs: f32) -> Vec<i16> {
        let n = (sample_rate as f32 * duration_secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let phase = (t * freq).fract();
                ((2.0 * phase - 1.0) * 0.6 * i16::MAX as f32) as i16
            })
            .collect()
    }

    fn write_wav(samples: &[i16], sample_rate: u32) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(file.path(), spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        file
    }

    fn input_for(path: PathBuf, source_id: &str) -> SongInput {
        SongInput {
            path: Some(path),
            title: Some(source_id.to_string()),
            source_id: Some(source_id.to_string()),
            duration: None,
            source_url: None,
        }
    }

    #[tokio::test]
    async fn ingest_then_identify_round_trip() {
        let store: Arc<dyn SongStore> = Arc::new(MemoryStore::default());
        let samples = sawtooth(8_000.0, 44_100, 3.0);
        let wav = write_wav(&samples, 44_100);

        let ingest_cfg = PipelineConfig {
            cpu_workers: 2,
            queue_capacity: 8,
            mode: PipelineMode::Ingest,
        };
        let ingest = Pipeline::new(
            ingest_cfg,
            EngineConfig::default(),
            AlignConfig::default(),
            store.clone(),
        )
        .unwrap();

        let sources = stream::iter(vec![input_for(wav.path().to_path_buf(), "song-1")]);
        let outcome = ingest.run(sources, CancellationToken::new()).await;
        assert!(!outcome.cancelled);
        assert_eq!(outcome.processed.len(), 1);
        assert!(outcome.processed[0].song_id.is_some());

        let identify_cfg = PipelineConfig {
            cpu_workers: 2,
            queue_capacity: 8,
            mode: PipelineMode::Identify { conf_thresh: 0.1 },
        };
        let identify = Pipeline::new(
            identify_cfg,
            EngineConfig::default(),
            AlignConfig::default(),
            store,
        )
        .unwrap();

        let sources = stream::iter(vec![input_for(wav.path().to_path_buf(), "query-1")]);
        let outcome = identify.run(sources, CancellationToken::new()).await;
        assert_eq!(outcome.processed.len(), 1);
        let matched = &outcome.processed[0];
        assert!(matched.match_result.is_some());
        assert_eq!(matched.match_result.as_ref().unwrap().song_id, 1);
    }

    #[tokio::test]
    async fn missing_path_is_reported_as_an_error_not_a_panic() {
        let store: Arc<dyn SongStore> = Arc::new(MemoryStore::default());
        let cfg = PipelineConfig {
            cpu_workers: 1,
            queue_capacity: 4,
            mode: PipelineMode::Ingest,
        };
        let pipeline = Pipeline::new(cfg, EngineConfig::default(), AlignConfig::default(), store).unwrap();

        let input = SongInput {
            path: None,
            title: None,
            source_id: Some("broken".into()),
            duration: None,
            source_url: None,
        };
        let outcome = pipeline.run(stream::iter(vec![input]), CancellationToken::new()).await;
        assert_eq!(outcome.processed.len(), 1);
        assert!(outcome.processed[0].error.is_some());
        assert!(outcome.processed[0].song_id.is_none());
    }

    #[tokio::test]
    async fn cancelling_before_any_input_yields_an_empty_cancelled_outcome() {
        let store: Arc<dyn SongStore> = Arc::new(MemoryStore::default());
        let cfg = PipelineConfig {
            cpu_workers: 1,
            queue_capacity: 4,
            mode: PipelineMode::Ingest,
        };
        let pipeline = Pipeline::new(cfg, EngineConfig::default(), AlignConfig::default(), store).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = pipeline
            .run(stream::pending::<SongInput>(), cancel)
            .await;
        assert!(outcome.cancelled);
        assert!(outcome.processed.is_empty());
    }

    #[test]
    fn rejects_zero_cpu_workers() {
        let cfg = PipelineConfig {
            cpu_workers: 0,
            queue_capacity: 4,
            mode: PipelineMode::Ingest,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_conf_thresh() {
        let cfg = PipelineConfig {
            cpu_workers: 1,
            queue_capacity: 4,
            mode: PipelineMode::Identify { conf_thresh: 1.5 },
        };
        assert!(cfg.validate().is_err());
    }
}
