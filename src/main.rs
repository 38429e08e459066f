use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::stream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use sabi::config::{AlignConfig, EngineConfig};
use sabi::pipeline::{Pipeline, PipelineConfig, PipelineMode, SongInput};
use sabi::result::to_match_result_json;
use sabi::store::FingerprintStore;

#[derive(Parser, Debug)]
#[command(name = "sabi", about = "Landmark acoustic fingerprinting and matching", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Postgres connection string. Falls back to the DATABASE_URL env var.
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Number of concurrent fingerprinting workers.
    #[arg(long, global = true, default_value_t = num_cpus())]
    cpu_workers: usize,

    /// Bounded capacity of the queue between pipeline stages.
    #[arg(long, global = true, default_value_t = 64)]
    queue_capacity: usize,

    /// Write results as a JSON array to this file instead of stdout only.
    #[arg(long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fingerprint audio files (or directories, expanded one level) and add them to the store.
    Ingest {
        /// Audio files, directories, or remote video URLs to ingest.
        inputs: Vec<String>,
    },
    /// Fingerprint a query audio file and report the best match.
    Identify {
        /// Audio file, directory, or remote video URL to identify.
        inputs: Vec<String>,

        /// Minimum fraction of matching fingerprints required to report a match.
        #[arg(long, default_value_t = 0.01)]
        conf_thresh: f32,
    },
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Turn CLI-supplied paths/URLs into pipeline inputs. A directory expands to
/// its immediate children (spec.md section 6); a `http(s)://` string becomes
/// a source-url input with no local path, which the external acquisition
/// collaborator would normally resolve before the fingerprint stage sees it
/// — absent that collaborator here, it surfaces as an acquisition error.
fn expand_inputs(raw: Vec<String>) -> Result<Vec<SongInput>> {
    let mut inputs = Vec::new();

    for arg in raw {
        if arg.starts_with("http://") || arg.starts_with("https://") {
            inputs.push(SongInput {
                path: None,
                title: None,
                source_id: Some(arg.clone()),
                duration: None,
                source_url: Some(arg),
            });
            continue;
        }

        let path = PathBuf::from(&arg);
        if path.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(&path)
                .with_context(|| format!("failed to read directory {arg}"))?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            for file in entries {
                inputs.push(input_for_path(file));
            }
        } else {
            inputs.push(input_for_path(path));
        }
    }

    Ok(inputs)
}

fn input_for_path(path: PathBuf) -> SongInput {
    SongInput {
        title: path.file_stem().map(|s| s.to_string_lossy().into_owned()),
        source_id: Some(path.to_string_lossy().into_owned()),
        path: Some(path),
        duration: None,
        source_url: None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let database_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .context("no database URL given (pass --database-url or set DATABASE_URL)")?;

    let store = Arc::new(FingerprintStore::new(&database_url).context("failed to connect to store")?);

    let engine_cfg = EngineConfig::default();
    let align_cfg = AlignConfig::default();

    let (mode, raw_inputs) = match cli.command {
        Command::Ingest { inputs } => (PipelineMode::Ingest, inputs),
        Command::Identify { inputs, conf_thresh } => {
            (PipelineMode::Identify { conf_thresh }, inputs)
        }
    };

    let pipeline_cfg = PipelineConfig {
        cpu_workers: cli.cpu_workers,
        queue_capacity: cli.queue_capacity,
        mode,
    };

    let pipeline = Pipeline::new(pipeline_cfg, engine_cfg, align_cfg, store.clone())?;
    let inputs = expand_inputs(raw_inputs)?;

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received interrupt, winding down in-flight work");
            ctrl_c_cancel.cancel();
        }
    });

    let outcome = pipeline.run(stream::iter(inputs), cancel).await;

    let mut results_json = Vec::with_capacity(outcome.processed.len());

    for processed in &outcome.processed {
        let label = processed
            .input
            .source_id
            .clone()
            .unwrap_or_else(|| "<unknown>".to_string());

        if let Some(err) = &processed.error {
            error!(source = %label, error = %err, "failed");
            continue;
        }

        match (&processed.song_id, &processed.match_result) {
            (Some(song_id), _) => {
                println!("{label}: stored as song {song_id}");
            }
            (None, Some(m)) => {
                let confidence = processed.confidence.unwrap_or(0.0);
                println!(
                    "{label}: matched song {} ({} fingerprints, confidence {:.2}, offset {:.2}s)",
                    m.song_id, m.num_matching_fingerprints, confidence, m.relative_offset
                );

                let matched_song = store
                    .get_song(m.song_id, true)
                    .unwrap_or_else(|e| {
                        error!(error = %e, song_id = m.song_id, "failed to fetch matched song");
                        None
                    });
                results_json.push(to_match_result_json(processed, matched_song.as_ref()));
            }
            (None, None) => {
                println!("{label}: no match");
                results_json.push(to_match_result_json(processed, None));
            }
        }
    }

    if let Some(output_path) = &cli.output {
        let json = serde_json::to_string_pretty(&results_json)
            .context("failed to serialize results to JSON")?;
        std::fs::write(output_path, json)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
    }

    if outcome.cancelled {
        info!("pipeline cancelled before all inputs were processed");
    }

    // Exit 0 on success, including "no match found" (spec.md section 6);
    // invalid arguments and store-unreachable failures already short-circuit
    // via `?` above before any stage runs.
    std::process::exit(0);
}
