//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::env;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::BackendConfig;
use crate::error::{Result, StemError};
use crate::mixer::{MixEngine, MixOptions, MixSession};
use crate::orchestrator::{SeparationOrchestrator, SourceAudio};
use crate::stem::StemDescriptor;
use crate::store::FsBlobStore;
use crate::transport::Uploader;

const DEFAULT_UPLOADER: &str = "cli";

/// Longest simulated playback `mix-preview` accepts
const MAX_PLAY_SECS: f64 = 86_400.0;

/// Load the backend configuration from a file or the environment.
pub fn load_config(path: Option<&Path>) -> Result<BackendConfig> {
    match path {
        Some(path) => {
            info!("Loading backend config: {}", path.display());
            BackendConfig::load(path)
        }
        None => BackendConfig::from_env(),
    }
}

/// Validate the configuration and print it.
pub fn check_config(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;

    match config.validate() {
        Ok(endpoint) => {
            println!("Configuration OK");
            println!("  Endpoint: {}", endpoint);
            println!("  Style: {}", config.style);
            println!("  Model: {}", config.default_model);
            println!(
                "  API token: {}",
                if config.api_token.is_some() { "set" } else { "not set" }
            );
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Err(e) => {
            println!("Configuration invalid: {}", e);
            for suggestion in e.recovery_suggestions() {
                println!("  - {}", suggestion);
            }
            Err(e)
        }
    }
}

/// Run one separation job and print the resulting stems.
pub async fn separate(
    config_path: Option<&Path>,
    input: &str,
    model: &str,
    stems: Vec<String>,
    json: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let mut orchestrator = SeparationOrchestrator::from_config(config.clone())?;

    let is_url = input.starts_with("http://") || input.starts_with("https://");
    let source = if is_url {
        SourceAudio::url(input)
    } else {
        let path = Path::new(input);
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let owner = env::var("STEMDECK_UPLOADER").unwrap_or_else(|_| DEFAULT_UPLOADER.to_string());
        let store = Arc::new(FsBlobStore::from_env()?);
        orchestrator = orchestrator.with_uploader(Uploader::from_config(store, owner, &config));

        SourceAudio::bytes(file_name, bytes)
    };

    info!("Separating {} ({} backend)", input, config.style);

    let mut events = orchestrator.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(job) = events.recv().await {
            println!("[{:>3}%] {}", job.progress_percent, job.stage);
        }
    });

    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let result = run_until_interrupted(&orchestrator, source, model, Some(stems), interrupt).await;
    reporter.abort();

    match result {
        Ok(stems) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&stems)?);
            } else {
                println!("Separation complete: {} stem(s)", stems.len());
                for stem in &stems {
                    println!("  {:<14} {}", stem.label, stem.url);
                }
            }
            Ok(())
        }
        Err(StemError::Cancelled) => {
            println!("Separation cancelled.");
            Ok(())
        }
        Err(e) => {
            println!("{}", e.friendly_message());
            for suggestion in e.recovery_suggestions() {
                println!("  - {}", suggestion);
            }
            Err(e)
        }
    }
}

/// Run a job, cancelling it when `interrupt` fires.
///
/// The job is cancelled and then awaited, so its remote cleanup runs before
/// this returns.
async fn run_until_interrupted(
    orchestrator: &SeparationOrchestrator,
    source: SourceAudio,
    model: &str,
    stems: Option<Vec<String>>,
    interrupt: impl Future<Output = ()>,
) -> Result<Vec<StemDescriptor>> {
    let job = orchestrator.start(source, model, stems);
    tokio::pin!(job);

    tokio::select! {
        result = &mut job => return result,
        _ = interrupt => {}
    }

    println!("Cancelling...");
    orchestrator.cancel();
    job.await
}

/// Parse a `--play` length. Zero means no playback.
fn play_duration(seconds: f64) -> Result<Option<Duration>> {
    if seconds == 0.0 {
        return Ok(None);
    }
    if !(0.0..=MAX_PLAY_SECS).contains(&seconds) {
        return Err(StemError::configuration(format!(
            "--play must be between 0 and {} seconds, got {}",
            MAX_PLAY_SECS, seconds
        )));
    }
    Ok(Some(Duration::from_secs_f64(seconds)))
}

/// Parse `id=volume` pairs.
fn parse_volumes(pairs: &[String]) -> Result<Vec<(String, u8)>> {
    pairs
        .iter()
        .map(|pair| {
            let (id, volume) = pair.split_once('=').ok_or_else(|| {
                StemError::configuration(format!("volume '{}' must look like id=80", pair))
            })?;
            let volume = volume.trim().parse::<u8>().map_err(|_| {
                StemError::configuration(format!("volume for '{}' must be 0-100", id))
            })?;
            Ok((id.trim().to_string(), volume))
        })
        .collect()
}

/// Build a simulated mix, apply the controls and print the resolved gains.
pub async fn mix_preview(
    stems: Vec<String>,
    mute: Vec<String>,
    solo: Vec<String>,
    volumes: Vec<String>,
    play_seconds: f64,
) -> Result<()> {
    let play_for = play_duration(play_seconds)?;
    let mut engine = MixEngine::simulated(stems, MixOptions::default());

    for (id, volume) in parse_volumes(&volumes)? {
        engine.set_volume(&id, volume)?;
    }
    for id in &mute {
        engine.toggle_mute(id)?;
    }
    for id in &solo {
        engine.toggle_solo(id)?;
    }

    println!("{:<14} {:>6} {:>6} {:>6} {:>6}", "Track", "Vol", "Mute", "Solo", "Gain");
    println!("{:-<44}", "");
    for track in engine.tracks() {
        println!(
            "{:<14} {:>6} {:>6} {:>6} {:>6.2}",
            track.label,
            track.volume,
            if track.muted { "yes" } else { "-" },
            if track.soloed { "yes" } else { "-" },
            track.gain
        );
    }

    if let Some(play_for) = play_for {
        let mut session = MixSession::new(engine);
        let mut updates = session.subscribe();
        session.play();

        let deadline = tokio::time::sleep(play_for);
        tokio::pin!(deadline);
        let mut last_whole = -1i64;

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    let whole = snapshot.current_time.floor() as i64;
                    if whole != last_whole {
                        last_whole = whole;
                        println!("  {:>6.1}s / {:.0}s", snapshot.current_time, snapshot.duration);
                    }
                }
            }
        }

        session.pause();
        let snapshot = session.snapshot();
        println!("Stopped at {:.2}s ({})", snapshot.current_time, snapshot.state);
    }

    Ok(())
}
