//! # Control Mapper
//!
//! Maps raw input frames to device output states.
//!
//! Reads one `RawInputFrame` JSON object per line on stdin and writes one
//! `OutputState` JSON object per line on stdout. Diagnostics go to stderr
//! and, optionally, to a daily rolling log file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use control_mapper::capture::frame::RawInputFrame;
use control_mapper::config::{Config, LoggingConfig};
use control_mapper::profile::ProfileRuntime;
use control_mapper::telemetry::FrameRecorder;

/// Used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Seconds of input between status log messages
const STATUS_INTERVAL_SECS: u64 = 5;

/// Main entry point for Control Mapper
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Build the pipeline and load the startup profile, if any
///
/// 2. **Main Loop**
///    - Read a frame from stdin, run it, write the output state to stdout
///    - Roll back a faulted profile before the next frame
///    - Record sampled frames to the telemetry log
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Shutdown** on end of input or Ctrl+C
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded
/// - stdin/stdout fail
///
/// # Examples
///
/// ```bash
/// echo '{"timestamp_ms": 0, "touches": [{"x": 0.85, "y": 0.8}]}' | control-mapper config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_arg = std::env::args().nth(1);
    let (config, base_dir) = load_config(config_arg.as_deref())?;

    let _log_guard = init_logging(&config.logging);
    info!("Control Mapper v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut pipeline = config.build_pipeline();
    info!(
        "Pipeline ready: {} nodes, {} mappings, active mapping {}",
        config.nodes.len(),
        pipeline.mappings().len(),
        pipeline.mappings().active().map_or("<none>", |m| m.name())
    );

    if let Some(profile_config) = &config.profile {
        match profile_config.load_profile(&base_dir) {
            Ok(profile) => {
                if !pipeline.with_profiles(|p| p.switch_profile(profile)) {
                    warn!("Startup profile '{}' rejected, using default pipeline", profile_config.name);
                }
            }
            Err(e) => warn!("Cannot read startup profile '{}': {}", profile_config.name, e),
        }
    }

    let mut recorder = if config.telemetry.enabled {
        Some(FrameRecorder::from_config(&config.telemetry).context("Failed to open telemetry log")?)
    } else {
        None
    };

    let status_interval = u64::from(config.pipeline.frame_rate_hz) * STATUS_INTERVAL_SECS;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut frame_count: u64 = 0;
    let mut skipped: u64 = 0;

    info!("Reading frames from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("End of input");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let raw: RawInputFrame = match serde_json::from_str(&line) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("Skipping malformed frame: {}", e);
                        skipped += 1;
                        continue;
                    }
                };

                if pipeline.with_profiles(|p| p.need_rollback()) {
                    pipeline.with_profiles(ProfileRuntime::auto_rollback);
                }

                let state = pipeline.next_frame(&raw);
                let mut json = state.to_json()?;
                json.push('\n');
                stdout.write_all(json.as_bytes()).await?;
                stdout.flush().await?;

                if let Some(recorder) = recorder.as_mut() {
                    if let Err(e) = recorder.record(&state) {
                        debug!("Failed to record frame: {}", e);
                    }
                }

                frame_count += 1;
                if frame_count % status_interval == 0 {
                    info!("Processed {} frames ({} skipped)", frame_count, skipped);
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Some(recorder) = recorder.as_mut() {
        recorder.flush()?;
    }
    pipeline.with_profiles(ProfileRuntime::unload_current_profile);
    info!("Total frames processed: {} ({} skipped)", frame_count, skipped);
    Ok(())
}

/// Loads the configuration and returns it with the directory relative
/// profile paths resolve against.
fn load_config(arg: Option<&str>) -> Result<(Config, PathBuf)> {
    let path = match arg {
        Some(path) => PathBuf::from(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => PathBuf::from(DEFAULT_CONFIG_PATH),
        None => return Ok((Config::default(), PathBuf::from("."))),
    };

    let config = Config::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((config, base_dir))
}

/// Logs go to stderr because stdout carries frames.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let level: tracing::Level = logging.level.parse().unwrap_or(tracing::Level::INFO);
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
