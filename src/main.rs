//! pullup-vision - Pull-up repetition counter
//!
//! Analyzes recorded pose detections (optionally with the matching frame
//! images) and writes an annotated frame sequence plus a JSON session report.
//!
//! # Usage
//!
//! ```bash
//! # Headless analysis of a pose recording
//! pullup-vision analyze --poses session.jsonl --report report.json
//!
//! # Annotate frames as well
//! pullup-vision analyze --poses session.jsonl --frames frames/ --output annotated/
//!
//! # Every *.jsonl in a directory, four at a time, 60s limit per video
//! pullup-vision batch recordings/ --jobs 4 --timeout-secs 60
//!
//! # Inspect configuration
//! pullup-vision default-config > pullup_config.toml
//! pullup-vision check-config pullup_config.toml
//! ```
//!
//! # Environment Variables
//!
//! - `PULLUP_CONFIG`: Path to a TOML analysis config
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pullup_vision::config::{self, AnalysisConfig};
use pullup_vision::pipeline::{discover_jobs, BatchRunner, JobOutcome, PipelineError, VideoJob};
use pullup_vision::ReportEnvelope;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "pullup-vision")]
#[command(about = "Pull-up repetition counting from pose landmarks")]
#[command(version)]
struct CliArgs {
    /// Emit logs as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a single video
    Analyze {
        /// JSON-lines pose recording
        #[arg(long, value_name = "FILE")]
        poses: PathBuf,

        /// Directory of frame images (PNG/JPEG, sorted by name)
        #[arg(long, value_name = "DIR")]
        frames: Option<PathBuf>,

        /// Directory for annotated frames
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Report path (stdout when omitted or "-")
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Analysis config (TOML)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Frame rate used when the recording has no header
        #[arg(long)]
        fps: Option<f64>,
    },

    /// Analyze every recording in a directory
    Batch {
        /// Directory holding <name>.jsonl recordings and optional <name>/ frame dirs
        dir: PathBuf,

        /// Videos analyzed concurrently
        #[arg(long, default_value = "2")]
        jobs: usize,

        /// Per-video time limit in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Root directory for annotated frames (one subdirectory per video)
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Batch report path (stdout when omitted or "-")
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Analysis config (TOML)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Load and validate a config file
    CheckConfig {
        /// Config path; the standard search order when omitted
        path: Option<PathBuf>,
    },

    /// Print the built-in default config as TOML
    DefaultConfig,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.json_logs);

    match args.command {
        Command::Analyze {
            poses,
            frames,
            output,
            report,
            config,
            fps,
        } => {
            let mut config = config::resolve(config.as_deref()).context("Failed to load config")?;
            if let Some(fps) = fps {
                config.pipeline.default_fps = fps;
            }
            let name = poses
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("video")
                .to_string();
            let job = VideoJob {
                name,
                poses,
                frames,
                output,
            };
            run_analyze(job, config, report).await
        }
        Command::Batch {
            dir,
            jobs,
            timeout_secs,
            output_dir,
            report,
            config,
        } => {
            let config = config::resolve(config.as_deref()).context("Failed to load config")?;
            run_batch(&dir, jobs, timeout_secs, output_dir, report, config).await
        }
        Command::CheckConfig { path } => {
            let config = config::resolve(path.as_deref()).context("Config is invalid")?;
            config.validate().context("Config is invalid")?;
            info!(
                "✓ Config OK (up < {:.0}°, down > {:.0}°, hold {} frames, max gap {} frames)",
                config.phase.up_threshold,
                config.phase.down_threshold,
                config.phase.min_hold_frames,
                config.smoothing.max_gap_frames
            );
            Ok(())
        }
        Command::DefaultConfig => {
            print!("{}", AnalysisConfig::default().to_toml()?);
            Ok(())
        }
    }
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // Logs go to stderr so a report on stdout stays parseable
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Cancel `token` on Ctrl+C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, stopping after the current frame...");
            token.cancel();
        }
    });
}

async fn run_analyze(job: VideoJob, config: AnalysisConfig, report: Option<PathBuf>) -> Result<()> {
    let cancel_token = CancellationToken::new();
    cancel_on_ctrl_c(cancel_token.clone());

    let poses = job.poses.clone();
    let worker_token = cancel_token.clone();
    let outcome = tokio::task::spawn_blocking(move || job.execute(&config, &worker_token))
        .await
        .context("Analysis worker panicked")?;

    let analysis = match outcome {
        Ok(analysis) => analysis,
        Err(PipelineError::Cancelled { frames_processed }) => {
            bail!("Analysis cancelled after {frames_processed} frames");
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to analyze {}", poses.display()));
        }
    };

    if let Some(err) = &analysis.source_error {
        warn!("Report is partial: {}", err);
    }

    ReportEnvelope::new(analysis)
        .write(report.as_deref())
        .context("Failed to write report")?;
    if let Some(path) = report.filter(|p| p.as_os_str() != "-") {
        info!("📝 Report written to {}", path.display());
    }
    Ok(())
}

async fn run_batch(
    dir: &std::path::Path,
    jobs: usize,
    timeout_secs: Option<u64>,
    output_dir: Option<PathBuf>,
    report: Option<PathBuf>,
    config: AnalysisConfig,
) -> Result<()> {
    let videos = discover_jobs(dir, output_dir.as_deref())
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    if videos.is_empty() {
        bail!("No *.jsonl recordings found in {}", dir.display());
    }

    let cancel_token = CancellationToken::new();
    cancel_on_ctrl_c(cancel_token.clone());

    let mut runner = BatchRunner::new(config, jobs).with_cancel_token(cancel_token);
    if let Some(secs) = timeout_secs {
        runner = runner.with_timeout(Duration::from_secs(secs));
    }

    let results = runner.run(videos).await;
    let failed = results
        .iter()
        .filter(|r| matches!(r.outcome, JobOutcome::Failed { .. }))
        .count();

    ReportEnvelope::new(&results)
        .write(report.as_deref())
        .context("Failed to write batch report")?;

    if failed > 0 {
        warn!("{} of {} videos failed", failed, results.len());
    }
    Ok(())
}
