//! Synthetic Pull-up Pose Recordings
//!
//! Generates a JSON-lines pose recording of a pull-up session for demos,
//! regression fixtures and soak tests. The elbow angle follows a
//! hang → pull → top hold → lower cycle per rep, with Gaussian landmark
//! jitter and random detection dropouts on top.
//!
//! # Usage
//! ```bash
//! pullup-synth --reps 8 --seed 7 --output session.jsonl
//! pullup-vision analyze --poses session.jsonl
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use tracing::info;

use pullup_vision::pipeline::{RecordedFrame, RecordingHeader};
use pullup_vision::types::{mediapipe, ArmLandmarks, Landmark};

// ============================================================================
// Motion Constants
// ============================================================================

/// Elbow angle while hanging (degrees)
const HANG_ANGLE: f64 = 172.0;
/// Elbow angle at the top of the pull (degrees)
const TOP_ANGLE: f64 = 55.0;
/// Upper arm length in normalized image units
const UPPER_ARM: f64 = 0.14;
/// Forearm length in normalized image units
const FOREARM: f64 = 0.13;
/// Shoulder height in normalized image units
const SHOULDER_Y: f64 = 0.45;
/// Horizontal shoulder offset from the frame center
const SHOULDER_HALF_WIDTH: f64 = 0.08;
/// Landmarks in a MediaPipe Pose result
const MEDIAPIPE_LANDMARKS: usize = 33;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Explicit left/right shoulder, elbow and wrist
    Arms,
    /// Full 33-point MediaPipe landmark array
    Mediapipe,
}

#[derive(Parser, Debug)]
#[command(name = "pullup-synth")]
#[command(about = "Synthetic pull-up pose recordings for pullup-vision testing")]
#[command(version)]
struct Args {
    /// Number of pull-ups
    #[arg(short, long, default_value = "5", value_parser = clap::value_parser!(u32).range(0..=500))]
    reps: u32,

    /// Frame rate of the recording
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Seconds per rep (pull + hold + lower)
    #[arg(long, default_value = "2.5")]
    rep_seconds: f64,

    /// Seconds of dead hang before the first and after the last rep
    #[arg(long, default_value = "1.0")]
    hang_seconds: f64,

    /// Landmark jitter standard deviation (normalized units)
    #[arg(long, default_value = "0.004")]
    jitter: f64,

    /// Probability that a frame has no detection
    #[arg(long, default_value = "0.02")]
    dropout: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Landmark layout of each line
    #[arg(long, value_enum, default_value = "arms")]
    format: Format,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

// ============================================================================
// Motion Model
// ============================================================================

/// Elbow angle at time `t` within one rep of length `period`.
///
/// 40% pull, 15% hold at the top, 45% controlled lower.
fn rep_angle(t: f64, period: f64) -> f64 {
    let p = (t / period).clamp(0.0, 1.0);
    let ease = |x: f64| 0.5 - 0.5 * (std::f64::consts::PI * x).cos();
    let depth = if p < 0.40 {
        ease(p / 0.40)
    } else if p < 0.55 {
        1.0
    } else {
        1.0 - ease((p - 0.55) / 0.45)
    };
    HANG_ANGLE - depth * (HANG_ANGLE - TOP_ANGLE)
}

/// Arm posed at `angle_deg` with the hand above the elbow.
///
/// `side` is -1 for the left arm and +1 for the right arm (image x grows rightwards).
fn arm_at(angle_deg: f64, side: f64) -> ArmLandmarks {
    let shoulder = (0.5 + side * SHOULDER_HALF_WIDTH, SHOULDER_Y);
    let elbow = (shoulder.0, shoulder.1 - UPPER_ARM);
    // Elbow→shoulder points down; rotate it by the elbow angle towards the body midline
    let theta = angle_deg.to_radians();
    let wrist = (
        elbow.0 - side * FOREARM * theta.sin(),
        elbow.1 + FOREARM * theta.cos(),
    );
    ArmLandmarks {
        shoulder: Landmark::new(shoulder.0, shoulder.1, 0.95),
        elbow: Landmark::new(elbow.0, elbow.1, 0.93),
        wrist: Landmark::new(wrist.0, wrist.1, 0.9),
    }
}

struct Generator {
    rng: StdRng,
    jitter: Normal<f64>,
    dropout: f64,
    format: Format,
}

impl Generator {
    fn jittered(&mut self, lm: Landmark) -> Landmark {
        let confidence = (lm.confidence + self.rng.gen_range(-0.05..0.04)).clamp(0.0, 1.0);
        Landmark::new(
            lm.x + self.jitter.sample(&mut self.rng),
            lm.y + self.jitter.sample(&mut self.rng),
            confidence,
        )
    }

    fn jittered_arm(&mut self, arm: ArmLandmarks) -> ArmLandmarks {
        ArmLandmarks {
            shoulder: self.jittered(arm.shoulder),
            elbow: self.jittered(arm.elbow),
            wrist: self.jittered(arm.wrist),
        }
    }

    fn frame(&mut self, index: u64, angle: f64) -> RecordedFrame {
        let mut frame = RecordedFrame {
            frame: index,
            landmarks: None,
            left: None,
            right: None,
        };
        if self.rng.gen_bool(self.dropout) {
            return frame;
        }

        // Arms never bend in perfect sync
        let right_angle = angle + self.rng.gen_range(-3.0..3.0);
        let left = self.jittered_arm(arm_at(angle, -1.0));
        let right = self.jittered_arm(arm_at(right_angle, 1.0));

        match self.format {
            Format::Arms => {
                frame.left = Some(left);
                frame.right = Some(right);
            }
            Format::Mediapipe => {
                let mut landmarks = vec![Landmark::new(0.5, 0.3, 0.5); MEDIAPIPE_LANDMARKS];
                landmarks[mediapipe::LEFT_SHOULDER] = left.shoulder;
                landmarks[mediapipe::LEFT_ELBOW] = left.elbow;
                landmarks[mediapipe::LEFT_WRIST] = left.wrist;
                landmarks[mediapipe::RIGHT_SHOULDER] = right.shoulder;
                landmarks[mediapipe::RIGHT_ELBOW] = right.elbow;
                landmarks[mediapipe::RIGHT_WRIST] = right.wrist;
                frame.landmarks = Some(landmarks);
            }
        }
        frame
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.fps.is_finite() && args.fps > 0.0, "--fps must be positive");
    anyhow::ensure!(args.rep_seconds > 0.0, "--rep-seconds must be positive");
    anyhow::ensure!((0.0..=1.0).contains(&args.dropout), "--dropout must be in [0, 1]");

    let rng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut generator = Generator {
        rng,
        jitter: Normal::new(0.0, args.jitter.max(0.0)).context("Invalid jitter")?,
        dropout: args.dropout,
        format: args.format,
    };

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let header = RecordingHeader {
        fps: args.fps,
        width: 1280,
        height: 720,
        source: Some(format!("pullup-synth ({} reps)", args.reps)),
    };
    writeln!(out, "{}", serde_json::to_string(&header)?)?;

    // Frame counts per segment; rounding keeps the timeline on whole frames
    let hang_frames = (args.hang_seconds.max(0.0) * args.fps).round() as u64;
    let rep_frames = (args.rep_seconds * args.fps).round().max(1.0) as u64;

    let rep_angles = (0..rep_frames).map(|f| rep_angle(f as f64 / args.fps, args.rep_seconds));
    let angles = std::iter::repeat(HANG_ANGLE)
        .take(hang_frames as usize)
        .chain((0..args.reps).flat_map(|_| rep_angles.clone()))
        .chain(std::iter::repeat(HANG_ANGLE).take(hang_frames as usize));

    let mut index = 0u64;
    let mut dropped = 0u64;
    for angle in angles {
        let frame = generator.frame(index, angle);
        if frame.landmarks.is_none() && frame.left.is_none() {
            dropped += 1;
        }
        writeln!(out, "{}", serde_json::to_string(&frame)?)?;
        index += 1;
    }
    out.flush()?;

    info!(
        "🧪 Wrote {} frames ({} reps, {} dropouts) at {:.0} fps{}",
        index,
        args.reps,
        dropped,
        args.fps,
        args.seed.map(|s| format!(", seed {s}")).unwrap_or_default()
    );
    Ok(())
}
