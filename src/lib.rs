//! pullup-vision: Pull-up Repetition Analysis
//!
//! Counts pull-up repetitions from per-frame pose detections and draws a
//! live overlay onto the video frames.
//!
//! ## Architecture
//!
//! - **Angle Estimator**: elbow flexion angle from shoulder/elbow/wrist landmarks
//! - **Signal Conditioner**: outlier-robust smoothing with bounded gap holding
//! - **Phase State Machine**: hysteresis + dwell time UP/DOWN detection and rep counting
//! - **Annotator**: rep count, angle and phase overlay per frame
//! - **Session Aggregator**: per-session summary and frame coverage
//! - **Pipeline**: frame source → detector → analysis → sink, single video or batch

pub mod angle;
pub mod annotate;
pub mod config;
pub mod phase;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod signal;
pub mod types;

pub use config::{AnalysisConfig, ConfigError};

pub use types::{
    AnalysisReport, AngleSample, ConditionedSample, IncompleteRep, JointSample, Phase,
    PhaseTransition, PoseDetection, RepEvent, SessionSummary,
};

pub use angle::AngleEstimator;
pub use annotate::Annotator;
pub use phase::PhaseStateMachine;
pub use session::SessionAggregator;
pub use signal::SignalConditioner;

pub use pipeline::{
    analyze_samples, AnalysisError, BatchRunner, PipelineError, RepAnalyzer, VideoPipeline,
};
pub use report::ReportEnvelope;
