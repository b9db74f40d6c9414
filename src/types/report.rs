//! Per-video summary and report documents

use serde::{Deserialize, Serialize};

use super::{IncompleteRep, PhaseTransition, RepEvent};

/// Angle span of a single rep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    pub rep_index: u32,
    pub min_angle: f64,
    pub max_angle: f64,
    pub range: f64,
}

/// How much of the video produced usable angles.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameCoverage {
    pub frames_processed: u64,
    pub valid_frames: u64,
    /// Invalid frames whose value was held from the last valid sample
    pub held_gap_frames: u64,
    /// Invalid frames past `max_gap_frames` (classification frozen)
    pub unrecoverable_gap_frames: u64,
    pub detection_unavailable_frames: u64,
    pub low_confidence_frames: u64,
    pub degenerate_frames: u64,
}

impl FrameCoverage {
    /// Fraction of frames with a valid elbow angle, 0.0 for an empty video.
    pub fn valid_ratio(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.valid_frames as f64 / self.frames_processed as f64
        }
    }
}

/// Aggregate statistics for one video.
///
/// Always well-formed: a video with no reps (or no detections at all) yields
/// `total_reps == 0` and zeroed duration statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_reps: u32,
    /// Mean rep duration in seconds (0.0 with no reps)
    pub mean_rep_duration: f64,
    /// Sample standard deviation of rep durations (0.0 with fewer than two reps)
    pub rep_duration_std_dev: f64,
    pub min_rep_duration: Option<f64>,
    pub max_rep_duration: Option<f64>,
    /// One entry per rep, in rep order
    pub angle_range_per_rep: Vec<AngleRange>,
    /// Mean of `angle_range_per_rep[*].range` (0.0 with no reps)
    pub mean_angle_range: f64,
    pub transition_count: u64,
    pub incomplete_reps: Vec<IncompleteRep>,
    pub coverage: FrameCoverage,
    /// `coverage.valid_ratio()` at summary time
    pub detection_coverage: f64,
}

/// Basic properties of the analyzed video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Human-readable source label (file or directory name)
    pub source: String,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Frame count if known before decoding
    pub expected_frames: Option<u64>,
}

impl VideoInfo {
    pub fn duration_seconds(&self, frames: u64) -> f64 {
        if self.fps > 0.0 {
            frames as f64 / self.fps
        } else {
            0.0
        }
    }
}

/// Everything produced by analyzing one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub video: VideoInfo,
    pub duration_seconds: f64,
    pub summary: SessionSummary,
    pub reps: Vec<RepEvent>,
    pub transitions: Vec<PhaseTransition>,
    /// Set when the frame source failed mid-stream; the report covers the
    /// frames read before the failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
}
