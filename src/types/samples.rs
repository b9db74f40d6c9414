//! Per-frame signal samples and the discrete events derived from them.

use serde::{Deserialize, Serialize};

use super::Side;

// ============================================================================
// Angle Samples
// ============================================================================

/// Why a frame produced no usable elbow angle.
///
/// None of these abort processing: an invalid sample simply flows into the
/// signal conditioner as a gap frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// The detector found no pose (or no arm) in this frame
    DetectionUnavailable,
    /// At least one of shoulder/elbow/wrist is below `min_joint_confidence`
    InsufficientConfidence,
    /// Zero-length or collinear arm segments; the angle is undefined
    DegenerateGeometry,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReason::DetectionUnavailable => write!(f, "detection unavailable"),
            InvalidReason::InsufficientConfidence => write!(f, "insufficient confidence"),
            InvalidReason::DegenerateGeometry => write!(f, "degenerate geometry"),
        }
    }
}

/// Representative elbow angle for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleSample {
    pub frame_index: u64,
    pub timestamp: f64,
    /// Elbow angle in degrees, in [0, 180]; `None` when invalid
    pub angle_degrees: Option<f64>,
    /// Arm the angle was measured on
    pub side: Option<Side>,
    /// Set exactly when `angle_degrees` is `None`
    pub invalid_reason: Option<InvalidReason>,
}

impl AngleSample {
    pub fn valid(frame_index: u64, timestamp: f64, angle: f64, side: Side) -> Self {
        Self {
            frame_index,
            timestamp,
            angle_degrees: Some(angle),
            side: Some(side),
            invalid_reason: None,
        }
    }

    pub fn invalid(frame_index: u64, timestamp: f64, reason: InvalidReason) -> Self {
        Self {
            frame_index,
            timestamp,
            angle_degrees: None,
            side: None,
            invalid_reason: Some(reason),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.angle_degrees.is_some()
    }
}

// ============================================================================
// Conditioned Samples
// ============================================================================

/// Smoothed, gap-filled angle for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSample {
    pub frame_index: u64,
    pub timestamp: f64,
    /// Smoothed angle; held across short gaps, `None` once a gap is unrecoverable
    pub smoothed_angle: Option<f64>,
    pub is_gap: bool,
    /// Consecutive invalid frames up to and including this one (0 when valid)
    pub gap_length: u32,
    /// Unsmoothed estimator output for this frame
    pub raw_angle: Option<f64>,
}

impl ConditionedSample {
    /// A gap that exceeded `max_gap_frames` (or precedes any valid data).
    ///
    /// The phase state machine freezes on these.
    pub fn is_unrecoverable_gap(&self) -> bool {
        self.is_gap && self.smoothed_angle.is_none()
    }
}

// ============================================================================
// Phase Events
// ============================================================================

/// Arm phase of the pull-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Arm flexed, chin toward the bar (low elbow angle)
    Up,
    /// Arm extended, dead hang (high elbow angle)
    Down,
    /// Stream start, before the first confident classification
    #[default]
    Unknown,
}

impl Phase {
    /// Short display label used on the overlay.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Up => "UP",
            Phase::Down => "DOWN",
            Phase::Unknown => "--",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Up => write!(f, "UP"),
            Phase::Down => write!(f, "DOWN"),
            Phase::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A confirmed phase change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub frame_index: u64,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub angle_at_transition: f64,
}

/// A finalized repetition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepEvent {
    /// 1-based, assigned in emission order
    pub rep_index: u32,
    pub start_frame: u64,
    pub end_frame: u64,
    /// Deepest flexion (smallest angle) reached during the rep
    pub min_angle: f64,
    /// Fullest extension (largest angle) of the bracketing hangs
    pub max_angle: f64,
    pub duration_seconds: f64,
}

impl RepEvent {
    pub fn angle_range(&self) -> f64 {
        self.max_angle - self.min_angle
    }
}

/// Why a partial cycle was not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    /// Flexion observed before any extended (DOWN) baseline
    NoBaseline,
    /// The stream ended before the cycle closed
    StreamEnded,
}

/// A partial cycle kept for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IncompleteRep {
    pub start_frame: u64,
    pub last_frame: u64,
    pub min_angle: Option<f64>,
    pub reason: IncompleteReason,
}
