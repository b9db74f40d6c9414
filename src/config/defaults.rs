//! System-wide default constants.
//!
//! Every tunable in `AnalysisConfig` takes its default from here. Grouped by
//! subsystem for easy discovery.

// ============================================================================
// Angle Estimation
// ============================================================================

/// Minimum per-joint detector confidence for a usable elbow angle.
pub const MIN_JOINT_CONFIDENCE: f64 = 0.5;

/// Arm segments shorter than this (in detector units) are degenerate.
pub const MIN_SEGMENT_LENGTH: f64 = 1e-6;

/// |sin θ| below this means shoulder, elbow and wrist are collinear.
pub const COLLINEARITY_EPSILON: f64 = 1e-6;

// ============================================================================
// Signal Conditioning
// ============================================================================

/// Sliding window length (frames) for the smoother.
pub const SMOOTHING_WINDOW: usize = 5;

/// Exponential smoothing factor (weight of the newest sample).
pub const EMA_ALPHA: f64 = 0.5;

/// Longest gap (frames) bridged by holding the last smoothed value.
///
/// 15 frames = 0.5 s at 30 fps.
pub const MAX_GAP_FRAMES: u32 = 15;

// ============================================================================
// Phase State Machine
// ============================================================================

/// Elbow angle at or below which the arm counts as flexed (degrees).
pub const UP_THRESHOLD_DEG: f64 = 90.0;

/// Elbow angle at or above which the arm counts as extended (degrees).
pub const DOWN_THRESHOLD_DEG: f64 = 160.0;

/// Consecutive confirming samples required before a phase change.
pub const MIN_HOLD_FRAMES: u32 = 3;

// ============================================================================
// Pipeline
// ============================================================================

/// Frame rate assumed when the source does not report one.
pub const DEFAULT_FPS: f64 = 30.0;

/// Log a progress line every N frames.
pub const PROGRESS_INTERVAL_FRAMES: u64 = 30;

/// How far a recorded frame index may run ahead of its line number.
///
/// 108 000 frames = one hour of omitted frames at 30 fps.
pub const MAX_FRAME_LEAD: u64 = 108_000;

// ============================================================================
// Overlay
// ============================================================================

/// Top-left corner of the overlay panel (pixels).
pub const PANEL_ORIGIN: (u32, u32) = (20, 20);

/// Overlay panel size (pixels).
pub const PANEL_SIZE: (u32, u32) = (150, 80);
