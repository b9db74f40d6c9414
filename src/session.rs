//! Session Aggregation
//!
//! Folds the per-frame and per-rep event streams of one video into a
//! [`SessionSummary`]. Rebuilt from scratch for every video.

use statrs::statistics::Statistics;

use crate::types::{
    AngleRange, AngleSample, ConditionedSample, FrameCoverage, IncompleteRep, InvalidReason,
    PhaseTransition, RepEvent, SessionSummary,
};

/// Accumulates events for one video.
#[derive(Debug, Clone, Default)]
pub struct SessionAggregator {
    reps: Vec<RepEvent>,
    transition_count: u64,
    incomplete: Vec<IncompleteRep>,
    coverage: FrameCoverage,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame's raw and conditioned outcome.
    pub fn record_frame(&mut self, angle: &AngleSample, conditioned: &ConditionedSample) {
        let c = &mut self.coverage;
        c.frames_processed += 1;

        match angle.invalid_reason {
            None => c.valid_frames += 1,
            Some(InvalidReason::DetectionUnavailable) => c.detection_unavailable_frames += 1,
            Some(InvalidReason::InsufficientConfidence) => c.low_confidence_frames += 1,
            Some(InvalidReason::DegenerateGeometry) => c.degenerate_frames += 1,
        }

        if conditioned.is_unrecoverable_gap() {
            c.unrecoverable_gap_frames += 1;
        } else if conditioned.is_gap {
            c.held_gap_frames += 1;
        }
    }

    pub fn record_transition(&mut self, _transition: &PhaseTransition) {
        self.transition_count += 1;
    }

    pub fn record_rep(&mut self, rep: &RepEvent) {
        self.reps.push(*rep);
    }

    pub fn record_incomplete(&mut self, incomplete: &IncompleteRep) {
        self.incomplete.push(*incomplete);
    }

    pub fn reps(&self) -> &[RepEvent] {
        &self.reps
    }

    pub fn coverage(&self) -> &FrameCoverage {
        &self.coverage
    }

    /// Summary of everything recorded so far.
    pub fn summary(&self) -> SessionSummary {
        let durations: Vec<f64> = self.reps.iter().map(|r| r.duration_seconds).collect();
        let angle_range_per_rep: Vec<AngleRange> = self
            .reps
            .iter()
            .map(|r| AngleRange {
                rep_index: r.rep_index,
                min_angle: r.min_angle,
                max_angle: r.max_angle,
                range: r.angle_range(),
            })
            .collect();

        let (mean_rep_duration, rep_duration_std_dev, min_rep_duration, max_rep_duration) =
            if durations.is_empty() {
                (0.0, 0.0, None, None)
            } else {
                let std_dev = if durations.len() > 1 {
                    durations.iter().std_dev()
                } else {
                    0.0
                };
                (
                    durations.iter().mean(),
                    std_dev,
                    Some(Statistics::min(durations.iter())),
                    Some(Statistics::max(durations.iter())),
                )
            };

        let mean_angle_range = if angle_range_per_rep.is_empty() {
            0.0
        } else {
            angle_range_per_rep.iter().map(|r| r.range).mean()
        };

        SessionSummary {
            total_reps: u32::try_from(self.reps.len()).unwrap_or(u32::MAX),
            mean_rep_duration,
            rep_duration_std_dev,
            min_rep_duration,
            max_rep_duration,
            angle_range_per_rep,
            mean_angle_range,
            transition_count: self.transition_count,
            incomplete_reps: self.incomplete.clone(),
            coverage: self.coverage,
            detection_coverage: self.coverage.valid_ratio(),
        }
    }
}

/// Summary of a finished list of reps, without frame coverage.
pub fn summarize(reps: &[RepEvent]) -> SessionSummary {
    let mut agg = SessionAggregator::new();
    for rep in reps {
        agg.record_rep(rep);
    }
    agg.summary()
}
