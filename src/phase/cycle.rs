//! Bookkeeping for the DOWN → UP → DOWN cycle behind each rep.

use crate::types::Phase;

/// Consecutive non-gap samples in the zone of a phase other than the current one.
#[derive(Debug, Clone, Copy)]
pub(super) struct Candidate {
    pub target: Phase,
    pub count: u32,
    pub start_frame: u64,
    pub start_timestamp: f64,
    pub run_min: f64,
    pub run_max: f64,
}

impl Candidate {
    pub fn start(target: Phase, frame_index: u64, timestamp: f64, angle: f64) -> Self {
        Self {
            target,
            count: 1,
            start_frame: frame_index,
            start_timestamp: timestamp,
            run_min: angle,
            run_max: angle,
        }
    }

    pub fn extend(&mut self, angle: f64) {
        self.count += 1;
        self.run_min = self.run_min.min(angle);
        self.run_max = self.run_max.max(angle);
    }
}

/// The extended hang the next rep starts from. Only exists while in DOWN.
#[derive(Debug, Clone, Copy)]
pub(super) struct Extension {
    /// Last frame at or above `down_threshold`
    pub anchor_frame: u64,
    pub anchor_timestamp: f64,
    /// Largest angle seen in this DOWN phase
    pub peak: f64,
    /// Smallest angle since the anchor (the start of the descent)
    pub min_since_anchor: f64,
}

impl Extension {
    pub fn new(frame_index: u64, timestamp: f64, peak: f64, angle: f64) -> Self {
        Self {
            anchor_frame: frame_index,
            anchor_timestamp: timestamp,
            peak: peak.max(angle),
            min_since_anchor: angle,
        }
    }

    pub fn observe(&mut self, frame_index: u64, timestamp: f64, angle: f64, down_threshold: f64) {
        self.peak = self.peak.max(angle);
        if angle >= down_threshold {
            self.anchor_frame = frame_index;
            self.anchor_timestamp = timestamp;
            self.min_since_anchor = angle;
        } else {
            self.min_since_anchor = self.min_since_anchor.min(angle);
        }
    }
}

/// A flexion that has started but whose closing DOWN is not yet confirmed.
#[derive(Debug, Clone, Copy)]
pub(super) struct OpenCycle {
    pub start_frame: u64,
    pub start_timestamp: f64,
    pub opening_peak: Option<f64>,
    pub min_angle: f64,
    /// False when the flexion came before any DOWN baseline
    pub has_baseline: bool,
}

impl OpenCycle {
    pub fn from_extension(ext: &Extension) -> Self {
        Self {
            start_frame: ext.anchor_frame,
            start_timestamp: ext.anchor_timestamp,
            opening_peak: Some(ext.peak),
            min_angle: ext.min_since_anchor,
            has_baseline: true,
        }
    }

    pub fn without_baseline(start_frame: u64, timestamp: f64, min_angle: f64) -> Self {
        Self {
            start_frame,
            start_timestamp: timestamp,
            opening_peak: None,
            min_angle,
            has_baseline: false,
        }
    }

    pub fn observe(&mut self, angle: f64) {
        self.min_angle = self.min_angle.min(angle);
    }
}
