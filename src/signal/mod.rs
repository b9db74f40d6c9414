//! Signal Conditioning
//!
//! Turns the raw per-frame angle series into a smoothed, gap-filled series:
//!
//! - Valid sample: pushed into the trailing window, smoothed value emitted.
//! - Invalid sample within `max_gap_frames`: last smoothed value is held and
//!   the frame is flagged as a gap.
//! - Invalid sample beyond `max_gap_frames` (or before any valid data): the
//!   gap is unrecoverable, no value is emitted and all smoothing history is
//!   dropped so pre-gap angles never blend into post-gap output.
//!
//! At stream end [`SignalConditioner::flush`] releases the smoothed values
//! the trailing window still owes for the last frames.

mod smoothing;

pub use smoothing::Smoother;

use tracing::debug;

use crate::config::SmoothingConfig;
use crate::types::{AngleSample, ConditionedSample};

/// Stateful smoother and gap filler, one per pipeline instance.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    smoother: Smoother,
    max_gap_frames: u32,
    last_smoothed: Option<f64>,
    gap_length: u32,
    /// Frame index and timestamp of the newest sample
    last_frame: Option<(u64, f64)>,
}

impl SignalConditioner {
    pub fn new(config: &SmoothingConfig) -> Self {
        Self {
            smoother: Smoother::new(config),
            max_gap_frames: config.max_gap_frames,
            last_smoothed: None,
            gap_length: 0,
            last_frame: None,
        }
    }

    /// Condition the next angle sample.
    pub fn process(&mut self, sample: &AngleSample) -> ConditionedSample {
        self.last_frame = Some((sample.frame_index, sample.timestamp));
        if let Some(angle) = sample.angle_degrees {
            if self.gap_length > 0 {
                debug!(
                    frame = sample.frame_index,
                    gap_frames = self.gap_length,
                    "Valid angle resumed after gap"
                );
            }
            let smoothed = self.smoother.push(angle);
            self.last_smoothed = Some(smoothed);
            self.gap_length = 0;
            return ConditionedSample {
                frame_index: sample.frame_index,
                timestamp: sample.timestamp,
                smoothed_angle: Some(smoothed),
                is_gap: false,
                gap_length: 0,
                raw_angle: Some(angle),
            };
        }

        self.gap_length = self.gap_length.saturating_add(1);

        let held = if self.gap_length <= self.max_gap_frames {
            self.last_smoothed
        } else {
            None
        };

        if held.is_none() && (self.last_smoothed.is_some() || !self.smoother.is_empty()) {
            debug!(
                frame = sample.frame_index,
                gap_frames = self.gap_length,
                "Gap unrecoverable, dropping smoothing history"
            );
            self.smoother.reset();
            self.last_smoothed = None;
        }

        ConditionedSample {
            frame_index: sample.frame_index,
            timestamp: sample.timestamp,
            smoothed_angle: held,
            is_gap: true,
            gap_length: self.gap_length,
            raw_angle: None,
        }
    }

    /// End of stream: the lagging tail of the smoothed series, oldest first.
    ///
    /// Samples are non-gap and stamped with the last frame seen, since that
    /// is when they become known. Empty after an unrecoverable gap. Leaves
    /// the conditioner in its stream-start state.
    pub fn flush(&mut self) -> Vec<ConditionedSample> {
        let Some((frame_index, timestamp)) = self.last_frame else {
            return Vec::new();
        };
        let tail: Vec<ConditionedSample> = self
            .smoother
            .flush()
            .into_iter()
            .map(|smoothed| ConditionedSample {
                frame_index,
                timestamp,
                smoothed_angle: Some(smoothed),
                is_gap: false,
                gap_length: 0,
                raw_angle: None,
            })
            .collect();
        if !tail.is_empty() {
            debug!(frame = frame_index, samples = tail.len(), "Flushed smoothing tail");
        }
        self.reset();
        tail
    }

    /// Consecutive invalid frames seen so far (0 after a valid sample).
    pub fn gap_length(&self) -> u32 {
        self.gap_length
    }

    /// Back to the stream-start state.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last_smoothed = None;
        self.gap_length = 0;
        self.last_frame = None;
    }
}
