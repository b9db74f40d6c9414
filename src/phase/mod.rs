//! Phase State Machine
//!
//! Converts the conditioned elbow angle stream into confirmed phase
//! transitions and finalized reps.
//!
//! ## States
//!
//! - `UNKNOWN`: stream start, nothing confirmed yet
//! - `DOWN`: arm extended, angle at or above `down_threshold`
//! - `UP`: arm flexed, angle at or below `up_threshold`
//!
//! Angles strictly between the thresholds form a dead zone that never causes
//! a transition (hysteresis). A transition needs `min_hold_frames`
//! consecutive non-gap samples in the target zone (debounce).
//!
//! ## Gaps
//!
//! | Sample                  | Effect on a pending candidate |
//! |-------------------------|-------------------------------|
//! | dead zone / own zone    | reset                         |
//! | held gap (value held)   | paused                        |
//! | unrecoverable gap       | reset, phase frozen           |
//!
//! ## Reps
//!
//! The first confirmed DOWN is the baseline. With `full_cycle` completion a
//! rep is emitted when DOWN is confirmed again after an UP; with `top` it is
//! emitted as soon as UP is confirmed after a baseline. Flexion before any
//! baseline and cycles cut off by the end of the stream are kept as
//! [`IncompleteRep`] diagnostics and never counted.

mod cycle;

use tracing::{debug, info};

use crate::config::{PhaseConfig, RepCompletion};
use crate::types::{
    ConditionedSample, IncompleteReason, IncompleteRep, Phase, PhaseTransition, RepEvent,
};
use cycle::{Candidate, Extension, OpenCycle};

/// Rejected phase configuration.
#[derive(Debug, thiserror::Error)]
pub enum PhaseConfigError {
    #[error("up_threshold ({up:.1}) must be below down_threshold ({down:.1})")]
    InvertedThresholds { up: f64, down: f64 },
    #[error("min_hold_frames must be at least 1")]
    ZeroHold,
}

/// Result of feeding one conditioned sample to the state machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseUpdate {
    /// Phase after this sample
    pub phase: Phase,
    pub transition: Option<PhaseTransition>,
    pub rep: Option<RepEvent>,
}

/// Hysteresis and debounce state for one video.
#[derive(Debug, Clone)]
pub struct PhaseStateMachine {
    config: PhaseConfig,
    phase: Phase,
    candidate: Option<Candidate>,
    extension: Option<Extension>,
    open_cycle: Option<OpenCycle>,
    baseline_frame: Option<u64>,
    rep_count: u32,
    transition_count: u64,
    incomplete: Vec<IncompleteRep>,
    last_frame: Option<u64>,
    finished: bool,
}

impl PhaseStateMachine {
    pub fn new(config: PhaseConfig) -> Result<Self, PhaseConfigError> {
        // `!(a < b)` so NaN thresholds are rejected too
        if !(config.up_threshold < config.down_threshold) {
            return Err(PhaseConfigError::InvertedThresholds {
                up: config.up_threshold,
                down: config.down_threshold,
            });
        }
        if config.min_hold_frames == 0 {
            return Err(PhaseConfigError::ZeroHold);
        }

        Ok(Self {
            config,
            phase: Phase::Unknown,
            candidate: None,
            extension: None,
            open_cycle: None,
            baseline_frame: None,
            rep_count: 0,
            transition_count: 0,
            incomplete: Vec::new(),
            last_frame: None,
            finished: false,
        })
    }

    /// Feed the next conditioned sample.
    pub fn process(&mut self, sample: &ConditionedSample) -> PhaseUpdate {
        self.last_frame = Some(sample.frame_index);

        let angle = match (sample.is_gap, sample.smoothed_angle) {
            (false, Some(angle)) => angle,
            // Held value: candidate paused, nothing evaluated
            (true, Some(_)) => return self.idle(),
            (_, None) => {
                self.candidate = None;
                return self.idle();
            }
        };

        self.track(sample, angle);

        let Some(zone) = self.zone(angle).filter(|zone| *zone != self.phase) else {
            self.candidate = None;
            return self.idle();
        };

        let continues = matches!(self.candidate, Some(c) if c.target == zone);
        if continues {
            if let Some(candidate) = self.candidate.as_mut() {
                candidate.extend(angle);
            }
        } else {
            self.candidate = Some(Candidate::start(
                zone,
                sample.frame_index,
                sample.timestamp,
                angle,
            ));
        }

        match self.candidate {
            Some(candidate) if candidate.count >= self.config.min_hold_frames => {
                self.candidate = None;
                self.confirm(candidate, sample, angle)
            }
            _ => self.idle(),
        }
    }

    /// Close the stream. A cycle still open becomes an incomplete rep.
    ///
    /// Idempotent: only the first call records anything.
    pub fn finish(&mut self) -> Option<IncompleteRep> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.candidate = None;

        let cycle = self.open_cycle.take()?;
        let reason = if cycle.has_baseline {
            IncompleteReason::StreamEnded
        } else {
            IncompleteReason::NoBaseline
        };
        let incomplete = IncompleteRep {
            start_frame: cycle.start_frame,
            last_frame: self.last_frame.unwrap_or(cycle.start_frame),
            min_angle: Some(cycle.min_angle),
            reason,
        };
        info!(
            start_frame = incomplete.start_frame,
            last_frame = incomplete.last_frame,
            reason = ?reason,
            "Partial rep at end of stream not counted"
        );
        self.incomplete.push(incomplete);
        Some(incomplete)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Reps finalized so far. Never decreases.
    pub fn rep_count(&self) -> u32 {
        self.rep_count
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Partial cycles recorded so far.
    pub fn incomplete_reps(&self) -> &[IncompleteRep] {
        &self.incomplete
    }

    /// Frame where the first DOWN was confirmed.
    pub fn baseline_frame(&self) -> Option<u64> {
        self.baseline_frame
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn idle(&self) -> PhaseUpdate {
        PhaseUpdate {
            phase: self.phase,
            transition: None,
            rep: None,
        }
    }

    /// Zone an angle falls in; `None` for the dead zone.
    fn zone(&self, angle: f64) -> Option<Phase> {
        if angle <= self.config.up_threshold {
            Some(Phase::Up)
        } else if angle >= self.config.down_threshold {
            Some(Phase::Down)
        } else {
            None
        }
    }

    fn track(&mut self, sample: &ConditionedSample, angle: f64) {
        match self.phase {
            Phase::Down => {
                if let Some(ext) = self.extension.as_mut() {
                    ext.observe(
                        sample.frame_index,
                        sample.timestamp,
                        angle,
                        self.config.down_threshold,
                    );
                }
            }
            Phase::Up => {
                if let Some(cycle) = self.open_cycle.as_mut() {
                    cycle.observe(angle);
                }
            }
            Phase::Unknown => {}
        }
    }

    fn confirm(&mut self, candidate: Candidate, sample: &ConditionedSample, angle: f64) -> PhaseUpdate {
        let transition = PhaseTransition {
            frame_index: sample.frame_index,
            from_phase: self.phase,
            to_phase: candidate.target,
            angle_at_transition: angle,
        };
        self.phase = candidate.target;
        self.transition_count += 1;

        debug!(
            frame = transition.frame_index,
            from = %transition.from_phase,
            to = %transition.to_phase,
            angle,
            "Phase transition"
        );

        let rep = match candidate.target {
            Phase::Up => self.enter_up(&candidate, sample),
            Phase::Down => self.enter_down(&candidate, sample, angle),
            Phase::Unknown => None,
        };

        PhaseUpdate {
            phase: self.phase,
            transition: Some(transition),
            rep,
        }
    }

    fn enter_up(&mut self, candidate: &Candidate, sample: &ConditionedSample) -> Option<RepEvent> {
        match (self.extension.take(), self.config.completion) {
            (Some(ext), RepCompletion::Top) => Some(self.emit_rep(
                ext.anchor_frame,
                ext.anchor_timestamp,
                sample,
                ext.min_since_anchor,
                ext.peak,
            )),
            (Some(ext), RepCompletion::FullCycle) => {
                self.open_cycle = Some(OpenCycle::from_extension(&ext));
                None
            }
            (None, _) => {
                debug!(frame = sample.frame_index, "Flexion before any DOWN baseline");
                self.open_cycle = Some(OpenCycle::without_baseline(
                    candidate.start_frame,
                    candidate.start_timestamp,
                    candidate.run_min,
                ));
                None
            }
        }
    }

    fn enter_down(
        &mut self,
        candidate: &Candidate,
        sample: &ConditionedSample,
        angle: f64,
    ) -> Option<RepEvent> {
        let rep = match self.open_cycle.take() {
            Some(cycle) if cycle.has_baseline => {
                let max_angle = cycle
                    .opening_peak
                    .map_or(candidate.run_max, |peak| peak.max(candidate.run_max));
                Some(self.emit_rep(
                    cycle.start_frame,
                    cycle.start_timestamp,
                    sample,
                    cycle.min_angle.min(candidate.run_min),
                    max_angle,
                ))
            }
            Some(cycle) => {
                self.incomplete.push(IncompleteRep {
                    start_frame: cycle.start_frame,
                    last_frame: sample.frame_index,
                    min_angle: Some(cycle.min_angle),
                    reason: IncompleteReason::NoBaseline,
                });
                None
            }
            None => None,
        };

        if self.baseline_frame.is_none() {
            self.baseline_frame = Some(sample.frame_index);
            info!(frame = sample.frame_index, angle, "DOWN baseline established");
        }
        self.extension = Some(Extension::new(
            sample.frame_index,
            sample.timestamp,
            candidate.run_max,
            angle,
        ));
        rep
    }

    fn emit_rep(
        &mut self,
        start_frame: u64,
        start_timestamp: f64,
        sample: &ConditionedSample,
        min_angle: f64,
        max_angle: f64,
    ) -> RepEvent {
        self.rep_count += 1;
        let rep = RepEvent {
            rep_index: self.rep_count,
            start_frame,
            end_frame: sample.frame_index,
            min_angle,
            max_angle,
            duration_seconds: (sample.timestamp - start_timestamp).max(0.0),
        };
        info!(
            "🏋️ Rep {} counted: frames {}-{}, elbow {:.1}°-{:.1}°, {:.2}s",
            rep.rep_index, rep.start_frame, rep.end_frame, rep.min_angle, rep.max_angle, rep.duration_seconds
        );
        rep
    }
}
