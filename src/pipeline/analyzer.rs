//! Per-frame analysis chain for one video.
//!
//! `JointSample → AngleEstimator → SignalConditioner → PhaseStateMachine`,
//! with every result folded into a [`SessionAggregator`]. Holds all
//! per-video state explicitly; nothing is shared between instances.

use tracing::debug;

use crate::angle::AngleEstimator;
use crate::config::{AnalysisConfig, ConfigError};
use crate::phase::{PhaseConfigError, PhaseStateMachine, PhaseUpdate};
use crate::session::SessionAggregator;
use crate::signal::SignalConditioner;
use crate::types::{
    AngleSample, ConditionedSample, JointSample, Phase, PhaseTransition, RepEvent, SessionSummary,
};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid phase configuration: {0}")]
    Phase(#[from] PhaseConfigError),
    /// Frames must arrive in strictly increasing order
    #[error("frame {got} arrived after frame {previous}")]
    NonMonotonicFrame { previous: u64, got: u64 },
}

/// Everything computed for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAnalysis {
    pub angle: AngleSample,
    pub conditioned: ConditionedSample,
    pub phase: Phase,
    /// Reps finalized up to and including this frame
    pub rep_count: u32,
    pub transition: Option<PhaseTransition>,
    pub rep: Option<RepEvent>,
}

/// Final output of a finished analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResult {
    pub summary: SessionSummary,
    pub reps: Vec<RepEvent>,
    pub transitions: Vec<PhaseTransition>,
}

/// Single-video analysis state.
#[derive(Debug, Clone)]
pub struct RepAnalyzer {
    estimator: AngleEstimator,
    conditioner: SignalConditioner,
    state_machine: PhaseStateMachine,
    aggregator: SessionAggregator,
    transitions: Vec<PhaseTransition>,
    last_frame: Option<u64>,
}

impl RepAnalyzer {
    /// Build an analyzer; the configuration is validated first.
    pub fn new(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            estimator: AngleEstimator::new(config.angle.clone()),
            conditioner: SignalConditioner::new(&config.smoothing),
            state_machine: PhaseStateMachine::new(config.phase.clone())?,
            aggregator: SessionAggregator::new(),
            transitions: Vec::new(),
            last_frame: None,
        })
    }

    /// Analyze the next frame.
    pub fn process(&mut self, sample: &JointSample) -> Result<FrameAnalysis, AnalysisError> {
        if let Some(previous) = self.last_frame {
            if sample.frame_index <= previous {
                return Err(AnalysisError::NonMonotonicFrame {
                    previous,
                    got: sample.frame_index,
                });
            }
        }
        self.last_frame = Some(sample.frame_index);

        let angle = self.estimator.estimate(sample);
        if let Some(reason) = angle.invalid_reason {
            debug!(frame = sample.frame_index, %reason, "Invalid angle sample");
        }
        let conditioned = self.conditioner.process(&angle);
        let update = self.state_machine.process(&conditioned);

        self.aggregator.record_frame(&angle, &conditioned);
        self.record(&update);

        Ok(FrameAnalysis {
            angle,
            conditioned,
            phase: update.phase,
            rep_count: self.state_machine.rep_count(),
            transition: update.transition,
            rep: update.rep,
        })
    }

    pub fn phase(&self) -> Phase {
        self.state_machine.phase()
    }

    pub fn rep_count(&self) -> u32 {
        self.state_machine.rep_count()
    }

    pub fn frames_processed(&self) -> u64 {
        self.aggregator.coverage().frames_processed
    }

    /// Close the stream and produce the session result.
    ///
    /// The smoother's lagging tail is played into the state machine first,
    /// so a rep whose final hang lasts exactly `min_hold_frames` still counts.
    pub fn finish(mut self) -> SessionResult {
        for conditioned in self.conditioner.flush() {
            let update = self.state_machine.process(&conditioned);
            self.record(&update);
        }
        self.state_machine.finish();
        for incomplete in self.state_machine.incomplete_reps() {
            self.aggregator.record_incomplete(incomplete);
        }
        SessionResult {
            summary: self.aggregator.summary(),
            reps: self.aggregator.reps().to_vec(),
            transitions: self.transitions,
        }
    }

    fn record(&mut self, update: &PhaseUpdate) {
        if let Some(transition) = &update.transition {
            self.aggregator.record_transition(transition);
            self.transitions.push(*transition);
        }
        if let Some(rep) = &update.rep {
            self.aggregator.record_rep(rep);
        }
    }
}

/// Run a whole sample stream through a fresh analyzer.
pub fn analyze_samples<I>(config: &AnalysisConfig, samples: I) -> Result<SessionResult, AnalysisError>
where
    I: IntoIterator<Item = JointSample>,
{
    let mut analyzer = RepAnalyzer::new(config)?;
    for sample in samples {
        analyzer.process(&sample)?;
    }
    Ok(analyzer.finish())
}
