//! Video Processing Pipeline
//!
//! ```text
//! FrameSource ──► PoseDetector ──► RepAnalyzer ──► Annotator ──► FrameSink
//!   (frames)        (landmarks)     angle/smooth/     (overlay)    (ordered
//!                                   phase/session                   output)
//! ```
//!
//! One [`VideoPipeline`] owns all state for one video. [`BatchRunner`] runs
//! many of them side by side with bounded concurrency.

pub mod analyzer;
pub mod batch;
pub mod runner;
pub mod source;

pub use analyzer::{analyze_samples, AnalysisError, FrameAnalysis, RepAnalyzer, SessionResult};
pub use batch::{discover_jobs, BatchRunner, JobOutcome, JobResult, VideoJob};
pub use runner::{PipelineError, VideoPipeline};
pub use source::{
    Frame, FrameEvent, FrameSink, FrameSource, ImageSequenceSink, ImageSequenceSource, NullSink,
    PoseDetector, RecordedFrame, RecordedPoseDetector, RecordingHeader, SourceError,
    TimelineSource,
};
