//! Frame loop for one video.
//!
//! Pulls frames from a [`FrameSource`], asks the [`PoseDetector`] for
//! landmarks, runs the [`RepAnalyzer`], draws the overlay and hands every
//! frame to the [`FrameSink`] in input order.
//!
//! Per-frame problems (no detection, detector error, low confidence) never
//! stop the loop. A source that fails before its first frame is fatal; one
//! that fails later ends the run early with a partial report.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::analyzer::{AnalysisError, RepAnalyzer};
use super::source::{FrameEvent, FrameSink, FrameSource, PoseDetector, SourceError};
use crate::annotate::Annotator;
use crate::config::AnalysisConfig;
use crate::types::{AnalysisReport, JointSample};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("frame source failed: {0}")]
    Source(#[source] SourceError),
    #[error("frame sink failed: {0}")]
    Sink(#[source] SourceError),
    #[error("overlay font failed to load: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("cancelled after {frames_processed} frames")]
    Cancelled { frames_processed: u64 },
}

/// One analysis run over one video.
pub struct VideoPipeline {
    config: AnalysisConfig,
    cancel_token: CancellationToken,
}

impl VideoPipeline {
    pub fn new(config: AnalysisConfig, cancel_token: CancellationToken) -> Self {
        Self {
            config,
            cancel_token,
        }
    }

    /// Process every frame and build the report.
    ///
    /// Checks for cancellation between frames.
    pub fn run<S, D, K>(
        &self,
        source: &mut S,
        detector: &mut D,
        sink: &mut K,
    ) -> Result<AnalysisReport, PipelineError>
    where
        S: FrameSource + ?Sized,
        D: PoseDetector + ?Sized,
        K: FrameSink + ?Sized,
    {
        let mut analyzer = RepAnalyzer::new(&self.config)?;
        let annotator = Annotator::new(self.config.annotation.clone(), &self.config.phase)?;
        let progress_every = self.config.pipeline.progress_interval_frames;
        let started = Instant::now();

        let video = source.info().clone();
        info!(
            "🎬 Analyzing {} ({}, detector: {}, {:.1} fps)",
            video.source,
            source.source_name(),
            detector.detector_name(),
            video.fps
        );

        let mut frames_processed = 0u64;
        let mut detector_failures = 0u64;
        let mut source_error = None;

        loop {
            if self.cancel_token.is_cancelled() {
                warn!(frames = frames_processed, "Pipeline cancelled");
                return Err(PipelineError::Cancelled { frames_processed });
            }

            let mut frame = match source.next_frame() {
                Ok(FrameEvent::Frame(frame)) => frame,
                Ok(FrameEvent::Eof) => {
                    info!("Source reached end ({} frames processed)", frames_processed);
                    break;
                }
                Err(e) if frames_processed == 0 => return Err(PipelineError::Source(e)),
                Err(e) => {
                    warn!("Source error after {} frames, finishing early: {}", frames_processed, e);
                    source_error = Some(e.to_string());
                    break;
                }
            };

            let pose = match detector.detect(&frame) {
                Ok(pose) => pose,
                Err(e) => {
                    detector_failures += 1;
                    warn!(frame = frame.index, "Detector error, frame treated as undetected: {}", e);
                    None
                }
            };

            let sample = JointSample::new(frame.index, frame.timestamp, pose);
            let analysis = analyzer.process(&sample)?;

            if let Some(image) = frame.image.as_mut() {
                annotator.render(image, &analysis.conditioned, analysis.phase, analysis.rep_count);
            }
            sink.write_frame(&frame).map_err(PipelineError::Sink)?;

            frames_processed += 1;
            if progress_every > 0 && frames_processed % progress_every == 0 {
                info!(
                    "📈 Progress: {} frames | Reps: {} | Phase: {}",
                    frames_processed, analysis.rep_count, analysis.phase
                );
            }
        }

        sink.finish().map_err(PipelineError::Sink)?;

        let result = analyzer.finish();
        let coverage = result.summary.coverage;

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("   Frames Processed:     {}", coverage.frames_processed);
        info!("   Valid Angle Frames:   {} ({:.0}%)", coverage.valid_frames, coverage.valid_ratio() * 100.0);
        info!("   Unrecoverable Gaps:   {}", coverage.unrecoverable_gap_frames);
        info!("   Detector Errors:      {}", detector_failures);
        info!("   Transitions:          {}", result.summary.transition_count);
        info!("   Reps Counted:         {}", result.summary.total_reps);
        info!("   Incomplete Reps:      {}", result.summary.incomplete_reps.len());
        info!("   Wall Time:            {:.2}s", started.elapsed().as_secs_f64());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        Ok(AnalysisReport {
            duration_seconds: video.duration_seconds(frames_processed),
            video,
            summary: result.summary,
            reps: result.reps,
            transitions: result.transitions,
            source_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::source::{Frame, NullSink, TimelineSource};
    use crate::types::{ArmLandmarks, Landmark, PoseDetection, VideoInfo};
    use image::RgbImage;

    /// Detector that plays back one elbow angle per frame.
    struct ScriptedDetector {
        angles: Vec<Option<f64>>,
        fail_on: Option<u64>,
    }

    impl PoseDetector for ScriptedDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Option<PoseDetection>, SourceError> {
            if self.fail_on == Some(frame.index) {
                return Err(SourceError::Detector("model crashed".to_string()));
            }
            let Some(Some(deg)) = usize::try_from(frame.index).ok().and_then(|i| self.angles.get(i)).copied() else {
                return Ok(None);
            };
            let r = deg.to_radians();
            Ok(Some(PoseDetection {
                left: Some(ArmLandmarks {
                    shoulder: Landmark::new(0.5, 0.3, 0.9),
                    elbow: Landmark::new(0.5, 0.5, 0.9),
                    wrist: Landmark::new(0.5 + 0.2 * r.sin(), 0.5 - 0.2 * r.cos(), 0.9),
                }),
                right: None,
            }))
        }

        fn detector_name(&self) -> &str {
            "scripted"
        }
    }

    /// Source yielding small blank images, failing at a given frame.
    struct FlakySource {
        next: u64,
        fail_at: u64,
        info: VideoInfo,
    }

    impl FrameSource for FlakySource {
        fn next_frame(&mut self) -> Result<FrameEvent, SourceError> {
            if self.next == self.fail_at {
                return Err(SourceError::Io(
                    std::path::PathBuf::from(format!("frame_{index:06}.png", index = self.next)),
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "corrupt frame"),
                ));
            }
            let index = self.next;
            self.next += 1;
            Ok(FrameEvent::Frame(Frame {
                index,
                timestamp: index as f64 / 30.0,
                image: Some(RgbImage::new(200, 150)),
            }))
        }

        fn info(&self) -> &VideoInfo {
            &self.info
        }

        fn source_name(&self) -> &str {
            "flaky"
        }
    }

    fn cycle_angles(reps: usize) -> Vec<Option<f64>> {
        let mut angles = vec![Some(170.0); 10];
        for _ in 0..reps {
            angles.extend(vec![Some(60.0); 10]);
            angles.extend(vec![Some(170.0); 10]);
        }
        angles
    }

    #[test]
    fn test_run_counts_reps_and_passes_every_frame() {
        let angles = cycle_angles(3);
        let mut source = TimelineSource::new("scripted", angles.len() as u64, 30.0).unwrap();
        let mut detector = ScriptedDetector { angles, fail_on: None };
        let mut sink = NullSink::default();

        let pipeline = VideoPipeline::new(AnalysisConfig::default(), CancellationToken::new());
        let report = pipeline.run(&mut source, &mut detector, &mut sink).unwrap();

        assert_eq!(report.summary.total_reps, 3);
        assert_eq!(sink.frames_seen(), 70);
        assert_eq!(report.summary.coverage.frames_processed, 70);
        assert!((report.duration_seconds - 70.0 / 30.0).abs() < 1e-9);
        assert!(report.source_error.is_none());
    }

    #[test]
    fn test_detector_error_becomes_invalid_frame() {
        let angles = cycle_angles(1);
        let mut source = TimelineSource::new("scripted", angles.len() as u64, 30.0).unwrap();
        let mut detector = ScriptedDetector { angles, fail_on: Some(15) };
        let mut sink = NullSink::default();

        let pipeline = VideoPipeline::new(AnalysisConfig::default(), CancellationToken::new());
        let report = pipeline.run(&mut source, &mut detector, &mut sink).unwrap();

        assert_eq!(report.summary.total_reps, 1);
        assert_eq!(report.summary.coverage.detection_unavailable_frames, 1);
        assert_eq!(report.summary.coverage.held_gap_frames, 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let mut source = TimelineSource::new("t", 10, 30.0).unwrap();
        let mut detector = ScriptedDetector { angles: Vec::new(), fail_on: None };
        let pipeline = VideoPipeline::new(AnalysisConfig::default(), token);
        let err = pipeline
            .run(&mut source, &mut detector, &mut NullSink::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled { frames_processed: 0 }));
    }

    #[test]
    fn test_source_failure_mid_stream_gives_partial_report() {
        let mut source = FlakySource { next: 0, fail_at: 25, info: VideoInfo::default() };
        let mut detector = ScriptedDetector { angles: cycle_angles(2), fail_on: None };
        let mut sink = NullSink::default();
        let pipeline = VideoPipeline::new(AnalysisConfig::default(), CancellationToken::new());

        let report = pipeline.run(&mut source, &mut detector, &mut sink).unwrap();
        assert_eq!(report.summary.coverage.frames_processed, 25);
        assert!(report.source_error.is_some());
        // The first rep closes at frame 24, just before the failure
        assert_eq!(report.summary.total_reps, 1);
        assert_eq!(sink.frames_seen(), 25);
    }

    #[test]
    fn test_source_failure_on_first_frame_is_fatal() {
        let mut source = FlakySource { next: 0, fail_at: 0, info: VideoInfo::default() };
        let mut detector = ScriptedDetector { angles: Vec::new(), fail_on: None };
        let pipeline = VideoPipeline::new(AnalysisConfig::default(), CancellationToken::new());
        let err = pipeline
            .run(&mut source, &mut detector, &mut NullSink::default())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source(_)));
    }
}
