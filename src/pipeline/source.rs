//! Frame, detector and sink abstractions.
//!
//! The pipeline only sees three traits:
//!
//! - [`FrameSource`]: lazy, finite, forward-only frames (not restartable)
//! - [`PoseDetector`]: one blocking detection call per frame, no retry
//! - [`FrameSink`]: receives every frame in input order after annotation
//!
//! Video container decoding is left to whatever produces the frames; the
//! provided sources read numbered image files or run headless.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{ArmLandmarks, Landmark, PoseDetection, VideoInfo};

/// Errors from frame sources, detectors and sinks.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error on {}: {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("cannot decode frame {}: {}", .0.display(), .1)]
    Decode(PathBuf, image::ImageError),
    #[error("cannot encode frame {}: {}", .0.display(), .1)]
    Encode(PathBuf, image::ImageError),
    #[error("no image frames (png/jpg) found in {}", .0.display())]
    NoFrames(PathBuf),
    #[error("invalid frame rate {0} (must be > 0)")]
    InvalidFps(f64),
    #[error("detector failed: {0}")]
    Detector(String),
}

/// One decoded frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    /// Presentation time in seconds
    pub timestamp: f64,
    /// Pixels; `None` for headless sources
    pub image: Option<RgbImage>,
}

/// Events produced by a frame source.
#[derive(Debug)]
pub enum FrameEvent {
    Frame(Frame),
    /// No more frames. Sources keep returning this once reached.
    Eof,
}

/// Where frames come from.
pub trait FrameSource: Send {
    /// Read the next frame.
    ///
    /// Returns `Err` when a frame exists but cannot be read.
    fn next_frame(&mut self) -> Result<FrameEvent, SourceError>;

    fn info(&self) -> &VideoInfo;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

/// The external pose landmark detector.
pub trait PoseDetector: Send {
    /// Detect the arms in one frame. `Ok(None)` means nobody was found.
    ///
    /// An `Err` is not retried; the frame becomes an invalid sample.
    fn detect(&mut self, frame: &Frame) -> Result<Option<PoseDetection>, SourceError>;

    fn detector_name(&self) -> &str;
}

/// Where annotated frames go.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SourceError>;

    /// Flush after the last frame.
    fn finish(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

fn check_fps(fps: f64) -> Result<f64, SourceError> {
    if fps > 0.0 && fps.is_finite() {
        Ok(fps)
    } else {
        Err(SourceError::InvalidFps(fps))
    }
}

#[allow(clippy::cast_precision_loss)]
fn timestamp_for(index: u64, fps: f64) -> f64 {
    index as f64 / fps
}

// ============================================================================
// Image Sequence Source (numbered frame files)
// ============================================================================

/// Reads a directory of PNG/JPEG frames in file-name order at a fixed rate.
pub struct ImageSequenceSource {
    paths: std::vec::IntoIter<PathBuf>,
    next_index: u64,
    info: VideoInfo,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> Result<Self, SourceError> {
        let fps = check_fps(fps)?;
        let entries = fs::read_dir(dir).map_err(|e| SourceError::Io(dir.to_path_buf(), e))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        paths.sort();

        let first = paths.first().ok_or_else(|| SourceError::NoFrames(dir.to_path_buf()))?;
        let (width, height) =
            image::image_dimensions(first).map_err(|e| SourceError::Decode(first.clone(), e))?;

        let info = VideoInfo {
            source: dir.display().to_string(),
            fps,
            width,
            height,
            expected_frames: Some(paths.len() as u64),
        };
        debug!(frames = paths.len(), width, height, "Opened image sequence");

        Ok(Self {
            paths: paths.into_iter(),
            next_index: 0,
            info,
        })
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|ext| matches!(ext.as_str(), "png" | "jpg" | "jpeg"))
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<FrameEvent, SourceError> {
        let Some(path) = self.paths.next() else {
            return Ok(FrameEvent::Eof);
        };
        let image = image::open(&path)
            .map_err(|e| SourceError::Decode(path.clone(), e))?
            .to_rgb8();

        let index = self.next_index;
        self.next_index += 1;
        Ok(FrameEvent::Frame(Frame {
            index,
            timestamp: timestamp_for(index, self.info.fps),
            image: Some(image),
        }))
    }

    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn source_name(&self) -> &str {
        "image-sequence"
    }
}

// ============================================================================
// Timeline Source (headless)
// ============================================================================

/// Yields `frame_count` pixel-less frames; used when only recorded
/// detections are analyzed.
pub struct TimelineSource {
    next_index: u64,
    frame_count: u64,
    info: VideoInfo,
}

impl TimelineSource {
    pub fn new(label: impl Into<String>, frame_count: u64, fps: f64) -> Result<Self, SourceError> {
        let fps = check_fps(fps)?;
        Ok(Self {
            next_index: 0,
            frame_count,
            info: VideoInfo {
                source: label.into(),
                fps,
                width: 0,
                height: 0,
                expected_frames: Some(frame_count),
            },
        })
    }
}

impl FrameSource for TimelineSource {
    fn next_frame(&mut self) -> Result<FrameEvent, SourceError> {
        if self.next_index >= self.frame_count {
            return Ok(FrameEvent::Eof);
        }
        let index = self.next_index;
        self.next_index += 1;
        Ok(FrameEvent::Frame(Frame {
            index,
            timestamp: timestamp_for(index, self.info.fps),
            image: None,
        }))
    }

    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn source_name(&self) -> &str {
        "timeline"
    }
}

// ============================================================================
// Recorded Pose Detector (JSON lines)
// ============================================================================

/// Optional first line of a pose recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingHeader {
    pub fps: f64,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One frame of a pose recording.
///
/// A line carries either a MediaPipe landmark array or explicit arms; a line
/// with neither means "no detection" for that frame. Frames missing from the
/// recording are treated the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub frame: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<Vec<Landmark>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<ArmLandmarks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<ArmLandmarks>,
}

impl RecordedFrame {
    pub fn detection(&self) -> Option<PoseDetection> {
        if let Some(landmarks) = &self.landmarks {
            return PoseDetection::from_mediapipe(landmarks);
        }
        let pose = PoseDetection {
            left: self.left,
            right: self.right,
        };
        (!pose.is_empty()).then_some(pose)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordingLine {
    Frame(RecordedFrame),
    Header(RecordingHeader),
}

/// Replays detections recorded by an external pose estimator.
#[derive(Debug, Clone)]
pub struct RecordedPoseDetector {
    detections: HashMap<u64, PoseDetection>,
    frame_count: u64,
    header: Option<RecordingHeader>,
    skipped_lines: usize,
}

impl RecordedPoseDetector {
    /// Load a JSON-lines recording from disk.
    ///
    /// See [`RecordedPoseDetector::from_reader`] for `max_frame_lead`.
    pub fn open(path: &Path, max_frame_lead: u64) -> Result<Self, SourceError> {
        let file = fs::File::open(path).map_err(|e| SourceError::Io(path.to_path_buf(), e))?;
        let detector = Self::from_reader(BufReader::new(file), max_frame_lead)
            .map_err(|e| SourceError::Io(path.to_path_buf(), e))?;
        if detector.skipped_lines > 0 {
            warn!(
                path = %path.display(),
                skipped = detector.skipped_lines,
                "Skipped malformed pose recording lines"
            );
        }
        Ok(detector)
    }

    /// Parse a recording. Malformed lines are logged and skipped.
    ///
    /// Frames without a detection may be left out of a recording, so frame
    /// indices can run ahead of line numbers, but by no more than
    /// `max_frame_lead`. Lines past that bound are skipped like malformed
    /// ones; the headless timeline never walks more frames than that.
    pub fn from_reader<R: BufRead>(reader: R, max_frame_lead: u64) -> Result<Self, std::io::Error> {
        let mut detector = Self {
            detections: HashMap::new(),
            frame_count: 0,
            header: None,
            skipped_lines: 0,
        };

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<RecordingLine>(trimmed) {
                Ok(RecordingLine::Frame(record)) => {
                    let lead = record.frame.saturating_sub(line_no as u64);
                    let Some(count) = record.frame.checked_add(1).filter(|_| lead <= max_frame_lead) else {
                        warn!(
                            "[RecordedPoseDetector] Line {}: frame index {} out of range, skipped",
                            line_no + 1,
                            record.frame
                        );
                        detector.skipped_lines += 1;
                        continue;
                    };
                    detector.frame_count = detector.frame_count.max(count);
                    if let Some(pose) = record.detection() {
                        detector.detections.insert(record.frame, pose);
                    } else {
                        detector.detections.remove(&record.frame);
                    }
                }
                Ok(RecordingLine::Header(header)) => {
                    detector.header = Some(header);
                }
                Err(e) => {
                    warn!("[RecordedPoseDetector] Line {}: failed to parse: {}", line_no + 1, e);
                    detector.skipped_lines += 1;
                }
            }
        }

        Ok(detector)
    }

    /// One past the highest frame index in the recording.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn header(&self) -> Option<&RecordingHeader> {
        self.header.as_ref()
    }

    /// Frames that carry a detection.
    pub fn detected_frames(&self) -> usize {
        self.detections.len()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

impl PoseDetector for RecordedPoseDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<PoseDetection>, SourceError> {
        Ok(self.detections.get(&frame.index).copied())
    }

    fn detector_name(&self) -> &str {
        "recorded"
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// Writes each frame as `frame_NNNNNN.png` into a directory.
///
/// Headless frames are counted but produce no file.
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path) -> Result<Self, SourceError> {
        fs::create_dir_all(dir).map_err(|e| SourceError::Io(dir.to_path_buf(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), SourceError> {
        if let Some(image) = &frame.image {
            let path = self.dir.join(format!("frame_{:06}.png", frame.index));
            image
                .save(&path)
                .map_err(|e| SourceError::Encode(path.clone(), e))?;
            self.written += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SourceError> {
        debug!(dir = %self.dir.display(), frames = self.written, "Annotated frames written");
        Ok(())
    }
}

/// Discards frames.
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), SourceError> {
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn frame(index: u64) -> Frame {
        Frame {
            index,
            timestamp: 0.0,
            image: None,
        }
    }

    #[test]
    fn test_timeline_source_yields_count_then_eof() {
        let mut source = TimelineSource::new("t", 3, 30.0).unwrap();
        let mut indices = Vec::new();
        while let FrameEvent::Frame(f) = source.next_frame().unwrap() {
            indices.push(f.index);
        }
        assert_eq!(indices, vec![0, 1, 2]);
        // Stays at EOF
        assert!(matches!(source.next_frame().unwrap(), FrameEvent::Eof));
    }

    #[test]
    fn test_timeline_timestamps_follow_fps() {
        let mut source = TimelineSource::new("t", 11, 10.0).unwrap();
        let mut last = None;
        while let FrameEvent::Frame(f) = source.next_frame().unwrap() {
            last = Some(f.timestamp);
        }
        assert!((last.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_zero_fps() {
        assert!(matches!(
            TimelineSource::new("t", 3, 0.0),
            Err(SourceError::InvalidFps(_))
        ));
    }

    #[test]
    fn test_recording_formats_and_malformed_lines() {
        let arm = r#"{"shoulder":{"x":0.5,"y":0.3,"confidence":0.9},"elbow":{"x":0.5,"y":0.5,"confidence":0.9},"wrist":{"x":0.7,"y":0.5,"confidence":0.9}}"#;
        let landmarks: Vec<String> = (0..33)
            .map(|i| format!(r#"{{"x":{}.0,"y":1.0,"visibility":0.8}}"#, i))
            .collect();
        let recording = format!(
            "{{\"fps\": 25.0, \"width\": 640, \"height\": 480}}\n\
             {{\"frame\": 0, \"left\": {arm}}}\n\
             not json at all\n\
             {{\"frame\": 1}}\n\
             \n\
             {{\"frame\": 3, \"landmarks\": [{}]}}\n",
            landmarks.join(",")
        );

        let mut det = RecordedPoseDetector::from_reader(recording.as_bytes(), 100).unwrap();
        assert_eq!(det.header().map(|h| h.fps), Some(25.0));
        assert_eq!(det.frame_count(), 4);
        assert_eq!(det.skipped_lines(), 1);
        assert_eq!(det.detected_frames(), 2);

        let f0 = det.detect(&frame(0)).unwrap().unwrap();
        assert!(f0.left.is_some() && f0.right.is_none());
        assert!(det.detect(&frame(1)).unwrap().is_none());
        assert!(det.detect(&frame(2)).unwrap().is_none());
        let f3 = det.detect(&frame(3)).unwrap().unwrap();
        assert_eq!(f3.right.unwrap().elbow.x, 14.0);
        assert_eq!(f3.left.unwrap().wrist.confidence, 0.8);
    }

    #[test]
    fn test_out_of_range_frame_indices_are_skipped() {
        let recording = format!(
            "{{\"frame\": 0}}\n\
             {{\"frame\": {}}}\n\
             {{\"frame\": 5000}}\n\
             {{\"frame\": 40}}\n",
            u64::MAX
        );
        let det = RecordedPoseDetector::from_reader(recording.as_bytes(), 100).unwrap();
        assert_eq!(det.skipped_lines(), 2);
        // Frames 1..40 were omitted, which is within the lead
        assert_eq!(det.frame_count(), 41);
    }

    #[test]
    fn test_unbounded_lead_still_rejects_overflow() {
        let recording = format!("{{\"frame\": {}}}\n", u64::MAX);
        let det = RecordedPoseDetector::from_reader(recording.as_bytes(), u64::MAX).unwrap();
        assert_eq!(det.skipped_lines(), 1);
        assert_eq!(det.frame_count(), 0);
    }

    #[test]
    fn test_short_landmark_list_is_no_detection() {
        let record = RecordedFrame {
            frame: 0,
            landmarks: Some(vec![Landmark::new(0.0, 0.0, 1.0); 5]),
            left: None,
            right: None,
        };
        assert!(record.detection().is_none());
    }

    #[test]
    fn test_image_sequence_roundtrip_through_sink() {
        let input = tempfile::tempdir().unwrap();
        for i in 0..3u8 {
            let img = RgbImage::from_pixel(8, 6, Rgb([i, i, i]));
            img.save(input.path().join(format!("f{i:03}.png"))).unwrap();
        }
        // Non-frame files are ignored
        fs::write(input.path().join("notes.txt"), "x").unwrap();

        let mut source = ImageSequenceSource::open(input.path(), 30.0).unwrap();
        assert_eq!(source.info().expected_frames, Some(3));
        assert_eq!((source.info().width, source.info().height), (8, 6));

        let output = tempfile::tempdir().unwrap();
        let mut sink = ImageSequenceSink::create(&output.path().join("out")).unwrap();
        let mut seen = Vec::new();
        while let FrameEvent::Frame(f) = source.next_frame().unwrap() {
            seen.push(f.image.as_ref().map(|img| img.get_pixel(0, 0)[0]));
            sink.write_frame(&f).unwrap();
        }
        sink.finish().unwrap();

        assert_eq!(seen, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(sink.frames_written(), 3);
        assert!(output.path().join("out/frame_000002.png").exists());
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::open(dir.path(), 30.0),
            Err(SourceError::NoFrames(_))
        ));
    }
}
