//! Multi-video batch runner.
//!
//! Each video gets its own [`VideoPipeline`] on a blocking thread; videos
//! share no mutable state. Concurrency is bounded by a semaphore and each job
//! may carry a timeout. On timeout the job's cancellation token fires and the
//! pipeline stops at the next frame boundary; its concurrency slot is only
//! released once the worker thread has actually stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::runner::{PipelineError, VideoPipeline};
use super::source::{
    FrameSink, FrameSource, ImageSequenceSink, ImageSequenceSource, NullSink,
    RecordedPoseDetector, SourceError, TimelineSource,
};
use crate::config::AnalysisConfig;
use crate::types::AnalysisReport;

/// Pose recording file extension picked up by [`discover_jobs`].
pub const RECORDING_EXTENSION: &str = "jsonl";

// ============================================================================
// Jobs
// ============================================================================

/// One video to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub name: String,
    /// JSON-lines pose recording for the video
    pub poses: PathBuf,
    /// Directory of frame images; headless analysis when absent
    pub frames: Option<PathBuf>,
    /// Where annotated frames are written; discarded when absent
    pub output: Option<PathBuf>,
}

impl VideoJob {
    /// Open the job's source, detector and sink and run the pipeline.
    ///
    /// Blocking: call from a blocking thread.
    pub fn execute(
        &self,
        config: &AnalysisConfig,
        cancel_token: &CancellationToken,
    ) -> Result<AnalysisReport, PipelineError> {
        let mut detector = RecordedPoseDetector::open(&self.poses, config.pipeline.max_frame_lead)
            .map_err(PipelineError::Source)?;
        let fps = detector
            .header()
            .map_or(config.pipeline.default_fps, |h| h.fps);

        let mut source: Box<dyn FrameSource> = match &self.frames {
            Some(dir) => Box::new(ImageSequenceSource::open(dir, fps).map_err(PipelineError::Source)?),
            None => Box::new(
                TimelineSource::new(self.name.clone(), detector.frame_count(), fps)
                    .map_err(PipelineError::Source)?,
            ),
        };

        let mut sink: Box<dyn FrameSink> = match &self.output {
            Some(dir) => Box::new(ImageSequenceSink::create(dir).map_err(PipelineError::Sink)?),
            None => Box::new(NullSink::default()),
        };

        let pipeline = VideoPipeline::new(config.clone(), cancel_token.clone());
        let mut report = pipeline.run(source.as_mut(), &mut detector, sink.as_mut())?;
        report.video.source.clone_from(&self.name);
        Ok(report)
    }
}

/// Find every `<name>.jsonl` recording in `dir`.
///
/// A sibling directory `<name>/` holding frame images is used as the frame
/// source. With `output_root`, annotated frames go to `output_root/<name>/`.
pub fn discover_jobs(dir: &Path, output_root: Option<&Path>) -> Result<Vec<VideoJob>, SourceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| SourceError::Io(dir.to_path_buf(), e))?;

    let mut jobs: Vec<VideoJob> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(RECORDING_EXTENSION)
        })
        .filter_map(|poses| {
            let name = poses.file_stem()?.to_str()?.to_string();
            let frames_dir = dir.join(&name);
            Some(VideoJob {
                frames: frames_dir.is_dir().then_some(frames_dir),
                output: output_root.map(|root| root.join(&name)),
                name,
                poses,
            })
        })
        .collect();

    jobs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(jobs)
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { report: Box<AnalysisReport> },
    Failed { error: String },
    TimedOut { limit_seconds: f64 },
    Cancelled,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub name: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
    pub elapsed_seconds: f64,
}

// ============================================================================
// Runner
// ============================================================================

/// Runs many videos concurrently, one independent pipeline each.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    config: AnalysisConfig,
    max_concurrent: usize,
    timeout: Option<Duration>,
    cancel_token: CancellationToken,
}

impl BatchRunner {
    pub fn new(config: AnalysisConfig, max_concurrent: usize) -> Self {
        Self {
            config,
            max_concurrent: max_concurrent.max(1),
            timeout: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Abort any single video that runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Parent token; cancelling it stops every job.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Run all jobs. Results come back in job order.
    pub async fn run(&self, jobs: Vec<VideoJob>) -> Vec<JobResult> {
        let total = jobs.len();
        info!(
            "🗂️  Batch: {} videos, {} concurrent{}",
            total,
            self.max_concurrent,
            self.timeout
                .map(|t| format!(", {:.0}s timeout", t.as_secs_f64()))
                .unwrap_or_default()
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (idx, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let timeout = self.timeout;
            let job_token = self.cancel_token.child_token();

            tasks.spawn(async move {
                let Ok(permit) = semaphore.acquire_owned().await else {
                    return (idx, JobResult { name: job.name, outcome: JobOutcome::Cancelled, elapsed_seconds: 0.0 });
                };
                let started = Instant::now();
                let name = job.name.clone();

                let worker_token = job_token.clone();
                let handle = spawn_with_permit(permit, move || job.execute(&config, &worker_token));

                let outcome = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, handle).await {
                        Ok(joined) => outcome_from(joined),
                        Err(_) => {
                            // Worker stops at its next frame boundary
                            job_token.cancel();
                            JobOutcome::TimedOut { limit_seconds: limit.as_secs_f64() }
                        }
                    },
                    None => outcome_from(handle.await),
                };

                (idx, JobResult {
                    name,
                    outcome,
                    elapsed_seconds: started.elapsed().as_secs_f64(),
                })
            });
        }

        let mut results: Vec<(usize, JobResult)> = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => {
                    log_result(&result);
                    results.push((idx, result));
                }
                Err(e) => warn!("Batch task failed to join: {}", e),
            }
        }
        results.sort_by_key(|(idx, _)| *idx);

        let completed = results.iter().filter(|(_, r)| r.outcome.is_completed()).count();
        info!("✅ Batch finished: {}/{} videos completed", completed, total);

        results.into_iter().map(|(_, result)| result).collect()
    }
}

/// Run `work` on a blocking thread that holds `permit` until it returns.
///
/// A timed-out worker keeps running to its next frame boundary and keeps
/// its concurrency slot until then.
fn spawn_with_permit<T, F>(permit: OwnedSemaphorePermit, work: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        work()
    })
}

fn outcome_from(
    joined: Result<Result<AnalysisReport, PipelineError>, tokio::task::JoinError>,
) -> JobOutcome {
    match joined {
        Ok(Ok(report)) => JobOutcome::Completed { report: Box::new(report) },
        Ok(Err(PipelineError::Cancelled { .. })) => JobOutcome::Cancelled,
        Ok(Err(e)) => JobOutcome::Failed { error: e.to_string() },
        Err(e) => JobOutcome::Failed { error: format!("worker panicked: {e}") },
    }
}

fn log_result(result: &JobResult) {
    match &result.outcome {
        JobOutcome::Completed { report } => info!(
            "   {}: {} reps in {:.1}s of video ({:.2}s)",
            result.name, report.summary.total_reps, report.duration_seconds, result.elapsed_seconds
        ),
        JobOutcome::Failed { error } => warn!("   {}: failed: {}", result.name, error),
        JobOutcome::TimedOut { limit_seconds } => {
            warn!("   {}: timed out after {:.1}s", result.name, limit_seconds);
        }
        JobOutcome::Cancelled => warn!("   {}: cancelled", result.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_jobs_pairs_frames_and_outputs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b_session.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("a_session.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("a_session")).unwrap();

        let out = dir.path().join("out");
        let jobs = discover_jobs(dir.path(), Some(&out)).unwrap();
        let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["a_session", "b_session"]);
        assert_eq!(jobs[0].frames.as_deref(), Some(dir.path().join("a_session").as_path()));
        assert!(jobs[1].frames.is_none());
        assert_eq!(jobs[1].output.as_deref(), Some(out.join("b_session").as_path()));
    }

    #[test]
    fn test_missing_recording_fails_job() {
        let job = VideoJob {
            name: "ghost".to_string(),
            poses: PathBuf::from("/nonexistent/ghost.jsonl"),
            frames: None,
            output: None,
        };
        let err = job
            .execute(&AnalysisConfig::default(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Source(SourceError::Io(..))));
    }

    #[test]
    fn test_empty_batch_returns_no_results() {
        let runner = BatchRunner::new(AnalysisConfig::default(), 0);
        let results = tokio_test::block_on(runner.run(Vec::new()));
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_permit_held_until_worker_returns() {
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = Arc::clone(&semaphore).acquire_owned().await.unwrap();
        let (release, wait) = std::sync::mpsc::channel::<()>();

        let mut handle = spawn_with_permit(permit, move || wait.recv().is_ok());
        // Giving up on the worker does not free its slot
        assert!(tokio::time::timeout(Duration::from_millis(10), &mut handle).await.is_err());
        assert_eq!(semaphore.available_permits(), 0);

        release.send(()).unwrap();
        assert!(handle.await.unwrap());
        assert_eq!(semaphore.available_permits(), 1);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let result = JobResult {
            name: "x".to_string(),
            outcome: JobOutcome::TimedOut { limit_seconds: 2.0 },
            elapsed_seconds: 2.1,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["limit_seconds"], 2.0);
        assert_eq!(json["name"], "x");
    }
}
