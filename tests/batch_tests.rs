//! Batch Runner Tests
//!
//! Several videos analyzed concurrently from recordings on disk: ordering,
//! isolation of failures, timeouts and cancellation.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pullup_vision::config::AnalysisConfig;
use pullup_vision::pipeline::{discover_jobs, BatchRunner, JobOutcome, VideoJob};
use pullup_vision::types::{ArmLandmarks, Landmark};

fn arm_at(deg: f64) -> ArmLandmarks {
    let r = deg.to_radians();
    ArmLandmarks {
        shoulder: Landmark::new(0.5, 0.3, 0.9),
        elbow: Landmark::new(0.5, 0.5, 0.9),
        wrist: Landmark::new(0.5 + 0.2 * r.sin(), 0.5 - 0.2 * r.cos(), 0.9),
    }
}

/// Recording of `reps` clean pull-ups, 10 frames per half cycle.
fn write_session(path: &Path, reps: usize) {
    let mut angles = vec![170.0; 10];
    for _ in 0..reps {
        angles.extend([60.0; 10]);
        angles.extend([170.0; 10]);
    }
    write_angles(path, &angles);
}

fn write_angles(path: &Path, angles: &[f64]) {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path).unwrap());
    writeln!(file, r#"{{"fps": 30.0}}"#).unwrap();
    for (i, deg) in angles.iter().enumerate() {
        let arm = serde_json::to_string(&arm_at(*deg)).unwrap();
        writeln!(file, r#"{{"frame": {i}, "left": {arm}}}"#).unwrap();
    }
}

fn completed_reps(outcome: &JobOutcome) -> Option<u32> {
    match outcome {
        JobOutcome::Completed { report } => Some(report.summary.total_reps),
        _ => None,
    }
}

#[tokio::test]
async fn batch_analyzes_each_video_independently() {
    let dir = tempfile::tempdir().unwrap();
    write_session(&dir.path().join("alice.jsonl"), 2);
    write_session(&dir.path().join("bob.jsonl"), 5);
    write_session(&dir.path().join("carol.jsonl"), 0);

    let jobs = discover_jobs(dir.path(), None).unwrap();
    let results = BatchRunner::new(AnalysisConfig::default(), 2).run(jobs).await;

    let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob", "carol"]);
    assert_eq!(completed_reps(&results[0].outcome), Some(2));
    assert_eq!(completed_reps(&results[1].outcome), Some(5));
    assert_eq!(completed_reps(&results[2].outcome), Some(0));
}

#[tokio::test]
async fn batch_matches_sequential_analysis() {
    let dir = tempfile::tempdir().unwrap();
    for (name, reps) in [("a", 3), ("b", 1), ("c", 4), ("d", 2)] {
        write_session(&dir.path().join(format!("{name}.jsonl")), reps);
    }
    let jobs = discover_jobs(dir.path(), None).unwrap();

    let config = AnalysisConfig::default();
    let token = CancellationToken::new();
    let sequential: Vec<u32> = jobs
        .iter()
        .map(|job| job.execute(&config, &token).unwrap().summary.total_reps)
        .collect();

    let results = BatchRunner::new(config, 4).run(jobs).await;
    let concurrent: Vec<u32> = results
        .iter()
        .map(|r| completed_reps(&r.outcome).unwrap())
        .collect();
    assert_eq!(sequential, concurrent);
    assert_eq!(concurrent, vec![3, 1, 4, 2]);
}

#[tokio::test]
async fn failing_video_does_not_affect_others() {
    let dir = tempfile::tempdir().unwrap();
    write_session(&dir.path().join("good.jsonl"), 2);
    write_session(&dir.path().join("broken.jsonl"), 2);
    // Frame directory with no images: the source cannot open
    std::fs::create_dir(dir.path().join("broken")).unwrap();

    let jobs = discover_jobs(dir.path(), None).unwrap();
    let results = BatchRunner::new(AnalysisConfig::default(), 2).run(jobs).await;

    assert_eq!(results[0].name, "broken");
    assert!(matches!(results[0].outcome, JobOutcome::Failed { .. }));
    assert_eq!(results[1].name, "good");
    assert_eq!(completed_reps(&results[1].outcome), Some(2));
}

#[tokio::test]
async fn annotated_frames_land_in_per_video_dirs() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("clip");
    std::fs::create_dir(&frames).unwrap();
    for i in 0..30 {
        image::RgbImage::new(200, 140)
            .save(frames.join(format!("{i:03}.png")))
            .unwrap();
    }
    write_session(&dir.path().join("clip.jsonl"), 1);

    let out = dir.path().join("out");
    let jobs = discover_jobs(dir.path(), Some(&out)).unwrap();
    let results = BatchRunner::new(AnalysisConfig::default(), 1).run(jobs).await;

    assert!(results[0].outcome.is_completed());
    let written = std::fs::read_dir(out.join("clip")).unwrap().count();
    assert_eq!(written, 30);
}

#[tokio::test]
async fn slow_video_times_out() {
    let dir = tempfile::tempdir().unwrap();
    // Large enough that parsing alone outlasts the limit
    let angles: Vec<f64> = (0..100_000).map(|i| if (i / 10) % 2 == 0 { 170.0 } else { 60.0 }).collect();
    write_angles(&dir.path().join("marathon.jsonl"), &angles);

    let jobs = discover_jobs(dir.path(), None).unwrap();
    let results = BatchRunner::new(AnalysisConfig::default(), 1)
        .with_timeout(Duration::from_millis(1))
        .run(jobs)
        .await;

    assert!(matches!(results[0].outcome, JobOutcome::TimedOut { .. }));
}

#[tokio::test]
async fn cancelled_batch_reports_every_job_cancelled() {
    let dir = tempfile::tempdir().unwrap();
    write_session(&dir.path().join("one.jsonl"), 2);
    write_session(&dir.path().join("two.jsonl"), 2);

    let token = CancellationToken::new();
    token.cancel();
    let jobs = discover_jobs(dir.path(), None).unwrap();
    let results = BatchRunner::new(AnalysisConfig::default(), 2)
        .with_cancel_token(token)
        .run(jobs)
        .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| matches!(r.outcome, JobOutcome::Cancelled)));
}

#[tokio::test]
async fn explicit_jobs_run_without_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let poses = dir.path().join("custom-name.jsonl");
    write_session(&poses, 3);

    let job = VideoJob {
        name: "warmup".to_string(),
        poses,
        frames: None,
        output: None,
    };
    let results = BatchRunner::new(AnalysisConfig::default(), 1).run(vec![job]).await;
    let JobOutcome::Completed { report } = &results[0].outcome else {
        panic!("expected completion, got {:?}", results[0].outcome);
    };
    assert_eq!(report.video.source, "warmup");
    assert_eq!(report.summary.total_reps, 3);
}
