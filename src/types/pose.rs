//! Pose landmarks as delivered by the external detector, and the per-frame
//! `JointSample` the analysis core consumes.

use serde::{Deserialize, Serialize};

/// MediaPipe Pose landmark indices used for the elbow angle.
pub mod mediapipe {
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    /// Fewer landmarks than this means the upper body was not resolved.
    pub const MIN_LANDMARKS: usize = 17;
}

/// Body side of an arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// A single joint position with detector confidence.
///
/// Coordinates are whatever the detector emits (normalized image coordinates
/// for MediaPipe). `z` is present only for detectors that estimate depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Detector confidence (MediaPipe "visibility"), in [0, 1]
    #[serde(default = "default_confidence", alias = "visibility")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

impl Landmark {
    pub fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, z: None, confidence }
    }

    pub fn with_depth(x: f64, y: f64, z: f64, confidence: f64) -> Self {
        Self { x, y, z: Some(z), confidence }
    }
}

/// Shoulder, elbow and wrist of one arm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmLandmarks {
    pub shoulder: Landmark,
    pub elbow: Landmark,
    pub wrist: Landmark,
}

impl ArmLandmarks {
    /// Mean confidence of the three joints.
    pub fn aggregate_confidence(&self) -> f64 {
        (self.shoulder.confidence + self.elbow.confidence + self.wrist.confidence) / 3.0
    }

    /// Lowest confidence of the three joints.
    pub fn min_confidence(&self) -> f64 {
        self.shoulder
            .confidence
            .min(self.elbow.confidence)
            .min(self.wrist.confidence)
    }
}

/// One detector result for one frame.
///
/// Either arm may be missing when the detector resolved only part of the body.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseDetection {
    #[serde(default)]
    pub left: Option<ArmLandmarks>,
    #[serde(default)]
    pub right: Option<ArmLandmarks>,
}

impl PoseDetection {
    /// Build a detection from a full MediaPipe Pose landmark list (33 points).
    ///
    /// Returns `None` when the list is too short to contain both arms.
    pub fn from_mediapipe(landmarks: &[Landmark]) -> Option<Self> {
        use mediapipe::*;

        if landmarks.len() < MIN_LANDMARKS {
            return None;
        }
        Some(Self {
            left: Some(ArmLandmarks {
                shoulder: landmarks[LEFT_SHOULDER],
                elbow: landmarks[LEFT_ELBOW],
                wrist: landmarks[LEFT_WRIST],
            }),
            right: Some(ArmLandmarks {
                shoulder: landmarks[RIGHT_SHOULDER],
                elbow: landmarks[RIGHT_ELBOW],
                wrist: landmarks[RIGHT_WRIST],
            }),
        })
    }

    pub fn arm(&self, side: Side) -> Option<&ArmLandmarks> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Per-frame joint observation fed to the angle estimator.
///
/// `pose == None` means the detector found nobody in this frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointSample {
    pub frame_index: u64,
    /// Presentation time in seconds
    pub timestamp: f64,
    pub pose: Option<PoseDetection>,
}

impl JointSample {
    pub fn new(frame_index: u64, timestamp: f64, pose: Option<PoseDetection>) -> Self {
        Self { frame_index, timestamp, pose }
    }

    /// A frame with no detection at all.
    pub fn undetected(frame_index: u64, timestamp: f64) -> Self {
        Self { frame_index, timestamp, pose: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lm(i: usize) -> Landmark {
        Landmark::new(i as f64, i as f64 * 2.0, 0.9)
    }

    #[test]
    fn test_from_mediapipe_picks_arm_indices() {
        let landmarks: Vec<Landmark> = (0..33).map(lm).collect();
        let det = PoseDetection::from_mediapipe(&landmarks).unwrap();
        let left = det.left.unwrap();
        let right = det.right.unwrap();
        assert_eq!(left.shoulder.x, 11.0);
        assert_eq!(left.elbow.x, 13.0);
        assert_eq!(left.wrist.x, 15.0);
        assert_eq!(right.shoulder.x, 12.0);
        assert_eq!(right.elbow.x, 14.0);
        assert_eq!(right.wrist.x, 16.0);
    }

    #[test]
    fn test_from_mediapipe_too_few_landmarks() {
        let landmarks: Vec<Landmark> = (0..16).map(lm).collect();
        assert!(PoseDetection::from_mediapipe(&landmarks).is_none());
    }

    #[test]
    fn test_landmark_visibility_alias() {
        let l: Landmark = serde_json::from_str(r#"{"x":0.1,"y":0.2,"visibility":0.7}"#).unwrap();
        assert_eq!(l.confidence, 0.7);
        assert!(l.z.is_none());
    }

    #[test]
    fn test_aggregate_confidence() {
        let arm = ArmLandmarks {
            shoulder: Landmark::new(0.0, 0.0, 0.9),
            elbow: Landmark::new(0.0, 0.0, 0.6),
            wrist: Landmark::new(0.0, 0.0, 0.3),
        };
        assert!((arm.aggregate_confidence() - 0.6).abs() < 1e-12);
        assert_eq!(arm.min_confidence(), 0.3);
    }
}
