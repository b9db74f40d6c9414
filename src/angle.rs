//! Elbow Angle Estimation
//!
//! Converts one frame's shoulder/elbow/wrist landmarks into a single elbow
//! angle in degrees. Pure: no state is carried between frames.
//!
//! The angle is the one between the elbow→shoulder and elbow→wrist vectors,
//! `acos(u·v / |u||v|)`, so 180° is a straight arm and small angles are a
//! deeply flexed arm. When both arms are usable, the arm with the higher mean
//! joint confidence represents the frame.

use crate::config::AngleConfig;
use crate::types::{AngleSample, ArmLandmarks, InvalidReason, JointSample, Landmark, Side};

/// Stateless elbow angle estimator.
#[derive(Debug, Clone)]
pub struct AngleEstimator {
    config: AngleConfig,
}

impl AngleEstimator {
    pub fn new(config: AngleConfig) -> Self {
        Self { config }
    }

    /// Representative elbow angle for one frame.
    pub fn estimate(&self, sample: &JointSample) -> AngleSample {
        let Some(pose) = sample.pose.as_ref() else {
            return AngleSample::invalid(
                sample.frame_index,
                sample.timestamp,
                InvalidReason::DetectionUnavailable,
            );
        };

        let left = pose.left.as_ref().map(|arm| (Side::Left, arm, self.elbow_angle(arm)));
        let right = pose.right.as_ref().map(|arm| (Side::Right, arm, self.elbow_angle(arm)));

        // Best valid side; ties go to the left arm so output is deterministic.
        let best_valid = [left, right]
            .into_iter()
            .flatten()
            .filter_map(|(side, arm, result)| {
                result.ok().map(|angle| (side, arm.aggregate_confidence(), angle))
            })
            .fold(None, |best: Option<(Side, f64, f64)>, cand| match best {
                Some(b) if b.1 >= cand.1 => Some(b),
                _ => Some(cand),
            });

        if let Some((side, _, angle)) = best_valid {
            return AngleSample::valid(sample.frame_index, sample.timestamp, angle, side);
        }

        // Both sides unusable: report the reason from the more confident arm.
        let reason = [left, right]
            .into_iter()
            .flatten()
            .filter_map(|(_, arm, result)| result.err().map(|r| (arm.aggregate_confidence(), r)))
            .fold(None, |best: Option<(f64, InvalidReason)>, cand| match best {
                Some(b) if b.0 >= cand.0 => Some(b),
                _ => Some(cand),
            })
            .map_or(InvalidReason::DetectionUnavailable, |(_, r)| r);

        AngleSample::invalid(sample.frame_index, sample.timestamp, reason)
    }

    /// Elbow angle of one arm in degrees, in [0, 180].
    pub fn elbow_angle(&self, arm: &ArmLandmarks) -> Result<f64, InvalidReason> {
        if arm.min_confidence() < self.config.min_joint_confidence {
            return Err(InvalidReason::InsufficientConfidence);
        }

        let use_depth = self.config.use_depth
            && arm.shoulder.z.is_some()
            && arm.elbow.z.is_some()
            && arm.wrist.z.is_some();

        let u = segment(&arm.elbow, &arm.shoulder, use_depth);
        let v = segment(&arm.elbow, &arm.wrist, use_depth);

        vector_angle_degrees(
            u,
            v,
            self.config.min_segment_length,
            self.config.collinearity_epsilon,
        )
    }
}

/// Vector from `from` to `to`; z is zero unless depth is in use.
fn segment(from: &Landmark, to: &Landmark, use_depth: bool) -> [f64; 3] {
    let dz = if use_depth {
        to.z.unwrap_or(0.0) - from.z.unwrap_or(0.0)
    } else {
        0.0
    };
    [to.x - from.x, to.y - from.y, dz]
}

fn norm(v: [f64; 3]) -> f64 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

/// Angle between two vectors in degrees.
///
/// Fails on zero-length vectors and on (anti-)parallel vectors, where
/// `|sin θ|` falls below `collinearity_epsilon`. Any non-finite input also
/// counts as degenerate.
pub fn vector_angle_degrees(
    u: [f64; 3],
    v: [f64; 3],
    min_length: f64,
    collinearity_epsilon: f64,
) -> Result<f64, InvalidReason> {
    let nu = norm(u);
    let nv = norm(v);
    if !nu.is_finite() || !nv.is_finite() || nu <= min_length || nv <= min_length {
        return Err(InvalidReason::DegenerateGeometry);
    }

    let cross = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    let sin = norm(cross) / (nu * nv);
    if sin < collinearity_epsilon {
        return Err(InvalidReason::DegenerateGeometry);
    }

    let dot = u[0] * v[0] + u[1] * v[1] + u[2] * v[2];
    let cos = (dot / (nu * nv)).clamp(-1.0, 1.0);
    Ok(cos.acos().to_degrees())
}
