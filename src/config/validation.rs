//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for AnalysisConfig.
///
/// Maintained by hand to match the struct hierarchy in analysis_config.rs.
/// Any new field added to AnalysisConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [angle]
        "angle",
        "angle.min_joint_confidence",
        "angle.min_segment_length",
        "angle.collinearity_epsilon",
        "angle.use_depth",
        // [smoothing]
        "smoothing",
        "smoothing.method",
        "smoothing.window_size",
        "smoothing.ema_alpha",
        "smoothing.max_gap_frames",
        // [phase]
        "phase",
        "phase.up_threshold",
        "phase.down_threshold",
        "phase.min_hold_frames",
        "phase.completion",
        // [annotation]
        "annotation",
        "annotation.enabled",
        "annotation.show_angle_gauge",
        // [pipeline]
        "pipeline",
        "pipeline.default_fps",
        "pipeline.progress_interval_frames",
        "pipeline.max_frame_lead",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so output is stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        best = match best {
            Some((bk, bd)) if bd < dist || (bd == dist && bk <= k) => Some((bk, bd)),
            _ => Some((k, dist)),
        };
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, "") {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(&key, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key,
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Validate physical ranges on a parsed AnalysisConfig.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent a run; warnings are legal but unlikely to count pull-ups well.
pub fn validate_physical_ranges(
    config: &super::AnalysisConfig,
) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let p = &config.phase;

    // An elbow angle lives in [0, 180]; thresholds at the ends can never trigger
    for (name, value) in [("up_threshold", p.up_threshold), ("down_threshold", p.down_threshold)] {
        if value.is_finite() && (value <= 0.0 || value >= 180.0) {
            errors.push(format!(
                "phase.{name} = {value:.1} is outside the elbow angle range (0-180 deg)"
            ));
        }
    }

    // Narrow dead zone: hysteresis loses its effect
    let dead_zone = p.down_threshold - p.up_threshold;
    if dead_zone > 0.0 && dead_zone < 20.0 {
        warnings.push(ValidationWarning {
            field: "phase".to_string(),
            message: format!(
                "dead zone between up_threshold and down_threshold is only {dead_zone:.1} deg (typical >= 40)"
            ),
            suggestion: None,
        });
    }

    if p.up_threshold > 120.0 {
        warnings.push(ValidationWarning {
            field: "phase.up_threshold".to_string(),
            message: format!(
                "up_threshold = {:.1} counts a shallow bend as the top of a pull-up (typical 70-100)",
                p.up_threshold
            ),
            suggestion: None,
        });
    }

    if p.down_threshold < 130.0 {
        warnings.push(ValidationWarning {
            field: "phase.down_threshold".to_string(),
            message: format!(
                "down_threshold = {:.1} counts a bent arm as a full hang (typical 150-170)",
                p.down_threshold
            ),
            suggestion: None,
        });
    }

    if p.min_hold_frames > 15 {
        warnings.push(ValidationWarning {
            field: "phase.min_hold_frames".to_string(),
            message: format!(
                "min_hold_frames = {} may swallow fast reps (typical 2-5)",
                p.min_hold_frames
            ),
            suggestion: None,
        });
    }

    let s = &config.smoothing;
    if s.window_size > 30 {
        warnings.push(ValidationWarning {
            field: "smoothing.window_size".to_string(),
            message: format!(
                "window_size = {} frames lags the signal by about half a window (typical 3-9)",
                s.window_size
            ),
            suggestion: None,
        });
    }

    if s.max_gap_frames > 300 {
        warnings.push(ValidationWarning {
            field: "smoothing.max_gap_frames".to_string(),
            message: format!(
                "max_gap_frames = {} holds stale angles for a very long time",
                s.max_gap_frames
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
