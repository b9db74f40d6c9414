//! Analysis Configuration - every threshold as an operator-tunable TOML value
//!
//! Each struct implements `Default` from `config::defaults`, so an absent or
//! empty config file behaves exactly like the built-in tuning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "PULLUP_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "pullup_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one analysis run.
///
/// Load with `AnalysisConfig::load()` which searches:
/// 1. `$PULLUP_CONFIG` env var
/// 2. `./pullup_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Elbow angle estimation
    #[serde(default)]
    pub angle: AngleConfig,

    /// Smoothing and gap filling
    #[serde(default)]
    pub smoothing: SmoothingConfig,

    /// Phase thresholds and rep counting
    #[serde(default)]
    pub phase: PhaseConfig,

    /// Overlay rendering
    #[serde(default)]
    pub annotation: AnnotationConfig,

    /// Frame loop settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AnalysisConfig {
    /// Load configuration using the standard search order:
    /// 1. `$PULLUP_CONFIG` environment variable
    /// 2. `./pullup_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded analysis config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./pullup_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded analysis config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are logged as warnings; inconsistent values are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all settings for internal consistency.
    ///
    /// Rules:
    /// - `up_threshold < down_threshold`, both inside (0, 180)
    /// - confidences in [0, 1]
    /// - window, hold and fps must be positive
    /// - no NaN / Inf anywhere
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let p = &self.phase;
        if !p.up_threshold.is_finite() || !p.down_threshold.is_finite() {
            errors.push(format!(
                "phase thresholds must be finite (got up={}, down={})",
                p.up_threshold, p.down_threshold
            ));
        } else if p.up_threshold >= p.down_threshold {
            errors.push(format!(
                "phase.up_threshold ({:.1}) must be less than phase.down_threshold ({:.1})",
                p.up_threshold, p.down_threshold
            ));
        }
        if p.min_hold_frames == 0 {
            errors.push("phase.min_hold_frames must be > 0".to_string());
        }

        let s = &self.smoothing;
        if s.window_size == 0 {
            errors.push("smoothing.window_size must be > 0".to_string());
        }
        if !(s.ema_alpha > 0.0 && s.ema_alpha <= 1.0) {
            errors.push(format!(
                "smoothing.ema_alpha ({}) must be in (0, 1]",
                s.ema_alpha
            ));
        }

        let a = &self.angle;
        if !(0.0..=1.0).contains(&a.min_joint_confidence) {
            errors.push(format!(
                "angle.min_joint_confidence ({}) must be in [0, 1]",
                a.min_joint_confidence
            ));
        }
        if !(a.min_segment_length >= 0.0) {
            errors.push("angle.min_segment_length must be >= 0".to_string());
        }
        if !(a.collinearity_epsilon >= 0.0 && a.collinearity_epsilon < 1.0) {
            errors.push(format!(
                "angle.collinearity_epsilon ({}) must be in [0, 1)",
                a.collinearity_epsilon
            ));
        }

        if !(self.pipeline.default_fps > 0.0) || !self.pipeline.default_fps.is_finite() {
            errors.push(format!(
                "pipeline.default_fps ({}) must be a positive number",
                self.pipeline.default_fps
            ));
        }

        // Physical range validation
        let (range_errors, range_warnings) = super::validation::validate_physical_ranges(self);
        errors.extend(range_errors);
        for w in &range_warnings {
            warn!("{}", w);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Angle
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleConfig {
    /// Minimum confidence of each of shoulder, elbow and wrist
    #[serde(default = "default_min_joint_confidence")]
    pub min_joint_confidence: f64,

    /// Arm segments shorter than this are degenerate
    #[serde(default = "default_min_segment_length")]
    pub min_segment_length: f64,

    /// |sin θ| below this is treated as collinear (angle undefined)
    #[serde(default = "default_collinearity_epsilon")]
    pub collinearity_epsilon: f64,

    /// Use detector depth (z) when all three joints carry it
    #[serde(default)]
    pub use_depth: bool,
}

fn default_min_joint_confidence() -> f64 { defaults::MIN_JOINT_CONFIDENCE }
fn default_min_segment_length() -> f64 { defaults::MIN_SEGMENT_LENGTH }
fn default_collinearity_epsilon() -> f64 { defaults::COLLINEARITY_EPSILON }

impl Default for AngleConfig {
    fn default() -> Self {
        Self {
            min_joint_confidence: default_min_joint_confidence(),
            min_segment_length: default_min_segment_length(),
            collinearity_epsilon: default_collinearity_epsilon(),
            use_depth: false,
        }
    }
}

// ============================================================================
// Smoothing
// ============================================================================

/// Smoothing filter applied to valid angle samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    /// Window median; rejects single-frame outliers
    #[default]
    Median,
    /// Window mean
    MovingAverage,
    /// Exponential moving average with `ema_alpha`
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default)]
    pub method: SmoothingMethod,

    /// Trailing window length in frames
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Weight of the newest sample for `exponential`
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,

    /// Longest gap bridged by holding the last smoothed value
    #[serde(default = "default_max_gap_frames")]
    pub max_gap_frames: u32,
}

fn default_window_size() -> usize { defaults::SMOOTHING_WINDOW }
fn default_ema_alpha() -> f64 { defaults::EMA_ALPHA }
fn default_max_gap_frames() -> u32 { defaults::MAX_GAP_FRAMES }

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            method: SmoothingMethod::default(),
            window_size: default_window_size(),
            ema_alpha: default_ema_alpha(),
            max_gap_frames: default_max_gap_frames(),
        }
    }
}

// ============================================================================
// Phase
// ============================================================================

/// When a rep is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepCompletion {
    /// DOWN → UP → DOWN: counted when the arm is extended again
    #[default]
    FullCycle,
    /// Counted as soon as UP is confirmed after a DOWN baseline
    Top,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Elbow angle (deg) at or below which the arm is flexed
    #[serde(default = "default_up_threshold")]
    pub up_threshold: f64,

    /// Elbow angle (deg) at or above which the arm is extended
    #[serde(default = "default_down_threshold")]
    pub down_threshold: f64,

    /// Consecutive non-gap samples needed to confirm a phase change
    #[serde(default = "default_min_hold_frames")]
    pub min_hold_frames: u32,

    #[serde(default)]
    pub completion: RepCompletion,
}

fn default_up_threshold() -> f64 { defaults::UP_THRESHOLD_DEG }
fn default_down_threshold() -> f64 { defaults::DOWN_THRESHOLD_DEG }
fn default_min_hold_frames() -> u32 { defaults::MIN_HOLD_FRAMES }

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            up_threshold: default_up_threshold(),
            down_threshold: default_down_threshold(),
            min_hold_frames: default_min_hold_frames(),
            completion: RepCompletion::default(),
        }
    }
}

// ============================================================================
// Annotation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// Draw the overlay (frames are passed through either way)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Draw the elbow angle gauge below the counter
    #[serde(default = "default_true")]
    pub show_angle_gauge: bool,
}

fn default_true() -> bool { true }

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            show_angle_gauge: true,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Frame rate when the source reports none
    #[serde(default = "default_fps")]
    pub default_fps: f64,

    /// Progress log cadence (0 disables)
    #[serde(default = "default_progress_interval")]
    pub progress_interval_frames: u64,

    /// Pose recording lines whose frame index runs further ahead of the
    /// line number are skipped
    #[serde(default = "default_max_frame_lead")]
    pub max_frame_lead: u64,
}

fn default_fps() -> f64 { defaults::DEFAULT_FPS }
fn default_progress_interval() -> u64 { defaults::PROGRESS_INTERVAL_FRAMES }
fn default_max_frame_lead() -> u64 { defaults::MAX_FRAME_LEAD }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_fps: default_fps(),
            progress_interval_frames: default_progress_interval(),
            max_frame_lead: default_max_frame_lead(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: AnalysisConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.angle.min_joint_confidence, 0.5);
        assert_eq!(config.smoothing.window_size, 5);
        assert_eq!(config.smoothing.method, SmoothingMethod::Median);
        assert_eq!(config.phase.min_hold_frames, 3);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[phase]
up_threshold = 80.0
completion = "top"

[smoothing]
method = "moving_average"
"#;
        let config = AnalysisConfig::from_toml_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.phase.up_threshold, 80.0);
        assert_eq!(config.phase.completion, RepCompletion::Top);
        assert_eq!(config.smoothing.method, SmoothingMethod::MovingAverage);
        // Non-overridden values retain defaults
        assert_eq!(config.phase.down_threshold, 160.0);
        assert_eq!(config.smoothing.max_gap_frames, 15);
    }

    #[test]
    fn test_validation_rejects_inverted_thresholds() {
        let mut config = AnalysisConfig::default();
        config.phase.up_threshold = 160.0;
        config.phase.down_threshold = 160.0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.iter().any(|e| e.contains("up_threshold")));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_rejects_zero_window_and_hold() {
        let mut config = AnalysisConfig::default();
        config.smoothing.window_size = 0;
        config.phase.min_hold_frames = 0;
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation error");
        };
        assert!(errors.iter().any(|e| e.contains("window_size")));
        assert!(errors.iter().any(|e| e.contains("min_hold_frames")));
    }

    #[test]
    fn test_validation_rejects_nan() {
        let mut config = AnalysisConfig::default();
        config.phase.up_threshold = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.smoothing.ema_alpha = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_confidence_out_of_range() {
        let mut config = AnalysisConfig::default();
        config.angle.min_joint_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = AnalysisConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: AnalysisConfig =
            toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original, roundtripped);
    }

    #[test]
    fn test_all_sections_serialize() {
        let toml_str = AnalysisConfig::default().to_toml().unwrap();
        for section in ["[angle]", "[smoothing]", "[phase]", "[annotation]", "[pipeline]"] {
            assert!(toml_str.contains(section), "Missing {section} section");
        }
    }

    #[test]
    fn test_validation_error_lists_every_problem() {
        let mut config = AnalysisConfig::default();
        config.phase.up_threshold = 170.0;
        config.pipeline.default_fps = 0.0;
        let msg = config.validate().unwrap_err().to_string();
        assert!(msg.contains("up_threshold"));
        assert!(msg.contains("default_fps"));
    }
}
