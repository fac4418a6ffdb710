pub mod capture;
pub mod detection;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{Frame, FrameSource};
pub use detection::{Analysis, FrameAnalyzer, FrameClassification, InfractionEpisode, TrackMask};
pub use display::ViewMode;
pub use error::{Error, Result};
pub use pipeline::{DetectionSession, FrameReport};

/// Prefix for environment overrides, e.g. `TRACKWATCH__DETECTION__EXIT_THRESHOLD=40`
pub const ENV_PREFIX: &str = "TRACKWATCH";

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub detection: DetectionThresholds,
    #[serde(default)]
    pub track_mask: TrackMaskConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Decision thresholds. These have no defaults: a session must not start
/// without calibrated values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    /// In-track percentage below which a frame counts as an infraction
    pub exit_threshold: f64,
    /// Grayscale difference cutoff for change detection
    pub background_subtraction_threshold: u8,
    /// Minimum candidate pixel count to trust a detection
    pub vehicle_noise_threshold: u32,
}

/// Calibrated track colour range and cleanup kernels.
///
/// HSV bounds use the OpenCV convention: hue in 0..=180, saturation and
/// value in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackMaskConfig {
    pub hsv_lower: [u8; 3],
    pub hsv_upper: [u8; 3],
    pub erosion_kernel: usize,
    pub closing_kernel: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub grouping_window_secs: f64,
    pub max_episodes: usize,
    pub max_frames_per_episode: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Video file (gstreamer builds) or a directory of still frames
    pub path: PathBuf,
    #[serde(default = "default_working_width")]
    pub working_width: u32,
    #[serde(default = "default_fallback_fps")]
    pub fallback_fps: f64,
    #[serde(default = "default_looping")]
    pub looping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub view_mode: ViewMode,
    pub poll_interval_ms: u64,
}

impl Default for TrackMaskConfig {
    fn default() -> Self {
        Self {
            hsv_lower: [0, 0, 33],
            hsv_upper: [180, 52, 124],
            erosion_kernel: 4, // effectively 5
            closing_kernel: 10, // effectively 11
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            grouping_window_secs: 1.0,
            max_episodes: 256,
            max_frames_per_episode: 64,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            view_mode: ViewMode::TrackWithVehicle,
            poll_interval_ms: 33, // ~30fps
        }
    }
}

fn default_working_width() -> u32 {
    600
}

fn default_fallback_fps() -> f64 {
    30.0
}

fn default_looping() -> bool {
    true
}

impl AggregationConfig {
    pub fn grouping_window(&self) -> Duration {
        Duration::from_secs_f64(self.grouping_window_secs)
    }
}

impl Config {
    /// Load from a TOML file, then apply `TRACKWATCH__*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(true))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| -> Result<()> { Err(Error::InvalidConfig(msg)) };

        let exit = self.detection.exit_threshold;
        if !exit.is_finite() || !(0.0..=100.0).contains(&exit) {
            return invalid(format!("detection.exit_threshold must be within 0..=100, got {exit}"));
        }
        if self.detection.vehicle_noise_threshold == 0 {
            return invalid("detection.vehicle_noise_threshold must be at least 1".into());
        }

        let mask = &self.track_mask;
        if mask.hsv_upper[0] > 180 {
            return invalid(format!("track_mask.hsv_upper hue must be <= 180, got {}", mask.hsv_upper[0]));
        }
        for (channel, (lo, hi)) in mask.hsv_lower.iter().zip(mask.hsv_upper.iter()).enumerate() {
            if lo > hi {
                return invalid(format!(
                    "track_mask channel {channel}: lower bound {lo} exceeds upper bound {hi}"
                ));
            }
        }

        let window = self.aggregation.grouping_window_secs;
        if !window.is_finite() || !(0.0..=86_400.0).contains(&window) {
            return invalid(format!("aggregation.grouping_window_secs must be within 0..=86400, got {window}"));
        }
        if self.aggregation.max_episodes == 0 || self.aggregation.max_frames_per_episode == 0 {
            return invalid("aggregation retention limits must be at least 1".into());
        }

        if self.source.working_width == 0 {
            return invalid("source.working_width must be at least 1".into());
        }
        if !self.source.fallback_fps.is_finite() || self.source.fallback_fps <= 0.0 {
            return invalid(format!("source.fallback_fps must be > 0, got {}", self.source.fallback_fps));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[detection]
exit_threshold = 50.0
background_subtraction_threshold = 30
vehicle_noise_threshold = 500

[source]
path = "frames"
"#;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let file = write_config(MINIMAL);
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.detection.exit_threshold, 50.0);
        assert_eq!(config.detection.background_subtraction_threshold, 30);
        assert_eq!(config.detection.vehicle_noise_threshold, 500);
        assert_eq!(config.track_mask, TrackMaskConfig::default());
        assert_eq!(config.aggregation.grouping_window(), Duration::from_secs(1));
        assert_eq!(config.source.working_width, 600);
        assert!(config.source.looping);
        assert_eq!(config.display.view_mode, ViewMode::TrackWithVehicle);
    }

    #[test]
    fn missing_threshold_is_fatal() {
        let file = write_config(
            r#"
[detection]
exit_threshold = 50.0
background_subtraction_threshold = 30

[source]
path = "frames"
"#,
        );
        assert!(matches!(Config::load(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_fatal() {
        assert!(matches!(
            Config::load("/nonexistent/trackwatch.toml"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let file = write_config(MINIMAL);
        let base = Config::load(file.path()).unwrap();

        let mut config = base.clone();
        config.detection.exit_threshold = 120.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = base.clone();
        config.track_mask.hsv_lower = [10, 60, 0];
        config.track_mask.hsv_upper = [20, 50, 255];
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = base.clone();
        config.aggregation.max_episodes = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = base;
        config.aggregation.grouping_window_secs = -1.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
