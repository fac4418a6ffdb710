use std::path::Path;

use tracing::info;

use crate::capture::{FrameSource, ImageSequenceSource};
use crate::error::{Error, Result};
use crate::SourceConfig;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Video time for a frame index, formatted `MM:SS.s`.
pub fn format_timestamp(frame_index: u64, frame_rate: f64) -> String {
    let seconds = if frame_rate > 0.0 {
        frame_index as f64 / frame_rate
    } else {
        0.0
    };
    // round to tenths first so 59.97s carries into the minute
    let tenths = (seconds * 10.0).round() as u64;
    format!("{:02}:{:02}.{}", tenths / 600, tenths % 600 / 10, tenths % 10)
}

/// Pick a source for the configured path: a directory or still image plays as
/// an image sequence, anything else is treated as a video file.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    let path = config.path.as_path();
    if !path.exists() {
        return Err(Error::Source(format!("{} does not exist", path.display())));
    }

    if path.is_dir() || is_image_file(path) {
        info!("Opening image sequence: {}", path.display());
        let source =
            ImageSequenceSource::open(path, config.working_width, config.fallback_fps)?;
        return Ok(Box::new(source));
    }

    open_video(config)
}

#[cfg(feature = "gstreamer-pipeline")]
fn open_video(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    info!("Opening video file: {}", config.path.display());
    let source = crate::capture::GstFileSource::open(
        &config.path,
        config.working_width,
        config.fallback_fps,
    )?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "gstreamer-pipeline"))]
fn open_video(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    Err(Error::Source(format!(
        "{} is not an image sequence; video files need the `gstreamer-pipeline` feature",
        config.path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn formats_minutes_and_tenths() {
        assert_eq!(format_timestamp(0, 30.0), "00:00.0");
        assert_eq!(format_timestamp(45, 30.0), "00:01.5");
        assert_eq!(format_timestamp(30 * 75, 30.0), "01:15.0");
        assert_eq!(format_timestamp(25 * 600 + 5, 25.0), "10:00.2");
    }

    #[test]
    fn rounding_carries_into_minutes() {
        // 59.97s
        assert_eq!(format_timestamp(5997, 100.0), "01:00.0");
    }

    #[test]
    fn recognises_image_extensions() {
        assert!(is_image_file(Path::new("a/frame_001.PNG")));
        assert!(is_image_file(Path::new("still.jpeg")));
        assert!(!is_image_file(Path::new("lap.mp4")));
        assert!(!is_image_file(Path::new("noext")));
    }

    #[test]
    fn missing_path_is_a_source_error() {
        let config = SourceConfig {
            path: PathBuf::from("/definitely/not/here"),
            working_width: 600,
            fallback_fps: 30.0,
            looping: true,
        };
        assert!(matches!(open_source(&config), Err(Error::Source(_))));
    }
}
