pub mod console;

pub use console::ConsoleDisplay;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::detection::TrackMask;
use crate::pipeline::FrameReport;

/// Which image the secondary view shows. The pipeline always produces both;
/// only presentation code looks at this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewMode {
    TrackOnly,
    #[default]
    TrackWithVehicle,
}

impl ViewMode {
    pub fn select<'a>(&self, report: &'a FrameReport, track: &'a TrackMask) -> &'a RgbImage {
        match self {
            ViewMode::TrackOnly => track.visualization(),
            ViewMode::TrackWithVehicle => &report.overlay,
        }
    }

    pub fn caption(&self, report: &FrameReport) -> String {
        match (self, report.in_track_fraction) {
            (ViewMode::TrackOnly, _) => "Track only".to_string(),
            (ViewMode::TrackWithVehicle, Some(fraction)) => {
                format!("Track with vehicle | on track: {fraction:.1}%")
            }
            (ViewMode::TrackWithVehicle, None) => "Track with vehicle | no vehicle".to_string(),
        }
    }
}
