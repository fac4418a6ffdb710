//! Per-frame vehicle isolation and in-track / out-of-track classification

use std::sync::Arc;
use std::time::Instant;

use image::{GrayImage, Luma, Rgb, RgbImage};
use tracing::{instrument, trace};

use super::morphology;
use super::track_mask::TrackMask;
use crate::error::{Error, Result};
use crate::DetectionThresholds;

/// Candidate cleanup: 5x5 closing, applied twice.
const CANDIDATE_KERNEL: usize = 5;
const CANDIDATE_ITERATIONS: usize = 2;

pub const ON_TRACK_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OFF_TRACK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outcome of analysing one frame.
#[derive(Debug, Clone)]
pub enum Analysis {
    Vehicle(FrameClassification),
    /// Candidate region too small to trust. Not the same as "fully off track".
    NoVehicle,
}

impl Analysis {
    pub fn is_infraction(&self) -> bool {
        matches!(self, Analysis::Vehicle(c) if c.infraction)
    }
}

#[derive(Debug, Clone)]
pub struct FrameClassification {
    pub vehicle_pixels: usize,
    pub in_track_pixels: usize,
    /// Percentage of vehicle pixels on the track mask, 0..=100
    pub in_track_fraction: f64,
    pub infraction: bool,
    /// Track visualization with the vehicle painted by verdict
    pub overlay: RgbImage,
}

/// Pure decision step shared by the analyzer and its tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub in_track_fraction: f64,
    pub infraction: bool,
}

/// `None` when the candidate is below the noise floor.
pub fn classify(
    candidate_pixels: usize,
    in_track_pixels: usize,
    thresholds: &DetectionThresholds,
) -> Option<Verdict> {
    if candidate_pixels == 0 || candidate_pixels < thresholds.vehicle_noise_threshold as usize {
        return None;
    }
    let in_track_fraction = in_track_pixels as f64 / candidate_pixels as f64 * 100.0;
    Some(Verdict {
        in_track_fraction,
        infraction: in_track_fraction < thresholds.exit_threshold,
    })
}

/// Holds the session-wide reference frame and track mask. Analyses are
/// stateless; `&self` can be shared across threads.
#[derive(Debug, Clone)]
pub struct FrameAnalyzer {
    reference: Arc<RgbImage>,
    track_mask: Arc<TrackMask>,
    thresholds: DetectionThresholds,
}

impl FrameAnalyzer {
    pub fn new(
        reference: Arc<RgbImage>,
        track_mask: Arc<TrackMask>,
        thresholds: DetectionThresholds,
    ) -> Result<Self> {
        Error::check_dimensions(reference.dimensions(), track_mask.dimensions())?;
        Ok(Self {
            reference,
            track_mask,
            thresholds,
        })
    }

    pub fn reference(&self) -> &Arc<RgbImage> {
        &self.reference
    }

    pub fn track_mask(&self) -> &Arc<TrackMask> {
        &self.track_mask
    }

    pub fn analyze(&self, frame: &RgbImage) -> Result<Analysis> {
        analyze_frame(frame, &self.reference, &self.track_mask, &self.thresholds)
    }
}

/// Difference against the reference, isolate the vehicle, then measure how
/// much of it sits on the track.
#[instrument(skip_all)]
pub fn analyze_frame(
    current: &RgbImage,
    reference: &RgbImage,
    track_mask: &TrackMask,
    thresholds: &DetectionThresholds,
) -> Result<Analysis> {
    Error::check_dimensions(reference.dimensions(), current.dimensions())?;
    Error::check_dimensions(track_mask.dimensions(), current.dimensions())?;

    let start = Instant::now();

    let candidate = candidate_mask(current, reference, thresholds.background_subtraction_threshold);
    let vehicle_pixels = morphology::count_nonzero(&candidate);
    let in_track_pixels = morphology::count_overlap(&candidate, track_mask.mask());

    let analysis = match classify(vehicle_pixels, in_track_pixels, thresholds) {
        None => {
            trace!(vehicle_pixels, "below noise floor");
            Analysis::NoVehicle
        }
        Some(verdict) => {
            let color = if verdict.infraction {
                OFF_TRACK_COLOR
            } else {
                ON_TRACK_COLOR
            };
            let mut overlay = track_mask.visualization().clone();
            morphology::paint(&mut overlay, &candidate, color);

            trace!(
                vehicle_pixels,
                in_track_pixels,
                fraction = verdict.in_track_fraction,
                infraction = verdict.infraction,
                "vehicle classified"
            );

            Analysis::Vehicle(FrameClassification {
                vehicle_pixels,
                in_track_pixels,
                in_track_fraction: verdict.in_track_fraction,
                infraction: verdict.infraction,
                overlay,
            })
        }
    };

    metrics::histogram!("analysis_time_us").record(start.elapsed().as_micros() as f64);
    metrics::counter!("frames_analyzed").increment(1);

    Ok(analysis)
}

/// Binary mask of pixels that changed relative to the reference frame.
pub fn candidate_mask(current: &RgbImage, reference: &RgbImage, level: u8) -> GrayImage {
    let diff = GrayImage::from_fn(current.width(), current.height(), |x, y| {
        let a = current.get_pixel(x, y).0;
        let b = reference.get_pixel(x, y).0;
        Luma([luminance([a[0].abs_diff(b[0]), a[1].abs_diff(b[1]), a[2].abs_diff(b[2])])])
    });
    let changed = morphology::threshold(&diff, level);
    morphology::close(&changed, CANDIDATE_KERNEL, CANDIDATE_ITERATIONS)
}

/// BT.601 luma, rounded.
fn luminance([r, g, b]: [u8; 3]) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}
