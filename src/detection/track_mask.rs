//! Drivable-surface mask built once from the empty reference frame

use image::{GrayImage, Luma, RgbImage};
use tracing::{debug, instrument};

use super::morphology::{self, MASK_ON};
use crate::TrackMaskConfig;

/// Binary mask of the drivable surface plus its three-channel rendering.
///
/// Immutable once built; share it behind an `Arc` between analyses.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackMask {
    mask: GrayImage,
    visualization: RgbImage,
}

impl TrackMask {
    /// Threshold the reference frame in HSV, erode away thin markings, then
    /// close small holes left by texture and shadows.
    #[instrument(skip_all, fields(width = reference.width(), height = reference.height()))]
    pub fn build(reference: &RgbImage, cfg: &TrackMaskConfig) -> Self {
        let hsv = to_hsv(reference);
        let initial = in_range(&hsv, cfg.hsv_lower, cfg.hsv_upper);
        let eroded = morphology::erode(&initial, cfg.erosion_kernel, 1);
        let mask = morphology::close(&eroded, cfg.closing_kernel, 1);

        debug!(
            initial = morphology::count_nonzero(&initial),
            eroded = morphology::count_nonzero(&eroded),
            closed = morphology::count_nonzero(&mask),
            "track mask built"
        );

        Self::from_mask(mask)
    }

    /// Wrap an existing binary mask (any non-zero byte counts as track).
    pub fn from_mask(mut mask: GrayImage) -> Self {
        for p in mask.iter_mut() {
            if *p != 0 {
                *p = MASK_ON;
            }
        }
        let visualization = morphology::to_rgb(&mask);
        Self {
            mask,
            visualization,
        }
    }

    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// The "track only" view, also the base canvas for vehicle overlays.
    pub fn visualization(&self) -> &RgbImage {
        &self.visualization
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Share of the frame classified as drivable, 0.0..=1.0.
    pub fn coverage(&self) -> f64 {
        let total = self.mask.width() as usize * self.mask.height() as usize;
        if total == 0 {
            return 0.0;
        }
        morphology::count_nonzero(&self.mask) as f64 / total as f64
    }
}

pub fn build_track_mask(reference: &RgbImage, cfg: &TrackMaskConfig) -> TrackMask {
    TrackMask::build(reference, cfg)
}

/// RGB to 8-bit HSV with hue halved into 0..=180 so calibration values
/// taken with OpenCV tools carry over unchanged.
pub fn to_hsv(rgb: &RgbImage) -> RgbImage {
    let mut out = rgb.clone();
    for pixel in out.pixels_mut() {
        pixel.0 = hsv_pixel(pixel.0);
    }
    out
}

fn hsv_pixel([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = v - min;

    let s = if v > 0.0 { delta * 255.0 / v } else { 0.0 };

    let mut h = if delta == 0.0 {
        0.0
    } else if v == rf {
        60.0 * (gf - bf) / delta
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        (h / 2.0).round().min(180.0) as u8,
        s.round() as u8,
        v as u8,
    ]
}

/// Inclusive per-channel range test.
pub fn in_range(hsv: &RgbImage, lower: [u8; 3], upper: [u8; 3]) -> GrayImage {
    GrayImage::from_fn(hsv.width(), hsv.height(), |x, y| {
        let px = hsv.get_pixel(x, y).0;
        let inside = (0..3).all(|c| px[c] >= lower[c] && px[c] <= upper[c]);
        Luma([if inside { MASK_ON } else { 0 }])
    })
}
