use image::RgbImage;
use std::sync::Arc;

/// Decoded frame at working resolution. The pixel buffer is shared, so
/// cloning a frame or handing it to an episode never copies pixels.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: Arc<RgbImage>,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,
}

#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Monotonic across the whole run, loop restarts included
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            image: Arc::new(image),
            meta: Arc::new(FrameMetadata {
                sequence,
                width,
                height,
            }),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.meta.width, self.meta.height)
    }
}
