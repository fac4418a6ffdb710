pub mod frame;
#[cfg(feature = "gstreamer-pipeline")]
pub mod gst_capture;
pub mod scale;
pub mod sequence;

pub use frame::{Frame, FrameMetadata};
#[cfg(feature = "gstreamer-pipeline")]
pub use gst_capture::GstFileSource;
pub use sequence::{ImageSequenceSource, MemorySource};

use crate::error::Result;

/// Supplier of successive frames at a fixed working size.
///
/// `Ok(None)` marks end of stream, which is not an error. Whether to stop or
/// loop is decided by the caller through `rewind`.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Nominal frame rate, used for display timestamps and pacing.
    fn frame_rate(&self) -> f64;

    fn rewind(&mut self) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }
}
