//! GStreamer-based video file decoding

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};

use super::{scale, Frame, FrameSource};
use crate::error::{Error, Result};

/// Decodes a video file to RGB frames through `uridecodebin ! appsink`.
pub struct GstFileSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    working_width: u32,
    fallback_fps: f64,
    frame_rate: Option<f64>,
    sequence: u64,
}

fn gst_err(context: &str) -> impl FnOnce(gst::glib::Error) -> Error + '_ {
    move |e| Error::Source(format!("{context}: {e}"))
}

impl GstFileSource {
    pub fn open(path: &Path, working_width: u32, fallback_fps: f64) -> Result<Self> {
        gst::init().map_err(gst_err("failed to initialize GStreamer"))?;

        let absolute = path.canonicalize()?;
        let uri = gst::glib::filename_to_uri(&absolute, None)
            .map_err(gst_err("invalid video path"))?;

        let pipeline_str = format!(
            "uridecodebin uri=\"{uri}\" ! \
             videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=2"
        );
        info!("Pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(gst_err("failed to build pipeline"))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| Error::Source("failed to create pipeline".into()))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| Error::Source("failed to find appsink element".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| Error::Source("failed to cast to AppSink".into()))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| Error::Source(format!("failed to start pipeline: {e:?}")))?;

        Ok(Self {
            pipeline,
            appsink,
            working_width,
            fallback_fps,
            frame_rate: None,
            sequence: 0,
        })
    }

    fn note_frame_rate(&mut self, info: &gst_video::VideoInfo) {
        if self.frame_rate.is_some() {
            return;
        }
        let fps = info.fps();
        let rate = if fps.numer() > 0 && fps.denom() > 0 {
            fps.numer() as f64 / fps.denom() as f64
        } else {
            warn!(
                "Stream reports no frame rate, using {:.1} fps",
                self.fallback_fps
            );
            self.fallback_fps
        };
        info!("Video stream at {:.2} fps", rate);
        self.frame_rate = Some(rate);
    }
}

impl FrameSource for GstFileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        // pull_sample errors on EOS as well as on failure
        let sample = match self.appsink.pull_sample() {
            Ok(sample) => sample,
            Err(_) if self.appsink.is_eos() => return Ok(None),
            Err(_) => return Err(Error::Source("failed to pull sample from pipeline".into())),
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| Error::Source("sample contains no buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| Error::Source("failed to map buffer".into()))?;

        let caps = sample
            .caps()
            .ok_or_else(|| Error::Source("sample has no caps".into()))?;
        let video_info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|_| Error::Source("failed to parse video info from caps".into()))?;
        self.note_frame_rate(&video_info);

        let stride = video_info.stride()[0] as usize;
        let decoded = scale::from_rgb_rows(
            map.as_slice(),
            video_info.width(),
            video_info.height(),
            stride,
        )?;
        let image = scale::scale_to_width(decoded, self.working_width);

        self.sequence += 1;
        Ok(Some(Frame::new(image, self.sequence)))
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate.unwrap_or(self.fallback_fps)
    }

    fn rewind(&mut self) -> Result<()> {
        debug!("Seeking to start of stream");
        self.pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT,
                gst::ClockTime::ZERO,
            )
            .map_err(|e| Error::Source(format!("seek failed: {e}")))?;
        Ok(())
    }
}

impl Drop for GstFileSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
