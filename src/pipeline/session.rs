//! One detection run over a frame source

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info, instrument, warn};

use crate::capture::FrameSource;
use crate::detection::{Analysis, EpisodeAggregator, FrameAnalyzer, InfractionEpisode, TrackMask};
use crate::error::{Error, Result};
use crate::utils::format_timestamp;
use crate::Config;

/// Per-frame output handed to the presentation side.
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Position in the current pass over the source, starting at 1
    pub frame_index: u64,
    /// Source sequence number, keeps counting across loop restarts
    pub sequence: u64,
    pub display_timestamp: String,
    /// `None` when no vehicle was found
    pub in_track_fraction: Option<f64>,
    pub vehicle_pixels: Option<usize>,
    pub infraction: bool,
    /// Track mask with the vehicle painted by verdict
    pub overlay: Arc<RgbImage>,
    /// Unmodified working frame
    pub source: Arc<RgbImage>,
}

#[derive(Debug)]
pub struct Step {
    pub report: FrameReport,
    /// Episodes sealed while processing this frame, in order
    pub sealed: Vec<InfractionEpisode>,
}

/// Owns the source, the analyzer and the episode aggregator. The reference
/// frame and track mask are captured once in `open` and survive loop
/// restarts. Drive it from a single thread; aggregation depends on order.
pub struct DetectionSession {
    source: Box<dyn FrameSource>,
    analyzer: FrameAnalyzer,
    aggregator: EpisodeAggregator,
    /// Sealed but not yet handed out, e.g. when a rewind failed
    pending: Vec<InfractionEpisode>,
    track_view: Arc<RgbImage>,
    frame_rate: f64,
    frame_index: u64,
    looping: bool,
    loops: u64,
    frames_processed: u64,
    episodes_sealed: u64,
}

/// Counters for the end-of-run log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub episodes_sealed: u64,
    pub loops: u64,
}

impl DetectionSession {
    /// Capture the reference frame, build the track mask and rewind the
    /// source so the first analysed frame is the reference itself.
    #[instrument(skip_all)]
    pub fn open(mut source: Box<dyn FrameSource>, config: &Config) -> Result<Self> {
        config.validate()?;

        let reference = source
            .next_frame()
            .map_err(|e| Error::Source(format!("cannot read reference frame: {e}")))?
            .ok_or_else(|| Error::Source("stream ended before a reference frame".into()))?;
        let (width, height) = reference.dimensions();

        let track_mask = Arc::new(TrackMask::build(&reference.image, &config.track_mask));
        info!(
            "Reference frame {}x{}, track covers {:.1}% of the view",
            width,
            height,
            track_mask.coverage() * 100.0
        );
        if track_mask.coverage() == 0.0 {
            warn!("Track mask is empty; every vehicle will read as off track");
        }

        let track_view = Arc::new(track_mask.visualization().clone());
        let analyzer = FrameAnalyzer::new(
            Arc::clone(&reference.image),
            track_mask,
            config.detection,
        )?;

        source.rewind()?;

        let frame_rate = match source.frame_rate() {
            fps if fps.is_finite() && fps > 0.0 => fps,
            fps => {
                warn!(
                    "Source reported {} fps, using {:.1}",
                    fps, config.source.fallback_fps
                );
                config.source.fallback_fps
            }
        };

        Ok(Self {
            source,
            analyzer,
            aggregator: EpisodeAggregator::new(
                config.aggregation.grouping_window(),
                config.aggregation.max_frames_per_episode,
            ),
            pending: Vec::new(),
            track_view,
            frame_rate,
            frame_index: 0,
            looping: config.source.looping,
            loops: 0,
            frames_processed: 0,
            episodes_sealed: 0,
        })
    }

    pub fn analyzer(&self) -> &FrameAnalyzer {
        &self.analyzer
    }

    pub fn track_mask(&self) -> &Arc<TrackMask> {
        self.analyzer.track_mask()
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames_processed: self.frames_processed,
            episodes_sealed: self.episodes_sealed,
            loops: self.loops,
        }
    }

    /// Process the next frame. `Ok(None)` once a non-looping source is
    /// exhausted; call `finish` afterwards (or after an error) to collect the
    /// trailing episodes.
    pub fn step(&mut self) -> Result<Option<Step>> {
        self.step_at(Instant::now())
    }

    /// As `step`, with the wall-clock instant supplied by the caller.
    pub fn step_at(&mut self, now: Instant) -> Result<Option<Step>> {
        let frame = match self.source.next_frame()? {
            Some(frame) => frame,
            None if self.looping => {
                // an episode never spans a loop boundary
                self.pending.extend(self.aggregator.flush());
                self.source.rewind()?;
                self.frame_index = 0;
                self.loops += 1;
                info!("End of stream, restarting (loop {})", self.loops);

                self.source
                    .next_frame()?
                    .ok_or_else(|| Error::Source("stream is empty after rewind".into()))?
            }
            None => {
                debug!("End of stream");
                return Ok(None);
            }
        };

        self.frame_index += 1;
        self.frames_processed += 1;
        let display_timestamp = format_timestamp(self.frame_index, self.frame_rate);

        let analysis = self.analyzer.analyze(&frame.image)?;
        let infraction = analysis.is_infraction();

        let report = match analysis {
            Analysis::Vehicle(c) => FrameReport {
                frame_index: self.frame_index,
                sequence: frame.meta.sequence,
                display_timestamp,
                in_track_fraction: Some(c.in_track_fraction),
                vehicle_pixels: Some(c.vehicle_pixels),
                infraction: c.infraction,
                overlay: Arc::new(c.overlay),
                source: Arc::clone(&frame.image),
            },
            Analysis::NoVehicle => FrameReport {
                frame_index: self.frame_index,
                sequence: frame.meta.sequence,
                display_timestamp,
                in_track_fraction: None,
                vehicle_pixels: None,
                infraction: false,
                overlay: Arc::clone(&self.track_view),
                source: Arc::clone(&frame.image),
            },
        };

        let mut sealed = std::mem::take(&mut self.pending);
        sealed.extend(self.aggregator.observe(
            infraction,
            Arc::clone(&frame.image),
            &report.display_timestamp,
            now,
        ));
        self.episodes_sealed += sealed.len() as u64;

        Ok(Some(Step { report, sealed }))
    }

    /// Hand out every episode not yet returned by a step, sealing the open
    /// one. Safe to call after a failed step.
    pub fn finish(&mut self) -> Vec<InfractionEpisode> {
        let mut sealed = std::mem::take(&mut self.pending);
        sealed.extend(self.aggregator.flush());
        self.episodes_sealed += sealed.len() as u64;
        sealed
    }
}

impl fmt::Debug for DetectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionSession")
            .field("frame_rate", &self.frame_rate)
            .field("frame_index", &self.frame_index)
            .field("looping", &self.looping)
            .field("state", &self.aggregator.state())
            .field("pending", &self.pending.len())
            .field("summary", &self.summary())
            .finish_non_exhaustive()
    }
}
