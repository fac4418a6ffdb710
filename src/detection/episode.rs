//! Groups the per-frame infraction stream into reviewable episodes
//!
//! A single flag per frame is too noisy to alert on. The aggregator opens an
//! episode on the first off-track frame, keeps appending while the excursion
//! lasts, and seals it either when the vehicle is back on track or when the
//! grouping window has elapsed, in which case a fresh episode continues
//! from the same frame.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    Idle,
    Active,
}

/// Sealed, immutable group of consecutive off-track frames.
#[derive(Debug, Clone)]
pub struct InfractionEpisode {
    /// Monotonic per session, starting at 1
    pub id: u64,
    /// Display timestamp at which the episode was sealed
    pub timestamp: String,
    /// Stored frames in arrival order, never empty
    pub frames: Vec<Arc<RgbImage>>,
    /// Frames the excursion actually spanned, including any not stored
    pub span_frames: usize,
}

impl InfractionEpisode {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn summary(&self) -> String {
        format!("Track exit at {} (x{} frames)", self.timestamp, self.span_frames)
    }
}

#[derive(Debug)]
struct OpenEpisode {
    started: Instant,
    frames: Vec<Arc<RgbImage>>,
    span_frames: usize,
}

/// Two-state machine (idle / active). Must be driven by a single ordered
/// stream of observations.
#[derive(Debug)]
pub struct EpisodeAggregator {
    window: Duration,
    max_frames: usize,
    open: Option<OpenEpisode>,
    last_timestamp: Option<String>,
    next_id: u64,
}

impl EpisodeAggregator {
    pub fn new(window: Duration, max_frames_per_episode: usize) -> Self {
        Self {
            window,
            max_frames: max_frames_per_episode.max(1),
            open: None,
            last_timestamp: None,
            next_id: 1,
        }
    }

    pub fn state(&self) -> AggregatorState {
        if self.open.is_some() {
            AggregatorState::Active
        } else {
            AggregatorState::Idle
        }
    }

    /// Frames held by the open episode, 0 when idle.
    pub fn pending_frames(&self) -> usize {
        self.open.as_ref().map_or(0, |e| e.frames.len())
    }

    /// Feed one processed frame. `NoVehicle` frames are fed as `infraction = false`.
    pub fn observe(
        &mut self,
        infraction: bool,
        frame: Arc<RgbImage>,
        timestamp: &str,
        now: Instant,
    ) -> Option<InfractionEpisode> {
        self.last_timestamp = Some(timestamp.to_owned());

        if !infraction {
            return self.seal(timestamp);
        }

        match self.open.as_mut() {
            None => {
                debug!(timestamp, "infraction started");
                self.open = Some(self.start(frame, now));
                None
            }
            Some(open) if now.saturating_duration_since(open.started) >= self.window => {
                let sealed = self.seal(timestamp);
                self.open = Some(self.start(frame, now));
                sealed
            }
            Some(open) => {
                open.span_frames += 1;
                if open.frames.len() < self.max_frames {
                    open.frames.push(frame);
                }
                None
            }
        }
    }

    /// Seal any open episode with the last timestamp seen, e.g. at end of
    /// stream or on a loop restart.
    pub fn flush(&mut self) -> Option<InfractionEpisode> {
        let timestamp = self.last_timestamp.clone()?;
        self.seal(&timestamp)
    }

    fn start(&self, frame: Arc<RgbImage>, now: Instant) -> OpenEpisode {
        OpenEpisode {
            started: now,
            frames: vec![frame],
            span_frames: 1,
        }
    }

    fn seal(&mut self, timestamp: &str) -> Option<InfractionEpisode> {
        let open = self.open.take()?;
        if open.frames.is_empty() {
            return None;
        }

        let episode = InfractionEpisode {
            id: self.next_id,
            timestamp: timestamp.to_owned(),
            frames: open.frames,
            span_frames: open.span_frames,
        };
        self.next_id += 1;

        metrics::counter!("episodes_sealed").increment(1);
        info!(
            id = episode.id,
            frames = episode.span_frames,
            "{}",
            episode.summary()
        );

        Some(episode)
    }
}
