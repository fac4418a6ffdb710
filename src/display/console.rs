//! Headless display: polls the latest report and logs what a viewer would see

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use flume::Receiver;
use image::RgbImage;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::ViewMode;
use crate::detection::{InfractionEpisode, TrackMask};
use crate::pipeline::{EpisodeLog, FrameReport, PipelineHandle};
use crate::DisplayConfig;

pub struct ConsoleDisplay {
    view_mode: ViewMode,
    poll_interval: Duration,
    track: Arc<TrackMask>,
    episodes: EpisodeLog,
    current: Option<Arc<FrameReport>>,
    off_track: bool,
    frames_shown: u64,
}

impl ConsoleDisplay {
    pub fn new(config: &DisplayConfig, max_episodes: usize, track: Arc<TrackMask>) -> Self {
        Self {
            view_mode: config.view_mode,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            track,
            episodes: EpisodeLog::new(max_episodes),
            current: None,
            off_track: false,
            frames_shown: 0,
        }
    }

    pub fn set_view_mode(&mut self, mode: ViewMode) {
        self.view_mode = mode;
    }

    pub fn episodes(&self) -> &EpisodeLog {
        &self.episodes
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }

    /// Image the secondary view would currently show.
    pub fn current_view(&self) -> Option<&RgbImage> {
        self.current
            .as_deref()
            .map(|report| self.view_mode.select(report, &self.track))
    }

    /// Show a new report, logging on-track / off-track transitions.
    pub fn show(&mut self, report: Arc<FrameReport>) {
        self.frames_shown += 1;

        if report.infraction != self.off_track {
            self.off_track = report.infraction;
            if report.infraction {
                warn!("[{}] TRACK EXIT", report.display_timestamp);
            } else {
                info!("[{}] Back on track", report.display_timestamp);
            }
        }
        debug!(
            "[{}] {}",
            report.display_timestamp,
            self.view_mode.caption(&report)
        );

        self.current = Some(report);
    }

    pub fn record(&mut self, episode: InfractionEpisode) {
        let episode = self.episodes.push(episode);
        warn!("Episode {}: {}", episode.id, episode.summary());
    }

    /// Move every pending episode into the log. Returns how many arrived.
    pub fn drain(&mut self, episodes: &Receiver<InfractionEpisode>) -> usize {
        let mut received = 0;
        while let Ok(episode) = episodes.try_recv() {
            self.record(episode);
            received += 1;
        }
        received
    }

    /// Poll `pipeline` until it finishes or `shutdown` resolves.
    pub async fn run(&mut self, pipeline: &PipelineHandle, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Quit requested");
                    break;
                }
                _ = ticker.tick() => {
                    let finished = pipeline.is_finished();
                    if let Some(report) = pipeline.reports.take() {
                        self.show(report);
                    }
                    self.drain(&pipeline.episodes);
                    if finished {
                        info!("Pipeline finished");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Rgb};

    fn display() -> ConsoleDisplay {
        let track = Arc::new(TrackMask::from_mask(GrayImage::new(2, 2)));
        ConsoleDisplay::new(&DisplayConfig::default(), 2, track)
    }

    fn report(infraction: bool) -> Arc<FrameReport> {
        Arc::new(FrameReport {
            frame_index: 1,
            sequence: 1,
            display_timestamp: "00:00.0".into(),
            in_track_fraction: Some(if infraction { 10.0 } else { 90.0 }),
            vehicle_pixels: Some(2000),
            infraction,
            overlay: Arc::new(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]))),
            source: Arc::new(RgbImage::new(2, 2)),
        })
    }

    fn episode(id: u64) -> InfractionEpisode {
        InfractionEpisode {
            id,
            timestamp: "00:01.0".into(),
            frames: vec![Arc::new(RgbImage::new(2, 2))],
            span_frames: 1,
        }
    }

    #[test]
    fn view_follows_mode() {
        let mut display = display();
        assert!(display.current_view().is_none());

        display.show(report(true));
        assert_eq!(*display.current_view().unwrap().get_pixel(0, 0), Rgb([255, 0, 0]));

        display.set_view_mode(ViewMode::TrackOnly);
        assert_eq!(*display.current_view().unwrap().get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(display.frames_shown(), 1);
    }

    #[test]
    fn drains_episodes_into_bounded_log() {
        let mut display = display();
        let (tx, rx) = flume::unbounded();
        for id in 1..=3 {
            tx.send(episode(id)).unwrap();
        }

        assert_eq!(display.drain(&rx), 3);
        assert_eq!(display.episodes().len(), 2);
        assert_eq!(display.episodes().latest().map(|e| e.id), Some(3));
        assert_eq!(display.drain(&rx), 0);
    }
}
