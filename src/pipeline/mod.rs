//! Analysis worker and its hand-off to the display side
//!
//! Frames are read, analysed and aggregated on one blocking worker. Each
//! per-frame report goes into a single-slot [`Mailbox`] (newest wins, drops
//! are expected); sealed episodes go through a `flume` channel so none is
//! lost in transit.

pub mod episode_log;
pub mod mailbox;
pub mod session;

pub use episode_log::EpisodeLog;
pub use mailbox::{Mailbox, MailboxStats};
pub use session::{DetectionSession, FrameReport, SessionSummary, Step};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::detection::InfractionEpisode;
use crate::error::{Error, Result};

/// Handles held by the consumer of a running pipeline.
pub struct PipelineHandle {
    pub reports: Arc<Mailbox<FrameReport>>,
    pub episodes: Receiver<InfractionEpisode>,
    stop: Arc<AtomicBool>,
    task: JoinHandle<Result<SessionSummary>>,
}

impl PipelineHandle {
    /// Ask the worker to stop after the frame in progress.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the worker and wait for its summary.
    pub async fn shutdown(self) -> Result<SessionSummary> {
        self.stop();
        self.join().await
    }

    /// Wait for the worker without stopping it.
    pub async fn join(self) -> Result<SessionSummary> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                error!("Analysis worker panicked");
                std::panic::resume_unwind(e.into_panic())
            }
            Err(e) => Err(Error::Source(format!("analysis worker cancelled: {e}"))),
        }
    }
}

/// Run `session` on a blocking worker. With `pace` set the worker sleeps to
/// keep to the source frame rate; otherwise it runs as fast as it can.
pub fn spawn(session: DetectionSession, pace: bool) -> PipelineHandle {
    let reports = Arc::new(Mailbox::new());
    let (tx, rx) = flume::unbounded();
    let stop = Arc::new(AtomicBool::new(false));

    let task = {
        let reports = Arc::clone(&reports);
        let stop = Arc::clone(&stop);
        tokio::task::spawn_blocking(move || run(session, &reports, &tx, &stop, pace))
    };

    PipelineHandle {
        reports,
        episodes: rx,
        stop,
        task,
    }
}

/// Worker loop. Public so callers without a runtime can drive it on their
/// own thread.
pub fn run(
    mut session: DetectionSession,
    reports: &Mailbox<FrameReport>,
    episodes: &Sender<InfractionEpisode>,
    stop: &AtomicBool,
    pace: bool,
) -> Result<SessionSummary> {
    let frame_interval = Duration::from_secs_f64(1.0 / session.frame_rate());
    info!(
        "Analysis worker started at {:.1} fps{}",
        session.frame_rate(),
        if pace { "" } else { " (unpaced)" }
    );

    while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();

        let step = match session.step() {
            Ok(Some(step)) => step,
            Ok(None) => break,
            Err(e) => {
                // episodes already observed still reach the consumer
                for episode in session.finish() {
                    let _ = episodes.send(episode);
                }
                error!("Analysis worker failed: {}", e);
                return Err(e);
            }
        };

        for episode in step.sealed {
            if episodes.send(episode).is_err() {
                info!("Episode receiver gone, stopping worker");
                return Ok(session.summary());
            }
        }
        reports.publish(step.report);

        if pace {
            if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    for episode in session.finish() {
        let _ = episodes.send(episode);
    }

    let summary = session.summary();
    info!(
        "Analysis worker finished: {} frames, {} episodes, {} loop(s)",
        summary.frames_processed, summary.episodes_sealed, summary.loops
    );
    Ok(summary)
}
