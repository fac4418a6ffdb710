//! Trackwatch: flags vehicles leaving the drivable surface in a fixed-camera video

use std::sync::Arc;

use color_eyre::{eyre::WrapErr, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use trackwatch::display::ConsoleDisplay;
use trackwatch::pipeline::{self, DetectionSession};
use trackwatch::{utils, Config};

const DEFAULT_CONFIG_PATH: &str = "trackwatch.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    init_tracing();

    info!("Trackwatch launching...");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .wrap_err_with(|| format!("failed to load configuration from {config_path}"))?;
    info!(
        "Thresholds: exit={:.1}%, bg_sub={}, noise={}px",
        config.detection.exit_threshold,
        config.detection.background_subtraction_threshold,
        config.detection.vehicle_noise_threshold
    );

    // Open the source and build the track mask from its first frame
    let source = utils::open_source(&config.source).wrap_err("failed to open frame source")?;
    let session = DetectionSession::open(source, &config).wrap_err("failed to start session")?;
    let track = Arc::clone(session.track_mask());

    let handle = pipeline::spawn(session, true);
    let episodes = handle.episodes.clone();

    let mut console = ConsoleDisplay::new(&config.display, config.aggregation.max_episodes, track);
    console
        .run(&handle, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    let summary = handle.shutdown().await?;
    console.drain(&episodes);

    info!(
        "Trackwatch shutting down: {} frames analysed, {} shown, {} episode(s) ({} kept)",
        summary.frames_processed,
        console.frames_shown(),
        console.episodes().stats().pushed,
        console.episodes().len()
    );
    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trackwatch=info"));

    #[cfg(feature = "profiling")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_timer(tracing_subscriber::fmt::time::uptime()))
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }

    #[cfg(not(feature = "profiling"))]
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();
}
