pub mod analyzer;
pub mod episode;
pub mod morphology;
pub mod track_mask;

pub use analyzer::{analyze_frame, classify, Analysis, FrameAnalyzer, FrameClassification, Verdict};
pub use episode::{AggregatorState, EpisodeAggregator, InfractionEpisode};
pub use track_mask::{build_track_mask, TrackMask};
