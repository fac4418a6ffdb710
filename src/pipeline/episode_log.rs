//! Bounded retention for sealed episodes

use std::sync::Arc;

use ringbuf::traits::{Consumer, Observer, RingBuffer};
use ringbuf::HeapRb;
use tracing::debug;

use crate::detection::InfractionEpisode;

/// Ring buffer of the most recent episodes, oldest first. A long session
/// keeps at most `capacity` episodes; older ones are evicted.
pub struct EpisodeLog {
    ring: HeapRb<Arc<InfractionEpisode>>,

    /// Statistics
    stats: Stats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub pushed: u64,
    pub evicted: u64,
}

impl EpisodeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            stats: Stats::default(),
        }
    }

    /// Append an episode, evicting the oldest when full.
    pub fn push(&mut self, episode: InfractionEpisode) -> Arc<InfractionEpisode> {
        let episode = Arc::new(episode);
        if let Some(evicted) = self.ring.push_overwrite(Arc::clone(&episode)) {
            debug!(id = evicted.id, "episode evicted from log");
            self.stats.evicted += 1;
        }
        self.stats.pushed += 1;
        episode
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<InfractionEpisode>> {
        self.ring.iter()
    }

    pub fn latest(&self) -> Option<&Arc<InfractionEpisode>> {
        self.ring.iter().last()
    }

    pub fn get(&self, id: u64) -> Option<&Arc<InfractionEpisode>> {
        self.ring.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }
}
