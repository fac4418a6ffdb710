//! Single-slot hand-off between the analysis worker and the display
//!
//! The worker overwrites the slot with every new report and never waits; the
//! display reads whatever is newest when it polls. Reports overwritten before
//! anyone took them are dropped on purpose: the display only ever wants the
//! latest frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;

pub struct Mailbox<T> {
    slot: ArcSwapOption<T>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    published: AtomicU64,
    taken: AtomicU64,
    overwritten: AtomicU64,
}

/// Snapshot of mailbox counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxStats {
    pub published: u64,
    pub taken: u64,
    pub overwritten: u64,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::const_empty(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: replace the slot content, never blocks.
    pub fn publish(&self, value: T) {
        let previous = self.slot.swap(Some(Arc::new(value)));
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        if previous.is_some() {
            self.stats.overwritten.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("mailbox_overwrites").increment(1);
        }
    }

    /// Consumer: take the pending value, leaving the slot empty.
    pub fn take(&self) -> Option<Arc<T>> {
        let value = self.slot.swap(None);
        if value.is_some() {
            self.stats.taken.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    /// Peek at the pending value without consuming it.
    pub fn latest(&self) -> Option<Arc<T>> {
        self.slot.load_full()
    }

    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            published: self.stats.published.load(Ordering::Relaxed),
            taken: self.stats.taken.load(Ordering::Relaxed),
            overwritten: self.stats.overwritten.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_newest_value() {
        let mailbox = Mailbox::new();
        mailbox.publish(1);
        mailbox.publish(2);
        mailbox.publish(3);

        assert_eq!(mailbox.latest().as_deref(), Some(&3));
        assert_eq!(mailbox.take().as_deref(), Some(&3));
        assert!(mailbox.take().is_none());

        assert_eq!(
            mailbox.stats(),
            MailboxStats {
                published: 3,
                taken: 1,
                overwritten: 2,
            }
        );
    }

    #[test]
    fn reading_does_not_count_as_a_drop() {
        let mailbox = Mailbox::new();
        mailbox.publish("a");
        assert!(mailbox.take().is_some());
        mailbox.publish("b");
        assert_eq!(mailbox.stats().overwritten, 0);
    }

    #[test]
    fn producer_and_consumer_on_separate_threads() {
        let mailbox = Arc::new(Mailbox::new());
        let producer = {
            let mailbox = Arc::clone(&mailbox);
            std::thread::spawn(move || {
                for i in 0..10_000u32 {
                    mailbox.publish(i);
                }
            })
        };

        let mut last_seen = None;
        while !producer.is_finished() {
            if let Some(v) = mailbox.take() {
                // values only move forward
                assert!(last_seen.map_or(true, |prev| *v > prev));
                last_seen = Some(*v);
            }
        }
        producer.join().unwrap();

        let stats = mailbox.stats();
        assert_eq!(stats.published, 10_000);
        let remaining = u64::from(mailbox.take().is_some());
        assert_eq!(stats.taken + remaining + stats.overwritten, 10_000);
    }
}
