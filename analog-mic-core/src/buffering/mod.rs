//! Single-slot sample handoff between the driver callback and the main loop.
//!
//! ## Protocol
//!
//! ```text
//! callback context                     main loop context
//! ────────────────                     ─────────────────
//! write samples[0..k]  (Relaxed)
//! ready.swap(k)        (SeqCst) ──┐
//!                                 └──► ready.swap(0)  (SeqCst)
//!                                      read samples[0..k] (Relaxed)
//! ```
//!
//! There is exactly one buffer and one ready count. A second capture event
//! before the loop drains replaces the first batch: its samples are lost and
//! only counted in [`HandoffStats::samples_overwritten`]. The loop may also
//! observe samples from a newer batch if the callback fires mid-iteration.
//! Neither case is reported as an error.

pub mod drained;

use std::sync::atomic::{AtomicI16, AtomicUsize, Ordering};

use serde::Serialize;
use tracing::trace;

use crate::audio::SampleReader;

pub use drained::{Drained, DrainedIter};

/// Buffer capacity used by the demo: 256 samples (one second at 256 Hz).
pub const DEFAULT_CAPACITY: usize = 256;

/// Shared buffer + ready count. Wrap in `Arc` and hand one clone to the
/// driver callback.
pub struct SampleHandoff<const N: usize = DEFAULT_CAPACITY> {
    samples: [AtomicI16; N],
    ready: AtomicUsize,
    stats: HandoffStats,
}

impl<const N: usize> SampleHandoff<N> {
    pub fn new() -> Self {
        Self {
            samples: std::array::from_fn(|_| AtomicI16::new(0)),
            ready: AtomicUsize::new(0),
            stats: HandoffStats::default(),
        }
    }

    /// Buffer capacity `N`.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Producer side: copy up to `N` samples and mark them ready.
    ///
    /// Any batch the consumer has not drained yet is replaced. Returns the
    /// number of samples now ready.
    pub fn publish(&self, samples: &[i16]) -> usize {
        let count = samples.len().min(N);
        for (slot, &sample) in self.samples.iter().zip(&samples[..count]) {
            slot.store(sample, Ordering::Relaxed);
        }

        let unread = self.ready.swap(count, Ordering::SeqCst);

        self.stats.batches_published.fetch_add(1, Ordering::Relaxed);
        self.stats
            .samples_published
            .fetch_add(count, Ordering::Relaxed);
        if unread > 0 {
            self.stats
                .samples_overwritten
                .fetch_add(unread, Ordering::Relaxed);
            trace!(unread, count, "unread batch replaced");
        }
        count
    }

    /// Capture-complete callback body: pull the driver's filled buffer and
    /// publish it. Must not block or emit anything.
    pub fn on_capture_complete(&self, reader: &mut dyn SampleReader) -> usize {
        let mut scratch = [0i16; N];
        let read = reader.read_samples(&mut scratch).min(N);
        self.publish(&scratch[..read])
    }

    /// Consumer side: claim the ready count and reset it to zero.
    ///
    /// Never blocks; returns an empty view when nothing is pending.
    pub fn drain(&self) -> Drained<'_, N> {
        let count = self.ready.swap(0, Ordering::SeqCst);
        if count > 0 {
            self.stats.batches_drained.fetch_add(1, Ordering::Relaxed);
            self.stats
                .samples_drained
                .fetch_add(count, Ordering::Relaxed);
        }
        Drained::new(self, count)
    }

    /// Current ready count without claiming it.
    pub fn ready_count(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> &HandoffStats {
        &self.stats
    }

    fn sample(&self, index: usize) -> i16 {
        self.samples[index].load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for SampleHandoff<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for SampleHandoff<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleHandoff")
            .field("capacity", &N)
            .field("ready", &self.ready_count())
            .finish_non_exhaustive()
    }
}

/// Producer/consumer counters kept by the handoff.
#[derive(Default)]
pub struct HandoffStats {
    pub batches_published: AtomicUsize,
    pub samples_published: AtomicUsize,
    pub batches_drained: AtomicUsize,
    pub samples_drained: AtomicUsize,
    pub samples_overwritten: AtomicUsize,
}

impl HandoffStats {
    pub fn reset(&self) {
        self.batches_published.store(0, Ordering::Relaxed);
        self.samples_published.store(0, Ordering::Relaxed);
        self.batches_drained.store(0, Ordering::Relaxed);
        self.samples_drained.store(0, Ordering::Relaxed);
        self.samples_overwritten.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HandoffSnapshot {
        HandoffSnapshot {
            batches_published: self.batches_published.load(Ordering::Relaxed),
            samples_published: self.samples_published.load(Ordering::Relaxed),
            batches_drained: self.batches_drained.load(Ordering::Relaxed),
            samples_drained: self.samples_drained.load(Ordering::Relaxed),
            samples_overwritten: self.samples_overwritten.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffSnapshot {
    pub batches_published: usize,
    pub samples_published: usize,
    pub batches_drained: usize,
    pub samples_drained: usize,
    pub samples_overwritten: usize,
}
