//! View over the batch claimed by one `drain()` call.

use super::SampleHandoff;

/// `(index, sample)` pairs claimed by a single drain, in capture order.
///
/// Samples are read from the shared buffer lazily while iterating, and the
/// view is `Copy`, so iteration can be restarted any number of times.
#[derive(Clone, Copy)]
pub struct Drained<'a, const N: usize> {
    handoff: &'a SampleHandoff<N>,
    count: usize,
}

impl<'a, const N: usize> Drained<'a, N> {
    pub(super) fn new(handoff: &'a SampleHandoff<N>, count: usize) -> Self {
        Self { handoff, count }
    }

    /// Number of valid samples claimed by this drain.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> Option<i16> {
        (index < self.count).then(|| self.handoff.sample(index))
    }

    pub fn iter(&self) -> DrainedIter<'a, N> {
        DrainedIter {
            handoff: self.handoff,
            next: 0,
            count: self.count,
        }
    }
}

impl<'a, const N: usize> IntoIterator for &Drained<'a, N> {
    type Item = (usize, i16);
    type IntoIter = DrainedIter<'a, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<const N: usize> std::fmt::Debug for Drained<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drained").field("count", &self.count).finish()
    }
}

pub struct DrainedIter<'a, const N: usize> {
    handoff: &'a SampleHandoff<N>,
    next: usize,
    count: usize,
}

impl<const N: usize> Iterator for DrainedIter<'_, N> {
    type Item = (usize, i16);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.count {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some((index, self.handoff.sample(index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.next;
        (remaining, Some(remaining))
    }
}

impl<const N: usize> ExactSizeIterator for DrainedIter<'_, N> {}
