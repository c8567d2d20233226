use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A rolling window that keeps at most `capacity` elements by dropping the
/// oldest one on overflow.
#[derive(Debug, Clone)]
pub struct Window<T> {
    data: VecDeque<T>,
    capacity: usize,
}

impl<T> Window<T> {
    /// An empty window holding up to `capacity` elements
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an element, evicting the oldest one when full
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        while self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    /// Number of elements currently in the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` until the first push
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

impl<T> Default for Window<T> {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Timestamps of recent failures, limited by age instead of count.
///
/// Entries older than `span` are pruned on every read and write, so the
/// window never reports stale failures.
#[derive(Debug, Clone)]
pub(crate) struct FailureWindow {
    span: Duration,
    timestamps: VecDeque<Instant>,
}

impl FailureWindow {
    pub(crate) const fn new(span: Duration) -> Self {
        Self {
            span,
            timestamps: VecDeque::new(),
        }
    }

    /// Record a failure and return the number of failures within the span.
    pub(crate) fn record(&mut self, now: Instant) -> usize {
        self.timestamps.push_back(now);
        self.count(now)
    }

    /// Number of failures within the span ending at `now`.
    pub(crate) fn count(&mut self, now: Instant) -> usize {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) > self.span {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        self.timestamps.len()
    }

    pub(crate) fn clear(&mut self) {
        self.timestamps.clear();
    }
}
