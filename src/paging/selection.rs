//! Candidate selection for free crawls.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::buffer::PageableBuffer;

/// Shared handle to a registered buffer.
pub type BufferHandle = Arc<dyn PageableBuffer>;

/// Shapes a candidate range may yield.
///
/// Plain handles, optional handles and `(key, handle)` pairs from map
/// iteration are all accepted; `None` entries are skipped.
pub trait SelectionCandidate {
    fn candidate(&self) -> Option<&BufferHandle>;
}

impl SelectionCandidate for BufferHandle {
    fn candidate(&self) -> Option<&BufferHandle> {
        Some(self)
    }
}

impl SelectionCandidate for Option<BufferHandle> {
    fn candidate(&self) -> Option<&BufferHandle> {
        self.as_ref()
    }
}

impl<K> SelectionCandidate for (K, BufferHandle) {
    fn candidate(&self) -> Option<&BufferHandle> {
        Some(&self.1)
    }
}

impl<K> SelectionCandidate for (&K, &BufferHandle) {
    fn candidate(&self) -> Option<&BufferHandle> {
        Some(self.1)
    }
}

impl<T: SelectionCandidate + ?Sized> SelectionCandidate for &T {
    fn candidate(&self) -> Option<&BufferHandle> {
        (**self).candidate()
    }
}

/// Which buffers a sweep acts on first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Least recently touched first.
    #[default]
    Lru,
    /// Iteration order, no sorting.
    Fifo,
    /// Largest age relative to the current frame first.
    OldestFirst,
    /// Largest size first.
    LargestFirst,
}

impl SelectionStrategy {
    /// Pick up to `count` buffers from `candidates`.
    ///
    /// Returns exactly `min(count, non-empty candidates)` handles. Sorts are
    /// stable, so ties keep iteration order.
    pub fn select<I>(&self, candidates: I, count: usize, current_frame: u64) -> Vec<BufferHandle>
    where
        I: IntoIterator,
        I::Item: SelectionCandidate,
    {
        if count == 0 {
            return Vec::new();
        }
        let present = candidates.into_iter().filter_map(|c| c.candidate().cloned());

        if *self == Self::Fifo {
            return present.take(count).collect();
        }

        let mut pool: Vec<BufferHandle> = present.collect();
        match self {
            Self::Lru => pool.sort_by_key(|b| b.frame_stamp()),
            Self::OldestFirst => {
                pool.sort_by_key(|b| Reverse(current_frame.saturating_sub(b.frame_stamp())))
            }
            Self::LargestFirst => pool.sort_by_key(|b| Reverse(b.size())),
            Self::Fifo => {}
        }
        pool.truncate(count);
        pool
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Fifo => "fifo",
            Self::OldestFirst => "oldest_first",
            Self::LargestFirst => "largest_first",
        }
    }
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "lru" => Ok(Self::Lru),
            "fifo" => Ok(Self::Fifo),
            "oldest_first" | "oldest" => Ok(Self::OldestFirst),
            "largest_first" | "largest" => Ok(Self::LargestFirst),
            other => Err(format!("unknown selection strategy: {}", other)),
        }
    }
}
