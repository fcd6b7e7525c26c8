//! Inclusive block ranges and their fixed-size windows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive range of block numbers (`from..=to`, `from <= to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Returns `None` when `from > to`.
    pub fn new(from: u64, to: u64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    pub fn single(block: u64) -> Self {
        Self {
            from: block,
            to: block,
        }
    }

    /// The `span` blocks ending at `end` (clamped at genesis).
    pub fn trailing(end: u64, span: u64) -> Self {
        Self {
            from: end.saturating_sub(span.saturating_sub(1)),
            to: end,
        }
    }

    pub fn block_count(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn contains(&self, block: u64) -> bool {
        (self.from..=self.to).contains(&block)
    }

    /// The part of this range starting at `block`, if any.
    pub fn starting_at(&self, block: u64) -> Option<Self> {
        Self::new(block.max(self.from), self.to)
    }

    /// Consecutive windows of at most `size` blocks covering the range in order.
    pub fn chunks(&self, size: u64) -> Chunks {
        Chunks {
            next: Some(self.from),
            end: self.to,
            size: size.max(1),
        }
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

#[derive(Debug, Clone)]
pub struct Chunks {
    next: Option<u64>,
    end: u64,
    size: u64,
}

impl Iterator for Chunks {
    type Item = BlockRange;

    fn next(&mut self) -> Option<Self::Item> {
        let from = self.next?;
        let to = from.saturating_add(self.size - 1).min(self.end);
        self.next = if to >= self.end { None } else { Some(to + 1) };
        Some(BlockRange { from, to })
    }
}
