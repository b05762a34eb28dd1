//! Collision-resistant labels
//!
//! Suffixes come from a sequence seeded with the wall clock. The sequence is
//! an explicit object: share one `Arc<NameSequence>` between engines that
//! run side by side in the same process so their labels never collide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct NameSequence {
    next: AtomicU64,
}

impl NameSequence {
    pub fn starting_at(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    /// Seeded from the current time in milliseconds.
    pub fn seeded_now() -> Self {
        Self::starting_at(chrono::Utc::now().timestamp_millis().max(0) as u64)
    }

    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct NameGenerator {
    sequence: Arc<NameSequence>,
    separator: String,
}

impl NameGenerator {
    pub fn new(separator: impl Into<String>) -> Self {
        Self::with_sequence(Arc::new(NameSequence::seeded_now()), separator)
    }

    pub fn with_sequence(sequence: Arc<NameSequence>, separator: impl Into<String>) -> Self {
        Self {
            sequence,
            separator: separator.into(),
        }
    }

    /// `prefix + separator + suffix`, distinct from every earlier output of
    /// this sequence.
    pub fn next(&self, prefix: &str) -> String {
        format!("{}{}{}", prefix, self.separator, self.sequence.next())
    }

    pub fn sequence(&self) -> &Arc<NameSequence> {
        &self.sequence
    }
}
