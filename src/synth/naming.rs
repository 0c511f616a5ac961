//! Seeded name and priority allocation.
//!
//! Synthesized scaling policies and listener rules need names and
//! priorities that do not collide with user-declared ones, and that stay
//! stable across runs for a fixed seed. The allocator draws candidates
//! from a seeded RNG and keeps used-value sets so collisions are resolved
//! by moving to the next free value instead of being accepted.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Length of synthesized name suffixes.
const SUFFIX_LEN: usize = 6;

/// Upper bound (inclusive) of the per-listener random priority offset.
const PRIORITY_OFFSET_MAX: u32 = 100;

/// Allocator for unique resource-name suffixes and rule priorities.
#[derive(Debug)]
pub struct UniqueNamer {
    rng: StdRng,
    used_names: HashSet<String>,
}

impl UniqueNamer {
    /// Creates a namer from an explicit seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            used_names: HashSet::new(),
        }
    }

    /// Creates a namer with a random seed.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::with_seed(rand::random())
    }

    /// Draws a lowercase alphabetic suffix.
    fn suffix(&mut self) -> String {
        (0..SUFFIX_LEN)
            .map(|_| char::from(b'a' + self.rng.gen_range(0..26)))
            .collect()
    }

    /// Produces a name `{base}{suffix}` guaranteed unique within this run.
    pub fn unique_name(&mut self, base: &str) -> String {
        loop {
            let candidate = format!("{base}{}", self.suffix());
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Draws the per-listener priority offset.
    pub fn priority_offset(&mut self) -> u32 {
        self.rng.gen_range(1..=PRIORITY_OFFSET_MAX)
    }
}

/// Per-listener rule priority allocator.
#[derive(Debug)]
pub struct PriorityAllocator {
    offset: u32,
    used: HashSet<u32>,
}

impl PriorityAllocator {
    /// Creates an allocator with the given base offset.
    #[must_use]
    pub fn new(offset: u32) -> Self {
        Self {
            offset,
            used: HashSet::new(),
        }
    }

    /// Reserves a user-declared priority.
    pub fn reserve(&mut self, priority: u32) -> bool {
        self.used.insert(priority)
    }

    /// Allocates the priority for the rule at the given ordinal index.
    ///
    /// The candidate is `offset + ordinal + 1`; if taken, the next free
    /// value above it is used.
    pub fn allocate(&mut self, ordinal: u32) -> u32 {
        let mut candidate = self.offset + ordinal + 1;
        while !self.used.insert(candidate) {
            candidate += 1;
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_names() {
        let mut a = UniqueNamer::with_seed(42);
        let mut b = UniqueNamer::with_seed(42);
        assert_eq!(a.unique_name("ScalingOutPolicy"), b.unique_name("ScalingOutPolicy"));
        assert_eq!(a.priority_offset(), b.priority_offset());
    }

    #[test]
    fn test_names_never_repeat() {
        let mut namer = UniqueNamer::with_seed(7);
        let mut seen = HashSet::new();
        for _ in 0..200 {
            assert!(seen.insert(namer.unique_name("Policy")));
        }
    }

    #[test]
    fn test_priority_collision_bumps() {
        let mut allocator = PriorityAllocator::new(10);
        assert!(allocator.reserve(11));
        // Ordinal 0 would land on 11, which is taken; it bumps to 12.
        assert_eq!(allocator.allocate(0), 12);
        assert_eq!(allocator.allocate(1), 13);
    }

    #[test]
    fn test_priorities_are_unique() {
        let mut allocator = PriorityAllocator::new(1);
        let mut seen = HashSet::new();
        for ordinal in 0..50 {
            assert!(seen.insert(allocator.allocate(ordinal)));
        }
    }
}
