//! Short file identifier allocation.
//!
//! Identifiers are lowercase hex strings of a fixed length. The default of
//! 4 characters gives 65,536 values: short enough to read aloud, but
//! collisions become likely after a few thousand live files. Deployments
//! expecting more should raise `id_length`.

use rand::Rng;

use crate::config::MAX_ID_LENGTH;
use crate::{DropError, Result};

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Generates identifiers that are not already taken.
#[derive(Debug, Clone, Copy)]
pub struct IdAllocator {
    length: usize,
    max_attempts: usize,
}

impl IdAllocator {
    /// Create an allocator for `length`-character ids giving up after
    /// `max_attempts` consecutive collisions.
    pub fn new(length: usize, max_attempts: usize) -> Self {
        Self {
            length: length.clamp(1, MAX_ID_LENGTH),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Identifier length in characters.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of distinct identifiers, saturating at `u128::MAX`.
    pub fn capacity(&self) -> u128 {
        16u128.checked_pow(self.length as u32).unwrap_or(u128::MAX)
    }

    /// Allocate an identifier that `is_taken` does not report as in use.
    pub fn allocate<F>(&self, taken_count: usize, is_taken: F) -> Result<String>
    where
        F: Fn(&str) -> bool,
    {
        self.allocate_with(&mut rand::rng(), taken_count, is_taken)
    }

    /// Same as [`allocate`](Self::allocate) with an explicit random source.
    ///
    /// `taken_count` lets the allocator fail immediately when the space is
    /// already full instead of burning every attempt.
    pub fn allocate_with<R, F>(
        &self,
        rng: &mut R,
        taken_count: usize,
        is_taken: F,
    ) -> Result<String>
    where
        R: Rng + ?Sized,
        F: Fn(&str) -> bool,
    {
        if taken_count as u128 >= self.capacity() {
            tracing::error!(capacity = %self.capacity(), "Identifier space is full");
            return Err(DropError::AllocationExhausted { attempts: 0 });
        }

        for attempt in 1..=self.max_attempts {
            let candidate = self.generate(rng);
            if !is_taken(&candidate) {
                if attempt > 1 {
                    tracing::debug!(attempt, "Identifier allocated after collisions");
                }
                return Ok(candidate);
            }
        }

        tracing::error!(
            attempts = self.max_attempts,
            taken = taken_count,
            "Identifier allocation exhausted; consider a longer id_length"
        );
        Err(DropError::AllocationExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Whether `s` has the shape of an identifier this allocator produces.
    pub fn is_valid_id(&self, s: &str) -> bool {
        s.len() == self.length && s.bytes().all(|b| HEX_DIGITS.contains(&b))
    }

    fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        (0..self.length)
            .map(|_| HEX_DIGITS[rng.random_range(0..HEX_DIGITS.len())] as char)
            .collect()
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(4, 1000)
    }
}
