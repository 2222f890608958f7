//! Two-level priority bitmap for O(1) highest-ready lookup
//!
//! Bit `i` of the low map is set when bucket `i` holds at least one
//! thread. Bit `w` of the high map is set when low word `w` is non-zero.
//! Bucket indexes are normalized so that index 0 is the highest
//! priority, which turns a find-first-set scan into "find highest".

use crate::config::CFG_MLQ_LEVELS;

/// Bits per bitmap word
const WORD_BITS: usize = u32::BITS as usize;

/// Number of words in the low map
const LOMAP_WORDS: usize = (CFG_MLQ_LEVELS + WORD_BITS - 1) / WORD_BITS;

// The high map is a single word
const _: () = assert!(LOMAP_WORDS <= WORD_BITS);

/// Priority bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioMap {
    himap: u32,
    lomap: [u32; LOMAP_WORDS],
}

impl PrioMap {
    pub const fn new() -> Self {
        PrioMap {
            himap: 0,
            lomap: [0; LOMAP_WORDS],
        }
    }

    #[inline(always)]
    const fn split(idx: usize) -> (usize, usize) {
        (idx / WORD_BITS, idx % WORD_BITS)
    }

    /// Mark bucket `idx` non-empty
    #[inline]
    pub fn insert(&mut self, idx: usize) {
        debug_assert!(idx < CFG_MLQ_LEVELS);

        let (hi, lo) = Self::split(idx);
        self.himap |= 1 << hi;
        self.lomap[hi] |= 1 << lo;
    }

    /// Mark bucket `idx` empty
    #[inline]
    pub fn remove(&mut self, idx: usize) {
        debug_assert!(idx < CFG_MLQ_LEVELS);

        let (hi, lo) = Self::split(idx);
        self.lomap[hi] &= !(1 << lo);
        if self.lomap[hi] == 0 {
            self.himap &= !(1 << hi);
        }
    }

    /// Lowest non-empty bucket index, i.e. the highest priority
    #[inline]
    pub fn first(&self) -> Option<usize> {
        if self.himap == 0 {
            return None;
        }
        let hi = self.himap.trailing_zeros() as usize;
        let lo = self.lomap[hi].trailing_zeros() as usize;
        Some(hi * WORD_BITS + lo)
    }

    /// Check if bucket `idx` is marked non-empty
    #[inline]
    pub fn is_set(&self, idx: usize) -> bool {
        let (hi, lo) = Self::split(idx);
        (self.lomap[hi] & (1 << lo)) != 0
    }

    /// Check if no bucket is marked
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.himap == 0
    }
}

impl Default for PrioMap {
    fn default() -> Self {
        Self::new()
    }
}
