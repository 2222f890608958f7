//! Multi-level priority run queue
//!
//! One [`ReadyList`] per priority level plus a [`PrioMap`] telling which
//! levels are populated. The map is updated in the same step as the
//! list it mirrors: a bit is set iff its bucket is non-empty.

use crate::config::{CFG_MAX_THREADS, CFG_MLQ_LEVELS};
use crate::prio::PrioMap;
use crate::types::{Prio, ThreadId};

use super::rdy_list::{QLink, ReadyList};

/// Run queue covering priorities `[loprio, hiprio]`
#[derive(Debug, Clone)]
pub struct RunQueue {
    loprio: Prio,
    hiprio: Prio,
    elems: usize,
    map: PrioMap,
    heads: [ReadyList; CFG_MLQ_LEVELS],
    links: [QLink; CFG_MAX_THREADS],
}

impl RunQueue {
    /// Create an empty queue for the given priority range
    pub const fn new(loprio: Prio, hiprio: Prio) -> Self {
        assert!(loprio <= hiprio);
        assert!(((hiprio - loprio) as usize) < CFG_MLQ_LEVELS);

        RunQueue {
            loprio,
            hiprio,
            elems: 0,
            map: PrioMap::new(),
            heads: [ReadyList::new(); CFG_MLQ_LEVELS],
            links: [QLink::UNLINKED; CFG_MAX_THREADS],
        }
    }

    /// Priority range served by this queue
    #[inline]
    pub fn range(&self) -> (Prio, Prio) {
        (self.loprio, self.hiprio)
    }

    /// Number of queued threads
    #[inline]
    pub fn len(&self) -> usize {
        self.elems
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elems == 0
    }

    /// Whether `tid` is linked to this queue
    #[inline]
    pub fn contains(&self, tid: ThreadId) -> bool {
        self.links[tid.index()].bucket.is_some()
    }

    /// Rescale `prio` to a 0-based bucket index, highest priority first
    fn index(&self, prio: Prio) -> usize {
        if prio < self.loprio || prio > self.hiprio {
            crate::fatal!("priority level {} is out of range", prio);
        }
        (self.hiprio - prio) as usize
    }

    fn link_check(&self, tid: ThreadId) {
        if self.contains(tid) {
            crate::fatal!("thread {} queued twice", tid);
        }
    }

    /// Queue `tid` ahead of its peers at `prio` (LIFO)
    pub fn insert_front(&mut self, tid: ThreadId, prio: Prio) {
        let idx = self.index(prio);
        self.link_check(tid);

        self.heads[idx].insert_head(&mut self.links, tid);
        self.links[tid.index()].bucket = Some(idx as u16);
        self.elems += 1;
        self.map.insert(idx);
    }

    /// Queue `tid` behind its peers at `prio` (FIFO)
    pub fn insert_back(&mut self, tid: ThreadId, prio: Prio) {
        let idx = self.index(prio);
        self.link_check(tid);

        self.heads[idx].insert_tail(&mut self.links, tid);
        self.links[tid.index()].bucket = Some(idx as u16);
        self.elems += 1;
        self.map.insert(idx);
    }

    fn unlink(&mut self, tid: ThreadId, idx: usize) {
        let bucket = &mut self.heads[idx];
        bucket.remove(&mut self.links, tid);
        self.elems -= 1;

        if bucket.is_empty() {
            self.map.remove(idx);
        }
    }

    /// Unlink `tid`, which must be queued here
    pub fn remove(&mut self, tid: ThreadId) {
        match self.links[tid.index()].bucket {
            Some(idx) => self.unlink(tid, idx as usize),
            None => crate::fatal!("thread {} is not queued", tid),
        }
    }

    /// Dequeue the head of the highest priority bucket
    pub fn pop_highest(&mut self) -> Option<ThreadId> {
        if self.elems == 0 {
            return None;
        }

        let idx = match self.map.first() {
            Some(idx) => idx,
            None => crate::fatal!("run queue holds {} threads but no bucket", self.elems),
        };
        let tid = match self.heads[idx].head() {
            Some(tid) => tid,
            None => crate::fatal!("bucket {} flagged but empty", idx),
        };
        self.unlink(tid, idx);

        Some(tid)
    }

    /// First thread waiting at exactly `prio`, left queued
    pub fn peek_at(&self, prio: Prio) -> Option<ThreadId> {
        self.heads[self.index(prio)].head()
    }

    /// Priority of the best queued thread
    pub fn highest_prio(&self) -> Option<Prio> {
        self.map.first().map(|idx| self.hiprio - idx as Prio)
    }

    /// Walk every queued thread, highest priority first
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        let levels = (self.hiprio - self.loprio) as usize + 1;
        self.heads[..levels]
            .iter()
            .flat_map(move |bucket| bucket.iter(&self.links))
    }

    /// Check that the bitmap mirrors bucket occupancy exactly
    pub fn is_consistent(&self) -> bool {
        let mut count = 0;
        for (idx, bucket) in self.heads.iter().enumerate() {
            if bucket.is_empty() == self.map.is_set(idx) {
                return false;
            }
            count += bucket.iter(&self.links).count();
        }
        count == self.elems
    }
}
