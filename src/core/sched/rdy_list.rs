//! Ready list - doubly linked list of thread handles at one priority
//!
//! Links are kept in a side table owned by the run queue and indexed by
//! [`ThreadId`], so threads never carry queue pointers themselves.
//! Scheduling always takes the head.

use crate::types::ThreadId;

/// Queue linkage of one thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QLink {
    pub(crate) prev: Option<ThreadId>,
    pub(crate) next: Option<ThreadId>,
    /// Bucket holding the thread, `None` when unlinked
    pub(crate) bucket: Option<u16>,
}

impl QLink {
    pub const UNLINKED: QLink = QLink {
        prev: None,
        next: None,
        bucket: None,
    };
}

/// Ready list for a single priority bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyList {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
}

impl ReadyList {
    /// Create a new empty ready list
    pub const fn new() -> Self {
        ReadyList {
            head: None,
            tail: None,
        }
    }

    /// Get head of list (first to be scheduled)
    #[inline]
    pub fn head(&self) -> Option<ThreadId> {
        self.head
    }

    /// Get tail of list
    #[inline]
    pub fn tail(&self) -> Option<ThreadId> {
        self.tail
    }

    /// Check if list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Insert at the tail (FIFO among equals)
    ///
    /// `tid` must not be linked anywhere.
    pub fn insert_tail(&mut self, links: &mut [QLink], tid: ThreadId) {
        let link = &mut links[tid.index()];
        link.next = None;
        link.prev = self.tail;

        match self.tail {
            Some(tail) => links[tail.index()].next = Some(tid),
            None => self.head = Some(tid),
        }

        self.tail = Some(tid);
    }

    /// Insert at the head (LIFO among equals)
    ///
    /// `tid` must not be linked anywhere.
    pub fn insert_head(&mut self, links: &mut [QLink], tid: ThreadId) {
        let link = &mut links[tid.index()];
        link.prev = None;
        link.next = self.head;

        match self.head {
            Some(head) => links[head.index()].prev = Some(tid),
            None => self.tail = Some(tid),
        }

        self.head = Some(tid);
    }

    /// Unlink `tid`, which must be on this list
    pub fn remove(&mut self, links: &mut [QLink], tid: ThreadId) {
        let QLink { prev, next, .. } = links[tid.index()];

        match prev {
            Some(prev) => links[prev.index()].next = next,
            None => self.head = next,
        }

        match next {
            Some(next) => links[next.index()].prev = prev,
            None => self.tail = prev,
        }

        links[tid.index()] = QLink::UNLINKED;
    }

    /// Walk the list from head to tail
    pub fn iter<'a>(&self, links: &'a [QLink]) -> impl Iterator<Item = ThreadId> + 'a {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let tid = cursor?;
            cursor = links[tid.index()].next;
            Some(tid)
        })
    }
}

impl Default for ReadyList {
    fn default() -> Self {
        Self::new()
    }
}
