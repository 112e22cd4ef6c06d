// src/engine/queue.rs

//! Time-ordered priority queue backing delayed scheduling.
//!
//! A binary min-heap keyed by an `i64` priority (smaller pops first) with a
//! FIFO tie-break: every push is tagged with a per-queue, strictly
//! increasing sequence number that acts as the secondary key.
//!
//! Elements live in a slab owned by the queue; the heap array only holds
//! slab keys and every node remembers its current heap position. A
//! [`Handle`] names a node by `(queue id, slab key, sequence)`, which lets
//! [`PriorityQueue::remove`] find an element directly and reject handles that
//! are stale (already popped/removed, key reused) or belong to another queue.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to an element pushed into a [`PriorityQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    queue: u64,
    key: usize,
    seq: u64,
}

/// An element taken out of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element<T> {
    pub value: T,
    pub priority: i64,
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    priority: i64,
    seq: u64,
    pos: usize,
}

#[derive(Debug)]
pub struct PriorityQueue<T> {
    id: u64,
    next_seq: u64,
    heap: Vec<usize>,
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            next_seq: 0,
            heap: Vec::new(),
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Insert `value`; O(log n).
    pub fn push(&mut self, value: T, priority: i64) -> Handle {
        let seq = self.next_seq;
        self.next_seq += 1;

        let pos = self.heap.len();
        let node = Node {
            value,
            priority,
            seq,
            pos,
        };

        let key = match self.free.pop() {
            Some(key) => {
                self.nodes[key] = Some(node);
                key
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };

        self.heap.push(key);
        self.sift_up(pos);

        Handle {
            queue: self.id,
            key,
            seq,
        }
    }

    /// Smallest element without removing it; O(1).
    pub fn peek(&self) -> Option<(&T, i64)> {
        let node = self.node_at(0)?;
        Some((&node.value, node.priority))
    }

    pub fn peek_priority(&self) -> Option<i64> {
        self.node_at(0).map(|n| n.priority)
    }

    /// Remove and return the smallest element; O(log n).
    pub fn pop(&mut self) -> Option<Element<T>> {
        self.remove_at(0)
    }

    /// Remove the element named by `handle`; O(log n).
    ///
    /// Returns `None` when the handle is stale or was issued by a different
    /// queue. That is a normal outcome, not an error.
    pub fn remove(&mut self, handle: Handle) -> Option<Element<T>> {
        let pos = self.live_node(handle)?.pos;
        self.remove_at(pos)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.live_node(handle).is_some()
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        self.live_node(handle).map(|n| &n.value)
    }

    /// Empty the queue, returning elements in pop order.
    pub fn drain(&mut self) -> Vec<Element<T>> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(element) = self.pop() {
            out.push(element);
        }
        out
    }

    fn live_node(&self, handle: Handle) -> Option<&Node<T>> {
        if handle.queue != self.id {
            return None;
        }
        match self.nodes.get(handle.key) {
            Some(Some(node)) if node.seq == handle.seq => Some(node),
            _ => None,
        }
    }

    fn node_at(&self, pos: usize) -> Option<&Node<T>> {
        let key = *self.heap.get(pos)?;
        self.nodes.get(key)?.as_ref()
    }

    fn remove_at(&mut self, pos: usize) -> Option<Element<T>> {
        if pos >= self.heap.len() {
            return None;
        }

        let last = self.heap.len() - 1;
        if pos != last {
            self.swap(pos, last);
        }

        let key = self.heap.pop()?;
        let node = self.nodes.get_mut(key)?.take()?;
        self.free.push(key);

        if pos < self.heap.len() && !self.sift_down(pos) {
            self.sift_up(pos);
        }

        Some(Element {
            value: node.value,
            priority: node.priority,
        })
    }

    fn rank(&self, pos: usize) -> (i64, u64) {
        match self.node_at(pos) {
            Some(node) => (node.priority, node.seq),
            None => (i64::MAX, u64::MAX),
        }
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.rank(i) < self.rank(j)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        for pos in [i, j] {
            let key = self.heap[pos];
            if let Some(node) = self.nodes[key].as_mut() {
                node.pos = pos;
            }
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if !self.less(pos, parent) {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    /// Returns true if the element moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.heap.len();
        let mut pos = start;
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < len && self.less(right, left) {
                child = right;
            }
            if !self.less(child, pos) {
                break;
            }
            self.swap(pos, child);
            pos = child;
        }
        pos > start
    }
}
