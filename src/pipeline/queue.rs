use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct QueuedFrame<T> {
    index: usize,
    payload: T,
}

impl<T> PartialEq for QueuedFrame<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for QueuedFrame<T> {}

impl<T> PartialOrd for QueuedFrame<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for QueuedFrame<T> {
    /// Reversed so the heap top is the lowest frame index.
    fn cmp(&self, other: &Self) -> Ordering {
        other.index.cmp(&self.index)
    }
}

/// Decoded frames of one camera and modality, popped in increasing frame index no matter
/// the order they were decoded in.
pub struct FrameQueue<T> {
    heap: BinaryHeap<QueuedFrame<T>>,
}

impl<T> Default for FrameQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<T> FrameQueue<T> {
    pub fn push(&mut self, index: usize, payload: T) {
        self.heap.push(QueuedFrame { index, payload });
    }

    /// Frame index at the head.
    pub fn head(&self) -> Option<usize> {
        self.heap.peek().map(|frame| frame.index)
    }

    pub fn pop(&mut self) -> Option<(usize, T)> {
        self.heap.pop().map(|frame| (frame.index, frame.payload))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
