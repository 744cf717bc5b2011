//! Binary min-heap with an explicit comparator
//!
//! Backs the emitter's pause buffer, but is a standalone structure. The
//! comparator is shared behind an `Arc` so clones and snapshot iterators
//! order identically.

use crate::event::error::QueueError;
use std::cmp::Ordering;
use std::sync::Arc;

/// Shared priority comparator
pub type Comparator<P> = Arc<dyn Fn(&P, &P) -> Ordering + Send + Sync>;

/// Queue construction options
#[derive(Debug, Clone, Copy)]
pub struct QueueOptions {
    pub initial_capacity: usize,
    /// Shrink backing storage when size falls below a quarter of capacity
    pub auto_trim: bool,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            auto_trim: false,
        }
    }
}

struct Node<T, P> {
    element: T,
    priority: P,
}

/// Binary heap ordered by a comparator over priorities
///
/// The top of the heap is the smallest priority under the comparator.
pub struct PriorityQueue<T, P> {
    nodes: Vec<Node<T, P>>,
    comparator: Comparator<P>,
    auto_trim: bool,
}

impl<T, P: Ord + 'static> PriorityQueue<T, P> {
    /// Natural ascending order: smallest priority dequeues first
    pub fn min_queue() -> Self {
        Self::with_comparator(Arc::new(|a: &P, b: &P| a.cmp(b)))
    }

    /// Reversed order: largest priority dequeues first
    pub fn max_queue() -> Self {
        Self::with_comparator(Arc::new(|a: &P, b: &P| b.cmp(a)))
    }
}

impl<T, P> PriorityQueue<T, P> {
    pub fn with_comparator(comparator: Comparator<P>) -> Self {
        Self::with_options(comparator, QueueOptions::default())
    }

    pub fn with_options(comparator: Comparator<P>, options: QueueOptions) -> Self {
        Self {
            nodes: Vec::with_capacity(options.initial_capacity),
            comparator,
            auto_trim: options.auto_trim,
        }
    }

    /// Build from `(element, priority)` pairs using bottom-up heapify
    pub fn from_iter<I>(items: I, comparator: Comparator<P>, options: QueueOptions) -> Self
    where
        I: IntoIterator<Item = (T, P)>,
    {
        let mut queue = Self::with_options(comparator, options);
        queue.enqueue_range(items);
        queue
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.capacity()
    }

    /// Insert in O(log n)
    pub fn enqueue(&mut self, element: T, priority: P) {
        self.nodes.push(Node { element, priority });
        self.sift_up(self.nodes.len() - 1);
    }

    /// Bulk insert; heapifies bottom-up when the queue starts empty
    pub fn enqueue_range<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = (T, P)>,
    {
        let old_len = self.nodes.len();
        self.nodes
            .extend(items.into_iter().map(|(element, priority)| Node {
                element,
                priority,
            }));
        if old_len == 0 {
            for i in (0..self.nodes.len() / 2).rev() {
                self.sift_down(i);
            }
        } else {
            for i in old_len..self.nodes.len() {
                self.sift_up(i);
            }
        }
    }

    /// Remove and return the top element
    pub fn dequeue(&mut self) -> Result<T, QueueError> {
        self.try_dequeue().ok_or(QueueError::EmptyQueue)
    }

    /// Remove and return the top element, or `None` when empty
    pub fn try_dequeue(&mut self) -> Option<T> {
        if self.nodes.is_empty() {
            return None;
        }
        let last = self.nodes.len() - 1;
        self.nodes.swap(0, last);
        let node = self.nodes.pop()?;
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        if self.auto_trim && self.capacity() > 8 && self.nodes.len() * 4 < self.capacity() {
            self.nodes.shrink_to(self.capacity() / 2);
        }
        Some(node.element)
    }

    /// Reference to the top element
    pub fn peek(&self) -> Result<&T, QueueError> {
        self.try_peek().ok_or(QueueError::EmptyQueue)
    }

    pub fn try_peek(&self) -> Option<&T> {
        self.nodes.first().map(|n| &n.element)
    }

    /// Drain into a priority-ascending sequence
    pub fn dequeue_all(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.nodes.len());
        while let Some(element) = self.try_dequeue() {
            out.push(element);
        }
        out
    }

    /// Linear scan by element equality
    pub fn contains(&self, element: &T) -> bool
    where
        T: PartialEq,
    {
        self.nodes.iter().any(|n| &n.element == element)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Reserve room for at least `n` total elements
    pub fn ensure_capacity(&mut self, n: usize) {
        if n > self.nodes.len() {
            self.nodes.reserve(n - self.nodes.len());
        }
    }

    /// Tighten capacity toward size (minimum 1 when non-empty)
    pub fn trim_excess(&mut self) {
        let floor = if self.nodes.is_empty() { 0 } else { 1 };
        self.nodes.shrink_to(self.nodes.len().max(floor));
    }

    /// Frozen snapshot of the elements in storage order
    pub fn to_array(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.nodes.iter().map(|n| n.element.clone()).collect()
    }

    /// Iterate elements in priority-ascending order without mutating the
    /// queue; operates on a snapshot copy
    pub fn iter_sorted(&self) -> impl Iterator<Item = T>
    where
        T: Clone,
        P: Clone,
    {
        let mut snapshot = self.clone();
        std::iter::from_fn(move || snapshot.try_dequeue())
    }

    /// Heap property check, used by the property tests
    #[cfg(test)]
    pub(crate) fn is_valid_heap(&self) -> bool {
        (1..self.nodes.len()).all(|i| {
            let parent = (i - 1) / 2;
            (self.comparator)(&self.nodes[i].priority, &self.nodes[parent].priority)
                != Ordering::Less
        })
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if (self.comparator)(&self.nodes[index].priority, &self.nodes[parent].priority)
                == Ordering::Less
            {
                self.nodes.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len
                && (self.comparator)(&self.nodes[left].priority, &self.nodes[smallest].priority)
                    == Ordering::Less
            {
                smallest = left;
            }
            if right < len
                && (self.comparator)(&self.nodes[right].priority, &self.nodes[smallest].priority)
                    == Ordering::Less
            {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.nodes.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T: Clone, P: Clone> Clone for PriorityQueue<T, P> {
    /// Clone preserving the comparator
    fn clone(&self) -> Self {
        Self {
            nodes: self
                .nodes
                .iter()
                .map(|n| Node {
                    element: n.element.clone(),
                    priority: n.priority.clone(),
                })
                .collect(),
            comparator: Arc::clone(&self.comparator),
            auto_trim: self.auto_trim,
        }
    }
}

impl<T, P> std::fmt::Debug for PriorityQueue<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("auto_trim", &self.auto_trim)
            .finish()
    }
}
