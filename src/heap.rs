use std::time::Instant;

const NONE: usize = usize::MAX;

/// Min-heap of slab keys ordered by deadline.
///
/// Keeps a reverse index from key to heap position so an arbitrary key
/// can be removed in O(log n):
/// - O(1) peek
/// - O(log n) push/pop/remove
pub struct DeadlineHeap {
    heap: Vec<(Instant, usize)>,
    heap_pos: Vec<usize>,
}

impl Default for DeadlineHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(unused)]
impl DeadlineHeap {
    pub fn new() -> Self {
        Self {
            heap: Vec::new(),
            heap_pos: Vec::new(),
        }
    }

    /// Push `key` with `deadline`.
    ///
    /// # Panics
    /// Debug builds panic if `key` is already in the heap.
    pub fn push(&mut self, deadline: Instant, key: usize) {
        if key >= self.heap_pos.len() {
            self.heap_pos.resize(key + 1, NONE);
        }
        debug_assert_eq!(self.heap_pos[key], NONE, "key {key} already in heap");

        let pos = self.heap.len();
        self.heap.push((deadline, key));
        self.heap_pos[key] = pos;
        self.swim(pos);
    }

    #[inline]
    pub fn peek(&self) -> Option<(Instant, usize)> {
        self.heap.first().copied()
    }

    /// Pop the minimum if its deadline is at or before `now`.
    #[inline]
    pub fn pop_due(&mut self, now: Instant) -> Option<(Instant, usize)> {
        match self.heap.first() {
            Some(&(deadline, _)) if deadline <= now => self.remove_at(0),
            _ => None,
        }
    }

    /// Remove `key` wherever it sits. Returns false if it is not in the heap.
    pub fn remove(&mut self, key: usize) -> bool {
        match self.heap_pos.get(key) {
            Some(&pos) if pos != NONE => self.remove_at(pos).is_some(),
            _ => false,
        }
    }

    #[inline]
    pub fn contains(&self, key: usize) -> bool {
        self.heap_pos.get(key).is_some_and(|&pos| pos != NONE)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.heap_pos.clear();
    }

    fn remove_at(&mut self, pos: usize) -> Option<(Instant, usize)> {
        if pos >= self.heap.len() {
            return None;
        }

        let removed = self.heap.swap_remove(pos);
        self.heap_pos[removed.1] = NONE;

        if pos < self.heap.len() {
            self.heap_pos[self.heap[pos].1] = pos;
            self.sink(pos);
            self.swim(pos);
        }

        Some(removed)
    }

    #[inline]
    fn swim(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.heap[pos].0 < self.heap[parent].0 {
                self.swap(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    #[inline]
    fn sink(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            let right = 2 * pos + 2;
            let mut smallest = pos;

            if left < len && self.heap[left].0 < self.heap[smallest].0 {
                smallest = left;
            }
            if right < len && self.heap[right].0 < self.heap[smallest].0 {
                smallest = right;
            }

            if smallest == pos {
                break;
            }

            self.swap(pos, smallest);
            pos = smallest;
        }
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.heap_pos[self.heap[a].1] = a;
        self.heap_pos[self.heap[b].1] = b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    fn drain_due(heap: &mut DeadlineHeap, now: Instant) -> Vec<usize> {
        let mut keys = Vec::new();
        while let Some((_, key)) = heap.pop_due(now) {
            keys.push(key);
        }
        keys
    }

    // ==================== Ordering ====================

    #[test]
    fn test_pops_in_deadline_order() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();

        heap.push(at(base, 50), 0);
        heap.push(at(base, 10), 1);
        heap.push(at(base, 30), 2);
        heap.push(at(base, 20), 3);
        heap.push(at(base, 40), 4);

        assert_eq!(heap.peek(), Some((at(base, 10), 1)));
        assert_eq!(drain_due(&mut heap, at(base, 100)), vec![1, 3, 2, 4, 0]);
        assert!(heap.is_empty());
    }

    #[test]
    fn test_pop_due_stops_at_now() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();

        heap.push(at(base, 5), 0);
        heap.push(at(base, 15), 1);
        heap.push(at(base, 10), 2);

        assert_eq!(drain_due(&mut heap, at(base, 10)), vec![0, 2]);
        assert_eq!(heap.len(), 1);
        assert!(heap.pop_due(at(base, 14)).is_none());
    }

    // ==================== Removal ====================

    #[test]
    fn test_remove_arbitrary_keeps_order() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();

        for (key, ms) in [(0, 70), (1, 20), (2, 60), (3, 10), (4, 50), (5, 30)] {
            heap.push(at(base, ms), key);
        }

        assert!(heap.remove(2));
        assert!(heap.remove(3));
        assert!(!heap.contains(3));
        assert!(heap.contains(5));

        assert_eq!(drain_due(&mut heap, at(base, 100)), vec![1, 5, 4, 0]);
    }

    #[test]
    fn test_remove_missing_key() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();

        assert!(!heap.remove(0));
        heap.push(base, 0);
        assert!(heap.remove(0));
        assert!(!heap.remove(0));
        assert!(!heap.remove(1000));
    }

    #[test]
    fn test_key_reuse_after_pop() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();

        heap.push(at(base, 1), 0);
        assert_eq!(heap.pop_due(at(base, 1)), Some((at(base, 1), 0)));

        heap.push(at(base, 2), 0);
        assert!(heap.contains(0));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn test_clear() {
        let base = Instant::now();
        let mut heap = DeadlineHeap::new();

        heap.push(base, 0);
        heap.push(base, 1);
        heap.clear();

        assert!(heap.is_empty());
        assert!(!heap.contains(0));
        assert!(heap.peek().is_none());
    }
}
