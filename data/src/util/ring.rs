use std::collections::VecDeque;

/// Fixed-capacity circular buffer. Pushing past capacity silently overwrites the
/// oldest entry — used for the bounded recent-trade and recent-depth-integrity
/// buffers so per-symbol history never grows unbounded.
#[derive(Debug, Clone)]
pub struct Ring<T> {
    buf: VecDeque<T>,
    cap: usize,
}

impl<T> Ring<T> {
    pub fn new(cap: usize) -> Self {
        assert!(cap > 0, "ring capacity must be positive");
        Self {
            buf: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.cap {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Newest-first, up to `min(limit, capacity)` entries.
    pub fn recent(&self, limit: usize) -> Vec<T>
    where
        T: Clone,
    {
        let n = limit.min(self.buf.len());
        self.buf.iter().rev().take(n).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_oldest_past_capacity() {
        let mut ring = Ring::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.recent(10), vec![4, 3, 2]);
    }

    #[test]
    fn recent_caps_at_limit_and_capacity() {
        let mut ring = Ring::new(200);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.recent(2), vec![4, 3]);
        assert_eq!(ring.recent(1000).len(), 5);
    }
}
