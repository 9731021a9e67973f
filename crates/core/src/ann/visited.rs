//! Epoch-stamped visited marks for graph traversal.
//!
//! A node counts as visited when its stamp equals the current epoch, so
//! starting a new traversal is a counter bump rather than a memset.

#[derive(Debug, Default)]
pub struct VisitedSet {
    stamps: Vec<u32>,
    epoch: u32,
}

impl VisitedSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            stamps: vec![0; capacity],
            epoch: 1,
        }
    }

    /// Begin a traversal over a graph of `node_count` nodes.
    pub fn reset(&mut self, node_count: usize) {
        if node_count > self.stamps.len() {
            self.stamps.resize(node_count, 0);
        }
        if self.epoch == u32::MAX {
            self.stamps.fill(0);
            self.epoch = 1;
        } else {
            self.epoch += 1;
        }
    }

    /// Returns `true` the first time `id` is seen in the current traversal.
    #[inline]
    pub fn first_visit(&mut self, id: u32) -> bool {
        let slot = &mut self.stamps[id as usize];
        if *slot == self.epoch {
            false
        } else {
            *slot = self.epoch;
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_clear_between_traversals() {
        let mut visited = VisitedSet::with_capacity(4);
        visited.reset(4);
        assert!(visited.first_visit(2));
        assert!(!visited.first_visit(2));

        visited.reset(8);
        assert!(visited.first_visit(2));
        assert!(visited.first_visit(7));
    }

    #[test]
    fn test_epoch_wraparound() {
        let mut visited = VisitedSet::with_capacity(3);
        visited.epoch = u32::MAX - 1;
        visited.reset(3);
        assert!(visited.first_visit(1));
        visited.reset(3);
        assert_eq!(visited.epoch, 1);
        assert!(visited.first_visit(1));
    }
}
