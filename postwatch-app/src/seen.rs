use std::collections::{HashSet, VecDeque};

/// Ids already delivered, bounded: once full, the oldest id is forgotten.
#[derive(Debug)]
pub struct SeenPosts {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenPosts {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ids: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.ids.contains(&id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.clone());
        self.order.push_back(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_duplicates() {
        let mut seen = SeenPosts::new(4);
        assert!(seen.insert("a"));
        assert!(!seen.insert("a"));
        assert!(seen.contains("a"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn oldest_ids_are_evicted_first() {
        let mut seen = SeenPosts::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("c");
        assert!(!seen.contains("a"));
        assert!(seen.contains("b"));
        assert!(seen.contains("c"));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn zero_capacity_still_remembers_the_latest() {
        let mut seen = SeenPosts::new(0);
        assert!(seen.is_empty());
        seen.insert("a");
        seen.insert("b");
        assert!(seen.contains("b"));
        assert_eq!(seen.len(), 1);
    }
}
