//! Five FIFO buckets drained in strict priority order.

use super::task::TaskPriority;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Default)]
pub struct PriorityQueue {
    buckets: [VecDeque<String>; 5],
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, priority: TaskPriority, id: String) {
        self.buckets[priority.index()].push_back(id);
    }

    /// Reinsert ahead of every task waiting at the same priority
    pub fn push_front(&mut self, priority: TaskPriority, id: String) {
        self.buckets[priority.index()].push_front(id);
    }

    /// Head of the most urgent non-empty bucket
    pub fn peek(&self) -> Option<(TaskPriority, &str)> {
        TaskPriority::ALL.iter().find_map(|priority| {
            self.buckets[priority.index()]
                .front()
                .map(|id| (*priority, id.as_str()))
        })
    }

    pub fn pop(&mut self) -> Option<(TaskPriority, String)> {
        TaskPriority::ALL.iter().find_map(|priority| {
            self.buckets[priority.index()]
                .pop_front()
                .map(|id| (*priority, id))
        })
    }

    pub fn remove(&mut self, priority: TaskPriority, id: &str) -> bool {
        let bucket = &mut self.buckets[priority.index()];
        match bucket.iter().position(|queued| queued == id) {
            Some(position) => bucket.remove(position).is_some(),
            None => false,
        }
    }

    /// Empty every bucket, most urgent first
    pub fn drain(&mut self) -> Vec<String> {
        self.buckets.iter_mut().flat_map(|bucket| bucket.drain(..)).collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(VecDeque::is_empty)
    }

    pub fn depths(&self) -> BTreeMap<TaskPriority, usize> {
        TaskPriority::ALL
            .iter()
            .map(|priority| (*priority, self.buckets[priority.index()].len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_priority_then_fifo() {
        let mut queue = PriorityQueue::new();
        queue.push_back(TaskPriority::Low, "low-1".into());
        queue.push_back(TaskPriority::Normal, "normal-1".into());
        queue.push_back(TaskPriority::Critical, "critical-1".into());
        queue.push_back(TaskPriority::Normal, "normal-2".into());

        let order: Vec<_> = std::iter::from_fn(|| queue.pop().map(|(_, id)| id)).collect();
        assert_eq!(order, vec!["critical-1", "normal-1", "normal-2", "low-1"]);
    }

    #[test]
    fn test_push_front_jumps_same_priority_only() {
        let mut queue = PriorityQueue::new();
        queue.push_back(TaskPriority::High, "high".into());
        queue.push_back(TaskPriority::Normal, "second".into());
        queue.push_front(TaskPriority::Normal, "retry".into());

        assert_eq!(queue.peek(), Some((TaskPriority::High, "high")));
        queue.pop();
        assert_eq!(queue.pop(), Some((TaskPriority::Normal, "retry".to_string())));
    }

    #[test]
    fn test_remove_and_depths() {
        let mut queue = PriorityQueue::new();
        queue.push_back(TaskPriority::Idle, "a".into());
        queue.push_back(TaskPriority::Idle, "b".into());

        assert!(queue.remove(TaskPriority::Idle, "a"));
        assert!(!queue.remove(TaskPriority::Idle, "a"));
        assert_eq!(queue.depths()[&TaskPriority::Idle], 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(), vec!["b".to_string()]);
        assert!(queue.is_empty());
    }
}
