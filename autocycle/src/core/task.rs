//! Quantity-bound jobs and the ordered queue that feeds the orchestrator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One job: process `target` units of `resource`.
///
/// `done` is derived from the counters and can only flip to true: the
/// completed count never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    resource: String,
    target: u32,
    completed: u32,
}

impl Task {
    fn new(resource: String, target: u32) -> Self {
        Self {
            resource,
            target,
            completed: 0,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn completed(&self) -> u32 {
        self.completed
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.target
    }

    /// Units still missing; zero once the task is done, never negative.
    pub fn remaining(&self) -> u32 {
        self.target.saturating_sub(self.completed)
    }

    /// Fraction complete, capped at 1.0.
    pub fn progress(&self) -> f64 {
        (f64::from(self.completed) / f64::from(self.target)).min(1.0)
    }

    /// Credit `units` of finished work.
    pub fn increment_completed(&mut self, units: u32) {
        self.completed = self.completed.saturating_add(units);
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}/{})", self.resource, self.completed, self.target)
    }
}

/// Ordered task list; insertion order is processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQueue {
    tasks: Vec<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Rejects non-positive quantities and blank resource names.
    pub fn enqueue(&mut self, resource: &str, quantity: i64) -> Result<(), String> {
        let resource = resource.trim();
        if resource.is_empty() {
            return Err("resource name must not be empty".to_string());
        }
        if quantity <= 0 {
            return Err(format!("quantity must be > 0 (got {quantity})"));
        }
        let target = u32::try_from(quantity)
            .map_err(|_| format!("quantity {quantity} exceeds {}", u32::MAX))?;
        self.tasks.push(Task::new(resource.to_string(), target));
        Ok(())
    }

    /// Remove the task at `index`, returning it if present.
    pub fn remove(&mut self, index: usize) -> Option<Task> {
        if index < self.tasks.len() {
            Some(self.tasks.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// First task that is not done.
    pub fn current(&self) -> Option<&Task> {
        self.tasks.iter().find(|task| !task.is_done())
    }

    pub fn current_mut(&mut self) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| !task.is_done())
    }

    /// Position of [`current`](Self::current) in insertion order.
    pub fn current_index(&self) -> Option<usize> {
        self.tasks.iter().position(|task| !task.is_done())
    }

    pub fn get(&self, index: usize) -> Option<&Task> {
        self.tasks.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.tasks.get_mut(index)
    }

    /// True when every task is done (vacuously true for an empty queue).
    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(Task::is_done)
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Sum of completed units across all tasks.
    pub fn total_completed(&self) -> u64 {
        self.tasks.iter().map(|task| u64::from(task.completed)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_rejects_non_positive_quantities() {
        let mut queue = TaskQueue::new();
        assert!(queue.enqueue("ore", 0).is_err());
        assert!(queue.enqueue("ore", -3).is_err());
        assert!(queue.enqueue("   ", 4).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn increments_are_monotonic_and_remaining_saturates() {
        let mut queue = TaskQueue::new();
        queue.enqueue("ore", 5).expect("enqueue");
        let task = queue.current_mut().expect("current task");

        task.increment_completed(2);
        assert!(!task.is_done());
        task.increment_completed(2);
        assert!(!task.is_done());
        task.increment_completed(2);
        assert!(task.is_done());
        assert_eq!(task.completed(), 6);
        assert_eq!(task.remaining(), 0);
        assert_eq!(task.progress(), 1.0);
    }

    #[test]
    fn current_is_first_undone_task_in_insertion_order() {
        let mut queue = TaskQueue::new();
        queue.enqueue("shrimp", 1).expect("enqueue");
        queue.enqueue("trout", 2).expect("enqueue");

        assert_eq!(queue.current().map(Task::resource), Some("shrimp"));
        queue.current_mut().expect("current").increment_completed(1);
        assert_eq!(queue.current().map(Task::resource), Some("trout"));
        assert_eq!(queue.current_index(), Some(1));
        queue.current_mut().expect("current").increment_completed(2);
        assert!(queue.current().is_none());
    }

    #[test]
    fn queue_complete_iff_every_task_done() {
        let mut queue = TaskQueue::new();
        assert!(queue.is_complete());

        queue.enqueue("a", 1).expect("enqueue");
        queue.enqueue("b", 1).expect("enqueue");
        assert!(!queue.is_complete());

        queue.current_mut().expect("current").increment_completed(1);
        assert!(!queue.is_complete());
        assert_eq!(
            queue.is_complete(),
            queue.tasks().iter().all(Task::is_done)
        );

        queue.current_mut().expect("current").increment_completed(1);
        assert!(queue.is_complete());
        assert_eq!(queue.total_completed(), 2);
    }

    #[test]
    fn remove_and_clear() {
        let mut queue = TaskQueue::new();
        queue.enqueue("a", 1).expect("enqueue");
        queue.enqueue("b", 1).expect("enqueue");

        let removed = queue.remove(0).expect("removed");
        assert_eq!(removed.resource(), "a");
        assert!(queue.remove(5).is_none());
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn display_shows_progress() {
        let mut queue = TaskQueue::new();
        queue.enqueue("raw shark", 28).expect("enqueue");
        queue.current_mut().expect("current").increment_completed(3);
        assert_eq!(queue.tasks()[0].to_string(), "raw shark (3/28)");
    }
}
