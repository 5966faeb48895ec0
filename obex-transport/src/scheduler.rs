//! Deferred task queue.
//!
//! Sessions never act on the packet engine from inside one of its
//! callbacks. Instead they schedule a task that runs on a later call to
//! their `poll`. Invalidating the queue discards everything scheduled so
//! far, including tasks already taken for the current turn.

use std::collections::VecDeque;

/// A task together with the queue generation it was scheduled in.
#[derive(Debug)]
pub struct Scheduled<T> {
    generation: u64,
    pub task: T,
}

#[derive(Debug)]
pub struct TaskQueue<T> {
    tasks: VecDeque<Scheduled<T>>,
    generation: u64,
}

impl<T> TaskQueue<T> {
    pub fn new() -> Self {
        Self {
            tasks: VecDeque::new(),
            generation: 0,
        }
    }

    pub fn schedule(&mut self, task: T) {
        self.tasks.push_back(Scheduled {
            generation: self.generation,
            task,
        });
    }

    /// Takes every task scheduled so far. Tasks scheduled while these run
    /// are left for the next turn.
    pub fn take_ready(&mut self) -> Vec<Scheduled<T>> {
        self.tasks.drain(..).collect()
    }

    /// Whether a task taken by `take_ready` should still run.
    pub fn is_live(&self, scheduled: &Scheduled<T>) -> bool {
        scheduled.generation == self.generation
    }

    /// Drops all pending tasks and marks taken ones stale.
    pub fn invalidate(&mut self) {
        self.tasks.clear();
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
