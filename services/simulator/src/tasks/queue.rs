//! Pending tasks, ordered by arrival.

use std::collections::{BTreeMap, BTreeSet};

use privpack_id::{BlockId, SimTime, TaskId};
use privpack_reconcile::{RetryPolicy, RetryTracker, RetryVerdict};

use super::Task;

/// Pending tasks keyed by `(arrival, id)`.
///
/// Ties in arrival time are broken by id, which is assignment order.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    pending: BTreeMap<(SimTime, TaskId), Task>,
    retries: RetryTracker<TaskId>,
}

impl TaskQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            pending: BTreeMap::new(),
            retries: RetryTracker::new(policy),
        }
    }

    pub fn enqueue(&mut self, task: Task) {
        self.pending.insert((task.arrival, task.id), task);
    }

    /// Removes and returns every task arrived at or before `now`, in
    /// arrival order.
    pub fn pop_ready(&mut self, now: SimTime) -> Vec<Task> {
        let mut ready = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            ready.push(entry.remove());
        }
        ready
    }

    /// Puts a deferred task back.
    ///
    /// Fails with the terminal verdict once the retry bound is exceeded or
    /// the deadline has been reached; the task is then dropped from the
    /// queue's bookkeeping.
    pub fn requeue(&mut self, task: Task, now: SimTime) -> Result<(), RetryVerdict> {
        let verdict = self.retries.record_failure(&task.id, now, task.deadline);
        if verdict.is_terminal() {
            self.retries.clear(&task.id);
            return Err(verdict);
        }
        self.enqueue(task);
        Ok(())
    }

    /// Forgets the retry history of a task that reached a terminal state.
    pub fn resolved(&mut self, task_id: TaskId) {
        self.retries.clear(&task_id);
    }

    /// Retries recorded for a task.
    pub fn retries(&self, task_id: TaskId) -> u32 {
        self.retries.failures(&task_id)
    }

    /// Removes tasks whose deadline is strictly before `now`.
    pub fn expire_deadlines(&mut self, now: SimTime) -> Vec<Task> {
        let expired_keys: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, task)| task.deadline.is_some_and(|d| d < now))
            .map(|(key, _)| *key)
            .collect();
        let mut expired = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some(task) = self.pending.remove(&key) {
                self.retries.clear(&task.id);
                expired.push(task);
            }
        }
        expired
    }

    /// Removes every pending task, in arrival order.
    pub fn drain(&mut self) -> Vec<Task> {
        let pending = std::mem::take(&mut self.pending);
        self.retries.retain(|_| false);
        pending.into_values().collect()
    }

    /// Blocks named explicitly by pending tasks.
    pub fn referenced_blocks(&self) -> BTreeSet<BlockId> {
        self.pending
            .values()
            .flat_map(|task| task.selector.explicit_ids().iter().copied())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.pending.values()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::unbounded())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockSelector;
    use privpack_budget::Budget;

    fn t(value: f64) -> SimTime {
        SimTime::new(value).unwrap()
    }

    fn task(id: u64, arrival: f64) -> Task {
        Task::new(
            TaskId::new(id),
            t(arrival),
            Budget::new(vec![1.0]).unwrap(),
            BlockSelector::latest(1),
        )
    }

    #[test]
    fn test_pop_ready_in_arrival_order() {
        let mut queue = TaskQueue::default();
        queue.enqueue(task(2, 1.0));
        queue.enqueue(task(0, 2.0));
        queue.enqueue(task(1, 1.0));

        let ready: Vec<_> = queue.pop_ready(t(1.0)).into_iter().map(|t| t.id).collect();
        assert_eq!(ready, vec![TaskId::new(1), TaskId::new(2)]);
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_ready(t(1.5)).is_empty());
    }

    #[test]
    fn test_requeue_bounded_by_retries() {
        let mut queue = TaskQueue::new(RetryPolicy::bounded(1));
        assert!(queue.requeue(task(0, 0.0), t(0.0)).is_ok());
        assert_eq!(queue.retries(TaskId::new(0)), 1);
        let popped = queue.pop_ready(t(1.0)).pop().unwrap();
        assert_eq!(
            queue.requeue(popped, t(1.0)),
            Err(RetryVerdict::Exhausted { attempts: 2 })
        );
        assert!(queue.is_empty());
        assert_eq!(queue.retries(TaskId::new(0)), 0);
    }

    #[test]
    fn test_requeue_bounded_by_deadline() {
        let mut queue = TaskQueue::default();
        let with_deadline = task(0, 0.0).with_deadline(t(2.0));
        assert!(queue.requeue(with_deadline.clone(), t(1.0)).is_ok());
        queue.pop_ready(t(1.0));
        assert_eq!(
            queue.requeue(with_deadline, t(2.0)),
            Err(RetryVerdict::DeadlineExpired)
        );
    }

    #[test]
    fn test_expire_deadlines_is_strict() {
        let mut queue = TaskQueue::default();
        queue.enqueue(task(0, 0.0).with_deadline(t(2.0)));
        queue.enqueue(task(1, 0.0));
        assert!(queue.expire_deadlines(t(2.0)).is_empty());
        let expired = queue.expire_deadlines(t(2.5));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, TaskId::new(0));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_referenced_blocks_and_drain() {
        let mut queue = TaskQueue::default();
        let mut explicit = task(0, 0.0);
        explicit.selector = BlockSelector::Explicit(vec![BlockId::new(3), BlockId::new(1)]);
        queue.enqueue(explicit);
        queue.enqueue(task(1, 0.5));

        let referenced = queue.referenced_blocks();
        assert_eq!(referenced.len(), 2);
        assert!(referenced.contains(&BlockId::new(3)));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
    }
}
