//! Per-peer task scheduling.
//!
//! A session tracks what has been asked of one peer: every outstanding
//! request carries a deadline and a retry budget. `tick` expires overdue
//! tasks, re-queues those with retries left and reports abandoned ones
//! so the enclosing peer manager can deprioritize the peer.

use crate::error::NetworkError;
use neo_types::Hash256;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// What a task asks the peer for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskKind {
    /// Header range download.
    GetHeaders,
    /// Block hash range download.
    GetBlocks,
    /// Concrete inventory download.
    GetData,
}

/// One outstanding (or queued) request.
#[derive(Clone, Debug)]
pub struct Task {
    /// Session-unique id.
    pub id: u64,
    /// Request kind.
    pub kind: TaskKind,
    /// The inventory hashes the response must cover.
    pub hashes: Vec<Hash256>,
    /// When the request expires.
    pub deadline: Instant,
    /// Send attempts so far.
    pub attempts: u8,
    /// Whether the request is on the wire.
    pub in_flight: bool,
}

/// Session tunables.
#[derive(Clone, Debug)]
pub struct TaskSessionConfig {
    /// Cap on simultaneously in-flight tasks.
    pub max_concurrent_tasks: usize,
    /// Cap on total (queued + in-flight) tasks.
    pub max_tasks: usize,
    /// How long a request may stay unanswered.
    pub timeout: Duration,
    /// Send attempts before a task is abandoned.
    pub retry_attempts: u8,
}

impl Default for TaskSessionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
            max_tasks: 256,
            timeout: Duration::from_secs(10),
            retry_attempts: 3,
        }
    }
}

/// What a `tick` decided.
#[derive(Clone, Debug)]
pub enum TaskEvent {
    /// Send (or resend) this request to the peer.
    Send(Task),
    /// The task ran out of retries; the peer should be deprioritized.
    Abandoned(Task),
}

/// The per-peer scheduler.
pub struct TaskSession {
    config: TaskSessionConfig,
    next_id: u64,
    tasks: HashMap<u64, Task>,
    /// Inventory hash -> owning task, for response matching.
    by_hash: HashMap<Hash256, u64>,
    /// Completed-task counter, for peer scoring.
    completed: u64,
}

impl TaskSession {
    /// An empty session.
    #[must_use]
    pub fn new(config: TaskSessionConfig) -> Self {
        Self {
            config,
            next_id: 0,
            tasks: HashMap::new(),
            by_hash: HashMap::new(),
            completed: 0,
        }
    }

    /// Outstanding task count (queued + in-flight).
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// In-flight task count.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tasks.values().filter(|t| t.in_flight).count()
    }

    /// Completed-task counter.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// True when any outstanding task covers `hash`.
    #[must_use]
    pub fn is_tracking(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    /// Queue a request. It is not sent until `tick` schedules it.
    pub fn add_task(
        &mut self,
        kind: TaskKind,
        hashes: Vec<Hash256>,
        now: Instant,
    ) -> Result<u64, NetworkError> {
        if self.tasks.len() >= self.config.max_tasks {
            return Err(NetworkError::TaskQueueFull);
        }
        self.next_id += 1;
        let id = self.next_id;
        for hash in &hashes {
            self.by_hash.insert(*hash, id);
        }
        self.tasks.insert(
            id,
            Task {
                id,
                kind,
                hashes,
                deadline: now + self.config.timeout,
                attempts: 0,
                in_flight: false,
            },
        );
        Ok(id)
    }

    /// Drop a task without completing it.
    pub fn remove_task(&mut self, id: u64) -> Result<Task, NetworkError> {
        let task = self.tasks.remove(&id).ok_or(NetworkError::UnknownTask(id))?;
        for hash in &task.hashes {
            self.by_hash.remove(hash);
        }
        Ok(task)
    }

    /// A response covering `hash` arrived; the owning task completes
    /// once every one of its hashes has been answered.
    pub fn on_response(&mut self, hash: &Hash256) -> bool {
        let Some(id) = self.by_hash.remove(hash) else {
            return false;
        };
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        task.hashes.retain(|h| h != hash);
        if task.hashes.is_empty() {
            self.tasks.remove(&id);
            self.completed += 1;
            debug!(task = id, "task completed");
        }
        true
    }

    /// Expire overdue tasks and choose what to send next, respecting
    /// the concurrency bound.
    pub fn tick(&mut self, now: Instant) -> Vec<TaskEvent> {
        let mut events = Vec::new();

        // Expire overdue in-flight tasks.
        let overdue: Vec<u64> = self
            .tasks
            .values()
            .filter(|t| t.in_flight && t.deadline <= now)
            .map(|t| t.id)
            .collect();
        for id in overdue {
            let Some(task) = self.tasks.get_mut(&id) else { continue };
            if task.attempts >= self.config.retry_attempts {
                let task = self.remove_task(id).expect("task present");
                debug!(task = id, "task abandoned after retries");
                events.push(TaskEvent::Abandoned(task));
            } else {
                task.in_flight = false;
            }
        }

        // Fill the in-flight window with queued tasks, oldest first.
        let mut capacity = self
            .config
            .max_concurrent_tasks
            .saturating_sub(self.in_flight());
        let mut queued: Vec<u64> = self
            .tasks
            .values()
            .filter(|t| !t.in_flight)
            .map(|t| t.id)
            .collect();
        queued.sort_unstable();
        for id in queued {
            if capacity == 0 {
                break;
            }
            let Some(task) = self.tasks.get_mut(&id) else { continue };
            task.in_flight = true;
            task.attempts += 1;
            task.deadline = now + self.config.timeout;
            events.push(TaskEvent::Send(task.clone()));
            capacity -= 1;
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TaskSessionConfig {
        TaskSessionConfig {
            max_concurrent_tasks: 2,
            max_tasks: 8,
            timeout: Duration::from_secs(5),
            retry_attempts: 2,
        }
    }

    fn hash(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    #[test]
    fn test_tick_respects_concurrency_bound() {
        let mut session = TaskSession::new(config());
        let now = Instant::now();
        for n in 0..4 {
            session
                .add_task(TaskKind::GetData, vec![hash(n)], now)
                .unwrap();
        }
        let events = session.tick(now);
        let sends = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::Send(_)))
            .count();
        assert_eq!(sends, 2);
        assert_eq!(session.in_flight(), 2);
    }

    #[test]
    fn test_response_completes_task() {
        let mut session = TaskSession::new(config());
        let now = Instant::now();
        session
            .add_task(TaskKind::GetData, vec![hash(1), hash(2)], now)
            .unwrap();
        session.tick(now);

        assert!(session.on_response(&hash(1)));
        assert_eq!(session.len(), 1, "task still waits for its second hash");
        assert!(session.on_response(&hash(2)));
        assert!(session.is_empty());
        assert_eq!(session.completed(), 1);
        assert!(!session.on_response(&hash(3)));
    }

    #[test]
    fn test_overdue_task_retries_then_abandons() {
        let mut session = TaskSession::new(config());
        let start = Instant::now();
        session
            .add_task(TaskKind::GetHeaders, vec![hash(9)], start)
            .unwrap();

        // First send.
        session.tick(start);
        // Expired once: re-queued and resent (attempt 2).
        let later = start + Duration::from_secs(6);
        let events = session.tick(later);
        assert!(events.iter().any(|e| matches!(e, TaskEvent::Send(t) if t.attempts == 2)));

        // Expired again: retry budget exhausted, abandoned.
        let much_later = later + Duration::from_secs(6);
        let events = session.tick(much_later);
        assert!(events.iter().any(|e| matches!(e, TaskEvent::Abandoned(_))));
        assert!(session.is_empty());
    }

    #[test]
    fn test_queue_bound() {
        let mut session = TaskSession::new(config());
        let now = Instant::now();
        for n in 0..8 {
            session
                .add_task(TaskKind::GetData, vec![hash(n)], now)
                .unwrap();
        }
        assert_eq!(
            session.add_task(TaskKind::GetData, vec![hash(99)], now),
            Err(NetworkError::TaskQueueFull)
        );
    }

    #[test]
    fn test_remove_task_clears_hash_index() {
        let mut session = TaskSession::new(config());
        let now = Instant::now();
        let id = session
            .add_task(TaskKind::GetData, vec![hash(5)], now)
            .unwrap();
        assert!(session.is_tracking(&hash(5)));
        session.remove_task(id).unwrap();
        assert!(!session.is_tracking(&hash(5)));
        assert!(matches!(
            session.remove_task(id),
            Err(NetworkError::UnknownTask(_))
        ));
    }
}
