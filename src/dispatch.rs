//! Task Dispatch Queue
//!
//! A priority queue of pending work that hands out keys through a
//! [`ResourceManager`]. The head task waits in place while its project has no
//! usable key.

use crate::clock::Clock;
use crate::config::BalancerSettings;
use crate::router::Complexity;
use crate::ResourceManager;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A unit of work waiting for a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    /// Kind of work, e.g. `code_generation`
    pub kind: String,
    pub project: String,
    /// Higher runs first
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
}

impl Task {
    /// Create a task stamped with `clock`'s current time
    pub fn new(
        kind: impl Into<String>,
        project: impl Into<String>,
        priority: i32,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            kind: kind.into(),
            project: project.into(),
            priority,
            enqueued_at: clock.now(),
        }
    }
}

/// A task paired with the key it should run with
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub task: Task,
    pub key: String,
    pub complexity: Complexity,
}

/// Queue summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue_length: usize,
    /// Tasks with priority above 1
    pub high_priority_tasks: usize,
}

#[derive(Debug)]
struct Queued {
    task: Task,
    seq: u64,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // max-heap: higher priority, then lower sequence number
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Queued {}

#[derive(Debug, Default)]
struct QueueInner {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

/// Pending tasks ordered by priority, then arrival
#[derive(Debug)]
pub struct TaskQueue {
    routes: HashMap<String, Complexity>,
    inner: Mutex<QueueInner>,
}

impl TaskQueue {
    /// Create a queue with a task kind -> complexity table.
    /// Kinds missing from the table run as [`Complexity::Normal`].
    pub fn new(routes: HashMap<String, Complexity>) -> Self {
        Self {
            routes,
            inner: Mutex::new(QueueInner::default()),
        }
    }

    pub fn from_settings(settings: &BalancerSettings) -> Self {
        Self::new(settings.task_complexity.clone())
    }

    /// Complexity a task kind is dispatched with
    pub fn complexity_for(&self, kind: &str) -> Complexity {
        self.routes.get(kind).copied().unwrap_or_default()
    }

    pub async fn push(&self, task: Task) {
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        debug!(kind = %task.kind, project = %task.project, priority = task.priority, "task queued");
        inner.heap.push(Queued { task, seq });
    }

    /// Acquire a key for the head task and dequeue it.
    ///
    /// Returns `None` when the queue is empty or the head task's project has
    /// no usable key; in the latter case the task stays queued.
    pub async fn process_next(&self, manager: &ResourceManager) -> Option<Dispatch> {
        let mut inner = self.inner.lock().await;
        let head = inner.heap.peek()?;
        let complexity = self.complexity_for(&head.task.kind);

        let Some(key) = manager.acquire_key(&head.task.project, complexity).await else {
            info!(
                kind = %head.task.kind,
                project = %head.task.project,
                "no key available, task left queued"
            );
            return None;
        };

        let task = inner.heap.pop()?.task;
        debug!(kind = %task.kind, project = %task.project, complexity = %complexity, "task dispatched");
        Some(Dispatch {
            task,
            key,
            complexity,
        })
    }

    pub async fn status(&self) -> QueueStatus {
        let inner = self.inner.lock().await;
        QueueStatus {
            queue_length: inner.heap.len(),
            high_priority_tasks: inner.heap.iter().filter(|q| q.task.priority > 1).count(),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{KeyEntry, KeysConfig};
    use chrono::TimeZone;
    use std::sync::Arc;

    async fn manager(dir: &tempfile::TempDir, keys: Vec<KeyEntry>) -> ResourceManager {
        let mut config = KeysConfig {
            keys,
            ..KeysConfig::default()
        };
        config.settings.usage_log_path = dir.path().join("usage.json");
        config.settings.seed = Some(3);
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap(),
        ));
        ResourceManager::from_config(config, clock).await
    }

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(
            &dir,
            vec![KeyEntry::new("queue-key-0001", "gemini-3-flash-preview", "hibou").daily_limit(10)],
        )
        .await;
        let queue = TaskQueue::from_settings(manager.settings());

        queue.push(Task::new("general_chat", "hibou", 1, manager.clock())).await;
        queue.push(Task::new("seo_content", "hibou", 3, manager.clock())).await;
        queue.push(Task::new("general_chat", "hibou", 3, manager.clock())).await;

        let order: Vec<String> = [
            queue.process_next(&manager).await.unwrap(),
            queue.process_next(&manager).await.unwrap(),
            queue.process_next(&manager).await.unwrap(),
        ]
        .into_iter()
        .map(|d| format!("{}:{}", d.task.kind, d.task.priority))
        .collect();

        assert_eq!(order, vec!["seo_content:3", "general_chat:3", "general_chat:1"]);
        assert!(queue.process_next(&manager).await.is_none());
    }

    #[tokio::test]
    async fn test_task_kind_routes_complexity() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(
            &dir,
            vec![
                KeyEntry::new("route-flash-0001", "gemini-3-flash-preview", "procore").priority(5),
                KeyEntry::new("route-sonnet-0002", "claude-3-sonnet", "procore").priority(1),
            ],
        )
        .await;
        let queue = TaskQueue::from_settings(manager.settings());
        assert_eq!(queue.complexity_for("code_review"), Complexity::High);
        assert_eq!(queue.complexity_for("seo_content"), Complexity::Normal);

        queue.push(Task::new("code_generation", "procore", 2, manager.clock())).await;
        queue.push(Task::new("seo_content", "procore", 1, manager.clock())).await;

        let first = queue.process_next(&manager).await.unwrap();
        assert_eq!(first.complexity, Complexity::High);
        assert_eq!(first.key, "route-sonnet-0002");

        let second = queue.process_next(&manager).await.unwrap();
        assert_eq!(second.complexity, Complexity::Normal);
        assert_eq!(second.key, "route-flash-0001");
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_task_queued() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(
            &dir,
            vec![KeyEntry::new("tight-key-0001", "gemini-3-flash-preview", "hibou").daily_limit(1)],
        )
        .await;
        let queue = TaskQueue::new(HashMap::new());

        queue.push(Task::new("general_chat", "hibou", 2, manager.clock())).await;
        queue.push(Task::new("general_chat", "hibou", 1, manager.clock())).await;

        let dispatched = queue.process_next(&manager).await.unwrap();
        assert_eq!(dispatched.task.priority, 2);

        assert!(queue.process_next(&manager).await.is_none());
        assert_eq!(
            queue.status().await,
            QueueStatus {
                queue_length: 1,
                high_priority_tasks: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_status_counts_and_enqueue_stamps() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 7, 0, 0).unwrap());
        let queue = TaskQueue::new(HashMap::new());
        assert!(queue.is_empty().await);

        let first = Task::new("a", "p", 1, &clock);
        assert_eq!(first.enqueued_at, clock.now());
        queue.push(first).await;

        let later = Utc.with_ymd_and_hms(2026, 10, 18, 9, 15, 0).unwrap();
        clock.set(later);
        let second = Task::new("b", "p", 2, &clock);
        assert_eq!(second.enqueued_at, later);
        queue.push(second).await;
        queue.push(Task::new("c", "p", 5, &clock)).await;

        let status = queue.status().await;
        assert_eq!(status.queue_length, 3);
        assert_eq!(status.high_priority_tasks, 2);
        assert_eq!(queue.len().await, 3);
    }
}
