//! Worker Pool
//!
//! Tracks which workers are alive. Every first-seen worker gets a watcher
//! task waiting on a deadline that each heartbeat resets; when the deadline
//! passes the worker is forgotten and its id is published on the expiry
//! channel. What happens to the jobs it held is up to the subscriber.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct WorkerEntry {
    last_seen: Instant,
    pulse: Arc<Notify>,
}

type Workers = Arc<Mutex<HashMap<String, WorkerEntry>>>;

pub struct WorkerPool {
    workers: Workers,
    die_after: Duration,
    expired_tx: mpsc::UnboundedSender<String>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Creates the pool and the receiving end of its expiry channel
    pub fn new(die_after: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let pool = Self {
            workers: Arc::new(Mutex::new(HashMap::new())),
            die_after,
            expired_tx,
            shutdown_tx,
        };
        (pool, expired_rx)
    }

    /// Records a liveness pulse from `worker_id`
    ///
    /// Must be called from within a tokio runtime: the first pulse of a
    /// worker spawns its watcher.
    pub fn heartbeat(&self, worker_id: &str) {
        let mut workers = lock(&self.workers);

        if let Some(entry) = workers.get_mut(worker_id) {
            entry.last_seen = Instant::now();
            entry.pulse.notify_one();
            return;
        }

        let pulse = Arc::new(Notify::new());
        workers.insert(
            worker_id.to_string(),
            WorkerEntry {
                last_seen: Instant::now(),
                pulse: Arc::clone(&pulse),
            },
        );
        drop(workers);

        info!("Worker {} joined the pool", worker_id);
        self.spawn_watcher(worker_id.to_string(), pulse);
    }

    /// True while the last pulse of `worker_id` is younger than `die_after`
    pub fn is_alive(&self, worker_id: &str) -> bool {
        lock(&self.workers)
            .get(worker_id)
            .is_some_and(|entry| entry.last_seen.elapsed() < self.die_after)
    }

    pub fn alive_workers(&self) -> Vec<String> {
        lock(&self.workers)
            .iter()
            .filter(|(_, entry)| entry.last_seen.elapsed() < self.die_after)
            .map(|(worker_id, _)| worker_id.clone())
            .collect()
    }

    /// Stops every watcher; entries stay as they are
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    fn spawn_watcher(&self, worker_id: String, pulse: Arc<Notify>) {
        if *self.shutdown_tx.borrow() {
            return;
        }

        let workers = Arc::clone(&self.workers);
        let die_after = self.die_after;
        let expired_tx = self.expired_tx.clone();
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                let deadline = match lock(&workers).get(&worker_id) {
                    Some(entry) => entry.last_seen + die_after,
                    None => return,
                };

                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        let mut guard = lock(&workers);
                        let Some(entry) = guard.get(&worker_id) else {
                            return;
                        };
                        // a pulse may have landed between the timer and the lock
                        if entry.last_seen.elapsed() < die_after {
                            continue;
                        }
                        guard.remove(&worker_id);
                        drop(guard);

                        warn!("Worker {} missed its heartbeat deadline", worker_id);
                        let _ = expired_tx.send(worker_id);
                        return;
                    }
                    _ = pulse.notified() => {
                        debug!("Heartbeat from worker {}", worker_id);
                    }
                    _ = shutdown.changed() => {
                        return;
                    }
                }
            }
        });
    }
}

fn lock(workers: &Workers) -> std::sync::MutexGuard<'_, HashMap<String, WorkerEntry>> {
    workers.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIE_AFTER: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn test_worker_expires_after_deadline() {
        let (pool, mut expired) = WorkerPool::new(DIE_AFTER);
        pool.heartbeat("w1");

        tokio::time::sleep(DIE_AFTER - Duration::from_millis(100)).await;
        assert!(pool.is_alive("w1"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!pool.is_alive("w1"));
        assert_eq!(expired.recv().await.as_deref(), Some("w1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeats_keep_worker_alive() {
        let (pool, _expired) = WorkerPool::new(DIE_AFTER);
        pool.heartbeat("steady");
        pool.heartbeat("silent");

        for _ in 0..5 {
            tokio::time::sleep(DIE_AFTER / 2).await;
            pool.heartbeat("steady");
        }

        assert!(pool.is_alive("steady"));
        assert!(!pool.is_alive("silent"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_after_expiry() {
        let (pool, mut expired) = WorkerPool::new(DIE_AFTER);
        pool.heartbeat("w1");
        tokio::time::sleep(DIE_AFTER * 2).await;
        assert_eq!(expired.recv().await.as_deref(), Some("w1"));

        pool.heartbeat("w1");
        assert!(pool.is_alive("w1"));
        assert_eq!(pool.alive_workers(), vec!["w1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_entries() {
        let (pool, mut expired) = WorkerPool::new(DIE_AFTER);
        pool.heartbeat("w1");
        pool.shutdown();

        tokio::time::sleep(DIE_AFTER / 2).await;
        assert!(pool.is_alive("w1"));

        tokio::time::sleep(DIE_AFTER * 3).await;
        assert!(expired.try_recv().is_err());
        assert!(lock(&pool.workers).contains_key("w1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_alive_exactly_at_deadline() {
        let (pool, _expired) = WorkerPool::new(DIE_AFTER);
        pool.heartbeat("w1");
        // no watcher gets to remove the entry
        pool.shutdown();

        tokio::time::advance(DIE_AFTER - Duration::from_millis(1)).await;
        assert!(pool.is_alive("w1"));
        assert_eq!(pool.alive_workers(), vec!["w1".to_string()]);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!pool.is_alive("w1"));
        assert!(pool.alive_workers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_counts_from_last_pulse() {
        let (pool, mut expired) = WorkerPool::new(DIE_AFTER);
        pool.heartbeat("w1");

        tokio::time::sleep(Duration::from_secs(4)).await;
        pool.heartbeat("w1");

        // 4s + die_after after the first pulse
        tokio::time::sleep(DIE_AFTER + Duration::from_millis(10)).await;
        assert_eq!(expired.try_recv().ok().as_deref(), Some("w1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_worker_is_not_alive() {
        let (pool, _expired) = WorkerPool::new(DIE_AFTER);
        assert!(!pool.is_alive("ghost"));
    }
}
