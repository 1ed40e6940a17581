//! Cooperative work queue (spec.md §5, §4.8): the main process dispatches
//! slow work — full validation runs, chunk requests — through a fixed pool
//! instead of running it inline. Modeled with `tokio::sync::Semaphore`
//! bounding concurrent subprocess spawns, since the slow work here is I/O
//! bound (external validator processes), not CPU-bound parsing fan-out
//! the way the teacher's `rayon` extraction fan-out is.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout;

#[derive(Clone)]
pub struct WorkQueue {
    semaphore: Arc<Semaphore>,
}

/// Outcome of a deadline-bounded job (spec.md §5 "Cancellation and
/// timeouts": "if exceeded, they return a partial result with a timeout
/// flag").
pub enum JobOutcome<T> {
    Completed(T),
    TimedOut,
}

impl WorkQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Run `job` once a slot is free, honoring an optional deadline.
    pub async fn run<F, T>(&self, deadline: Option<Duration>, job: F) -> JobOutcome<T>
    where
        F: Future<Output = T>,
    {
        let _permit = self.semaphore.acquire().await.expect("semaphore not closed");
        match deadline {
            Some(d) => match timeout(d, job).await {
                Ok(value) => JobOutcome::Completed(value),
                Err(_) => JobOutcome::TimedOut,
            },
            None => JobOutcome::Completed(job.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bounds_concurrency_to_configured_limit() {
        let queue = WorkQueue::new(2);
        let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let queue = queue.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .run(None, async {
                        let now = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                    })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(max_seen.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn deadline_exceeded_yields_timed_out() {
        let queue = WorkQueue::new(1);
        let outcome = queue
            .run(Some(Duration::from_millis(5)), async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                42
            })
            .await;
        assert!(matches!(outcome, JobOutcome::TimedOut));
    }
}
