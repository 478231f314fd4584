//! Bounded worker pool with an explicit join point.
//!
//! Jobs run as tokio tasks but never more than `limit` at a time. [`WorkerPool::join`]
//! waits for everything submitted since the last join and hands back the
//! results in completion order. The first failing job aborts its siblings.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{Instrument, debug, warn};

use crate::cancel::CancellationToken;
use crate::error::SsmError;

struct JobFailure {
    label: String,
    error: SsmError,
}

pub struct WorkerPool<T> {
    permits: Arc<Semaphore>,
    tasks: JoinSet<Result<T, JobFailure>>,
    /// Job labels by task id, so a panicked job can still be named.
    labels: HashMap<Id, String>,
    cancel: CancellationToken,
    limit: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Creates a pool running at most `limit` jobs at once (at least one).
    pub fn new(limit: usize, cancel: CancellationToken) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            tasks: JoinSet::new(),
            labels: HashMap::new(),
            cancel,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of jobs submitted and not yet joined.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Queues `job`. It starts once a slot frees up; `label` names it in
    /// logs and in the error returned by [`join`](Self::join).
    pub fn submit<F>(&mut self, label: impl Into<String>, job: F)
    where
        F: Future<Output = Result<T, SsmError>> + Send + 'static,
    {
        let label = label.into();
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        let span = tracing::debug_span!("job", key = %label);
        let key = label.clone();

        let handle = self.tasks.spawn(
            async move {
                let _permit = tokio::select! {
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return Err(JobFailure { label, error: SsmError::Cancelled }),
                    },
                    _ = cancel.cancelled() => {
                        return Err(JobFailure { label, error: SsmError::Cancelled });
                    }
                };
                debug!("Job started");

                tokio::select! {
                    result = job => result.map_err(|error| JobFailure { label, error }),
                    _ = cancel.cancelled() => Err(JobFailure { label, error: SsmError::Cancelled }),
                }
            }
            .instrument(span),
        );
        self.labels.insert(handle.id(), key);
    }

    /// Waits for every pending job.
    ///
    /// Returns all results in completion order, or an error once any job
    /// failed. A failure aborts the jobs still queued or running;
    /// [`SsmError::FetchFailed`] lists every job that failed or panicked before
    /// the abort took effect. If the pool's token was cancelled the result is
    /// [`SsmError::Cancelled`].
    pub async fn join(&mut self) -> Result<Vec<T>, SsmError> {
        let mut values = Vec::with_capacity(self.tasks.len());
        let mut failed_keys = Vec::new();
        let mut cause: Option<SsmError> = None;

        while let Some(joined) = self.tasks.join_next_with_id().await {
            let error = match joined {
                Ok((id, Ok(value))) => {
                    self.labels.remove(&id);
                    values.push(value);
                    continue;
                }
                Ok((id, Err(JobFailure { label, error }))) => {
                    self.labels.remove(&id);
                    if !matches!(error, SsmError::Cancelled) {
                        failed_keys.push(label);
                    }
                    error
                }
                Err(e) => {
                    let label = self.labels.remove(&e.id());
                    if e.is_cancelled() {
                        continue;
                    }
                    failed_keys.extend(label);
                    SsmError::Worker(e.to_string())
                }
            };

            if cause.is_none() {
                warn!(error = %error, "Job failed, aborting remaining jobs");
                self.tasks.abort_all();
                cause = Some(error);
            }
        }

        if self.cancel.is_cancelled() {
            return Err(SsmError::Cancelled);
        }
        match cause {
            None => Ok(values),
            Some(source) if !failed_keys.is_empty() => {
                failed_keys.sort();
                Err(SsmError::FetchFailed {
                    keys: failed_keys,
                    source: Box::new(source),
                })
            }
            Some(source) => Err(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_never_exceeds_limit() {
        let mut pool = WorkerPool::new(2, CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.submit(format!("job-{i}"), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            });
        }
        assert_eq!(pool.pending(), 8);

        let mut results = pool.join().await.unwrap();
        results.sort();
        assert_eq!(results, (0..8).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_zero_limit_is_clamped_to_one() {
        let pool: WorkerPool<()> = WorkerPool::new(0, CancellationToken::new());
        assert_eq!(pool.limit(), 1);
    }

    #[tokio::test]
    async fn test_first_failure_aborts_siblings() {
        let mut pool = WorkerPool::new(2, CancellationToken::new());
        pool.submit("/slow", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        pool.submit("/broken", async {
            Err(SsmError::NotFound {
                key: "/broken".to_string(),
            })
        });
        pool.submit("/queued", async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });

        let err = tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .expect("join should not wait for aborted jobs")
            .unwrap_err();
        match err {
            SsmError::FetchFailed { keys, source } => {
                assert_eq!(keys, vec!["/broken".to_string()]);
                assert!(matches!(*source, SsmError::NotFound { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    async fn explode() -> Result<(), SsmError> {
        panic!("worker exploded")
    }

    #[tokio::test]
    async fn test_panicked_job_is_named() {
        let mut pool = WorkerPool::new(2, CancellationToken::new());
        pool.submit("/fine", async { Ok(()) });
        pool.submit("/exploding", explode());

        let err = pool.join().await.unwrap_err();
        match err {
            SsmError::FetchFailed { keys, source } => {
                assert_eq!(keys, vec!["/exploding".to_string()]);
                assert!(matches!(*source, SsmError::Worker(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(pool.labels.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_running_jobs() {
        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::new(1, cancel.clone());
        for i in 0..3 {
            pool.submit(format!("job-{i}"), async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            });
        }

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), pool.join())
            .await
            .expect("cancellation should end the join")
            .unwrap_err();
        assert!(matches!(err, SsmError::Cancelled));
    }

    #[tokio::test]
    async fn test_pool_is_reusable_after_join() {
        let mut pool = WorkerPool::new(2, CancellationToken::new());
        pool.submit("a", async { Ok(1) });
        assert_eq!(pool.join().await.unwrap(), vec![1]);
        pool.submit("b", async { Ok(2) });
        assert_eq!(pool.join().await.unwrap(), vec![2]);
    }
}
