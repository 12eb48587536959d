//! Polling an asynchronous job until it reaches a terminal status.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::time::Duration;

use super::{CancelHandle, Job, JobStatus};
use crate::error::ApiError;

/// Default number of poll attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Anything that can report the current state of a job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn fetch_job(&self, job_id: &str) -> Result<Job>;
}

/// Wait between two poll attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `attempt × base`, never more than `max_factor × base`.
    Linear { base: Duration, max_factor: u32 },
    /// The same wait every time.
    Fixed(Duration),
}

impl Backoff {
    /// Linear backoff capped at ten times `base`.
    pub fn linear(base: Duration) -> Self {
        Backoff::Linear {
            base,
            max_factor: 10,
        }
    }

    /// Delay after the given (1-based) attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear { base, max_factor } => base.saturating_mul(attempt.min(max_factor)),
            Backoff::Fixed(delay) => delay,
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::linear(Duration::from_secs(1))
    }
}

/// Drives a [`JobSource`] until the job completes, fails, or the attempt
/// budget runs out. Attempts are strictly sequential.
pub struct JobPoller<'a, S: JobSource + ?Sized> {
    source: &'a S,
    backoff: Backoff,
    tolerate_fetch_errors: bool,
}

impl<'a, S: JobSource + ?Sized> JobPoller<'a, S> {
    pub fn new(source: &'a S, backoff: Backoff) -> Self {
        Self {
            source,
            backoff,
            tolerate_fetch_errors: false,
        }
    }

    /// Counts a failed status request as a spent attempt instead of giving
    /// up. A job that reports failure still stops polling at once.
    pub fn tolerating_fetch_errors(mut self) -> Self {
        self.tolerate_fetch_errors = true;
        self
    }

    /// Polls `job_id` up to `max_attempts` times.
    ///
    /// `on_progress` sees every attempt number and status before the status
    /// is evaluated. Returns the completed job, [`ApiError::JobFailed`] when
    /// the job reports failure, or [`ApiError::Timeout`] when the budget is
    /// exhausted.
    pub async fn poll_until_complete<F>(
        &self,
        job_id: &str,
        max_attempts: u32,
        on_progress: F,
    ) -> Result<Job>
    where
        F: FnMut(u32, &JobStatus),
    {
        self.poll_until_complete_with_cancel(job_id, max_attempts, on_progress, &CancelHandle::new())
            .await
    }

    /// Like [`poll_until_complete`](Self::poll_until_complete), but returns
    /// [`ApiError::Cancelled`] as soon as `cancel` fires, even mid-request
    /// or mid-wait.
    #[tracing::instrument(skip(self, on_progress, cancel))]
    pub async fn poll_until_complete_with_cancel<F>(
        &self,
        job_id: &str,
        max_attempts: u32,
        mut on_progress: F,
        cancel: &CancelHandle,
    ) -> Result<Job>
    where
        F: FnMut(u32, &JobStatus),
    {
        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled.into());
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled.into()),
                job = self.source.fetch_job(job_id) => job,
            };

            match fetched {
                Ok(job) => {
                    debug!(
                        "Job {} attempt {}/{}: {}",
                        job_id, attempt, max_attempts, job.status
                    );
                    on_progress(attempt, &job.status);

                    if job.status.is_terminal() {
                        if job.status.is_success() {
                            info!("Job {} completed after {} attempts", job_id, attempt);
                            return Ok(job);
                        }
                        return Err(ApiError::JobFailed(job.failure_message()).into());
                    }
                }
                Err(e) if self.tolerate_fetch_errors => {
                    warn!(
                        "Job {} attempt {}/{} failed: {:#}",
                        job_id, attempt, max_attempts, e
                    );
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to poll job {}", job_id));
                }
            }

            if attempt == max_attempts {
                break;
            }

            let delay = self.backoff.delay(attempt);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ApiError::Cancelled.into()),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Err(ApiError::Timeout {
            attempts: max_attempts,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_api_error;
    use mockall::predicate::eq;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    const FAST: Backoff = Backoff::Fixed(Duration::from_millis(1));

    fn job(status: JobStatus) -> Job {
        Job::with_status(status)
    }

    /// Source answering `statuses[n]` on the n-th call, repeating the last one.
    fn scripted(statuses: Vec<JobStatus>, calls: usize) -> MockJobSource {
        let counter = Arc::new(AtomicU32::new(0));
        let mut source = MockJobSource::new();
        source
            .expect_fetch_job()
            .times(calls)
            .returning(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst) as usize;
                let status = statuses[n.min(statuses.len() - 1)].clone();
                let mut job = job(status);
                if job.status == JobStatus::Completed {
                    job.data = Some(serde_json::json!({"papers": ["p1", "p2"]}));
                }
                Ok(job)
            });
        source
    }

    #[test]
    fn test_linear_backoff_monotonic_and_capped() {
        let base = Duration::from_millis(1000);
        let backoff = Backoff::linear(base);

        let delays: Vec<Duration> = (1..=40).map(|n| backoff.delay(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(1000));
        assert_eq!(delays[2], Duration::from_millis(3000));
        for pair in delays.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        assert!(delays.iter().all(|d| *d <= base * 10));
        assert_eq!(delays[39], Duration::from_millis(10_000));
    }

    #[test]
    fn test_fixed_backoff() {
        let backoff = Backoff::Fixed(Duration::from_secs(5));
        assert_eq!(backoff.delay(1), Duration::from_secs(5));
        assert_eq!(backoff.delay(60), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_completes_after_running_attempts() {
        let source = scripted(
            vec![JobStatus::Running, JobStatus::Running, JobStatus::Completed],
            3,
        );
        let mut seen = Vec::new();

        let result = JobPoller::new(&source, FAST)
            .poll_until_complete("job-1", 5, |attempt, status| {
                seen.push((attempt, status.clone()))
            })
            .await
            .unwrap();

        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.data.unwrap()["papers"][1], "p2");
        assert_eq!(
            seen,
            vec![
                (1, JobStatus::Running),
                (2, JobStatus::Running),
                (3, JobStatus::Completed)
            ]
        );
    }

    #[tokio::test]
    async fn test_times_out_after_exactly_max_attempts() {
        let source = scripted(vec![JobStatus::Running], 3);
        let mut callbacks = 0;

        let err = JobPoller::new(&source, FAST)
            .poll_until_complete("job-2", 3, |_, _| callbacks += 1)
            .await
            .unwrap_err();

        assert_eq!(
            find_api_error(&err),
            Some(&ApiError::Timeout { attempts: 3 })
        );
        assert_eq!(callbacks, 3);
    }

    #[tokio::test]
    async fn test_failed_status_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut source = MockJobSource::new();
        source
            .expect_fetch_job()
            .with(eq("job-3"))
            .times(2)
            .returning(move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(job(JobStatus::Pending))
                } else {
                    let mut failed = job(JobStatus::Failed);
                    failed.message = Some("arXiv unreachable".to_string());
                    Ok(failed)
                }
            });

        let err = JobPoller::new(&source, FAST)
            .poll_until_complete("job-3", 10, |_, _| {})
            .await
            .unwrap_err();

        assert_eq!(
            find_api_error(&err),
            Some(&ApiError::JobFailed("arXiv unreachable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_cancelled_status_is_terminal_failure() {
        let source = scripted(vec![JobStatus::Cancelled], 1);

        let err = JobPoller::new(&source, FAST)
            .poll_until_complete("job-4", 10, |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(
            find_api_error(&err),
            Some(ApiError::JobFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_status_keeps_polling() {
        let source = scripted(
            vec![
                JobStatus::Other("ENRICHING".to_string()),
                JobStatus::Completed,
            ],
            2,
        );

        let result = JobPoller::new(&source, FAST)
            .poll_until_complete("job-5", 10, |_, _| {})
            .await
            .unwrap();
        assert!(result.status.is_success());
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_without_retry() {
        let mut source = MockJobSource::new();
        source.expect_fetch_job().times(1).returning(|_| {
            Err(ApiError::Application {
                status: 404,
                message: "Unknown correlation id".to_string(),
            }
            .into())
        });

        let err = JobPoller::new(&source, FAST)
            .poll_until_complete("job-6", 10, |_, _| {})
            .await
            .unwrap_err();

        assert!(err.to_string().contains("job-6"));
        assert!(matches!(
            find_api_error(&err),
            Some(ApiError::Application { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_tolerated_fetch_error_spends_an_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut source = MockJobSource::new();
        source.expect_fetch_job().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ApiError::Application {
                    status: 503,
                    message: "busy".to_string(),
                }
                .into())
            } else {
                Ok(job(JobStatus::Completed))
            }
        });
        let mut seen = Vec::new();

        let result = JobPoller::new(&source, FAST)
            .tolerating_fetch_errors()
            .poll_until_complete("job-10", 5, |attempt, status| {
                seen.push((attempt, status.clone()))
            })
            .await
            .unwrap();

        assert!(result.status.is_success());
        assert_eq!(seen, vec![(2, JobStatus::Completed)]);
    }

    #[tokio::test]
    async fn test_tolerated_fetch_errors_exhaust_budget() {
        let mut source = MockJobSource::new();
        source
            .expect_fetch_job()
            .times(3)
            .returning(|_| Err(ApiError::Transport("connection refused".to_string()).into()));

        let err = JobPoller::new(&source, FAST)
            .tolerating_fetch_errors()
            .poll_until_complete("job-11", 3, |_, _| {})
            .await
            .unwrap_err();

        assert_eq!(
            find_api_error(&err),
            Some(&ApiError::Timeout { attempts: 3 })
        );
    }

    #[tokio::test]
    async fn test_tolerating_errors_still_stops_on_failed_job() {
        let source = scripted(vec![JobStatus::Failed], 1);

        let err = JobPoller::new(&source, FAST)
            .tolerating_fetch_errors()
            .poll_until_complete("job-12", 10, |_, _| {})
            .await
            .unwrap_err();

        assert!(matches!(
            find_api_error(&err),
            Some(ApiError::JobFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_zero_attempts_issues_no_request() {
        let mut source = MockJobSource::new();
        source.expect_fetch_job().never();

        let err = JobPoller::new(&source, FAST)
            .poll_until_complete("job-7", 0, |_, _| {})
            .await
            .unwrap_err();

        assert_eq!(
            find_api_error(&err),
            Some(&ApiError::Timeout { attempts: 0 })
        );
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let mut source = MockJobSource::new();
        source.expect_fetch_job().never();
        let cancel = CancelHandle::new();
        cancel.cancel();

        let err = JobPoller::new(&source, FAST)
            .poll_until_complete_with_cancel("job-8", 5, |_, _| {}, &cancel)
            .await
            .unwrap_err();

        assert_eq!(find_api_error(&err), Some(&ApiError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_during_wait_stops_polling() {
        let source = scripted(vec![JobStatus::Running], 1);
        let cancel = CancelHandle::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let err = JobPoller::new(&source, Backoff::Fixed(Duration::from_secs(60)))
            .poll_until_complete_with_cancel("job-9", 5, |_, _| {}, &cancel)
            .await
            .unwrap_err();

        assert_eq!(find_api_error(&err), Some(&ApiError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
