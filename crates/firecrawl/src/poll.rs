use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::error::{describe_value, FirecrawlError};
use crate::models::JobState;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Run `work` under an overall deadline, mapping expiry to [`FirecrawlError::Timeout`].
pub async fn with_deadline<T, F>(limit: Duration, work: F) -> Result<T, FirecrawlError>
where
    F: Future<Output = Result<T, FirecrawlError>>,
{
    match timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(FirecrawlError::Timeout { limit }),
    }
}

/// Fetch job status until it reaches a terminal state.
///
/// This waits for completion; it does not retry. Any error from `fetch`, or a
/// failed job status, ends the loop immediately.
pub async fn poll_job<F, Fut>(
    job: &'static str,
    interval: Duration,
    mut fetch: F,
) -> Result<Value, FirecrawlError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, FirecrawlError>>,
{
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let status = fetch().await?;

        match JobState::of(&status) {
            JobState::Completed => {
                debug!(
                    job,
                    attempts,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
                return Ok(status);
            }
            JobState::Failed => {
                let state = status
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("failed")
                    .to_string();
                return Err(FirecrawlError::JobFailed {
                    job,
                    status: state,
                    message: describe_value(&status).unwrap_or_default(),
                });
            }
            JobState::Pending => {
                debug!(job, attempts, "job still running");
                sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn completes_after_pending_statuses() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = poll_job("agent", Duration::from_secs(2), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 3 {
                    Ok(json!({"status": "processing"}))
                } else {
                    Ok(json!({"status": "completed", "data": "done"}))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result["data"], "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_status_stops_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let err = poll_job("crawl", Duration::from_secs(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(json!({"status": "failed", "error": "blocked by robots.txt"})) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match err {
            FirecrawlError::JobFailed { job, message, .. } => {
                assert_eq!(job, "crawl");
                assert_eq!(message, "blocked by robots.txt");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_finishing_job_hits_the_deadline() {
        let started = Instant::now();
        let err = with_deadline(
            Duration::from_secs(300),
            poll_job("agent", Duration::from_secs(2), || async {
                Ok(json!({"status": "processing"}))
            }),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("timeout"));
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert!(started.elapsed() < Duration::from_secs(303));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_past_limit_times_out() {
        let err = with_deadline(Duration::from_secs(300), async {
            sleep(Duration::from_secs(301)).await;
            Ok(json!({}))
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            FirecrawlError::Timeout { limit } if limit == Duration::from_secs(300)
        ));
    }
}
