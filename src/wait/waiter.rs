//! State Change Waiter
//!
//! Repeatedly invokes a refresh function until the observed status reaches a
//! target, with expected transient ("pending") statuses in between.

use super::backoff::PollBackoff;
use super::refresh::{PollOutcome, Status};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, Instrument};
use uuid::Uuid;

/// Default overall timeout for a wait
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Ways a wait can fail
#[derive(Debug, Error)]
pub enum WaitError {
    /// The refresh function failed for a reason other than "not found"
    #[error("refresh failed on poll {polls}")]
    Refresh {
        polls: u32,
        #[source]
        source: anyhow::Error,
    },

    /// The resource reported a status that is neither target nor pending
    #[error("unexpected state '{status}', wanted target '{target}'")]
    UnexpectedState { status: Status, target: String },

    /// The target was not reached in time
    #[error(
        "timeout waiting for state '{target}' (last state: '{}', timeout: {timeout:?})",
        describe_last(.last_status)
    )]
    Timeout {
        last_status: Option<Status>,
        target: String,
        timeout: Duration,
        polls: u32,
    },

    /// The wait was configured inconsistently; nothing was polled
    #[error("invalid wait configuration: {0}")]
    InvalidSpec(String),
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout { .. })
    }

    pub fn is_unexpected_state(&self) -> bool {
        matches!(self, WaitError::UnexpectedState { .. })
    }

    pub fn is_refresh(&self) -> bool {
        matches!(self, WaitError::Refresh { .. })
    }

    /// Last status observed before the wait gave up, if any
    pub fn last_status(&self) -> Option<&Status> {
        match self {
            WaitError::UnexpectedState { status, .. } => Some(status),
            WaitError::Timeout { last_status, .. } => last_status.as_ref(),
            _ => None,
        }
    }
}

fn describe_last(status: &Option<Status>) -> String {
    status
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "none".to_string())
}

fn describe_set(set: &HashSet<Status>) -> String {
    let mut items: Vec<_> = set.iter().collect();
    items.sort();
    items
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration of a single wait.
///
/// `target` and `pending` must be disjoint. A status in neither set ends the
/// wait with [`WaitError::UnexpectedState`]; an empty `pending` set makes
/// every non-target observation fatal.
#[derive(Clone)]
pub struct WaitSpec<F> {
    target: HashSet<Status>,
    pending: HashSet<Status>,
    timeout: Duration,
    initial_delay: Duration,
    min_poll_interval: Duration,
    refresh: F,
}

impl<F> WaitSpec<F> {
    /// Create a spec around a refresh function. Set at least one target.
    pub fn new(refresh: F) -> Self {
        Self {
            target: HashSet::new(),
            pending: HashSet::new(),
            timeout: DEFAULT_TIMEOUT,
            initial_delay: Duration::ZERO,
            min_poll_interval: Duration::ZERO,
            refresh,
        }
    }

    pub fn target<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Status>,
    {
        self.target = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn pending<I, S>(mut self, statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Status>,
    {
        self.pending = statuses.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay before the first poll
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Floor for the interval between polls
    pub fn min_poll_interval(mut self, interval: Duration) -> Self {
        self.min_poll_interval = interval;
        self
    }

    /// Check the spec before any poll is issued
    pub fn validate(&self) -> Result<(), WaitError> {
        if self.target.is_empty() {
            return Err(WaitError::InvalidSpec(
                "at least one target status is required".to_string(),
            ));
        }

        let overlap: HashSet<Status> = self
            .target
            .intersection(&self.pending)
            .cloned()
            .collect();
        if !overlap.is_empty() {
            return Err(WaitError::InvalidSpec(format!(
                "statuses cannot be both target and pending: {}",
                describe_set(&overlap)
            )));
        }

        Ok(())
    }
}

/// Result of a successful wait
#[derive(Debug, Clone)]
pub struct WaitOutcome<T> {
    /// Snapshot returned by the final poll
    pub object: Option<T>,
    /// Target status that ended the wait
    pub status: Status,
    pub polls: u32,
}

#[derive(Default)]
struct Progress {
    polls: u32,
    last_status: Option<Status>,
}

/// Block until the refresh function reports a target status.
///
/// Polls are strictly sequential. Refresh errors and unexpected statuses end
/// the wait immediately; still-pending observations back off through
/// [`PollBackoff`]. The timeout covers the initial delay and any poll in
/// flight.
///
/// # Example
/// ```ignore
/// let outcome = wait_for(
///     WaitSpec::new(|| async { Ok(PollOutcome::observed(vol, "available")) })
///         .target(["available"])
///         .pending(["creating"])
///         .timeout(Duration::from_secs(600)),
/// )
/// .await?;
/// ```
pub async fn wait_for<T, F, Fut>(mut spec: WaitSpec<F>) -> Result<WaitOutcome<T>, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<PollOutcome<T>>>,
{
    spec.validate()?;

    let target = describe_set(&spec.target);
    let span = tracing::debug_span!("wait_for", wait_id = %Uuid::new_v4(), wanted = %target);

    async move {
        let timeout = spec.timeout;
        let mut progress = Progress::default();

        let settled =
            tokio::time::timeout(timeout, poll_until_settled(&mut spec, &mut progress)).await;

        match settled {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    polls = progress.polls,
                    last_status = %describe_last(&progress.last_status),
                    "Wait timed out"
                );
                Err(WaitError::Timeout {
                    last_status: progress.last_status,
                    target,
                    timeout,
                    polls: progress.polls,
                })
            }
        }
    }
    .instrument(span)
    .await
}

async fn poll_until_settled<T, F, Fut>(
    spec: &mut WaitSpec<F>,
    progress: &mut Progress,
) -> Result<WaitOutcome<T>, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<PollOutcome<T>>>,
{
    if !spec.initial_delay.is_zero() {
        trace!(delay_ms = spec.initial_delay.as_millis(), "Initial delay");
        tokio::time::sleep(spec.initial_delay).await;
    }

    let mut backoff = PollBackoff::new(spec.min_poll_interval);

    loop {
        progress.polls += 1;

        let outcome = match (spec.refresh)().await {
            Ok(outcome) => outcome,
            Err(source) => {
                debug!(poll = progress.polls, error = %source, "Refresh failed");
                return Err(WaitError::Refresh {
                    polls: progress.polls,
                    source,
                });
            }
        };
        progress.last_status = Some(outcome.status.clone());

        if spec.target.contains(&outcome.status) {
            debug!(poll = progress.polls, status = %outcome.status, "Target state reached");
            return Ok(WaitOutcome {
                object: outcome.object,
                status: outcome.status,
                polls: progress.polls,
            });
        }

        if !spec.pending.contains(&outcome.status) {
            debug!(poll = progress.polls, status = %outcome.status, "Unexpected state");
            return Err(WaitError::UnexpectedState {
                status: outcome.status,
                target: describe_set(&spec.target),
            });
        }

        let delay = backoff.next_delay();
        trace!(
            poll = progress.polls,
            status = %outcome.status,
            delay_ms = delay.as_millis(),
            "Still pending"
        );
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// One scripted poll result
    #[derive(Clone)]
    enum Step {
        Status(&'static str),
        NotFound,
        Fail,
    }

    /// Refresh function that replays a script and counts calls
    fn scripted(
        steps: Vec<Step>,
    ) -> (
        impl FnMut() -> std::future::Ready<anyhow::Result<PollOutcome<u32>>> + Clone,
        Arc<AtomicU32>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let script = Arc::new(Mutex::new(VecDeque::from(steps)));
        let counter = calls.clone();

        let refresh = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let mut script = script.lock().unwrap();
            // The last step repeats forever
            let step = if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            };
            std::future::ready(match step {
                Step::Status(s) => Ok(PollOutcome::observed(n, s)),
                Step::NotFound => Ok(PollOutcome::absent()),
                Step::Fail => Err(anyhow::anyhow!("connection reset")),
            })
        };

        (refresh, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_reached_after_pending() {
        let (refresh, calls) = scripted(vec![
            Step::Status("creating"),
            Step::Status("creating"),
            Step::Status("available"),
        ]);

        let outcome = wait_for(
            WaitSpec::new(refresh)
                .target(["available"])
                .pending(["creating"])
                .min_poll_interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, Status::reported("available"));
        assert_eq!(outcome.object, Some(3));
        assert_eq!(outcome.polls, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_pending_fails_on_first_transitional_status() {
        let (refresh, calls) = scripted(vec![
            Step::Status("creating"),
            Step::Status("creating"),
            Step::Status("available"),
        ]);

        let err = wait_for(WaitSpec::new(refresh).target(["available"]))
            .await
            .unwrap_err();

        assert!(err.is_unexpected_state());
        assert_eq!(err.last_status(), Some(&Status::reported("creating")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_converges_on_not_found() {
        let (refresh, calls) = scripted(vec![
            Step::Status("deleting"),
            Step::Status("deleting"),
            Step::NotFound,
        ]);

        let outcome = wait_for(
            WaitSpec::new(refresh)
                .target([Status::Absent])
                .pending(["deleting"])
                .min_poll_interval(Duration::from_millis(10)),
        )
        .await
        .unwrap();

        assert!(outcome.status.is_absent());
        assert!(outcome.object.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_unexpected_unless_targeted() {
        let (refresh, _calls) = scripted(vec![Step::Status("creating"), Step::NotFound]);

        let err = wait_for(
            WaitSpec::new(refresh)
                .target(["available"])
                .pending(["creating"]),
        )
        .await
        .unwrap_err();

        assert!(err.is_unexpected_state());
        assert_eq!(err.last_status(), Some(&Status::Absent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_forever_times_out() {
        let (refresh, calls) = scripted(vec![Step::Status("creating")]);
        let start = tokio::time::Instant::now();

        let err = wait_for(
            WaitSpec::new(refresh)
                .target(["available"])
                .pending(["creating"])
                .timeout(Duration::from_millis(100))
                .min_poll_interval(Duration::from_millis(10)),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.last_status(), Some(&Status::reported("creating")));
        assert!(start.elapsed() >= Duration::from_millis(100));
        // 100ms base interval leaves room for at most two polls
        assert!(calls.load(Ordering::SeqCst) <= 2);
        assert!(err.to_string().contains("last state: 'creating'"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_during_initial_delay_reports_no_status() {
        let (refresh, calls) = scripted(vec![Step::Status("available")]);

        let err = wait_for(
            WaitSpec::new(refresh)
                .target(["available"])
                .timeout(Duration::from_secs(1))
                .initial_delay(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.last_status(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_error_is_not_retried() {
        let (refresh, calls) = scripted(vec![
            Step::Status("creating"),
            Step::Fail,
            Step::Status("available"),
        ]);

        let err = wait_for(
            WaitSpec::new(refresh)
                .target(["available"])
                .pending(["creating"]),
        )
        .await
        .unwrap_err();

        assert!(err.is_refresh());
        assert!(matches!(err, WaitError::Refresh { polls: 2, .. }));
        assert_eq!(err.to_string(), "refresh failed on poll 2");
        let cause = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("connection reset"));
        let chain = format!("{:#}", anyhow::Error::from(err));
        assert_eq!(chain.matches("connection reset").count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_converged_is_idempotent() {
        let (refresh, calls) = scripted(vec![Step::Status("available")]);
        let spec = WaitSpec::new(refresh)
            .target(["available"])
            .pending(["creating"]);

        let first = wait_for(spec.clone()).await.unwrap();
        let second = wait_for(spec).await.unwrap();

        assert_eq!(first.polls, 1);
        assert_eq!(second.polls, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_delay_precedes_first_poll() {
        let (refresh, _calls) = scripted(vec![Step::Status("available")]);
        let start = tokio::time::Instant::now();

        wait_for(
            WaitSpec::new(refresh)
                .target(["available"])
                .initial_delay(Duration::from_secs(10)),
        )
        .await
        .unwrap();

        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_sets_rejected_before_polling() {
        let (refresh, calls) = scripted(vec![Step::Status("available")]);

        let err = wait_for(
            WaitSpec::new(refresh)
                .target(["available"])
                .pending(["available", "creating"]),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, WaitError::InvalidSpec(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_rejected() {
        let (refresh, calls) = scripted(vec![Step::Status("available")]);

        let err = wait_for(WaitSpec::new(refresh)).await.unwrap_err();

        assert!(matches!(err, WaitError::InvalidSpec(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waits_are_independent() {
        let (slow, slow_calls) = scripted(vec![
            Step::Status("deleting"),
            Step::Status("deleting"),
            Step::Status("deleting"),
            Step::NotFound,
        ]);
        let (fast, fast_calls) = scripted(vec![Step::NotFound]);

        let (slow, fast) = tokio::join!(
            wait_for(
                WaitSpec::new(slow)
                    .target([Status::Absent])
                    .pending(["deleting"])
            ),
            wait_for(
                WaitSpec::new(fast)
                    .target([Status::Absent])
                    .pending(["deleting"])
            ),
        );

        assert_eq!(slow.unwrap().polls, 4);
        assert_eq!(fast.unwrap().polls, 1);
        assert_eq!(slow_calls.load(Ordering::SeqCst), 4);
        assert_eq!(fast_calls.load(Ordering::SeqCst), 1);
    }
}
