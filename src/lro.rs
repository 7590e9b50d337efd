//! Generic support for long-running remote operations.
//!
//! Document-analysis services accept a unit of work, reply immediately with
//! an operation handle, and expect the caller to poll a status URL until the
//! work reaches a terminal state. This module owns that submit/poll/retrieve
//! protocol. Concrete services implement [`LroTransport`], and [`Poller`]
//! drives the wait loop with bounded exponential backoff, a total wait
//! budget, a transient-retry budget, and cooperative cancellation. The result
//! payload is opaque here; interpreting it is the caller's job.

use std::{fmt, time::Duration};

use schemars::JsonSchema;
use thiserror::Error;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::prelude::*;

/// Status of a remote operation.
///
/// Statuses only ever advance through `NotStarted → Running → {Succeeded |
/// Failed}`. The derived ordering follows that sequence, which lets
/// [`Operation`] refuse to move backwards if the service ever reports stale
/// state.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum OperationStatus {
    /// The service has accepted the work but not begun it.
    #[default]
    NotStarted,

    /// The work is in progress.
    Running,

    /// The work finished and a result is available.
    Succeeded,

    /// The work finished in failure. Never retried.
    Failed,
}

impl OperationStatus {
    /// Has this operation reached a state from which no further transition
    /// occurs?
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Succeeded | OperationStatus::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationStatus::NotStarted => "notStarted",
            OperationStatus::Running => "running",
            OperationStatus::Succeeded => "succeeded",
            OperationStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Error detail reported by the remote service for a failed operation.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    /// A machine-readable error code.
    pub code: String,

    /// A human-readable description of what went wrong.
    pub message: String,
}

impl ServiceError {
    /// A placeholder for services that report failure with no detail.
    pub fn unspecified() -> Self {
        Self {
            code: "Unspecified".to_owned(),
            message: "the service reported failure without detail".to_owned(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// The remote-assigned identity of an operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationHandle {
    /// The operation id assigned by the service at submission time.
    pub id: String,

    /// The URL to query for status. Typically taken from an
    /// `Operation-Location` response header.
    pub status_url: String,
}

/// One status observation, as returned by a single poll round trip.
#[derive(Clone, Debug)]
pub struct PollSnapshot<R> {
    /// The status reported by the service.
    pub status: OperationStatus,

    /// The result payload, present once the operation has succeeded.
    pub result: Option<R>,

    /// The failure detail, present once the operation has failed.
    pub error: Option<ServiceError>,
}

/// Local representation of one outstanding or completed remote operation.
///
/// Created by [`Poller::submit`] and mutated only by absorbing poll
/// snapshots. The status never moves backwards, and a terminal status is
/// never overwritten.
#[derive(Clone, Debug)]
pub struct Operation<R> {
    /// The remote identity of this operation.
    handle: OperationHandle,

    /// The last status observed from the service.
    status: OperationStatus,

    /// The result payload, once observed.
    result: Option<R>,

    /// The failure detail, once observed.
    error: Option<ServiceError>,
}

impl<R> Operation<R> {
    /// Create a freshly submitted operation.
    pub fn new(handle: OperationHandle) -> Self {
        Self {
            handle,
            status: OperationStatus::NotStarted,
            result: None,
            error: None,
        }
    }

    /// The remote identity of this operation.
    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    /// The operation id assigned by the service.
    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// The last status observed from the service.
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// The failure detail, if the operation has been observed to fail.
    pub fn error(&self) -> Option<&ServiceError> {
        self.error.as_ref()
    }

    /// The result payload, if the operation has been observed to succeed.
    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    /// Fold one poll snapshot into our local state.
    ///
    /// Ignores snapshots that would move the status backwards or disturb an
    /// already-terminal operation.
    fn absorb(&mut self, snapshot: PollSnapshot<R>) {
        if self.status.is_terminal() || snapshot.status < self.status {
            return;
        }
        self.status = snapshot.status;
        if snapshot.result.is_some() {
            self.result = snapshot.result;
        }
        if snapshot.error.is_some() {
            self.error = snapshot.error;
        }
    }

    /// Take the result payload out of the operation, leaving the terminal
    /// status in place.
    fn take_result(&mut self) -> Option<R> {
        self.result.take()
    }
}

/// Configuration controlling poll cadence. Immutable once a wait begins.
#[derive(Clone, Debug, PartialEq)]
pub struct PollingPolicy {
    /// Delay before the first status query.
    pub initial_delay: Duration,

    /// Multiplier applied to the delay after each non-terminal poll.
    /// Values below 1.0 are treated as 1.0.
    pub backoff_multiplier: f64,

    /// Upper bound on the delay between polls.
    pub max_delay: Duration,

    /// Upper bound on total wall-clock time spent waiting.
    pub max_total_wait: Duration,

    /// How many consecutive transient transport failures to tolerate while
    /// polling. `None` means unbounded within the `max_total_wait` window.
    pub retry_budget: Option<u32>,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            max_total_wait: Duration::from_secs(300),
            retry_budget: None,
        }
    }
}

impl PollingPolicy {
    /// The delay sequence this policy produces: starts at `initial_delay`,
    /// multiplies by `backoff_multiplier` after each step, capped at
    /// `max_delay`. The sequence is infinite and monotone non-decreasing.
    pub fn delays(&self) -> DelaySchedule {
        DelaySchedule {
            next: self.initial_delay.min(self.max_delay),
            multiplier: self.backoff_multiplier.max(1.0),
            max: self.max_delay,
        }
    }
}

/// Iterator over the poll delay sequence of a [`PollingPolicy`].
#[derive(Clone, Debug)]
pub struct DelaySchedule {
    /// The next delay to hand out.
    next: Duration,

    /// Backoff multiplier, already clamped to at least 1.0.
    multiplier: f64,

    /// Cap on every delay.
    max: Duration,
}

impl Iterator for DelaySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        let grown = current.as_secs_f64() * self.multiplier;
        self.next = Duration::from_secs_f64(grown.min(self.max.as_secs_f64()));
        Some(current)
    }
}

/// Errors raised by [`Poller`] operations.
///
/// A `Timeout` leaves the remote operation running; the caller may keep the
/// [`Operation`] and resume waiting on it later with the same handle.
#[derive(Debug, Error)]
pub enum LroError {
    /// A network or HTTP-layer failure. `retryable` marks failures worth
    /// retrying (connection errors, throttling, 5xx).
    #[error("transport failure: {message}")]
    Transport {
        /// What failed, including the URL or operation involved.
        message: String,
        /// Whether retrying this request may help.
        retryable: bool,
    },

    /// The service does not recognize the operation id.
    #[error("operation {id} is unknown to the service (it may have expired)")]
    InvalidOperation {
        /// The id the service rejected.
        id: String,
    },

    /// The service reported a terminal failure. Never retried.
    #[error("operation {id} failed: {error}")]
    OperationFailed {
        /// The id of the failed operation.
        id: String,
        /// The failure detail reported by the service.
        error: ServiceError,
    },

    /// The local wait budget was exhausted. The remote operation may still
    /// be running.
    #[error("timed out after {waited:?} waiting for operation {id} (last status: {last_status})")]
    Timeout {
        /// The id of the operation that was being waited on.
        id: String,
        /// How long we waited.
        waited: Duration,
        /// The last status observed before giving up.
        last_status: OperationStatus,
    },

    /// The caller cancelled the wait. The remote operation is left running.
    #[error("wait for operation {id} was cancelled (last status: {last_status})")]
    Cancelled {
        /// The id of the operation that was being waited on.
        id: String,
        /// The last status observed before cancellation.
        last_status: OperationStatus,
    },
}

impl LroError {
    /// Build a transport error for a failed request.
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        LroError::Transport {
            message: message.into(),
            retryable,
        }
    }

    /// Is this a transient failure worth retrying?
    pub fn is_retryable(&self) -> bool {
        matches!(self, LroError::Transport { retryable: true, .. })
    }
}

/// Interface between [`Poller`] and a concrete remote service.
///
/// Implementations perform exactly one round trip per call. The poller owns
/// all waiting, backoff, retrying, and cancellation.
#[async_trait]
pub trait LroTransport: Send + Sync {
    /// A full description of one unit of work.
    type Request: Send + Sync;

    /// The terminal result payload. Opaque to the poller.
    type Output: Send;

    /// Submit a unit of work, returning the remote-assigned handle.
    async fn submit(&self, request: &Self::Request) -> Result<OperationHandle, LroError>;

    /// Issue one status query for an outstanding operation.
    async fn poll(
        &self,
        handle: &OperationHandle,
    ) -> Result<PollSnapshot<Self::Output>, LroError>;
}

/// Drives the submit/poll/retrieve protocol for one transport.
///
/// The poller holds no per-operation state and no locks. Each [`Operation`]
/// is polled sequentially by exactly one caller; waiting on several
/// operations at once means one `wait_until_done` call per operation, each
/// on its own task.
pub struct Poller<T: LroTransport> {
    /// The transport used for submissions and status queries.
    transport: T,
}

impl<T: LroTransport> Poller<T> {
    /// Create a new poller over the given transport.
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Access the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit a unit of work to the remote service.
    ///
    /// On success the returned operation is in `NotStarted` or `Running`
    /// state with a remote-assigned identifier.
    #[instrument(level = "debug", skip_all)]
    pub async fn submit(
        &self,
        request: &T::Request,
    ) -> Result<Operation<T::Output>, LroError> {
        let handle = self.transport.submit(request).await?;
        debug!(id = %handle.id, "submitted operation");
        Ok(Operation::new(handle))
    }

    /// Issue one status query and return an updated snapshot of the
    /// operation.
    #[instrument(level = "debug", skip_all, fields(id = %operation.id()))]
    pub async fn poll(
        &self,
        operation: &Operation<T::Output>,
    ) -> Result<Operation<T::Output>, LroError>
    where
        T::Output: Clone,
    {
        let snapshot = self.transport.poll(operation.handle()).await?;
        let mut updated = operation.clone();
        updated.absorb(snapshot);
        Ok(updated)
    }

    /// Poll until the operation reaches a terminal state, then return its
    /// result payload.
    ///
    /// Sleeps between polls following the policy's backoff schedule; this is
    /// the only suspension point and it never busy-spins. On `Succeeded` the
    /// payload is returned and removed from the operation. On `Failed`,
    /// [`LroError::OperationFailed`] is returned immediately, with no retry.
    /// When `policy.max_total_wait` elapses, [`LroError::Timeout`] is
    /// returned without disturbing the operation's last-known state, so the
    /// caller may resume waiting later. Cancelling `cancel` returns
    /// [`LroError::Cancelled`] promptly, also leaving last-known state
    /// unchanged.
    ///
    /// Transient transport failures are retried, up to
    /// `policy.retry_budget` consecutive failures; any successful poll
    /// resets the count.
    #[instrument(level = "debug", skip_all, fields(id = %operation.id()))]
    pub async fn wait_until_done(
        &self,
        operation: &mut Operation<T::Output>,
        policy: &PollingPolicy,
        cancel: &CancellationToken,
    ) -> Result<T::Output, LroError> {
        let started = Instant::now();
        let mut delays = policy.delays();
        let mut consecutive_failures = 0u32;

        loop {
            if let Some(outcome) = Self::terminal_outcome(operation) {
                return outcome;
            }

            // Sleep before the next status query, but never past the
            // deadline.
            let elapsed = started.elapsed();
            let remaining = policy.max_total_wait.saturating_sub(elapsed);
            if remaining.is_zero() {
                return Err(LroError::Timeout {
                    id: operation.id().to_owned(),
                    waited: elapsed,
                    last_status: operation.status(),
                });
            }
            let delay = delays
                .next()
                .expect("delay schedule is infinite")
                .min(remaining);
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("wait cancelled by caller");
                    return Err(LroError::Cancelled {
                        id: operation.id().to_owned(),
                        last_status: operation.status(),
                    });
                }
                _ = time::sleep(delay) => {}
            }

            match self.transport.poll(operation.handle()).await {
                Ok(snapshot) => {
                    consecutive_failures = 0;
                    operation.absorb(snapshot);
                    trace!(status = %operation.status(), "polled operation");
                }
                Err(err) if err.is_retryable() => {
                    consecutive_failures += 1;
                    if let Some(budget) = policy.retry_budget
                        && consecutive_failures > budget
                    {
                        warn!(
                            failures = consecutive_failures,
                            "transient retry budget exhausted"
                        );
                        return Err(err);
                    }
                    warn!(
                        error = %err,
                        failures = consecutive_failures,
                        "transient poll failure, will retry"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// If the operation is terminal, convert it into its final outcome.
    fn terminal_outcome(
        operation: &mut Operation<T::Output>,
    ) -> Option<Result<T::Output, LroError>> {
        match operation.status() {
            OperationStatus::Succeeded => Some(match operation.take_result() {
                Some(result) => Ok(result),
                None => Err(LroError::transport(
                    format!(
                        "operation {} succeeded but the service returned no result",
                        operation.id()
                    ),
                    false,
                )),
            }),
            OperationStatus::Failed => {
                let error = operation
                    .error()
                    .cloned()
                    .unwrap_or_else(ServiceError::unspecified);
                Some(Err(LroError::OperationFailed {
                    id: operation.id().to_owned(),
                    error,
                }))
            }
            OperationStatus::NotStarted | OperationStatus::Running => None,
        }
    }
}
