//! Status polling with exponential backoff and cancellation support.
//!
//! [`Waiter::wait_for`] probes a remote object until its status converges on
//! a target set, fails fast on statuses nobody anticipated, and honours both
//! a hard deadline and external cancellation.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, WaitError};
use crate::remote::{ProbeResult, RemoteObject, StatusProbe, StatusSource};

/// Backoff configuration between probes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitConfig {
    /// Initial delay between probes.
    pub initial_delay: Duration,
    /// Maximum delay between probes (cap for exponential growth).
    pub max_delay: Duration,
    /// Jitter factor (0.0 - 1.0) added to each delay.
    pub jitter: f64,
}

/// What to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSpec {
    /// Statuses that mean "keep polling".
    pub pending: &'static [&'static str],
    /// Statuses that mean "done". Empty means the object must disappear.
    pub target: &'static [&'static str],
    /// Where the status label comes from.
    pub status: StatusSource,
    /// Consecutive target observations required for success.
    pub min_target_hits: u32,
    /// Consecutive absent probes: required for success when `target` is
    /// empty, tolerated before failing otherwise.
    pub not_found_checks: u32,
}

/// Polls a [`StatusProbe`] until convergence, timeout, or cancellation.
#[derive(Debug, Clone, Default)]
pub struct Waiter {
    config: WaitConfig,
    cancel: Option<CancellationToken>,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.25,
        }
    }
}

impl WaitSpec {
    /// Returns true if this wait ends with the object gone.
    #[must_use]
    pub const fn waits_for_absence(&self) -> bool {
        self.target.is_empty()
    }

    fn target_labels(&self) -> Vec<String> {
        self.target.iter().map(|s| (*s).to_string()).collect()
    }
}

impl Waiter {
    /// Creates a waiter with the given backoff configuration.
    #[must_use]
    pub const fn new(config: WaitConfig) -> Self {
        Self {
            config,
            cancel: None,
        }
    }

    /// Observes a cancellation token between and during probes.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Backoff configuration.
    #[must_use]
    pub const fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Polls until the status converges.
    ///
    /// Returns the last fetched object on success, or `None` once the object
    /// is gone when waiting for absence.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::Timeout`] once `timeout` has elapsed,
    /// [`WaitError::UnexpectedState`] for a status in neither set,
    /// [`WaitError::NotFoundAfterChecks`] when the object stays absent while
    /// waiting for a status, [`WaitError::Cancelled`] on cancellation, and any
    /// probe error unchanged.
    pub async fn wait_for<P: StatusProbe + ?Sized>(
        &self,
        probe: &P,
        id: &str,
        spec: &WaitSpec,
        timeout: Duration,
    ) -> Result<Option<RemoteObject>> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut delay = self.config.initial_delay;
        let mut attempts = 0u32;
        let mut target_hits = 0u32;
        let mut absent_hits = 0u32;
        let mut last_status: Option<String> = None;

        loop {
            attempts = attempts.saturating_add(1);

            if self.is_cancelled() {
                return Err(WaitError::Cancelled { id: id.to_string() }.into());
            }

            match probe.probe(id).await {
                Ok(ProbeResult::Absent) => {
                    target_hits = 0;
                    absent_hits = absent_hits.saturating_add(1);
                    last_status = Some(ABSENT_STATUS.to_string());
                    debug!(id, attempt = attempts, absent_hits, "Resource not found");

                    if spec.waits_for_absence() {
                        if absent_hits >= spec.not_found_checks.max(1) {
                            debug!(id, attempts, "Resource gone");
                            return Ok(None);
                        }
                    } else if absent_hits > spec.not_found_checks {
                        return Err(WaitError::NotFoundAfterChecks {
                            id: id.to_string(),
                            checks: absent_hits,
                        }
                        .into());
                    }
                }
                Ok(ProbeResult::Present { object, status }) => {
                    absent_hits = 0;
                    debug!(id, attempt = attempts, status = %status, "Probed status");

                    if spec.target.contains(&status.as_str()) {
                        target_hits = target_hits.saturating_add(1);
                        if target_hits >= spec.min_target_hits.max(1) {
                            debug!(id, attempts, status = %status, "Target status reached");
                            return Ok(Some(object));
                        }
                    } else if spec.pending.contains(&status.as_str()) {
                        target_hits = 0;
                    } else {
                        return Err(WaitError::UnexpectedState {
                            id: id.to_string(),
                            status,
                            target: spec.target_labels(),
                        }
                        .into());
                    }

                    last_status = Some(status);
                }
                Err(e) => {
                    warn!(id, error = %e, "Status probe failed");
                    return Err(e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WaitError::Timeout {
                    id: id.to_string(),
                    target: spec.target_labels(),
                    last_status,
                    elapsed: now.duration_since(start),
                }
                .into());
            }

            let sleep_for = jittered_delay(delay, self.config.jitter).min(deadline - now);
            debug!(id, delay = ?sleep_for, "Waiting before next probe");

            if let Some(token) = &self.cancel {
                tokio::select! {
                    () = tokio::time::sleep(sleep_for) => {}
                    () = token.cancelled() => {
                        return Err(WaitError::Cancelled { id: id.to_string() }.into());
                    }
                }
            } else {
                tokio::time::sleep(sleep_for).await;
            }

            delay = delay.saturating_mul(2).min(self.config.max_delay);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Status label recorded for a probe that found no object.
const ABSENT_STATUS: &str = "absent";

/// Add jitter to a duration to prevent thundering herd.
fn jittered_delay(base: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return base;
    }
    let jitter = rand::thread_rng().gen_range(0.0..jitter_factor);
    Duration::from_secs_f64(base.as_secs_f64() * (1.0 + jitter))
}
