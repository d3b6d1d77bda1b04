use std::future::Future;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info, warn};

use super::status::{classify, StatusMatch};
use crate::util::errors::{Result, StdError};

const MAX_INTERVAL: Duration = Duration::from_secs(10);

/// One refresh of the remote group as seen by the poll loop.
#[derive(Debug, Clone)]
pub struct Observation<T> {
    pub state: T,
    pub status: String,
    pub node_group_status: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Refresh<T> {
    Found(Observation<T>),
    /// The remote system no longer knows the group.
    Gone,
}

/// What a wait is looking for. Without a target the wait succeeds once the group is gone.
#[derive(Debug, Clone, Copy)]
pub struct Expectation<'a> {
    pub target: Option<&'a str>,
    pub pending: &'a [&'a str],
    pub failed: &'a [&'a str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub timeout: Duration,
    pub delay: Duration,
    pub min_interval: Duration,
}

impl WaitSettings {
    pub fn new(timeout: Duration, delay: Duration) -> Self {
        Self {
            timeout,
            delay,
            min_interval: Duration::from_secs(3),
        }
    }
}

/// Polls `refresh` until the expectation is met, the group fails, or the timeout elapses.
///
/// Refresh errors are returned as they are. A timeout only stops the local
/// wait, the remote operation keeps running.
pub async fn wait_for<T, F, Fut>(
    id: &str,
    expectation: &Expectation<'_>,
    settings: &WaitSettings,
    mut refresh: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Refresh<T>>>,
{
    let start = Instant::now();
    let ceiling = MAX_INTERVAL.max(settings.min_interval);
    let mut interval = settings.min_interval;
    let mut last_status = String::from("unknown");
    let mut attempt: u32 = 0;

    sleep(settings.delay).await;

    loop {
        // a timeout shorter than the delay still gets one look at the group
        if attempt > 0 && start.elapsed() >= settings.timeout {
            warn!(id, status = %last_status, "Timed out waiting for replication group");
            return Err(StdError::PollTimeout {
                id: id.to_string(),
                last_status,
                timeout: settings.timeout,
            }
            .into());
        }

        attempt += 1;
        match refresh().await? {
            Refresh::Gone => {
                return match expectation.target {
                    None => {
                        info!(id, attempt, "Replication group is gone");
                        Ok(None)
                    }
                    Some(target) => Err(StdError::ResourceVanished {
                        id: id.to_string(),
                        target: target.to_string(),
                    }
                    .into()),
                };
            }
            Refresh::Found(observation) => {
                let status_match = classify(
                    &observation.status,
                    observation.node_group_status.as_deref(),
                    expectation.pending,
                    expectation.target,
                );
                last_status = observation.status.clone();

                match status_match {
                    StatusMatch::Target(status) => {
                        info!(id, %status, attempt, "Replication group reached target status");
                        return Ok(Some(observation.state));
                    }
                    StatusMatch::Pending(status) => {
                        debug!(id, %status, attempt, "Waiting for replication group");
                    }
                    StatusMatch::Other(status) if expectation.failed.contains(&status.as_str()) => {
                        return Err(StdError::UnexpectedStatus {
                            id: id.to_string(),
                            status,
                        }
                        .into());
                    }
                    StatusMatch::Other(status) => {
                        info!(id, %status, attempt, "Replication group reported an unexpected status, continuing to wait");
                    }
                }
            }
        }

        sleep(interval).await;
        interval = (interval * 2).min(ceiling);
    }
}
