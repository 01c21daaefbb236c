use crate::error::RuntimeError;
use crate::runtime::ContainerRuntime;
use std::time::Duration;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::debug;

const TRANSIENT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(i64),
    DeadlineElapsed,
}

/// Waits for `container_id` to exit, giving up at the absolute `deadline`.
///
/// Every attempt is bounded by `attempt_timeout` (clamped to the time left).
/// Attempts that time out or fail transiently are repeated, any other runtime
/// error ends the wait.
pub async fn await_exit<R: ContainerRuntime>(
    runtime: &R,
    container_id: &str,
    deadline: Instant,
    attempt_timeout: Duration,
) -> Result<WaitOutcome, RuntimeError> {
    let mut attempt = 0u32;
    loop {
        let now = Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome::DeadlineElapsed);
        }
        attempt += 1;

        match timeout(attempt_timeout.min(deadline - now), runtime.wait_container(container_id)).await {
            Ok(Ok(code)) => return Ok(WaitOutcome::Exited(code)),
            Ok(Err(err)) if err.is_transient() => {
                debug!(
                    "Wait attempt {} for container {} failed, retrying: {}",
                    attempt, container_id, err
                );
                sleep_until((Instant::now() + TRANSIENT_RETRY_BACKOFF).min(deadline)).await;
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => debug!(
                "Wait attempt {} for container {} returned no exit status in time",
                attempt, container_id
            ),
        }
    }
}
