//! Backoff-restarting supervisor for long-running background tasks.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Initial restart delay.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Restart delay ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// A run lasting at least this long counts as healthy and resets the
/// backoff.
const HEALTHY_RUN: Duration = Duration::from_secs(30);

/// Runs `task` until shutdown.
///
/// A task that returns `Ok(())` is treated as a clean exit (it observed
/// the cancellation token itself). A task that returns an error is logged
/// and restarted after a delay that starts at one second and doubles to a
/// two-minute cap; the delay resets once a run survives long enough to be
/// considered healthy.
pub async fn run_supervised<F, Fut>(name: &str, shutdown: CancellationToken, mut task: F)
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = lodge_core::AppResult<()>>,
{
    let mut backoff = INITIAL_BACKOFF;

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let started = tokio::time::Instant::now();
        match task(shutdown.clone()).await {
            Ok(()) => {
                info!(task = name, "background task exited cleanly");
                return;
            }
            Err(error) => {
                if shutdown.is_cancelled() {
                    return;
                }
                if started.elapsed() >= HEALTHY_RUN {
                    backoff = INITIAL_BACKOFF;
                }
                warn!(task = name, %error, delay_secs = backoff.as_secs(), "background task failed; restarting");

                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Drives a periodic task on a fixed interval until shutdown.
///
/// Wraps the per-tick body so it composes with [`run_supervised`]: a tick
/// error propagates out and triggers the supervisor's backoff.
pub async fn run_interval<F, Fut>(
    interval: Duration,
    shutdown: CancellationToken,
    mut tick: F,
) -> lodge_core::AppResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = lodge_core::AppResult<()>>,
{
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => return Ok(()),
            _ = timer.tick() => tick().await?,
        }
    }
}
