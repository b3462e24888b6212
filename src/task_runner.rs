/// Background-loop supervisor
///
/// Drives the periodic jobs (position monitoring, status reporting) with a
/// fixed cadence on success and exponential backoff on failure. A failed
/// iteration is logged and retried forever; scan failures are expected
/// operational noise, never fatal to the process.
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

/// Supervision parameters for one background loop
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay between successful iterations.
    pub interval: Duration,
    /// Delay after the first failure; doubles per consecutive failure.
    pub initial_backoff: Duration,
    /// Backoff ceiling.
    pub max_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

/// Run one iteration of `task_fn` per interval, backing off while it fails.
pub async fn run_supervised<F, Fut>(task_name: &str, config: SupervisorConfig, mut task_fn: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut consecutive_failures: u32 = 0;
    let mut backoff = config.initial_backoff;

    loop {
        match task_fn().await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    info!(
                        "Task '{}' recovered after {} failures",
                        task_name, consecutive_failures
                    );
                }
                consecutive_failures = 0;
                backoff = config.initial_backoff;
                sleep(config.interval).await;
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    "Task '{}' failed ({} consecutive), retrying in {:?}: {}",
                    task_name, consecutive_failures, backoff, e
                );
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
