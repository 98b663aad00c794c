//! `PeriodicSweeper` runs a maintenance job on a fixed interval in a background task.
//!
//! The job is anything implementing [`Sweep`], typically purging expired entries from a store.
//! The background task stops when the sweeper is dropped, when [`PeriodicSweeper::cancel`] is
//! called, or when the cancellation token it was started with is cancelled.
//! [`PeriodicSweeper::shutdown`] additionally waits for the task to finish.

use async_trait::async_trait;
use log::{debug, info, warn};
use stats::SweeperStats;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

mod stats;

/// A periodic maintenance job
#[async_trait]
pub trait Sweep: Send + Sync + Debug + 'static {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// Run one pass. Returns the number of entries purged, if the job can tell.
    async fn sweep(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>>;
}

#[derive(Debug, Clone)]
pub struct SweeperOptions {
    /// Time between two passes (default: 60 s)
    pub interval: Duration,
    /// Delay before the first pass (default: one interval)
    pub initial_delay: Option<Duration>,
}

impl Default for SweeperOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: None,
        }
    }
}

#[derive(Debug)]
pub struct PeriodicSweeper {
    /// A cancellation token to signal shutdown.
    shutdown_token: CancellationToken,
    /// Name of the job (for logging).
    name: String,
    /// Statistics about the passes performed so far
    stats: Arc<SweeperStats>,
    /// Handle of the background task, taken by `shutdown`
    handle: Option<JoinHandle<()>>,
}

impl PeriodicSweeper {
    /// Starts running `job` every minute until the sweeper is dropped.
    pub fn start<S: Sweep>(job: S) -> Self {
        Self::start_with_opt(job, SweeperOptions::default())
    }

    /// Starts running `job` with the given options until the sweeper is dropped.
    pub fn start_with_opt<S: Sweep>(job: S, opt: SweeperOptions) -> Self {
        Self::start_with_token(job, opt, CancellationToken::new())
    }

    /// Starts running `job`, stopping when `shutdown_token` (or a parent of it) is cancelled.
    pub fn start_with_token<S: Sweep>(
        job: S,
        opt: SweeperOptions,
        shutdown_token: CancellationToken,
    ) -> Self {
        let mut sweeper = Self {
            shutdown_token,
            name: job.name().to_string(),
            stats: Arc::new(SweeperStats::default()),
            handle: None,
        };
        sweeper.spawn(job, opt);
        sweeper
    }

    /// Number of passes performed so far
    pub fn runs(&self) -> usize {
        self.stats.runs()
    }

    /// Number of passes that failed
    pub fn failed_runs(&self) -> usize {
        self.stats.failed_runs()
    }

    /// Total number of entries the job reported as purged
    pub fn purged(&self) -> usize {
        self.stats.purged()
    }

    /// Whether the background task has been asked to stop
    pub fn is_cancelled(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Signals the background task to stop without waiting for it
    pub fn cancel(&self) {
        self.shutdown_token.cancel();
    }

    /// Signals the background task to stop and waits until it has exited
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Sweeper '{}' task ended abnormally: {}", self.name, e);
            }
        }
        info!("Sweeper '{}' stopped", self.name);
    }

    fn spawn<S: Sweep>(&mut self, job: S, opt: SweeperOptions) {
        let shutdown_token = self.shutdown_token.clone();
        let stats = Arc::clone(&self.stats);
        let initial_delay = opt.initial_delay.unwrap_or(opt.interval);

        self.handle = Some(tokio::spawn(async move {
            info!(
                "Starting sweeper '{}' (interval: {:?})",
                job.name(),
                opt.interval
            );

            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    debug!("Sweeper '{}' cancelled before its first pass", job.name());
                    return;
                }
                _ = tokio::time::sleep(initial_delay) => {}
            }

            let mut ticker = interval(opt.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_token.cancelled() => {
                        info!("Sweeper '{}' received shutdown signal", job.name());
                        break;
                    }
                    _ = ticker.tick() => {}
                }

                let count = stats.increment_runs();
                match job.sweep().await {
                    Ok(purged) => {
                        stats.add_purged(purged);
                        debug!(
                            "Sweeper '{}' pass {} purged {} entries",
                            job.name(),
                            count + 1,
                            purged
                        );
                    }
                    Err(e) => {
                        stats.increment_failed_runs();
                        warn!("Sweeper '{}' pass {} failed: {}", job.name(), count + 1, e);
                    }
                }
            }
        }));
    }
}

impl Drop for PeriodicSweeper {
    fn drop(&mut self) {
        if !self.shutdown_token.is_cancelled() {
            debug!("Sweeper '{}' is dropping, stopping its task", self.name);
        }
        self.shutdown_token.cancel();
    }
}
