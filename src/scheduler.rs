//! Periodic background jobs
//!
//! Runs each registered job on its own task at a fixed interval. Job errors
//! are caught and logged so one failing job never takes down its schedule or
//! any other job. Sleeps are sliced into one-second chunks polling the run
//! signal, so shutdown is observed within about a second.

use std::future::Future;
use std::pin::Pin;

use anyhow::{bail, Result};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::signal::RunSignal;

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type JobFn = Box<dyn Fn() -> JobFuture + Send + Sync + 'static>;

struct Job {
    name: String,
    interval_secs: u64,
    run: JobFn,
}

/// Schedules named jobs at fixed intervals until the run signal clears.
pub struct PeriodicJobScheduler {
    signal: RunSignal,
    jobs: Vec<Job>,
    handles: Vec<JoinHandle<()>>,
}

impl PeriodicJobScheduler {
    #[must_use]
    pub fn new(signal: RunSignal) -> Self {
        Self {
            signal,
            jobs: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Register a job to run every `interval_secs` seconds. Must be called
    /// before [`start`](Self::start); an interval of zero is rejected.
    pub fn add_job<F, Fut>(&mut self, name: &str, interval_secs: u64, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if interval_secs == 0 {
            bail!("job '{name}' has a zero interval");
        }
        self.jobs.push(Job {
            name: name.to_string(),
            interval_secs,
            run: Box::new(move || Box::pin(job())),
        });
        Ok(())
    }

    /// Number of registered jobs.
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len() + self.handles.len()
    }

    /// Spawn one worker task per registered job. Each worker runs its job,
    /// then sleeps for the job's interval, until shutdown.
    pub fn start(&mut self) {
        for job in self.jobs.drain(..) {
            let signal = self.signal.clone();
            info!(job = %job.name, interval_secs = job.interval_secs, "starting periodic job");
            self.handles.push(tokio::spawn(async move {
                while signal.is_set() {
                    debug!(job = %job.name, "running periodic job");
                    if let Err(e) = (job.run)().await {
                        error!(job = %job.name, error = %e, "periodic job failed");
                    }
                    if !signal.sleep_while_running(job.interval_secs).await {
                        break;
                    }
                }
                debug!(job = %job.name, "periodic job stopped");
            }));
        }
    }

    /// Wait for all workers to observe shutdown and finish.
    pub async fn join(&mut self) {
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "periodic job panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_zero_interval_rejected() {
        let mut scheduler = PeriodicJobScheduler::new(RunSignal::new());
        let result = scheduler.add_job("bad", 0, || async { Ok(()) });
        assert!(result.is_err());
        assert_eq!(scheduler.job_count(), 0);
    }

    #[tokio::test]
    async fn test_job_runs_and_stops_promptly() {
        let signal = RunSignal::new();
        let counter = Arc::new(AtomicU32::new(0));
        let mut scheduler = PeriodicJobScheduler::new(signal.clone());

        let job_counter = Arc::clone(&counter);
        scheduler
            .add_job("counter", 60, move || {
                let c = Arc::clone(&job_counter);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        signal.clear();
        let started = Instant::now();
        scheduler.join().await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_failing_job_keeps_running_others() {
        let signal = RunSignal::new();
        let counter = Arc::new(AtomicU32::new(0));
        let mut scheduler = PeriodicJobScheduler::new(signal.clone());

        scheduler
            .add_job("broken", 60, || async { bail!("boom") })
            .unwrap();
        let job_counter = Arc::clone(&counter);
        scheduler
            .add_job("healthy", 60, move || {
                let c = Arc::clone(&job_counter);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .unwrap();
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        signal.clear();
        scheduler.join().await;
    }
}
