// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tokio Job Processor
//!
//! Default [`JobProcessor`]: every accepted job becomes a tokio task that
//! first waits for one of `workers` permits, then runs to completion.
//! Submission never waits for a permit, so [`JobProcessor::queue_job`]
//! returns immediately even when all workers are busy.
//!
//! After [`JobProcessor::shutdown`] new submissions are rejected with
//! [`DispatchError::ShutDown`]; jobs still waiting for a permit are dropped,
//! running jobs get `drain_timeout` to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::controller_config::ProcessorSettings;
use crate::domain::job::{DispatchError, Job, JobHandle, JobId, JobProcessor};

pub struct TokioJobProcessor {
    handle: Handle,
    workers: Arc<Semaphore>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    drain_timeout: Duration,
}

impl TokioJobProcessor {
    /// Create a processor scheduling on the current tokio runtime
    pub fn new(workers: usize) -> Result<Self, DispatchError> {
        let handle = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        Ok(Self::with_handle(handle, workers))
    }

    pub fn with_handle(handle: Handle, workers: usize) -> Self {
        Self {
            handle,
            workers: Arc::new(Semaphore::new(workers.max(1))),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            drain_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_settings(settings: &ProcessorSettings) -> Result<Self, DispatchError> {
        let mut processor = Self::new(settings.workers)?;
        processor.drain_timeout = settings.drain_timeout;
        Ok(processor)
    }

    /// Jobs accepted and not yet finished (waiting or running)
    pub fn pending_jobs(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl JobProcessor for TokioJobProcessor {
    fn queue_job(&self, job: Box<dyn Job>) -> Result<JobHandle, DispatchError> {
        if self.shutdown.is_cancelled() {
            metrics::counter!("ikestack_jobs_rejected_total").increment(1);
            return Err(DispatchError::ShutDown);
        }

        let id = JobId::new();
        let description = job.describe();
        let workers = self.workers.clone();
        let shutdown = self.shutdown.clone();

        debug!(job_id = %id, job = %description, "Job queued");
        metrics::counter!("ikestack_jobs_queued_total").increment(1);

        self.tracker.spawn_on(
            async move {
                let _permit = tokio::select! {
                    permit = workers.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                    _ = shutdown.cancelled() => {
                        debug!(job_id = %id, job = %description, "Job dropped before start");
                        return;
                    }
                };

                let _active = ActiveJob::enter();
                debug!(job_id = %id, job = %description, "Job started");
                job.execute().await;
                debug!(job_id = %id, "Job finished");
            },
            &self.handle,
        );

        Ok(JobHandle { id })
    }

    /// Waits up to the drain timeout for running jobs
    async fn shutdown(&self) -> bool {
        info!(pending = self.pending_jobs(), "Shutting down job processor");
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(self.drain_timeout, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pending = self.pending_jobs(),
                    "Job processor drain timed out after {:?}", self.drain_timeout
                );
                false
            }
        }
    }
}

impl Drop for TokioJobProcessor {
    // Jobs still waiting for a worker are dropped; running jobs finish
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// Keeps the active-jobs gauge right even if a job panics
struct ActiveJob;

impl ActiveJob {
    fn enter() -> Self {
        metrics::gauge!("ikestack_jobs_active").increment(1.0);
        ActiveJob
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        metrics::gauge!("ikestack_jobs_active").decrement(1.0);
    }
}
