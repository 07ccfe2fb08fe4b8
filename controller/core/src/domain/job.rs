// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Execution Contract
//!
//! The controller never performs lifecycle work itself. It wraps each request
//! into a [`Job`] and hands it to a [`JobProcessor`], which owns scheduling
//! from then on. Queueing is fire-and-forget: [`JobProcessor::queue_job`]
//! returns as soon as the job is accepted (or rejected) and never waits for
//! the job to run.
//!
//! Jobs report progress exclusively through signals published via their
//! [`JobContext`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::signal::{CorrelationId, Signal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receipt for an accepted job. Carries no way to wait on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
}

/// One opaque unit of work.
#[async_trait]
pub trait Job: Send + 'static {
    /// Short human-readable description for logs
    fn describe(&self) -> String;

    async fn execute(self: Box<Self>);
}

/// The job execution engine
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Accept a job for asynchronous execution. Must not block on the job.
    fn queue_job(&self, job: Box<dyn Job>) -> Result<JobHandle, DispatchError>;

    /// Stop accepting jobs and let running ones finish. Returns false if
    /// some were still running when the processor gave up waiting.
    async fn shutdown(&self) -> bool {
        true
    }
}

/// Submission-time failures. A job that is accepted and later fails its
/// operation reports that through signals, never through this type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Job processor is shut down")]
    ShutDown,

    #[error("Job processor has no runtime to schedule on")]
    NoRuntime,

    #[error("Job rejected: {0}")]
    Rejected(String),
}

/// Anything signals can be published to
pub trait SignalSink: Send + Sync {
    fn publish(&self, signal: Signal);
}

/// Per-job handle the keying engine uses to report progress. Every signal
/// emitted through it is stamped with the job's correlation token.
#[derive(Clone)]
pub struct JobContext {
    correlation: CorrelationId,
    sink: Arc<dyn SignalSink>,
}

impl JobContext {
    pub fn new(correlation: CorrelationId, sink: Arc<dyn SignalSink>) -> Self {
        Self { correlation, sink }
    }

    pub fn correlation(&self) -> CorrelationId {
        self.correlation
    }

    pub fn emit(&self, signal: Signal) {
        self.sink.publish(signal.with_correlation(self.correlation));
    }
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("correlation", &self.correlation)
            .finish_non_exhaustive()
    }
}
