// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Action Dispatcher
//!
//! Turns an [`ActionRequest`] into exactly one [`Job`] and queues it on the
//! [`JobProcessor`]. The dispatcher performs no lifecycle work itself: the job
//! calls into the [`KeyingEngine`] when the processor runs it.
//!
//! If the engine rejects the action with an error, the job publishes the
//! action's failure signal stamped with the request's correlation token, so a
//! waiting caller always gets an answer for engine-side errors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::action::{Action, ActionKind, ActionRequest};
use crate::domain::job::{DispatchError, Job, JobContext, JobHandle, JobProcessor, SignalSink};
use crate::domain::keying::KeyingEngine;
use crate::domain::signal::{Level, Signal};

#[derive(Clone)]
pub struct ActionDispatcher {
    processor: Arc<dyn JobProcessor>,
    keying: Arc<dyn KeyingEngine>,
    sink: Arc<dyn SignalSink>,
}

impl ActionDispatcher {
    pub fn new(
        processor: Arc<dyn JobProcessor>,
        keying: Arc<dyn KeyingEngine>,
        sink: Arc<dyn SignalSink>,
    ) -> Self {
        Self {
            processor,
            keying,
            sink,
        }
    }

    /// Queue the job for `request`. Returns as soon as the processor accepted
    /// or refused it.
    pub fn dispatch(&self, request: &ActionRequest) -> Result<JobHandle, DispatchError> {
        let job = ActionJob {
            action: request.action.clone(),
            ctx: JobContext::new(request.correlation, self.sink.clone()),
            keying: self.keying.clone(),
        };

        match self.processor.queue_job(Box::new(job)) {
            Ok(handle) => {
                info!(
                    action = %request.kind(),
                    correlation = %request.correlation,
                    job_id = %handle.id,
                    "Action dispatched"
                );
                Ok(handle)
            }
            Err(e) => {
                warn!(
                    action = %request.kind(),
                    correlation = %request.correlation,
                    error = %e,
                    "Action dispatch failed"
                );
                Err(e)
            }
        }
    }
}

struct ActionJob {
    action: Action,
    ctx: JobContext,
    keying: Arc<dyn KeyingEngine>,
}

impl ActionJob {
    fn report_failure(&self, kind: ActionKind, reason: impl std::fmt::Display) {
        self.ctx.emit(Signal::new(
            kind.failure_signal(),
            Level::Control,
            format!("{} failed: {}", self.action, reason),
        ));
    }
}

#[async_trait]
impl Job for ActionJob {
    fn describe(&self) -> String {
        self.action.to_string()
    }

    async fn execute(self: Box<Self>) {
        let kind = self.action.kind();
        let ctx = &self.ctx;

        let result = match &self.action {
            Action::Initiate { peer, child } => {
                self.keying.initiate(ctx, peer.clone(), child.clone()).await
            }
            Action::TerminateIke { id } => self.keying.terminate_ike(ctx, *id).await,
            Action::TerminateChild { reqid } => self.keying.terminate_child(ctx, *reqid).await,
            Action::Route { peer, child } => self.keying.route(ctx, peer.clone(), child.clone()).await,
            Action::Unroute { reqid } => self.keying.unroute(ctx, *reqid).await,
        };

        if let Err(e) = result {
            warn!(
                action = %kind,
                correlation = %ctx.correlation(),
                error = %e,
                "Keying engine rejected action"
            );
            self.report_failure(kind, e);
        }
    }
}
