// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Correlation Engine
//!
//! Gives each lifecycle request a synchronous-looking outcome: dispatch the
//! job, then follow the signals it produces until one of them settles the
//! request.
//!
//! ## Procedure
//! 1. Check the target exists (terminate/unroute). Missing targets return
//!    `NotFound` without dispatching, subscribing or calling back.
//! 2. Subscribe to the bus, then dispatch. Subscribing first means a job that
//!    finishes before we start listening cannot slip past us.
//! 3. For every signal the [`Correlator`] accepts, call the caller's callback.
//!    If it returns `false`, stop and return `NeedMore`: the job keeps running,
//!    we just stop waiting on it.
//! 4. Otherwise classify the signal ([`ActionKind::classify`]); a terminal
//!    success or failure ends the call.
//!
//! There is no timeout here. A job that never produces a terminal signal
//! keeps the caller waiting until its callback gives up.

use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::{debug, info};

use crate::application::dispatcher::ActionDispatcher;
use crate::domain::action::{Action, ActionKind, ActionRequest, Status, Verdict};
use crate::domain::ike_sa::{IkeSaId, IkeSaRef, ReqId};
use crate::domain::job::DispatchError;
use crate::domain::signal::{CorrelationId, Level, Signal, SignalKind};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::ike_sa_manager::IkeSaManager;

/// Progress callback of a controller call. Returning `false` means
/// "stop waiting now".
///
/// Caller state (the "param" of a classic C-style callback) lives in the
/// implementing type or in the closure's captures.
pub trait SignalCallback: Send {
    fn on_signal(&mut self, kind: SignalKind, level: Level, ike_sa: Option<&IkeSaRef>, message: &str) -> bool;
}

/// Closure adapter for [`SignalCallback`], see [`callback_fn`]
pub struct FnCallback<F>(F);

/// Wrap a closure as a [`SignalCallback`]
pub fn callback_fn<F>(f: F) -> FnCallback<F>
where
    F: FnMut(SignalKind, Level, Option<&IkeSaRef>, &str) -> bool + Send,
{
    FnCallback(f)
}

impl<F> SignalCallback for FnCallback<F>
where
    F: FnMut(SignalKind, Level, Option<&IkeSaRef>, &str) -> bool + Send,
{
    fn on_signal(&mut self, kind: SignalKind, level: Level, ike_sa: Option<&IkeSaRef>, message: &str) -> bool {
        (self.0)(kind, level, ike_sa, message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Dispatch failed: {0}")]
    DispatchFailed(#[from] DispatchError),

    #[error("IKE_SA {0} not found")]
    IkeSaNotFound(IkeSaId),

    #[error("CHILD_SA with reqid {0} not found")]
    ChildSaNotFound(ReqId),

    #[error("CHILD_SA with reqid {0} is not routed")]
    NotRouted(ReqId),

    #[error("Callback requested to stop waiting")]
    CallbackStopped,

    #[error("Event bus closed while waiting for the outcome")]
    BusClosed,
}

impl From<ControllerError> for Status {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::DispatchFailed(_) | ControllerError::BusClosed => Status::Failed,
            ControllerError::IkeSaNotFound(_)
            | ControllerError::ChildSaNotFound(_)
            | ControllerError::NotRouted(_) => Status::NotFound,
            ControllerError::CallbackStopped => Status::NeedMore,
        }
    }
}

/// Decides which signals on the shared bus belong to one request.
///
/// A signal belongs to the request if it carries the request's token, or
/// concerns the request's CHILD_SA, or concerns its IKE_SA and no other
/// CHILD_SA. Targets unknown up front (initiate/route) are adopted from the
/// first token-stamped signal naming them, so signals emitted later by other
/// jobs working on the same SA are followed too. Until the request's own
/// CHILD_SA is known, unstamped signals naming any CHILD_SA are ignored: the
/// IKE_SA may be shared with children set up by other requests.
#[derive(Debug, Clone)]
pub struct Correlator {
    token: CorrelationId,
    ike_sa: Option<IkeSaId>,
    reqid: Option<ReqId>,
    adopt_reqid: bool,
}

impl Correlator {
    pub fn new(token: CorrelationId) -> Self {
        Self {
            token,
            ike_sa: None,
            reqid: None,
            adopt_reqid: true,
        }
    }

    /// Follow the whole IKE_SA: never narrow down to the first CHILD_SA a
    /// signal names
    pub fn whole_ike_sa(mut self) -> Self {
        self.adopt_reqid = false;
        self
    }

    pub fn with_ike_sa(mut self, id: IkeSaId) -> Self {
        self.ike_sa = Some(id);
        self
    }

    pub fn with_reqid(mut self, reqid: ReqId) -> Self {
        self.reqid = Some(reqid);
        self
    }

    pub fn ike_sa(&self) -> Option<IkeSaId> {
        self.ike_sa
    }

    pub fn reqid(&self) -> Option<ReqId> {
        self.reqid
    }

    pub fn matches(&mut self, signal: &Signal) -> bool {
        if signal.correlation == Some(self.token) {
            if self.ike_sa.is_none() {
                self.ike_sa = signal.ike_sa_id();
            }
            if self.adopt_reqid && self.reqid.is_none() {
                self.reqid = signal.reqid;
            }
            return true;
        }

        match (self.reqid, signal.reqid) {
            (Some(ours), Some(theirs)) => return ours == theirs,
            (None, Some(_)) if self.adopt_reqid => return false,
            _ => {}
        }

        matches!((self.ike_sa, signal.ike_sa_id()), (Some(ours), Some(theirs)) if ours == theirs)
    }
}

pub struct CorrelationEngine {
    bus: EventBus,
    manager: Arc<IkeSaManager>,
    dispatcher: ActionDispatcher,
}

impl CorrelationEngine {
    pub fn new(bus: EventBus, manager: Arc<IkeSaManager>, dispatcher: ActionDispatcher) -> Self {
        Self {
            bus,
            manager,
            dispatcher,
        }
    }

    /// Run `request` to a terminal status. Without a callback the request is
    /// dispatched and reported as `Success` without waiting.
    pub async fn execute(&self, request: ActionRequest, callback: Option<&mut dyn SignalCallback>) -> Status {
        let kind = request.kind();
        let status = match self.run(&request, callback).await {
            Ok(status) => status,
            Err(e) => {
                debug!(action = %kind, correlation = %request.correlation, reason = %e, "Action ended early");
                e.into()
            }
        };

        info!(
            action = %kind,
            correlation = %request.correlation,
            status = %status,
            "{} finished",
            request.action
        );
        metrics::counter!(
            "ikestack_actions_total",
            "action" => kind.as_str(),
            "status" => status.as_str()
        )
        .increment(1);

        status
    }

    async fn run(
        &self,
        request: &ActionRequest,
        callback: Option<&mut dyn SignalCallback>,
    ) -> Result<Status, ControllerError> {
        let mut correlator = self.precheck(request).await?;

        let Some(callback) = callback else {
            self.dispatcher.dispatch(request)?;
            return Ok(Status::Success);
        };

        let mut receiver = self.bus.subscribe();
        self.dispatcher.dispatch(request)?;

        let kind = request.kind();
        let token = request.correlation;
        receiver
            .listen(
                |signal| correlator.matches(signal),
                |signal| Self::observe(kind, token, &mut *callback, signal),
            )
            .await
            .map_err(|_| ControllerError::BusClosed)?
    }

    fn observe(
        kind: ActionKind,
        token: CorrelationId,
        callback: &mut dyn SignalCallback,
        signal: &Signal,
    ) -> ControlFlow<Result<Status, ControllerError>> {
        debug!(action = %kind, correlation = %token, signal = %signal, "Signal observed");

        if !callback.on_signal(signal.kind, signal.level, signal.ike_sa.as_ref(), &signal.message) {
            return ControlFlow::Break(Err(ControllerError::CallbackStopped));
        }

        match kind.classify(signal.kind) {
            Verdict::Progress => ControlFlow::Continue(()),
            Verdict::Succeeded => ControlFlow::Break(Ok(Status::Success)),
            Verdict::Failed => ControlFlow::Break(Ok(Status::Failed)),
        }
    }

    /// Synchronous existence check against the manager, before anything is
    /// dispatched. Seeds the correlator with the targets it finds.
    async fn precheck(&self, request: &ActionRequest) -> Result<Correlator, ControllerError> {
        let correlator = Correlator::new(request.correlation);

        match &request.action {
            Action::Initiate { .. } | Action::Route { .. } => Ok(correlator),
            Action::TerminateIke { id } => {
                self.manager
                    .find_by_id(*id)
                    .await
                    .ok_or(ControllerError::IkeSaNotFound(*id))?;
                Ok(correlator.with_ike_sa(*id).whole_ike_sa())
            }
            Action::TerminateChild { reqid } => {
                let parent = self
                    .manager
                    .find_by_reqid(*reqid)
                    .await
                    .ok_or(ControllerError::ChildSaNotFound(*reqid))?;
                Ok(correlator.with_ike_sa(parent.id).with_reqid(*reqid))
            }
            Action::Unroute { reqid } => {
                let parent = self
                    .manager
                    .find_by_reqid(*reqid)
                    .await
                    .ok_or(ControllerError::ChildSaNotFound(*reqid))?;
                let routed = parent.child(*reqid).is_some_and(|child| child.is_routed());
                if !routed {
                    return Err(ControllerError::NotRouted(*reqid));
                }
                Ok(correlator.with_ike_sa(parent.id).with_reqid(*reqid))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ike_sa::IkeSaState;
    use crate::domain::signal::DebugGroup;

    fn sa(id: u32) -> IkeSaRef {
        IkeSaRef {
            id: IkeSaId(id),
            name: "gw".to_string(),
            state: IkeSaState::Connecting,
        }
    }

    #[test]
    fn test_token_match_adopts_targets() {
        let token = CorrelationId::new();
        let mut correlator = Correlator::new(token);

        let unrelated = Signal::log(DebugGroup::Ike, Level::Control, "x").with_ike_sa(sa(1));
        assert!(!correlator.matches(&unrelated));

        let first = Signal::new(SignalKind::IkeUpStart, Level::Control, "start")
            .with_ike_sa(sa(1))
            .with_correlation(token);
        assert!(correlator.matches(&first));
        assert_eq!(correlator.ike_sa(), Some(IkeSaId(1)));
        assert_eq!(correlator.reqid(), None);

        // Emitted by a different job handling the same IKE_SA
        let later = Signal::new(SignalKind::IkeUpSuccess, Level::Control, "up").with_ike_sa(sa(1));
        assert!(correlator.matches(&later));
    }

    #[test]
    fn test_other_child_on_same_ike_sa_is_ignored() {
        let mut correlator = Correlator::new(CorrelationId::new())
            .with_ike_sa(IkeSaId(1))
            .with_reqid(ReqId(10));

        let ours = Signal::new(SignalKind::ChildDownSuccess, Level::Control, "down")
            .with_ike_sa(sa(1))
            .with_reqid(ReqId(10));
        let theirs = Signal::new(SignalKind::ChildDownSuccess, Level::Control, "down")
            .with_ike_sa(sa(1))
            .with_reqid(ReqId(11));
        let ike_level = Signal::log(DebugGroup::Ike, Level::Control, "sending DELETE").with_ike_sa(sa(1));

        assert!(correlator.matches(&ours));
        assert!(!correlator.matches(&theirs));
        assert!(correlator.matches(&ike_level));
    }

    #[test]
    fn test_foreign_child_on_shared_ike_sa_is_ignored_before_adoption() {
        let token = CorrelationId::new();
        let mut correlator = Correlator::new(token);

        let ours = Signal::new(SignalKind::ChildUpStart, Level::Control, "reusing IKE_SA")
            .with_ike_sa(sa(1))
            .with_correlation(token);
        assert!(correlator.matches(&ours));
        assert_eq!(correlator.ike_sa(), Some(IkeSaId(1)));
        assert_eq!(correlator.reqid(), None);

        let foreign = Signal::new(SignalKind::ChildUpSuccess, Level::Audit, "net-b established")
            .with_ike_sa(sa(1))
            .with_reqid(ReqId(9))
            .with_correlation(CorrelationId::new());
        assert!(!correlator.matches(&foreign));

        // IKE-level signals on the shared IKE_SA are still ours
        let ike_level = Signal::new(SignalKind::IkeRekeyStart, Level::Control, "rekeying").with_ike_sa(sa(1));
        assert!(correlator.matches(&ike_level));

        let own_child = Signal::new(SignalKind::ChildUpStart, Level::Control, "net-a")
            .with_ike_sa(sa(1))
            .with_reqid(ReqId(10))
            .with_correlation(token);
        assert!(correlator.matches(&own_child));
        assert_eq!(correlator.reqid(), Some(ReqId(10)));

        let own_success = Signal::new(SignalKind::ChildUpSuccess, Level::Audit, "net-a established")
            .with_ike_sa(sa(1))
            .with_reqid(ReqId(10));
        assert!(correlator.matches(&own_success));
        assert!(!correlator.matches(&foreign));
    }

    #[test]
    fn test_whole_ike_sa_keeps_following_every_child() {
        let token = CorrelationId::new();
        let mut correlator = Correlator::new(token).with_ike_sa(IkeSaId(1)).whole_ike_sa();

        let first = Signal::new(SignalKind::ChildDownSuccess, Level::Control, "down")
            .with_ike_sa(sa(1))
            .with_reqid(ReqId(10))
            .with_correlation(token);
        let second = Signal::new(SignalKind::ChildDownSuccess, Level::Control, "down")
            .with_ike_sa(sa(1))
            .with_reqid(ReqId(11));

        assert!(correlator.matches(&first));
        assert_eq!(correlator.reqid(), None);
        assert!(correlator.matches(&second));
    }

    #[test]
    fn test_other_ike_sa_is_ignored() {
        let mut correlator = Correlator::new(CorrelationId::new()).with_ike_sa(IkeSaId(1));
        let other = Signal::new(SignalKind::IkeDownSuccess, Level::Control, "down").with_ike_sa(sa(2));
        let unattributed = Signal::log(DebugGroup::Daemon, Level::Control, "reloading");

        assert!(!correlator.matches(&other));
        assert!(!correlator.matches(&unattributed));
    }

    #[test]
    fn test_foreign_token_with_same_target_still_matches() {
        let mut correlator = Correlator::new(CorrelationId::new()).with_ike_sa(IkeSaId(4));
        let signal = Signal::new(SignalKind::IkeDownSuccess, Level::Control, "down")
            .with_ike_sa(sa(4))
            .with_correlation(CorrelationId::new());
        assert!(correlator.matches(&signal));
    }

    #[test]
    fn test_error_to_status_mapping() {
        assert_eq!(
            Status::from(ControllerError::DispatchFailed(DispatchError::ShutDown)),
            Status::Failed
        );
        assert_eq!(Status::from(ControllerError::BusClosed), Status::Failed);
        assert_eq!(Status::from(ControllerError::IkeSaNotFound(IkeSaId(1))), Status::NotFound);
        assert_eq!(Status::from(ControllerError::ChildSaNotFound(ReqId(1))), Status::NotFound);
        assert_eq!(Status::from(ControllerError::NotRouted(ReqId(1))), Status::NotFound);
        assert_eq!(Status::from(ControllerError::CallbackStopped), Status::NeedMore);
    }

    #[test]
    fn test_observe_stops_when_callback_declines() {
        let mut calls = 0;
        let mut callback = callback_fn(|_, _, _, _| {
            calls += 1;
            false
        });
        let signal = Signal::new(SignalKind::ChildUpSuccess, Level::Control, "up");

        let flow = CorrelationEngine::observe(ActionKind::Initiate, CorrelationId::new(), &mut callback, &signal);
        assert!(matches!(flow, ControlFlow::Break(Err(ControllerError::CallbackStopped))));
        drop(callback);
        assert_eq!(calls, 1);
    }
}
