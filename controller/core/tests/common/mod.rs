// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ikestack_core::application::{SignalCallback, StandardController};
use ikestack_core::domain::ike_sa::{ChildSa, ChildSaState, IkeSaId, IkeSaRef, IkeSaState, ReqId};
use ikestack_core::domain::job::{DispatchError, Job, JobContext, JobHandle, JobProcessor};
use ikestack_core::domain::keying::{KeyingEngine, KeyingError};
use ikestack_core::domain::peer_config::{ChildConfig, PeerConfig};
use ikestack_core::domain::signal::{DebugGroup, Level, Signal, SignalKind};
use ikestack_core::infrastructure::event_bus::EventBus;
use ikestack_core::infrastructure::ike_sa_manager::IkeSaManager;
use ikestack_core::infrastructure::processor::TokioJobProcessor;

/// How the scripted engine behaves
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Pause between consecutive signals
    pub step_delay: Duration,
    /// Initiate fails during IKE_SA setup
    pub fail_ike: bool,
    /// Never emit a terminal signal
    pub silent: bool,
    /// Emit IKE-level progress and terminal signals without the job's token,
    /// the way a real engine does when a peer's reply is processed by another
    /// job. Signals announcing a new CHILD_SA stay stamped.
    pub out_of_band: bool,
    /// Initiate reuses an established IKE_SA of the same peer
    pub reuse_ike_sa: bool,
    /// Child whose setup waits five extra steps after the IKE_SA is ready
    pub slow_child: Option<String>,
    /// Return this error instead of doing anything
    pub reject: Option<KeyingError>,
}

/// Keying engine double: mutates the manager and emits signal sequences
/// shaped like a real negotiation
pub struct ScriptedEngine {
    manager: Arc<IkeSaManager>,
    bus: EventBus,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new(manager: Arc<IkeSaManager>, bus: EventBus, script: Script) -> Self {
        Self {
            manager,
            bus,
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), KeyingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script.reject {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn pause(&self) {
        if !self.script.step_delay.is_zero() {
            tokio::time::sleep(self.script.step_delay).await;
        }
    }

    fn send(&self, ctx: &JobContext, signal: Signal) {
        if self.script.out_of_band {
            self.bus.publish(signal);
        } else {
            ctx.emit(signal);
        }
    }

    async fn snapshot(&self, id: IkeSaId) -> Result<IkeSaRef, KeyingError> {
        self.manager
            .find_by_id(id)
            .await
            .map(|sa| sa.snapshot())
            .ok_or(KeyingError::IkeSaNotFound(id))
    }

    async fn set_state(&self, id: IkeSaId, state: IkeSaState) -> Result<IkeSaRef, KeyingError> {
        self.manager
            .update(id, |sa| sa.state = state)
            .await
            .map_err(|e| KeyingError::Other(e.to_string()))?;
        self.snapshot(id).await
    }

    async fn set_child_state(&self, id: IkeSaId, reqid: ReqId, state: ChildSaState) -> Result<(), KeyingError> {
        self.manager
            .update(id, |sa| {
                if let Some(child) = sa.child_mut(reqid) {
                    child.state = state;
                }
            })
            .await
            .map_err(|e| KeyingError::Other(e.to_string()))
    }

    async fn add_child(&self, id: IkeSaId, child: Arc<ChildConfig>) -> Result<ReqId, KeyingError> {
        let reqid = self
            .manager
            .allocate_reqid()
            .map_err(|e| KeyingError::Other(e.to_string()))?;
        self.manager
            .add_child(id, ChildSa::new(reqid, child))
            .await
            .map_err(|e| KeyingError::Other(e.to_string()))?;
        Ok(reqid)
    }
}

#[async_trait]
impl KeyingEngine for ScriptedEngine {
    async fn initiate(
        &self,
        ctx: &JobContext,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
    ) -> Result<(), KeyingError> {
        self.enter()?;
        let reusable = if self.script.reuse_ike_sa {
            self.manager
                .find_by_name(&peer.name)
                .await
                .filter(|sa| sa.state == IkeSaState::Established)
        } else {
            None
        };

        let (id, sa) = match reusable {
            Some(existing) => {
                let sa = existing.snapshot();
                ctx.emit(
                    Signal::log(DebugGroup::Ike, Level::Control, format!("reusing IKE_SA {}", sa))
                        .with_ike_sa(sa.clone()),
                );
                (existing.id, sa)
            }
            None => {
                let id = self
                    .manager
                    .create(peer.clone())
                    .await
                    .map_err(|e| KeyingError::Other(e.to_string()))?;
                let sa = self.set_state(id, IkeSaState::Connecting).await?;

                ctx.emit(
                    Signal::new(SignalKind::IkeUpStart, Level::Control, format!("initiating IKE_SA {}", sa))
                        .with_ike_sa(sa.clone()),
                );
                self.pause().await;
                self.send(
                    ctx,
                    Signal::log(
                        DebugGroup::Ike,
                        Level::ControlMore,
                        format!("sending IKE_SA_INIT to {}", peer.remote_host),
                    )
                    .with_ike_sa(sa.clone()),
                );

                if self.script.fail_ike {
                    let _ = self.manager.remove(id).await;
                    self.send(
                        ctx,
                        Signal::new(SignalKind::IkeUpFailed, Level::Audit, "peer did not respond").with_ike_sa(sa),
                    );
                    return Ok(());
                }

                self.pause().await;
                let sa = self.set_state(id, IkeSaState::Established).await?;
                self.send(
                    ctx,
                    Signal::new(SignalKind::IkeUpSuccess, Level::Audit, format!("IKE_SA {} established", sa))
                        .with_ike_sa(sa.clone()),
                );
                (id, sa)
            }
        };

        if self.script.slow_child.as_deref() == Some(child.name.as_str()) {
            tokio::time::sleep(self.script.step_delay * 5).await;
        }

        let reqid = self.add_child(id, child.clone()).await?;
        self.set_child_state(id, reqid, ChildSaState::Installing).await?;
        ctx.emit(
            Signal::new(SignalKind::ChildUpStart, Level::Control, format!("establishing CHILD_SA {}", child.name))
                .with_ike_sa(sa.clone())
                .with_reqid(reqid),
        );

        if self.script.silent {
            return Ok(());
        }

        self.pause().await;
        self.set_child_state(id, reqid, ChildSaState::Installed).await?;
        self.send(
            ctx,
            Signal::new(SignalKind::ChildUpSuccess, Level::Audit, format!("CHILD_SA {} established", child.name))
                .with_ike_sa(sa)
                .with_reqid(reqid),
        );
        Ok(())
    }

    async fn terminate_ike(&self, ctx: &JobContext, id: IkeSaId) -> Result<(), KeyingError> {
        self.enter()?;
        let sa = self.set_state(id, IkeSaState::Deleting).await?;
        let reqids: Vec<ReqId> = match self.manager.find_by_id(id).await {
            Some(ike_sa) => ike_sa.reqids().collect(),
            None => Vec::new(),
        };

        ctx.emit(
            Signal::new(SignalKind::IkeDownStart, Level::Control, format!("deleting IKE_SA {}", sa))
                .with_ike_sa(sa.clone()),
        );
        if self.script.silent {
            return Ok(());
        }

        self.pause().await;
        let _ = self.manager.remove(id).await;
        for reqid in reqids {
            self.send(
                ctx,
                Signal::new(SignalKind::ChildDownSuccess, Level::Control, "CHILD_SA closed")
                    .with_ike_sa(sa.clone())
                    .with_reqid(reqid),
            );
        }
        self.send(
            ctx,
            Signal::new(SignalKind::IkeDownSuccess, Level::Audit, format!("IKE_SA {} deleted", sa))
                .with_ike_sa(sa),
        );
        Ok(())
    }

    async fn terminate_child(&self, ctx: &JobContext, reqid: ReqId) -> Result<(), KeyingError> {
        self.enter()?;
        let parent = self
            .manager
            .find_by_reqid(reqid)
            .await
            .ok_or(KeyingError::ChildSaNotFound(reqid))?;
        self.set_child_state(parent.id, reqid, ChildSaState::Deleting).await?;
        let sa = parent.snapshot();

        ctx.emit(
            Signal::new(SignalKind::ChildDownStart, Level::Control, format!("closing CHILD_SA {}", reqid))
                .with_ike_sa(sa.clone())
                .with_reqid(reqid),
        );
        if self.script.silent {
            return Ok(());
        }

        self.pause().await;
        let _ = self.manager.remove_child(reqid).await;
        self.send(
            ctx,
            Signal::new(SignalKind::ChildDownSuccess, Level::Audit, format!("CHILD_SA {} closed", reqid))
                .with_ike_sa(sa)
                .with_reqid(reqid),
        );
        Ok(())
    }

    async fn route(
        &self,
        ctx: &JobContext,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
    ) -> Result<(), KeyingError> {
        self.enter()?;
        let id = self
            .manager
            .create(peer)
            .await
            .map_err(|e| KeyingError::Other(e.to_string()))?;
        let reqid = self.add_child(id, child.clone()).await?;
        let sa = self.snapshot(id).await?;

        ctx.emit(
            Signal::new(SignalKind::ChildRouteStart, Level::Control, format!("routing {}", child.name))
                .with_ike_sa(sa.clone())
                .with_reqid(reqid),
        );
        if self.script.silent {
            return Ok(());
        }

        self.pause().await;
        self.set_child_state(id, reqid, ChildSaState::Routed).await?;
        self.send(
            ctx,
            Signal::new(SignalKind::ChildRouteSuccess, Level::Audit, format!("{} routed", child.name))
                .with_ike_sa(sa)
                .with_reqid(reqid),
        );
        Ok(())
    }

    async fn unroute(&self, ctx: &JobContext, reqid: ReqId) -> Result<(), KeyingError> {
        self.enter()?;
        let parent = self
            .manager
            .find_by_reqid(reqid)
            .await
            .ok_or(KeyingError::ChildSaNotFound(reqid))?;
        let sa = parent.snapshot();

        ctx.emit(
            Signal::new(SignalKind::ChildUnrouteStart, Level::Control, format!("unrouting {}", reqid))
                .with_ike_sa(sa.clone())
                .with_reqid(reqid),
        );
        if self.script.silent {
            return Ok(());
        }

        self.pause().await;
        let _ = self.manager.remove_child(reqid).await;
        self.send(
            ctx,
            Signal::new(SignalKind::ChildUnrouteSuccess, Level::Audit, format!("{} unrouted", reqid))
                .with_ike_sa(sa)
                .with_reqid(reqid),
        );
        Ok(())
    }
}

/// Processor wrapper counting submissions
pub struct CountingProcessor {
    inner: TokioJobProcessor,
    queued: AtomicUsize,
}

impl CountingProcessor {
    pub fn new() -> Self {
        Self {
            inner: TokioJobProcessor::new(4).expect("tokio runtime"),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }
}

#[async_trait]
impl JobProcessor for CountingProcessor {
    fn queue_job(&self, job: Box<dyn Job>) -> Result<JobHandle, DispatchError> {
        let handle = self.inner.queue_job(job)?;
        self.queued.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    async fn shutdown(&self) -> bool {
        self.inner.shutdown().await
    }
}

/// Job that does nothing
pub struct NoopJob;

#[async_trait]
impl Job for NoopJob {
    fn describe(&self) -> String {
        "noop".to_string()
    }

    async fn execute(self: Box<Self>) {}
}

pub struct Harness {
    pub controller: Arc<StandardController>,
    pub manager: Arc<IkeSaManager>,
    pub bus: EventBus,
    pub processor: Arc<CountingProcessor>,
    pub engine: Arc<ScriptedEngine>,
}

/// Must be called from within a tokio runtime
pub fn harness(script: Script) -> Harness {
    let manager = Arc::new(IkeSaManager::new());
    let bus = EventBus::new(256);
    let processor = Arc::new(CountingProcessor::new());
    let engine = Arc::new(ScriptedEngine::new(manager.clone(), bus.clone(), script));
    let controller = Arc::new(StandardController::new(
        manager.clone(),
        bus.clone(),
        processor.clone(),
        engine.clone(),
    ));

    Harness {
        controller,
        manager,
        bus,
        processor,
        engine,
    }
}

pub fn peer(name: &str) -> Arc<PeerConfig> {
    Arc::new(PeerConfig::new(name, "192.0.2.1", "198.51.100.1"))
}

pub fn child(name: &str) -> Arc<ChildConfig> {
    Arc::new(ChildConfig::new(name, "10.1.0.0/16", "10.2.0.0/16"))
}

#[derive(Debug, Clone)]
pub struct Observed {
    pub kind: SignalKind,
    pub level: Level,
    pub ike_sa: Option<IkeSaRef>,
    pub message: String,
}

/// Callback recording everything it sees, optionally giving up after
/// `stop_after` signals
#[derive(Debug, Default)]
pub struct Recorder {
    pub seen: Vec<Observed>,
    pub stop_after: Option<usize>,
}

impl Recorder {
    pub fn stopping_after(n: usize) -> Self {
        Self {
            seen: Vec::new(),
            stop_after: Some(n),
        }
    }

    pub fn as_callback(&mut self) -> Option<&mut dyn SignalCallback> {
        Some(self)
    }

    pub fn kinds(&self) -> Vec<SignalKind> {
        self.seen.iter().map(|o| o.kind).collect()
    }
}

impl SignalCallback for Recorder {
    fn on_signal(&mut self, kind: SignalKind, level: Level, ike_sa: Option<&IkeSaRef>, message: &str) -> bool {
        self.seen.push(Observed {
            kind,
            level,
            ike_sa: ike_sa.cloned(),
            message: message.to_string(),
        });
        match self.stop_after {
            Some(n) => self.seen.len() < n,
            None => true,
        }
    }
}

/// Poll `check` until it holds or a second passes
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
