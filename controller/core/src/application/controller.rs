// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Controller Facade
//!
//! Public surface for control front-ends (CLI, local IPC, ...). Every
//! lifecycle call resolves to a single [`Status`]; nothing is propagated as
//! an error across this boundary.
//!
//! | Call | Possible statuses |
//! |------|-------------------|
//! | `initiate`, `route` | `Success`, `Failed`, `NeedMore` |
//! | `terminate_ike`, `terminate_child`, `unroute` | `Success`, `Failed`, `NotFound`, `NeedMore` |
//!
//! `NeedMore` means the callback stopped the wait; the action may still
//! complete in the background.
//!
//! Calls may run concurrently from any number of tasks. Two calls against the
//! same target are not serialized: both wait on the same signals and either
//! may observe the terminal one.
//!
//! Front-ends attach as [`ControlInterface`]s and receive a shared handle on
//! [`StandardController::start_interfaces`]. [`Controller::destroy`] stops them
//! before draining the job processor.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::application::correlation::{CorrelationEngine, SignalCallback};
use crate::application::dispatcher::ActionDispatcher;
use crate::application::interface::{ControlInterface, InterfaceError, InterfaceManager};
use crate::domain::action::{Action, ActionRequest, Status};
use crate::domain::controller_config::ControllerConfig;
use crate::domain::ike_sa::{IkeSaId, ReqId};
use crate::domain::job::{DispatchError, JobProcessor};
use crate::domain::keying::KeyingEngine;
use crate::domain::peer_config::{ChildConfig, PeerConfig};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::ike_sa_manager::{IkeSaLease, IkeSaManager};
use crate::infrastructure::processor::TokioJobProcessor;

#[async_trait]
pub trait Controller: Send + Sync {
    /// Exclusive traversal of all IKE_SAs. Blocks every mutating operation on
    /// the table until the lease is dropped; do not call back into the
    /// controller while holding it.
    async fn create_ike_sa_iterator(&self) -> IkeSaLease;

    async fn initiate(
        &self,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
        callback: Option<&mut dyn SignalCallback>,
    ) -> Status;

    async fn terminate_ike(&self, id: IkeSaId, callback: Option<&mut dyn SignalCallback>) -> Status;

    async fn terminate_child(&self, reqid: ReqId, callback: Option<&mut dyn SignalCallback>) -> Status;

    async fn route(
        &self,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
        callback: Option<&mut dyn SignalCallback>,
    ) -> Status;

    async fn unroute(&self, reqid: ReqId, callback: Option<&mut dyn SignalCallback>) -> Status;

    /// Stop attached interfaces, then refuse new jobs and wait (bounded by
    /// the processor's drain timeout) for running ones. Leases must be
    /// dropped beforehand.
    async fn destroy(self: Arc<Self>);
}

pub struct StandardController {
    manager: Arc<IkeSaManager>,
    bus: EventBus,
    processor: Arc<dyn JobProcessor>,
    engine: CorrelationEngine,
    interfaces: InterfaceManager,
}

impl StandardController {
    pub fn new(
        manager: Arc<IkeSaManager>,
        bus: EventBus,
        processor: Arc<dyn JobProcessor>,
        keying: Arc<dyn KeyingEngine>,
    ) -> Self {
        let dispatcher = ActionDispatcher::new(processor.clone(), keying, Arc::new(bus.clone()));
        let engine = CorrelationEngine::new(bus.clone(), manager.clone(), dispatcher);
        Self {
            manager,
            bus,
            processor,
            engine,
            interfaces: InterfaceManager::new(),
        }
    }

    /// Wire manager, bus and a [`TokioJobProcessor`] from settings. The
    /// keying engine is built last since it needs the manager and the bus.
    /// Must be called from within a tokio runtime.
    pub fn from_settings<K>(config: &ControllerConfig, keying: K) -> Result<Self, DispatchError>
    where
        K: FnOnce(Arc<IkeSaManager>, EventBus) -> Arc<dyn KeyingEngine>,
    {
        let manager = Arc::new(IkeSaManager::new());
        let bus = EventBus::new(config.event_bus.capacity);
        let processor = Arc::new(TokioJobProcessor::from_settings(&config.processor)?);
        let keying = keying(manager.clone(), bus.clone());

        info!(
            bus_capacity = config.event_bus.capacity,
            workers = config.processor.workers,
            "Controller initialized"
        );
        Ok(Self::new(manager, bus, processor, keying))
    }

    pub fn manager(&self) -> &Arc<IkeSaManager> {
        &self.manager
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn interfaces(&self) -> &InterfaceManager {
        &self.interfaces
    }

    pub fn register_interface(&self, interface: Arc<dyn ControlInterface>) -> Result<(), InterfaceError> {
        self.interfaces.register(interface)
    }

    /// Hand every registered interface a handle to this controller
    pub async fn start_interfaces(self: &Arc<Self>) -> usize {
        let controller: Arc<dyn Controller> = self.clone();
        self.interfaces.start_all(controller).await
    }

    async fn run(&self, action: Action, callback: Option<&mut dyn SignalCallback>) -> Status {
        self.engine.execute(ActionRequest::new(action), callback).await
    }
}

#[async_trait]
impl Controller for StandardController {
    async fn create_ike_sa_iterator(&self) -> IkeSaLease {
        self.manager.acquire_iterator().await
    }

    async fn initiate(
        &self,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
        callback: Option<&mut dyn SignalCallback>,
    ) -> Status {
        self.run(Action::Initiate { peer, child }, callback).await
    }

    async fn terminate_ike(&self, id: IkeSaId, callback: Option<&mut dyn SignalCallback>) -> Status {
        self.run(Action::TerminateIke { id }, callback).await
    }

    async fn terminate_child(&self, reqid: ReqId, callback: Option<&mut dyn SignalCallback>) -> Status {
        self.run(Action::TerminateChild { reqid }, callback).await
    }

    async fn route(
        &self,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
        callback: Option<&mut dyn SignalCallback>,
    ) -> Status {
        self.run(Action::Route { peer, child }, callback).await
    }

    async fn unroute(&self, reqid: ReqId, callback: Option<&mut dyn SignalCallback>) -> Status {
        self.run(Action::Unroute { reqid }, callback).await
    }

    async fn destroy(self: Arc<Self>) {
        self.interfaces.stop_all().await;
        let drained = self.processor.shutdown().await;
        info!(
            drained,
            subscribers = self.bus.subscriber_count(),
            "Controller destroyed"
        );
    }
}
