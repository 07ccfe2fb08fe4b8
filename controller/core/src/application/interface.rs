// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Control Interfaces
//!
//! Front-ends (a CLI socket, a management API, ...) plug into the daemon as
//! [`ControlInterface`]s. The controller never calls into an interface to do
//! work; each interface receives a controller handle when started and drives
//! lifecycle requests through it until stopped.
//!
//! Interfaces start in registration order and stop in reverse order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::application::controller::Controller;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InterfaceError {
    #[error("Control interface '{0}' is already registered")]
    DuplicateName(String),

    #[error("Control interface failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait ControlInterface: Send + Sync {
    /// Unique name within one controller
    fn name(&self) -> &str;

    /// Begin serving requests. The interface may hold on to `controller`
    /// until [`stop`](ControlInterface::stop) returns.
    async fn start(&self, controller: Arc<dyn Controller>) -> Result<(), InterfaceError>;

    /// Stop serving and drop the controller handle
    async fn stop(&self);
}

struct Registered {
    interface: Arc<dyn ControlInterface>,
    running: AtomicBool,
}

/// Registry of the control interfaces attached to one controller
#[derive(Default)]
pub struct InterfaceManager {
    interfaces: RwLock<Vec<Arc<Registered>>>,
}

impl InterfaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, interface: Arc<dyn ControlInterface>) -> Result<(), InterfaceError> {
        let mut interfaces = self.interfaces.write();
        if interfaces.iter().any(|r| r.interface.name() == interface.name()) {
            return Err(InterfaceError::DuplicateName(interface.name().to_string()));
        }

        debug!(interface = interface.name(), "Control interface registered");
        interfaces.push(Arc::new(Registered {
            interface,
            running: AtomicBool::new(false),
        }));
        Ok(())
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<String> {
        self.interfaces
            .read()
            .iter()
            .map(|r| r.interface.name().to_string())
            .collect()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.interfaces
            .read()
            .iter()
            .any(|r| r.interface.name() == name && r.running.load(Ordering::Acquire))
    }

    /// Start every registered interface that is not running yet. An
    /// interface that fails to start is logged and skipped. Returns how many
    /// were started by this call.
    pub async fn start_all(&self, controller: Arc<dyn Controller>) -> usize {
        let snapshot = self.interfaces.read().clone();
        let mut started = 0;

        for entry in snapshot {
            if entry.running.swap(true, Ordering::AcqRel) {
                continue;
            }
            let name = entry.interface.name();
            match entry.interface.start(controller.clone()).await {
                Ok(()) => {
                    info!(interface = name, "Control interface started");
                    started += 1;
                }
                Err(e) => {
                    entry.running.store(false, Ordering::Release);
                    warn!(interface = name, error = %e, "Control interface failed to start");
                }
            }
        }

        started
    }

    /// Stop running interfaces, last registered first
    pub async fn stop_all(&self) {
        let snapshot = self.interfaces.read().clone();

        for entry in snapshot.iter().rev() {
            if entry.running.swap(false, Ordering::AcqRel) {
                entry.interface.stop().await;
                info!(interface = entry.interface.name(), "Control interface stopped");
            }
        }
    }
}
