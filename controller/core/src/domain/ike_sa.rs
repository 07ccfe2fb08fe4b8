// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # IKE_SA and CHILD_SA Aggregates
//!
//! An [`IkeSa`] is the top-level security relationship negotiated between two
//! peers. It owns zero or more [`ChildSa`]s, each identified by a [`ReqId`]
//! that is unique across the whole association table at any instant.
//!
//! Both aggregates are owned exclusively by
//! [`IkeSaManager`](crate::infrastructure::ike_sa_manager::IkeSaManager).
//! Everything outside the manager works with identifiers or with
//! [`IkeSaRef`] snapshots.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::peer_config::{ChildConfig, PeerConfig};

/// Unique IKE_SA identifier, assigned at creation and stable for the SA's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IkeSaId(pub u32);

impl fmt::Display for IkeSaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CHILD_SA request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReqId(pub u32);

impl fmt::Display for ReqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IkeSaState {
    Created,
    Connecting,
    Established,
    Rekeying,
    Deleting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildSaState {
    Created,
    /// Policy installed, SA not yet negotiated (trap)
    Routed,
    Installing,
    Installed,
    Rekeying,
    Deleting,
}

#[derive(Debug, Clone)]
pub struct ChildSa {
    reqid: ReqId,
    pub config: Arc<ChildConfig>,
    pub state: ChildSaState,
}

impl ChildSa {
    pub fn new(reqid: ReqId, config: Arc<ChildConfig>) -> Self {
        Self {
            reqid,
            config,
            state: ChildSaState::Created,
        }
    }

    pub fn reqid(&self) -> ReqId {
        self.reqid
    }

    pub fn is_routed(&self) -> bool {
        self.state == ChildSaState::Routed
    }
}

#[derive(Debug, Clone)]
pub struct IkeSa {
    pub id: IkeSaId,
    pub peer_config: Arc<PeerConfig>,
    pub state: IkeSaState,
    children: Vec<ChildSa>,
    pub created_at: DateTime<Utc>,
}

impl IkeSa {
    pub fn new(id: IkeSaId, peer_config: Arc<PeerConfig>) -> Self {
        Self {
            id,
            peer_config,
            state: IkeSaState::Created,
            children: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.peer_config.name
    }

    pub fn children(&self) -> &[ChildSa] {
        &self.children
    }

    pub fn child(&self, reqid: ReqId) -> Option<&ChildSa> {
        self.children.iter().find(|c| c.reqid == reqid)
    }

    pub fn child_mut(&mut self, reqid: ReqId) -> Option<&mut ChildSa> {
        self.children.iter_mut().find(|c| c.reqid == reqid)
    }

    /// Attach a child. Uniqueness of the reqid across the table is enforced by
    /// the manager, not here.
    pub(crate) fn push_child(&mut self, child: ChildSa) {
        self.children.push(child);
    }

    pub(crate) fn remove_child(&mut self, reqid: ReqId) -> Option<ChildSa> {
        let index = self.children.iter().position(|c| c.reqid == reqid)?;
        Some(self.children.remove(index))
    }

    pub(crate) fn take_children(&mut self) -> Vec<ChildSa> {
        std::mem::take(&mut self.children)
    }

    pub fn reqids(&self) -> impl Iterator<Item = ReqId> + '_ {
        self.children.iter().map(|c| c.reqid)
    }

    pub fn snapshot(&self) -> IkeSaRef {
        IkeSaRef {
            id: self.id,
            name: self.peer_config.name.clone(),
            state: self.state,
        }
    }
}

/// Snapshot of an IKE_SA handed to signal consumers. Never grants access to
/// the live aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IkeSaRef {
    pub id: IkeSaId,
    pub name: String,
    pub state: IkeSaState,
}

impl fmt::Display for IkeSaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.id)
    }
}
