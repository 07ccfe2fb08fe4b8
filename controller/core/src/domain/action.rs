// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Action Requests and Outcomes
//!
//! An [`ActionRequest`] is the ephemeral description of one lifecycle request
//! coming from a control front-end. It lives for the duration of a single
//! controller call and is never persisted.
//!
//! ## Terminal Signal Table
//! | Action | Success | Failure | Not found (checked before dispatch) |
//! |--------|---------|---------|-------------------------------------|
//! | `Initiate` | `ChildUpSuccess` | `IkeUpFailed`, `ChildUpFailed` | n/a |
//! | `TerminateIke` | `IkeDownSuccess` | `IkeDownFailed` | unknown IKE_SA id |
//! | `TerminateChild` | `ChildDownSuccess` | `ChildDownFailed` | unknown reqid |
//! | `Route` | `ChildRouteSuccess` | `ChildRouteFailed` | n/a |
//! | `Unroute` | `ChildUnrouteSuccess` | `ChildUnrouteFailed` | reqid not routed |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::ike_sa::{IkeSaId, ReqId};
use crate::domain::peer_config::{ChildConfig, PeerConfig};
use crate::domain::signal::{CorrelationId, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Initiate,
    TerminateIke,
    TerminateChild,
    Route,
    Unroute,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Initiate => "initiate",
            ActionKind::TerminateIke => "terminate_ike",
            ActionKind::TerminateChild => "terminate_child",
            ActionKind::Route => "route",
            ActionKind::Unroute => "unroute",
        }
    }

    /// Map an observed signal kind to its meaning for this action.
    pub fn classify(&self, kind: SignalKind) -> Verdict {
        use SignalKind::*;
        match (self, kind) {
            (ActionKind::Initiate, ChildUpSuccess) => Verdict::Succeeded,
            (ActionKind::Initiate, IkeUpFailed | ChildUpFailed) => Verdict::Failed,
            (ActionKind::TerminateIke, IkeDownSuccess) => Verdict::Succeeded,
            (ActionKind::TerminateIke, IkeDownFailed) => Verdict::Failed,
            (ActionKind::TerminateChild, ChildDownSuccess) => Verdict::Succeeded,
            (ActionKind::TerminateChild, ChildDownFailed) => Verdict::Failed,
            (ActionKind::Route, ChildRouteSuccess) => Verdict::Succeeded,
            (ActionKind::Route, ChildRouteFailed) => Verdict::Failed,
            (ActionKind::Unroute, ChildUnrouteSuccess) => Verdict::Succeeded,
            (ActionKind::Unroute, ChildUnrouteFailed) => Verdict::Failed,
            _ => Verdict::Progress,
        }
    }

    /// Signal a job publishes when the keying engine rejects the action outright.
    pub fn failure_signal(&self) -> SignalKind {
        match self {
            ActionKind::Initiate => SignalKind::ChildUpFailed,
            ActionKind::TerminateIke => SignalKind::IkeDownFailed,
            ActionKind::TerminateChild => SignalKind::ChildDownFailed,
            ActionKind::Route => SignalKind::ChildRouteFailed,
            ActionKind::Unroute => SignalKind::ChildUnrouteFailed,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Progress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Action {
    Initiate {
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
    },
    TerminateIke {
        id: IkeSaId,
    },
    TerminateChild {
        reqid: ReqId,
    },
    Route {
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
    },
    Unroute {
        reqid: ReqId,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Initiate { .. } => ActionKind::Initiate,
            Action::TerminateIke { .. } => ActionKind::TerminateIke,
            Action::TerminateChild { .. } => ActionKind::TerminateChild,
            Action::Route { .. } => ActionKind::Route,
            Action::Unroute { .. } => ActionKind::Unroute,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Initiate { peer, child } => write!(f, "initiate {}/{}", peer.name, child.name),
            Action::TerminateIke { id } => write!(f, "terminate IKE_SA {}", id),
            Action::TerminateChild { reqid } => write!(f, "terminate CHILD_SA reqid {}", reqid),
            Action::Route { peer, child } => write!(f, "route {}/{}", peer.name, child.name),
            Action::Unroute { reqid } => write!(f, "unroute reqid {}", reqid),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: Action,
    pub correlation: CorrelationId,
}

impl ActionRequest {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            correlation: CorrelationId::new(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }
}

/// Terminal status of a controller call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failed,
    NotFound,
    /// The callback asked to stop waiting; the action may still complete in
    /// the background.
    NeedMore,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failed => "failed",
            Status::NotFound => "not_found",
            Status::NeedMore => "need_more",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
