// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle Signals
//!
//! A [`Signal`] is what the keying engine publishes on the
//! [`EventBus`](crate::infrastructure::event_bus::EventBus) while it works:
//! lifecycle transitions (`IkeUpSuccess`, `ChildDownFailed`, ...) and
//! diagnostic log lines tagged with a [`DebugGroup`].
//!
//! Signals are broadcast: every subscriber sees every signal and nobody
//! consumes them. Messages are rendered before publication, so consumers never
//! deal with format strings.
//!
//! ## Correlation
//!
//! Signals emitted from inside a job carry the job's [`CorrelationId`]
//! (stamped by [`JobContext`](crate::domain::job::JobContext)). Signals
//! emitted elsewhere, e.g. while processing an inbound message for an
//! existing IKE_SA, carry only the IKE_SA and reqid they concern.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ike_sa::{IkeSaId, IkeSaRef, ReqId};

/// Token generated per action and stamped on every signal its job emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subsystem a diagnostic message originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugGroup {
    Daemon,
    Manager,
    Ike,
    Child,
    Job,
    Config,
    Kernel,
    Net,
    Encoding,
    Library,
}

impl DebugGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebugGroup::Daemon => "dmn",
            DebugGroup::Manager => "mgr",
            DebugGroup::Ike => "ike",
            DebugGroup::Child => "chd",
            DebugGroup::Job => "job",
            DebugGroup::Config => "cfg",
            DebugGroup::Kernel => "knl",
            DebugGroup::Net => "net",
            DebugGroup::Encoding => "enc",
            DebugGroup::Library => "lib",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "group", rename_all = "snake_case")]
pub enum SignalKind {
    /// Diagnostic message
    Log(DebugGroup),

    IkeUpStart,
    IkeUpSuccess,
    IkeUpFailed,

    IkeDownStart,
    IkeDownSuccess,
    IkeDownFailed,

    IkeRekeyStart,
    IkeRekeySuccess,
    IkeRekeyFailed,

    ChildUpStart,
    ChildUpSuccess,
    ChildUpFailed,

    ChildDownStart,
    ChildDownSuccess,
    ChildDownFailed,

    ChildRekeyStart,
    ChildRekeySuccess,
    ChildRekeyFailed,

    ChildRouteStart,
    ChildRouteSuccess,
    ChildRouteFailed,

    ChildUnrouteStart,
    ChildUnrouteSuccess,
    ChildUnrouteFailed,
}

impl SignalKind {
    pub fn is_log(&self) -> bool {
        matches!(self, SignalKind::Log(_))
    }

    /// Stable snake_case name, without the debug group for log signals
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Log(_) => "log",
            SignalKind::IkeUpStart => "ike_up_start",
            SignalKind::IkeUpSuccess => "ike_up_success",
            SignalKind::IkeUpFailed => "ike_up_failed",
            SignalKind::IkeDownStart => "ike_down_start",
            SignalKind::IkeDownSuccess => "ike_down_success",
            SignalKind::IkeDownFailed => "ike_down_failed",
            SignalKind::IkeRekeyStart => "ike_rekey_start",
            SignalKind::IkeRekeySuccess => "ike_rekey_success",
            SignalKind::IkeRekeyFailed => "ike_rekey_failed",
            SignalKind::ChildUpStart => "child_up_start",
            SignalKind::ChildUpSuccess => "child_up_success",
            SignalKind::ChildUpFailed => "child_up_failed",
            SignalKind::ChildDownStart => "child_down_start",
            SignalKind::ChildDownSuccess => "child_down_success",
            SignalKind::ChildDownFailed => "child_down_failed",
            SignalKind::ChildRekeyStart => "child_rekey_start",
            SignalKind::ChildRekeySuccess => "child_rekey_success",
            SignalKind::ChildRekeyFailed => "child_rekey_failed",
            SignalKind::ChildRouteStart => "child_route_start",
            SignalKind::ChildRouteSuccess => "child_route_success",
            SignalKind::ChildRouteFailed => "child_route_failed",
            SignalKind::ChildUnrouteStart => "child_unroute_start",
            SignalKind::ChildUnrouteSuccess => "child_unroute_success",
            SignalKind::ChildUnrouteFailed => "child_unroute_failed",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Log(group) => write!(f, "log({})", group.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Signal severity/verbosity. Lower is more important.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Always relevant, suitable for audit trails
    Audit = 0,
    /// Control flow of an operation
    Control = 1,
    /// Detailed control flow
    ControlMore = 2,
    /// Raw protocol data
    Raw = 3,
    /// May contain sensitive material
    Private = 4,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    pub level: Level,
    /// IKE_SA the signal concerns, if any
    pub ike_sa: Option<IkeSaRef>,
    /// CHILD_SA the signal concerns, if any
    pub reqid: Option<ReqId>,
    pub correlation: Option<CorrelationId>,
    pub message: String,
    pub emitted_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(kind: SignalKind, level: Level, message: impl Into<String>) -> Self {
        Self {
            kind,
            level,
            ike_sa: None,
            reqid: None,
            correlation: None,
            message: message.into(),
            emitted_at: Utc::now(),
        }
    }

    pub fn log(group: DebugGroup, level: Level, message: impl Into<String>) -> Self {
        Self::new(SignalKind::Log(group), level, message)
    }

    pub fn with_ike_sa(mut self, ike_sa: IkeSaRef) -> Self {
        self.ike_sa = Some(ike_sa);
        self
    }

    pub fn with_reqid(mut self, reqid: ReqId) -> Self {
        self.reqid = Some(reqid);
        self
    }

    pub fn with_correlation(mut self, correlation: CorrelationId) -> Self {
        self.correlation = Some(correlation);
        self
    }

    pub fn ike_sa_id(&self) -> Option<IkeSaId> {
        self.ike_sa.as_ref().map(|sa| sa.id)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ike_sa {
            Some(sa) => write!(f, "[{}] {} {}", self.kind, sa, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}
