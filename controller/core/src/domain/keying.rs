// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Keying engine contract.
//
// The protocol state machine that actually negotiates, rekeys and tears down
// SAs lives outside this crate. Jobs built by the action dispatcher call into
// it through this trait. Implementations publish progress through the given
// JobContext and mutate the IkeSaManager as SAs come and go.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::ike_sa::{IkeSaId, ReqId};
use crate::domain::job::JobContext;
use crate::domain::peer_config::{ChildConfig, PeerConfig};

#[async_trait]
pub trait KeyingEngine: Send + Sync {
    /// Establish a CHILD_SA, creating or reusing an IKE_SA for `peer`
    async fn initiate(
        &self,
        ctx: &JobContext,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
    ) -> Result<(), KeyingError>;

    /// Delete an IKE_SA and all of its children
    async fn terminate_ike(&self, ctx: &JobContext, id: IkeSaId) -> Result<(), KeyingError>;

    async fn terminate_child(&self, ctx: &JobContext, reqid: ReqId) -> Result<(), KeyingError>;

    /// Install a trap policy for `child` without negotiating it
    async fn route(
        &self,
        ctx: &JobContext,
        peer: Arc<PeerConfig>,
        child: Arc<ChildConfig>,
    ) -> Result<(), KeyingError>;

    async fn unroute(&self, ctx: &JobContext, reqid: ReqId) -> Result<(), KeyingError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum KeyingError {
    #[error("IKE_SA {0} not found")]
    IkeSaNotFound(IkeSaId),

    #[error("CHILD_SA with reqid {0} not found")]
    ChildSaNotFound(ReqId),

    #[error("Kernel interface error: {0}")]
    Kernel(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Keying engine error: {0}")]
    Other(String),
}
