// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Peer and child configuration references.
//
// These are read-only views handed in by control front-ends (or resolved from
// a backend repository upstream of this crate). They are shared via `Arc` and
// never mutated once an action has been requested against them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IkeVersion {
    V1,
    #[default]
    V2,
}

/// Peer (IKE_SA level) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Connection name, unique per configuration backend
    pub name: String,

    pub local_host: String,

    pub remote_host: String,

    /// Local identity (defaults to the local host address)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,

    /// Remote identity (defaults to the remote host address)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    #[serde(default)]
    pub ike_version: IkeVersion,
}

impl PeerConfig {
    pub fn new(name: impl Into<String>, local_host: impl Into<String>, remote_host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_host: local_host.into(),
            remote_host: remote_host.into(),
            local_id: None,
            remote_id: None,
            ike_version: IkeVersion::default(),
        }
    }

    pub fn local_identity(&self) -> &str {
        self.local_id.as_deref().unwrap_or(&self.local_host)
    }

    pub fn remote_identity(&self) -> &str {
        self.remote_id.as_deref().unwrap_or(&self.remote_host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpsecMode {
    #[default]
    Tunnel,
    Transport,
}

/// Child (traffic protection policy) configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildConfig {
    pub name: String,

    /// Local traffic selector, e.g. "10.1.0.0/16"
    pub local_ts: String,

    /// Remote traffic selector
    pub remote_ts: String,

    #[serde(default)]
    pub mode: IpsecMode,
}

impl ChildConfig {
    pub fn new(name: impl Into<String>, local_ts: impl Into<String>, remote_ts: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            local_ts: local_ts.into(),
            remote_ts: remote_ts.into(),
            mode: IpsecMode::default(),
        }
    }
}
