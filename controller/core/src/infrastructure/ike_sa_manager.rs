// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! IKE_SA Manager
//!
//! Thread-safe table of live IKE_SAs, indexed by [`IkeSaId`] and by the
//! [`ReqId`] of every CHILD_SA they own.
//!
//! # Locking
//!
//! One `tokio::sync::Mutex` guards the whole table. Every method takes it for
//! the duration of the call only; lookups hand out owned snapshots so no lock
//! outlives a call. [`IkeSaManager::acquire_iterator`] is the exception: the
//! returned [`IkeSaLease`] owns the lock until it is dropped, and every other
//! call on the manager waits for it.
//!
//! Calling any manager method from the task that holds a lease deadlocks that
//! task. This is a programming error, not a runtime condition: release the
//! lease (drop it) before touching the manager again.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::ike_sa::{ChildSa, IkeSa, IkeSaId, ReqId};
use crate::domain::peer_config::PeerConfig;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("IKE_SA {0} not found")]
    IkeSaNotFound(IkeSaId),

    #[error("CHILD_SA with reqid {0} not found")]
    ChildSaNotFound(ReqId),

    #[error("IKE_SA {0} already exists")]
    DuplicateId(IkeSaId),

    #[error("reqid {0} is already in use")]
    DuplicateReqid(ReqId),

    #[error("No unused IKE_SA ids left")]
    IkeSaIdsExhausted,

    #[error("No unused reqids left")]
    ReqidsExhausted,
}

#[derive(Debug, Default)]
struct IkeSaTable {
    sas: BTreeMap<IkeSaId, IkeSa>,
    reqids: HashMap<ReqId, IkeSaId>,
}

impl IkeSaTable {
    fn parent_of(&self, reqid: ReqId) -> Result<IkeSaId, RepositoryError> {
        self.reqids
            .get(&reqid)
            .copied()
            .ok_or(RepositoryError::ChildSaNotFound(reqid))
    }
}

// Counters are wider than the ids they hand out so running past u32::MAX
// is detected instead of wrapping onto live ids
pub struct IkeSaManager {
    table: Arc<Mutex<IkeSaTable>>,
    next_id: AtomicU64,
    next_reqid: AtomicU64,
}

impl IkeSaManager {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(IkeSaTable::default())),
            next_id: AtomicU64::new(1),
            next_reqid: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh IKE_SA for `peer_config` and register it
    pub async fn create(&self, peer_config: Arc<PeerConfig>) -> Result<IkeSaId, RepositoryError> {
        let mut table = self.table.lock().await;
        let id = u32::try_from(self.next_id.fetch_add(1, Ordering::Relaxed))
            .map(IkeSaId)
            .map_err(|_| RepositoryError::IkeSaIdsExhausted)?;
        table.sas.insert(id, IkeSa::new(id, peer_config));
        debug!(ike_sa_id = %id, "IKE_SA created");
        Ok(id)
    }

    /// Hand out a reqid that has never been used by this manager
    pub fn allocate_reqid(&self) -> Result<ReqId, RepositoryError> {
        u32::try_from(self.next_reqid.fetch_add(1, Ordering::Relaxed))
            .map(ReqId)
            .map_err(|_| RepositoryError::ReqidsExhausted)
    }

    /// Register an externally built IKE_SA together with its children
    pub async fn insert(&self, ike_sa: IkeSa) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().await;
        if table.sas.contains_key(&ike_sa.id) {
            return Err(RepositoryError::DuplicateId(ike_sa.id));
        }
        let mut seen = HashSet::new();
        if let Some(reqid) = ike_sa
            .reqids()
            .find(|r| table.reqids.contains_key(r) || !seen.insert(*r))
        {
            return Err(RepositoryError::DuplicateReqid(reqid));
        }

        // Keep generated ids ahead of anything inserted from outside
        self.next_id.fetch_max(u64::from(ike_sa.id.0) + 1, Ordering::Relaxed);
        for reqid in ike_sa.reqids() {
            self.next_reqid.fetch_max(u64::from(reqid.0) + 1, Ordering::Relaxed);
        }

        for reqid in ike_sa.reqids() {
            table.reqids.insert(reqid, ike_sa.id);
        }
        debug!(ike_sa_id = %ike_sa.id, "IKE_SA inserted");
        table.sas.insert(ike_sa.id, ike_sa);
        Ok(())
    }

    /// Mutate an IKE_SA in place. Children can change state here but cannot
    /// be added or removed; use [`Self::add_child`] / [`Self::remove_child`].
    pub async fn update<R>(&self, id: IkeSaId, f: impl FnOnce(&mut IkeSa) -> R) -> Result<R, RepositoryError> {
        let mut table = self.table.lock().await;
        let ike_sa = table.sas.get_mut(&id).ok_or(RepositoryError::IkeSaNotFound(id))?;
        Ok(f(ike_sa))
    }

    /// Remove an IKE_SA and every child it owns
    pub async fn remove(&self, id: IkeSaId) -> Result<IkeSa, RepositoryError> {
        let mut table = self.table.lock().await;
        let ike_sa = table.sas.remove(&id).ok_or(RepositoryError::IkeSaNotFound(id))?;
        for reqid in ike_sa.reqids() {
            table.reqids.remove(&reqid);
        }
        debug!(ike_sa_id = %id, "IKE_SA removed");
        Ok(ike_sa)
    }

    pub async fn add_child(&self, id: IkeSaId, child: ChildSa) -> Result<(), RepositoryError> {
        let mut table = self.table.lock().await;
        let reqid = child.reqid();
        if table.reqids.contains_key(&reqid) {
            return Err(RepositoryError::DuplicateReqid(reqid));
        }
        let ike_sa = table.sas.get_mut(&id).ok_or(RepositoryError::IkeSaNotFound(id))?;
        ike_sa.push_child(child);
        table.reqids.insert(reqid, id);
        debug!(ike_sa_id = %id, reqid = %reqid, "CHILD_SA added");
        Ok(())
    }

    pub async fn remove_child(&self, reqid: ReqId) -> Result<ChildSa, RepositoryError> {
        let mut table = self.table.lock().await;
        let parent = table.parent_of(reqid)?;
        let child = table
            .sas
            .get_mut(&parent)
            .and_then(|sa| sa.remove_child(reqid))
            .ok_or(RepositoryError::ChildSaNotFound(reqid))?;
        table.reqids.remove(&reqid);
        debug!(ike_sa_id = %parent, reqid = %reqid, "CHILD_SA removed");
        Ok(child)
    }

    /// Move every child of `from` to `to` (rekeyed IKE_SA takeover). Children
    /// are moved, not copied: at no point does a reqid belong to both.
    pub async fn transfer_children(&self, from: IkeSaId, to: IkeSaId) -> Result<usize, RepositoryError> {
        let mut table = self.table.lock().await;
        if !table.sas.contains_key(&to) {
            return Err(RepositoryError::IkeSaNotFound(to));
        }
        let children = table
            .sas
            .get_mut(&from)
            .ok_or(RepositoryError::IkeSaNotFound(from))?
            .take_children();

        let count = children.len();
        for child in &children {
            table.reqids.insert(child.reqid(), to);
        }
        if let Some(target) = table.sas.get_mut(&to) {
            for child in children {
                target.push_child(child);
            }
        }
        debug!(from = %from, to = %to, count, "CHILD_SAs transferred");
        Ok(count)
    }

    pub async fn find_by_id(&self, id: IkeSaId) -> Option<IkeSa> {
        self.table.lock().await.sas.get(&id).cloned()
    }

    /// IKE_SA owning the CHILD_SA with `reqid`
    pub async fn find_by_reqid(&self, reqid: ReqId) -> Option<IkeSa> {
        let table = self.table.lock().await;
        let parent = table.reqids.get(&reqid)?;
        table.sas.get(parent).cloned()
    }

    /// First IKE_SA created from the peer configuration called `name`
    pub async fn find_by_name(&self, name: &str) -> Option<IkeSa> {
        let table = self.table.lock().await;
        table.sas.values().find(|sa| sa.name() == name).cloned()
    }

    pub async fn len(&self) -> usize {
        self.table.lock().await.sas.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Exclusive traversal of the table. Every other call on this manager
    /// waits until the returned lease is dropped.
    pub async fn acquire_iterator(&self) -> IkeSaLease {
        IkeSaLease {
            guard: self.table.clone().lock_owned().await,
        }
    }
}

impl Default for IkeSaManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive, scoped access to every IKE_SA. Released on drop.
pub struct IkeSaLease {
    guard: OwnedMutexGuard<IkeSaTable>,
}

impl IkeSaLease {
    /// IKE_SAs in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &IkeSa> + '_ {
        self.guard.sas.values()
    }

    pub fn len(&self) -> usize {
        self.guard.sas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.sas.is_empty()
    }

    /// Release the lease explicitly. Equivalent to dropping it.
    pub fn release(self) {}
}

impl<'a> IntoIterator for &'a IkeSaLease {
    type Item = &'a IkeSa;
    type IntoIter = std::collections::btree_map::Values<'a, IkeSaId, IkeSa>;

    fn into_iter(self) -> Self::IntoIter {
        self.guard.sas.values()
    }
}
