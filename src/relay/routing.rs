//! Shared map from authorities to live hop connections.
//!
//! `RoutingTable` stores non-owning weak references to hop links, so a hop
//! that closes disappears from the table without coordination. Dead entries
//! are pruned lazily at lookup time or in bulk with [`RoutingTable::prune`].

use std::{
    fmt,
    sync::{Arc, Weak},
};

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::hop::HopCommand;
use crate::{connection::Outbound, push::PushHandle, uri::Authority};

/// Identifier assigned to a hop connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HopId(u64);

impl From<u64> for HopId {
    fn from(value: u64) -> Self { Self(value) }
}

impl HopId {
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for HopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "hop-{}", self.0) }
}

/// Ways into a hop worker, owned by the worker itself.
#[derive(Debug)]
pub(crate) struct HopLink {
    pub id: HopId,
    pub commands: mpsc::UnboundedSender<HopCommand>,
    pub writer: PushHandle<Outbound>,
}

/// Concurrent routing table keyed by [`Authority`].
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: DashMap<Authority, Weak<HopLink>>,
    hops: DashMap<HopId, Weak<HopLink>>,
}

impl RoutingTable {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    pub(crate) fn register_hop(&self, link: &Arc<HopLink>) {
        self.hops.insert(link.id, Arc::downgrade(link));
    }

    /// Route `authority` through `link`, replacing any previous route.
    pub(crate) fn insert(&self, authority: Authority, link: &Arc<HopLink>) {
        self.routes.insert(authority, Arc::downgrade(link));
    }

    /// Route `authority` through `link` unless a live route exists.
    ///
    /// Returns `true` when the route was added.
    pub(crate) fn learn(&self, authority: &Authority, link: &Arc<HopLink>) -> bool {
        if self.get(authority).is_some() {
            return false;
        }
        self.insert(authority.clone(), link);
        true
    }

    /// Live link for `authority`.
    pub(crate) fn get(&self, authority: &Authority) -> Option<Arc<HopLink>> {
        let guard = self.routes.get(authority);
        let link = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if link.is_none() {
            self.routes
                .remove_if(authority, |_, weak| weak.strong_count() == 0);
        }
        link
    }

    /// Live links of every hop.
    pub(crate) fn links(&self) -> Vec<Arc<HopLink>> {
        let mut links = Vec::with_capacity(self.hops.len());
        self.hops.retain(|_, weak| {
            if let Some(link) = weak.upgrade() {
                links.push(link);
                true
            } else {
                false
            }
        });
        links
    }

    /// Forget `id` and every route through it.
    pub(crate) fn remove_hop(&self, id: HopId) {
        self.hops.remove(&id);
        self.routes
            .retain(|_, weak| weak.upgrade().is_some_and(|link| link.id != id));
    }

    /// Hop currently serving `authority`.
    #[must_use]
    pub fn hop_for(&self, authority: &Authority) -> Option<HopId> {
        self.get(authority).map(|link| link.id)
    }

    /// Remove a route, typically when the peer is known to have moved.
    pub fn remove_route(&self, authority: &Authority) { self.routes.remove(authority); }

    /// Prune stale entries, then return the live hop ids in ascending order.
    #[must_use]
    pub fn active_hops(&self) -> Vec<HopId> {
        let mut ids: Vec<HopId> = self.links().iter().map(|link| link.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of live routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.prune();
        self.routes.len()
    }

    /// Remove all stale weak references.
    ///
    /// `DashMap::retain` acquires per-bucket write locks, so other operations
    /// may contend briefly while the table is pruned.
    pub fn prune(&self) {
        self.routes.retain(|_, weak| weak.strong_count() > 0);
        self.hops.retain(|_, weak| weak.strong_count() > 0);
    }
}
