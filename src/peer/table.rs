use crate::peer::state::PeerSession;
use crate::peer::types::PeerId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent `peer_id → PeerSession` map owned by the host role
///
/// Lookups hand out `Arc` clones so no shard guard is ever held across an
/// `await`. Iteration works on snapshots, which keeps removal safe while a
/// broadcast is in flight.
#[derive(Default)]
pub struct PeerTable {
    peers: DashMap<PeerId, Arc<PeerSession>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the id is taken; returns `false` on a duplicate
    pub fn insert(&self, session: Arc<PeerSession>) -> bool {
        match self.peers.entry(session.peer_id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(v) => {
                v.insert(session);
                true
            }
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<Arc<PeerSession>> {
        self.peers.get(peer_id).map(|e| e.value().clone())
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn remove(&self, peer_id: &PeerId) -> Option<Arc<PeerSession>> {
        self.peers.remove(peer_id).map(|(_, s)| s)
    }

    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn sessions(&self) -> Vec<Arc<PeerSession>> {
        self.peers.iter().map(|e| e.value().clone()).collect()
    }

    pub fn drain(&self) -> Vec<Arc<PeerSession>> {
        let ids: Vec<PeerId> = self.peers.iter().map(|e| e.key().clone()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
