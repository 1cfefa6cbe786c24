//! Duplicate suppression for data packets.
//!
//! Every copy of a data unit carries the same `(src_id, seq_no)`. Recording
//! it on first contact and dropping later copies is what keeps floods and
//! gateway relays from looping.

use clustermesh_core::Timestamp;
use std::collections::HashMap;
use std::time::Duration;

use crate::message::PacketId;

#[derive(Debug, Default, Clone)]
pub struct SeenPacketCache {
    seen: HashMap<PacketId, Timestamp>,
}

impl SeenPacketCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`. Returns false if it was already present.
    pub fn insert(&mut self, id: PacketId, now: Timestamp) -> bool {
        if self.seen.contains_key(&id) {
            return false;
        }
        self.seen.insert(id, now);
        true
    }

    pub fn contains(&self, id: &PacketId) -> bool {
        self.seen.contains_key(id)
    }

    /// Forget entries first seen longer than `ttl` ago.
    pub fn prune(&mut self, now: Timestamp, ttl: Duration) -> usize {
        let before = self.seen.len();
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) <= ttl);
        before - self.seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
