//! Reputation scoring and peer isolation.
//!
//! Every observed peer carries an integer rating. Confirmed forwarding
//! raises it, misbehavior lowers it; at the isolation threshold the peer
//! is quarantined and its traffic dropped. Pending-forward entries track
//! messages we originated whose relay we expect to overhear, aged in
//! logical ticks so the bookkeeping survives scheduler drift.

use crate::net::message::CustomKey;
use crate::types::{MAX_RATING, PENDING_EXPIRE_PENALTY, PENDING_EXPIRE_TICKS, RATING_TO_ISOLATE};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone)]
struct PendingForward {
    key: CustomKey,
    expected_next_hop: String,
    age: u32,
}

#[derive(Debug, Default)]
pub struct Ips {
    ratings: HashMap<String, i32>,
    isolated: HashSet<String>,
    pending: Vec<PendingForward>,
}

impl Ips {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current rating; unknown peers start at zero.
    pub fn rating(&self, name: &str) -> i32 {
        self.ratings.get(name).copied().unwrap_or(0)
    }

    pub fn is_isolated(&self, name: &str) -> bool {
        self.isolated.contains(name)
    }

    /// Names currently isolated, sorted.
    pub fn isolated_names(&self) -> Vec<String> {
        let mut out: Vec<String> = self.isolated.iter().cloned().collect();
        out.sort();
        out
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Apply a rating delta. Isolated peers are left untouched; they
    /// cannot be rehabilitated implicitly. The update only applies while
    /// the rating sits at or below [`MAX_RATING`].
    pub fn change_rating(&mut self, name: &str, delta: i32) {
        if self.isolated.contains(name) {
            return;
        }
        let entry = self.ratings.entry(name.to_string()).or_insert(0);
        if *entry <= MAX_RATING {
            *entry += delta;
        }
        let rating = *entry;
        if rating <= RATING_TO_ISOLATE && self.isolated.insert(name.to_string()) {
            warn!(peer = name, rating, "isolating misbehaving peer");
        }
        if rating > 0 && self.isolated.remove(name) {
            info!(peer = name, rating, "reintegrating peer");
        }
    }

    /// Track a message we originated whose first relay hop we expect to
    /// overhear on the broadcast medium.
    pub fn register_pending(&mut self, key: CustomKey, expected_next_hop: String) {
        self.pending.push(PendingForward {
            key,
            expected_next_hop,
            age: 0,
        });
    }

    /// Proof of forwarding: drop every pending entry matching the key.
    pub fn confirm_forward(&mut self, key: &CustomKey) {
        self.pending.retain(|p| &p.key != key);
    }

    /// Age pending entries one tick. Entries that stay unconfirmed past
    /// the deadline penalize their expected next hop and are dropped.
    pub fn tick_pending(&mut self) {
        for entry in &mut self.pending {
            entry.age += 1;
        }
        let (expired, live): (Vec<PendingForward>, Vec<PendingForward>) = self
            .pending
            .drain(..)
            .partition(|p| p.age >= PENDING_EXPIRE_TICKS);
        self.pending = live;
        for entry in expired {
            warn!(
                peer = %entry.expected_next_hop,
                dest = %entry.key.dest,
                "expected relay never forwarded our message"
            );
            self.change_rating(&entry.expected_next_hop, PENDING_EXPIRE_PENALTY);
        }
    }
}
