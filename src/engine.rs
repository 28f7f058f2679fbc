//! Protocol engine: ingress dispatch and topology maintenance.
//!
//! The engine owns the topology database and the IPS and is driven from
//! outside: the daemon feeds it datagrams and periodic beats under one
//! coarse lock. Handlers never touch the network themselves: they return
//! the actions to perform so the caller can broadcast after unlocking.

use crate::config::Side;
use crate::ips::Ips;
use crate::mpr;
use crate::net::message::{Message, NeighborEntry};
use crate::topology::{TopologyDb, TopologySnapshot};
use crate::types::RATING_TO_ISOLATE;
use std::collections::HashSet;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// Work a handler wants done once the protocol lock is released.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Emit this message on every local interface.
    Broadcast(Message),
    /// A CUSTOM message addressed to us arrived; `path` is the realized
    /// route including ourselves.
    Deliver {
        from: String,
        payload: Vec<u8>,
        path: Vec<String>,
    },
}

pub struct Engine {
    pub(crate) name: String,
    pub(crate) side: Side,
    pub(crate) local_addrs: HashSet<IpAddr>,
    pub(crate) topo: TopologyDb,
    pub(crate) ips: Ips,
    pub(crate) decode_errors: u64,
}

impl Engine {
    pub fn new(name: impl Into<String>, side: Side, local_addrs: HashSet<IpAddr>) -> Self {
        let name = name.into();
        let mut topo = TopologyDb::new();
        topo.upsert(&name);
        for addr in &local_addrs {
            topo.add_addr(&name, *addr);
        }
        Self {
            name,
            side,
            local_addrs,
            topo,
            ips: Ips::new(),
            decode_errors: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn topology(&self) -> &TopologyDb {
        &self.topo
    }

    pub fn ips(&self) -> &Ips {
        &self.ips
    }

    /// Malformed datagrams seen so far.
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    /// Whether anyone has chosen us as their MPR; only relays re-emit TC
    /// bulletins and forward CUSTOM traffic.
    pub fn is_relay(&self) -> bool {
        !self.topo.names_with(|i| i.mprss).is_empty()
    }

    /// Our current MPR selector set, sorted.
    pub fn selector_set(&self) -> Vec<String> {
        self.topo.names_with(|i| i.mprss)
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        self.topo.snapshot()
    }

    /// Entry point for every received datagram.
    pub fn handle_datagram(&mut self, data: &[u8], src: IpAddr) -> Vec<Action> {
        if self.local_addrs.contains(&src) {
            return Vec::new();
        }
        let msg = match Message::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                self.decode_errors += 1;
                debug!(src = %src, error = %e, "dropping malformed datagram");
                return Vec::new();
            }
        };
        if self.ips.is_isolated(msg.sender()) {
            info!(sender = msg.sender(), kind = msg.kind(), "dropping message from isolated peer");
            return Vec::new();
        }
        match msg {
            Message::Hello { sender, neighbors } => self.handle_hello(sender, neighbors, src),
            Message::Tc {
                sender,
                mpr_set,
                route,
            } => self.handle_tc(sender, mpr_set, route),
            Message::Custom {
                sender,
                dest,
                payload,
                forwarders,
            } => self.handle_custom(sender, dest, payload, forwarders),
            Message::Alert { sender, .. } => {
                debug!(sender = %sender, "ignoring alert");
                Vec::new()
            }
        }
    }

    fn handle_hello(
        &mut self,
        sender: String,
        neighbors: Vec<NeighborEntry>,
        src: IpAddr,
    ) -> Vec<Action> {
        if sender == self.name {
            warn!(src = %src, "foreign hello claims our name, ignoring");
            return Vec::new();
        }
        self.topo.add_addr(&sender, src);
        let me = self.name.clone();
        self.topo.add_edge(&me, &sender);
        for nbr in neighbors {
            if nbr.isolated {
                if nbr.name == self.name && self.side == Side::Good {
                    // A peer is framing us: penalize the claimant, never
                    // ourselves.
                    warn!(claimant = %sender, "peer claims we are isolated, penalizing claimant");
                    self.ips.change_rating(&sender, RATING_TO_ISOLATE);
                } else {
                    info!(peer = %nbr.name, via = %sender, "adopting isolation advisory");
                    self.ips.change_rating(&nbr.name, RATING_TO_ISOLATE);
                    self.topo.remove_node(&nbr.name);
                }
                continue;
            }
            self.topo.upsert(&nbr.name);
            for addr in &nbr.addrs {
                self.topo.add_addr(&nbr.name, *addr);
            }
            if nbr.name == self.name && nbr.local_mpr {
                // The sender chose us as its MPR; we forward on its behalf.
                self.topo.update(&sender, |info| info.mprss = true);
            }
            self.topo.add_edge(&sender, &nbr.name);
        }
        self.refresh_local_state();
        Vec::new()
    }

    fn handle_tc(
        &mut self,
        sender: String,
        mpr_set: Vec<String>,
        mut route: Vec<String>,
    ) -> Vec<Action> {
        if sender == self.name {
            return Vec::new();
        }
        if self.topo.is_reachable(&self.name, &sender) {
            for selector in &mpr_set {
                self.topo.add_edge(&sender, selector);
                self.topo.record_mpr_choice(selector, &sender);
            }
        }
        let mut actions = Vec::new();
        if self.is_relay() && !route.iter().any(|hop| hop == &self.name) {
            route.push(self.name.clone());
            actions.push(Action::Broadcast(Message::Tc {
                sender,
                mpr_set,
                route,
            }));
        }
        self.refresh_local_state();
        actions
    }

    /// Build the periodic HELLO from the current neighbor table, with
    /// isolation flags reflecting both graph state and the IPS.
    pub fn build_hello(&self) -> Message {
        let mut neighbors = self.topo.neighbor_table(&self.name);
        for row in &mut neighbors {
            if self.ips.is_isolated(&row.name) {
                row.isolated = true;
            }
        }
        Message::Hello {
            sender: self.name.clone(),
            neighbors,
        }
    }

    /// Build the periodic TC; `None` unless somebody selected us.
    pub fn build_tc(&self) -> Option<Message> {
        let mpr_set = self.selector_set();
        if mpr_set.is_empty() {
            return None;
        }
        Some(Message::Tc {
            sender: self.name.clone(),
            mpr_set,
            route: vec![self.name.clone()],
        })
    }

    /// One IPS tick: age pending-forward entries, then purge isolated
    /// peers from the graph, announcing each with a HELLO built while the
    /// record still carries the isolated flag.
    pub fn ips_tick(&mut self) -> Vec<Action> {
        self.ips.tick_pending();
        let mut actions = Vec::new();
        let mut purged = false;
        for name in self.ips.isolated_names() {
            if !self.topo.contains(&name) {
                continue;
            }
            self.topo.update(&name, |info| info.isolated = true);
            actions.push(Action::Broadcast(self.build_hello()));
            self.topo.remove_node(&name);
            purged = true;
            info!(peer = %name, "removed isolated peer from topology");
        }
        if purged {
            self.refresh_local_state();
        }
        actions
    }

    /// Re-derive everything hanging off the graph: the local MPR set (and
    /// with it the neighbor-table marks the next HELLO will carry).
    pub(crate) fn refresh_local_state(&mut self) {
        let me = self.name.clone();
        mpr::recompute(&mut self.topo, &me);
    }
}
