//! CUSTOM message origination, forwarding and delivery detection.
//!
//! Unicast rides the broadcast medium: the originator emits once, and
//! every relay on a shortest path toward the destination re-emits with
//! itself appended to the forwarder list. Overhearing our own message
//! come back is the proof that the first hop actually forwarded it.

use crate::config::Side;
use crate::engine::{Action, Engine};
use crate::net::message::{CustomKey, Message};
use tracing::{debug, info};

impl Engine {
    /// Originate a CUSTOM message toward `dest`. Returns the message to
    /// broadcast, or `None` when `dest` is ourselves. When the
    /// destination is not a direct neighbor, a pending-forward entry is
    /// registered against the expected first hop.
    pub fn originate_custom(&mut self, dest: &str, payload: Vec<u8>) -> Option<Message> {
        if dest == self.name {
            return None;
        }
        let path = self.topo.shortest_path(&self.name, dest);
        let direct = self.topo.neighbors(&self.name).iter().any(|n| n == dest);
        if !direct {
            if let Some(next_hop) = path.get(1) {
                self.ips.register_pending(
                    CustomKey {
                        sender: self.name.clone(),
                        dest: dest.to_string(),
                        payload: payload.clone(),
                    },
                    next_hop.clone(),
                );
            } else {
                debug!(dest = dest, "no known route, sending blind");
            }
        }
        info!(dest = dest, hops = path.len().saturating_sub(1), "originating message");
        Some(Message::Custom {
            sender: self.name.clone(),
            dest: dest.to_string(),
            payload,
            forwarders: vec![self.name.clone()],
        })
    }

    pub(crate) fn handle_custom(
        &mut self,
        sender: String,
        dest: String,
        payload: Vec<u8>,
        mut forwarders: Vec<String>,
    ) -> Vec<Action> {
        if dest == self.name {
            let mut path = forwarders;
            path.push(self.name.clone());
            info!(from = %sender, path = ?path, "message delivered");
            return vec![Action::Deliver {
                from: sender,
                payload,
                path,
            }];
        }

        if sender == self.name {
            // Our own origination heard being forwarded.
            let Some(forwarder) = forwarders.last().cloned() else {
                return Vec::new();
            };
            if forwarder == self.name {
                return Vec::new();
            }
            let is_our_mpr = self
                .topo
                .get(&forwarder)
                .map(|info| info.local_mpr)
                .unwrap_or(false);
            if is_our_mpr {
                self.ips.change_rating(&forwarder, 1);
                self.ips.confirm_forward(&CustomKey {
                    sender,
                    dest,
                    payload,
                });
            } else {
                debug!(peer = %forwarder, "forwarded our message without being our relay");
                self.ips.change_rating(&forwarder, -1);
            }
            return Vec::new();
        }

        // Transit traffic: forward only as an MPR on a shortest path.
        let Some(prev_hop) = forwarders.last().cloned() else {
            return Vec::new();
        };
        if forwarders.iter().any(|f| f == &self.name) {
            return Vec::new();
        }
        if !self.is_relay() {
            return Vec::new();
        }
        if !self.topo.on_shortest_path(&prev_hop, &dest, &self.name) {
            return Vec::new();
        }
        if self.side == Side::Evil {
            // Adversary simulation: swallow traffic we were trusted with.
            info!(from = %sender, to = %dest, "dropping forwardable message");
            return Vec::new();
        }
        debug!(from = %sender, to = %dest, "forwarding");
        forwarders.push(self.name.clone());
        vec![Action::Broadcast(Message::Custom {
            sender,
            dest,
            payload,
            forwarders,
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::NeighborEntry;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    /// Engine for `b` in the line a-b-c, where both a and c chose b.
    fn relay_engine() -> Engine {
        let mut e = Engine::new("b", Side::Good, HashSet::from([addr(2)]));
        for (peer, ip) in [("a", 1u8), ("c", 3u8)] {
            let hello = Message::Hello {
                sender: peer.to_string(),
                neighbors: vec![NeighborEntry {
                    name: "b".to_string(),
                    addrs: vec![],
                    local_mpr: true,
                    mprss: false,
                    isolated: false,
                }],
            };
            e.handle_datagram(&hello.encode().unwrap(), addr(ip));
        }
        e
    }

    fn custom(sender: &str, dest: &str, forwarders: &[&str]) -> Message {
        Message::Custom {
            sender: sender.to_string(),
            dest: dest.to_string(),
            payload: b"hi".to_vec(),
            forwarders: forwarders.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_originate_to_self_is_noop() {
        let mut e = relay_engine();
        assert!(e.originate_custom("b", b"hi".to_vec()).is_none());
    }

    #[test]
    fn test_originate_direct_neighbor_skips_pending() {
        let mut e = relay_engine();
        let msg = e.originate_custom("a", b"hi".to_vec()).unwrap();
        assert_eq!(e.ips().pending_count(), 0);
        match msg {
            Message::Custom { forwarders, .. } => {
                assert_eq!(forwarders, vec!["b".to_string()]);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_originate_multihop_registers_pending() {
        let mut e = Engine::new("a", Side::Good, HashSet::from([addr(1)]));
        let hello = Message::Hello {
            sender: "b".to_string(),
            neighbors: vec![NeighborEntry {
                name: "c".to_string(),
                addrs: vec![],
                local_mpr: false,
                mprss: false,
                isolated: false,
            }],
        };
        e.handle_datagram(&hello.encode().unwrap(), addr(2));
        e.originate_custom("c", b"hi".to_vec()).unwrap();
        assert_eq!(e.ips().pending_count(), 1);
    }

    #[test]
    fn test_delivery() {
        let mut e = relay_engine();
        let msg = custom("a", "b", &["a"]);
        let actions = e.handle_datagram(&msg.encode().unwrap(), addr(1));
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::Deliver { from, path, .. } => {
                assert_eq!(from, "a");
                assert_eq!(path, &vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_relay_forwards_on_shortest_path() {
        let mut e = relay_engine();
        let msg = custom("a", "c", &["a"]);
        let actions = e.handle_datagram(&msg.encode().unwrap(), addr(1));
        assert_eq!(actions.len(), 1);
        match &actions[0] {
            Action::Broadcast(Message::Custom { forwarders, .. }) => {
                assert_eq!(forwarders, &vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_non_relay_does_not_forward() {
        let mut e = Engine::new("b", Side::Good, HashSet::from([addr(2)]));
        // b knows the line but nobody chose it.
        for (peer, ip) in [("a", 1u8), ("c", 3u8)] {
            let hello = Message::Hello {
                sender: peer.to_string(),
                neighbors: vec![],
            };
            e.handle_datagram(&hello.encode().unwrap(), addr(ip));
        }
        let msg = custom("a", "c", &["a"]);
        assert!(e.handle_datagram(&msg.encode().unwrap(), addr(1)).is_empty());
    }

    #[test]
    fn test_already_forwarded_not_repeated() {
        let mut e = relay_engine();
        let msg = custom("a", "c", &["a", "b"]);
        assert!(e.handle_datagram(&msg.encode().unwrap(), addr(1)).is_empty());
    }

    #[test]
    fn test_off_path_relay_does_not_forward() {
        // b relays for a ring a-b, a-d, d-c: b is not on the a->d shortest path.
        let mut e = Engine::new("b", Side::Good, HashSet::from([addr(2)]));
        let hello = Message::Hello {
            sender: "a".to_string(),
            neighbors: vec![
                NeighborEntry {
                    name: "b".to_string(),
                    addrs: vec![],
                    local_mpr: true,
                    mprss: false,
                    isolated: false,
                },
                NeighborEntry {
                    name: "d".to_string(),
                    addrs: vec![],
                    local_mpr: false,
                    mprss: false,
                    isolated: false,
                },
            ],
        };
        e.handle_datagram(&hello.encode().unwrap(), addr(1));
        let msg = custom("a", "d", &["a"]);
        assert!(e.handle_datagram(&msg.encode().unwrap(), addr(1)).is_empty());
    }

    #[test]
    fn test_evil_relay_drops() {
        let mut e = relay_engine();
        e.side = Side::Evil;
        let msg = custom("a", "c", &["a"]);
        assert!(e.handle_datagram(&msg.encode().unwrap(), addr(1)).is_empty());
    }

    #[test]
    fn test_unexpected_forwarder_penalized() {
        let mut e = Engine::new("a", Side::Good, HashSet::from([addr(1)]));
        let hello = Message::Hello {
            sender: "b".to_string(),
            neighbors: vec![],
        };
        e.handle_datagram(&hello.encode().unwrap(), addr(2));
        // b echoes our message although we never chose it as MPR.
        let msg = custom("a", "c", &["a", "b"]);
        e.handle_datagram(&msg.encode().unwrap(), addr(2));
        assert_eq!(e.ips().rating("b"), -1);
    }
}
