//! Topology database: the node-attributed undirected graph.
//!
//! All cross-node relationships are by logical name. The graph is a soft
//! cache of what the mesh has told us: removing a name that already
//! vanished is not an error, and edges carry no attributes.

use crate::net::message::NeighborEntry;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::Undirected;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::IpAddr;

type MeshGraph = StableGraph<NodeRecord, (), Undirected>;

/// Attributes tracked per known node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    /// Link addresses observed as origin for this name.
    pub addrs: BTreeSet<IpAddr>,
    /// We chose this node as one of our MPRs.
    pub local_mpr: bool,
    /// This node chose us as one of its MPRs; we forward on its behalf.
    pub mprss: bool,
    /// Somebody's MPR, learned via TC. Diagnostic.
    pub mpr: bool,
    /// Quarantined by the local IPS.
    pub isolated: bool,
}

#[derive(Debug, Clone)]
struct NodeRecord {
    name: String,
    info: NodeInfo,
}

/// Owned copy of the graph, safe to consume outside the protocol lock.
#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub nodes: Vec<(String, NodeInfo)>,
    pub edges: Vec<(String, String)>,
}

pub struct TopologyDb {
    graph: MeshGraph,
    index: HashMap<String, NodeIndex>,
    /// selector name -> originator currently advertising it in a TC.
    chosen_mpr: HashMap<String, String>,
}

impl TopologyDb {
    pub fn new() -> Self {
        Self {
            graph: StableGraph::default(),
            index: HashMap::new(),
            chosen_mpr: HashMap::new(),
        }
    }

    /// Create-or-get the record for `name`.
    pub fn upsert(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(NodeRecord {
            name: name.to_string(),
            info: NodeInfo::default(),
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&NodeInfo> {
        let idx = self.index.get(name)?;
        self.graph.node_weight(*idx).map(|r| &r.info)
    }

    /// Create-or-merge: apply `f` to the (possibly fresh) record.
    pub fn update<F: FnOnce(&mut NodeInfo)>(&mut self, name: &str, f: F) {
        let idx = self.upsert(name);
        if let Some(record) = self.graph.node_weight_mut(idx) {
            f(&mut record.info);
        }
    }

    pub fn add_addr(&mut self, name: &str, addr: IpAddr) {
        self.update(name, |info| {
            info.addrs.insert(addr);
        });
    }

    /// Idempotent undirected edge. Self-loops are ignored.
    pub fn add_edge(&mut self, u: &str, v: &str) {
        if u == v {
            return;
        }
        let ui = self.upsert(u);
        let vi = self.upsert(v);
        if self.graph.find_edge(ui, vi).is_none() {
            self.graph.add_edge(ui, vi, ());
        }
    }

    /// Remove a node and its incident edges. Unknown names are ignored.
    pub fn remove_node(&mut self, name: &str) {
        if let Some(idx) = self.index.remove(name) {
            self.graph.remove_node(idx);
        }
        self.chosen_mpr
            .retain(|selector, mpr| selector != name && mpr != name);
    }

    /// One-hop neighbors, sorted by name.
    pub fn neighbors(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut out: Vec<String> = self
            .graph
            .neighbors(idx)
            .filter_map(|n| self.graph.node_weight(n).map(|r| r.name.clone()))
            .collect();
        out.sort();
        out
    }

    /// Nodes at exactly `dist` hops from `name` (BFS layer).
    pub fn neighbors_at(&self, name: &str, dist: usize) -> BTreeSet<String> {
        let Some(&start) = self.index.get(name) else {
            return BTreeSet::new();
        };
        self.bfs_distances(start)
            .into_iter()
            .filter(|(_, d)| *d == dist)
            .filter_map(|(idx, _)| self.graph.node_weight(idx).map(|r| r.name.clone()))
            .collect()
    }

    /// Hop count between two nodes, `None` when unreachable or unknown.
    pub fn distance(&self, from: &str, to: &str) -> Option<usize> {
        let start = *self.index.get(from)?;
        let goal = *self.index.get(to)?;
        self.bfs_distances(start).get(&goal).copied()
    }

    pub fn is_reachable(&self, from: &str, to: &str) -> bool {
        self.distance(from, to).is_some()
    }

    /// BFS shortest path including both endpoints; empty when unreachable
    /// or either name is unknown.
    pub fn shortest_path(&self, from: &str, to: &str) -> Vec<String> {
        let (Some(&start), Some(&goal)) = (self.index.get(from), self.index.get(to)) else {
            return Vec::new();
        };
        if start == goal {
            return vec![from.to_string()];
        }
        let mut pred: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        let mut seen: BTreeSet<NodeIndex> = BTreeSet::from([start]);
        'search: while let Some(u) = queue.pop_front() {
            // Sorted expansion keeps the witness path deterministic.
            let mut next: Vec<NodeIndex> = self.graph.neighbors(u).collect();
            next.sort_by_key(|n| self.graph.node_weight(*n).map(|r| r.name.clone()));
            for v in next {
                if seen.insert(v) {
                    pred.insert(v, u);
                    if v == goal {
                        break 'search;
                    }
                    queue.push_back(v);
                }
            }
        }
        if !pred.contains_key(&goal) {
            return Vec::new();
        }
        let mut path = vec![goal];
        let mut cur = goal;
        while let Some(&p) = pred.get(&cur) {
            path.push(p);
            cur = p;
        }
        path.reverse();
        path.into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).map(|r| r.name.clone()))
            .collect()
    }

    /// Whether `via` lies on *some* shortest path from `from` to `to`.
    pub fn on_shortest_path(&self, from: &str, to: &str, via: &str) -> bool {
        let (Some(d_total), Some(d_in), Some(d_out)) = (
            self.distance(from, to),
            self.distance(from, via),
            self.distance(via, to),
        ) else {
            return false;
        };
        d_in + d_out == d_total
    }

    /// Names whose record satisfies the predicate, sorted.
    pub fn names_with<F: Fn(&NodeInfo) -> bool>(&self, f: F) -> Vec<String> {
        let mut out: Vec<String> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .filter(|r| f(&r.info))
            .map(|r| r.name.clone())
            .collect();
        out.sort();
        out
    }

    pub fn clear_local_mprs(&mut self) {
        let indices: Vec<NodeIndex> = self.graph.node_indices().collect();
        for idx in indices {
            if let Some(record) = self.graph.node_weight_mut(idx) {
                record.info.local_mpr = false;
            }
        }
    }

    pub fn set_local_mpr(&mut self, name: &str, value: bool) {
        self.update(name, |info| info.local_mpr = value);
    }

    /// Record that a TC from `originator` listed `selector` in its MPR
    /// selector set. When the selector previously pointed at a different
    /// originator, switch it and clear the old originator's `mpr` flag if
    /// no remaining selector points at it.
    pub fn record_mpr_choice(&mut self, selector: &str, originator: &str) {
        if let Some(prev) = self.chosen_mpr.get(selector).cloned() {
            if prev != originator {
                self.chosen_mpr
                    .insert(selector.to_string(), originator.to_string());
                if !self.chosen_mpr.values().any(|m| m == &prev) {
                    self.update(&prev, |info| info.mpr = false);
                }
            }
        } else {
            self.chosen_mpr
                .insert(selector.to_string(), originator.to_string());
        }
        self.update(originator, |info| info.mpr = true);
    }

    /// Projection of graph-neighbors-of-`me` as HELLO rows.
    pub fn neighbor_table(&self, me: &str) -> Vec<NeighborEntry> {
        self.neighbors(me)
            .into_iter()
            .filter_map(|name| {
                self.get(&name).map(|info| NeighborEntry {
                    addrs: info.addrs.iter().copied().collect(),
                    local_mpr: info.local_mpr,
                    mprss: info.mprss,
                    isolated: info.isolated,
                    name,
                })
            })
            .collect()
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let mut nodes: Vec<(String, NodeInfo)> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .map(|r| (r.name.clone(), r.info.clone()))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        let mut edges: Vec<(String, String)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .filter_map(|(a, b)| {
                let a = self.graph.node_weight(a)?.name.clone();
                let b = self.graph.node_weight(b)?.name.clone();
                Some(if a <= b { (a, b) } else { (b, a) })
            })
            .collect();
        edges.sort();
        TopologySnapshot { nodes, edges }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn bfs_distances(&self, start: NodeIndex) -> HashMap<NodeIndex, usize> {
        let mut dist = HashMap::from([(start, 0)]);
        let mut queue = VecDeque::from([start]);
        while let Some(u) = queue.pop_front() {
            let du = dist[&u];
            for v in self.graph.neighbors(u) {
                if !dist.contains_key(&v) {
                    dist.insert(v, du + 1);
                    queue.push_back(v);
                }
            }
        }
        dist
    }
}

impl Default for TopologyDb {
    fn default() -> Self {
        Self::new()
    }
}
