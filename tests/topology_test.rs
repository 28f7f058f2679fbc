//! Randomized-topology properties of the graph store and MPR selection.

use meshguard::mpr;
use meshguard::topology::TopologyDb;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Random connected graph: a spanning chain plus random extra edges.
fn random_connected(rng: &mut StdRng, nodes: usize, extra_edges: usize) -> TopologyDb {
    let names: Vec<String> = (0..nodes).map(|i| format!("n{i}")).collect();
    let mut db = TopologyDb::new();
    for pair in names.windows(2) {
        db.add_edge(&pair[0], &pair[1]);
    }
    for _ in 0..extra_edges {
        let u = rng.gen_range(0..nodes);
        let v = rng.gen_range(0..nodes);
        if u != v {
            db.add_edge(&names[u], &names[v]);
        }
    }
    db
}

fn mpr_cover_holds(db: &TopologyDb, me: &str) -> bool {
    let two_hop = db.neighbors_at(me, 2);
    let covered: BTreeSet<String> = db
        .names_with(|i| i.local_mpr)
        .into_iter()
        .flat_map(|m| db.neighbors(&m))
        .filter(|n| two_hop.contains(n))
        .collect();
    covered == two_hop
}

#[test]
fn test_mpr_cover_on_random_graphs() {
    for seed in 0..40 {
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = rng.gen_range(4..14);
        let extra = rng.gen_range(0..nodes * 2);
        let mut db = random_connected(&mut rng, nodes, extra);
        let chosen = mpr::recompute(&mut db, "n0");
        assert!(
            mpr_cover_holds(&db, "n0"),
            "cover violated at seed {seed}: chosen {chosen:?}"
        );
    }
}

#[test]
fn test_mprs_are_one_hop_neighbors() {
    for seed in 0..40 {
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = rng.gen_range(4..14);
        let extra = rng.gen_range(0..nodes);
        let mut db = random_connected(&mut rng, nodes, extra);
        let chosen = mpr::recompute(&mut db, "n0");
        let one_hop = db.neighbors_at("n0", 1);
        for mpr in &chosen {
            assert!(
                one_hop.contains(mpr),
                "seed {seed}: {mpr} chosen but not a one-hop neighbor"
            );
        }
    }
}

#[test]
fn test_mpr_selection_deterministic() {
    for seed in 0..10 {
        let mut rng_a = StdRng::seed_from_u64(seed);
        let mut rng_b = StdRng::seed_from_u64(seed);
        let mut db_a = random_connected(&mut rng_a, 10, 8);
        let mut db_b = random_connected(&mut rng_b, 10, 8);
        assert_eq!(
            mpr::recompute(&mut db_a, "n0"),
            mpr::recompute(&mut db_b, "n0")
        );
    }
}

#[test]
fn test_every_mpr_contributes() {
    // Each selection step must cover at least one previously uncovered
    // two-hop node, so the set can never exceed |N2|.
    for seed in 0..40 {
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = rng.gen_range(4..14);
        let extra = rng.gen_range(0..nodes * 2);
        let mut db = random_connected(&mut rng, nodes, extra);
        let chosen = mpr::recompute(&mut db, "n0");
        let two_hop = db.neighbors_at("n0", 2);
        assert!(
            chosen.len() <= two_hop.len(),
            "seed {seed}: {} MPRs for {} two-hop nodes",
            chosen.len(),
            two_hop.len()
        );
    }
}

#[test]
fn test_minimality_on_tree_branches() {
    // On a two-branch tree the greedy result is exactly minimal: each
    // branch head is irreplaceable.
    let mut db = TopologyDb::new();
    db.add_edge("me", "left");
    db.add_edge("me", "right");
    db.add_edge("left", "l1");
    db.add_edge("left", "l2");
    db.add_edge("right", "r1");
    let chosen = mpr::recompute(&mut db, "me");
    assert_eq!(chosen.len(), 2);
    for dropped in &chosen {
        let rest: BTreeSet<String> = chosen
            .iter()
            .filter(|m| *m != dropped)
            .flat_map(|m| db.neighbors(m))
            .collect();
        let two_hop = db.neighbors_at("me", 2);
        assert!(
            !two_hop.is_subset(&rest),
            "dropping {dropped} should break the cover"
        );
    }
}

#[test]
fn test_shortest_path_is_valid_walk() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = rng.gen_range(4..12);
        let extra = rng.gen_range(0..nodes);
        let db = random_connected(&mut rng, nodes, extra);
        let goal = format!("n{}", nodes - 1);
        let path = db.shortest_path("n0", &goal);
        assert!(!path.is_empty(), "seed {seed}: chain graph must connect");
        assert_eq!(path.first().map(String::as_str), Some("n0"));
        assert_eq!(path.last().map(String::as_str), Some(goal.as_str()));
        for pair in path.windows(2) {
            assert!(
                db.neighbors(&pair[0]).contains(&pair[1]),
                "seed {seed}: {} and {} are not adjacent",
                pair[0],
                pair[1]
            );
        }
        // A shortest path must match the BFS distance.
        assert_eq!(db.distance("n0", &goal), Some(path.len() - 1));
    }
}

#[test]
fn test_interior_nodes_lie_on_shortest_path() {
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = rng.gen_range(4..12);
        let db = random_connected(&mut rng, nodes, 3);
        let goal = format!("n{}", nodes - 1);
        let path = db.shortest_path("n0", &goal);
        for via in &path {
            assert!(
                db.on_shortest_path("n0", &goal, via),
                "seed {seed}: {via} is on the BFS witness but fails the test"
            );
        }
    }
}
