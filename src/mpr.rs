//! Greedy multi-point relay selection.
//!
//! Picks the subset of one-hop neighbors whose joint neighborhoods cover
//! every node exactly two hops away. Greedy by residual cover size, ties
//! broken by the database's sorted order.

use crate::topology::TopologyDb;
use std::collections::BTreeSet;
use tracing::debug;

/// Recompute the local MPR set of `me` from the current graph. Clears
/// every `local_mpr` flag, then marks the chosen set. Returns the chosen
/// names in selection order.
pub fn recompute(db: &mut TopologyDb, me: &str) -> Vec<String> {
    db.clear_local_mprs();
    let mut uncovered = db.neighbors_at(me, 2);
    let mut candidates: Vec<String> = db.neighbors_at(me, 1).into_iter().collect();
    let mut chosen: Vec<String> = Vec::new();

    while !uncovered.is_empty() {
        let mut best: Option<(usize, BTreeSet<String>)> = None;
        for (i, cand) in candidates.iter().enumerate() {
            let cover: BTreeSet<String> = db
                .neighbors(cand)
                .into_iter()
                .filter(|n| n != me && uncovered.contains(n))
                .collect();
            let better = match &best {
                None => true,
                Some((_, best_cover)) => cover.len() > best_cover.len(),
            };
            if better {
                best = Some((i, cover));
            }
        }
        let Some((i, cover)) = best else {
            break;
        };
        if cover.is_empty() {
            // Remaining two-hop nodes are unreachable through any
            // remaining candidate (disconnected two-hop island).
            debug!(node = me, remaining = uncovered.len(), "two-hop cover incomplete");
            break;
        }
        let mpr = candidates.remove(i);
        for covered in &cover {
            uncovered.remove(covered);
        }
        chosen.push(mpr);
        candidates.retain(|cand| {
            db.neighbors(cand)
                .iter()
                .any(|n| uncovered.contains(n))
        });
    }

    for mpr in &chosen {
        db.set_local_mpr(mpr, true);
    }
    chosen
}
