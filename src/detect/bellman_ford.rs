/// Source-rooted Bellman-Ford negative-cycle search.
///
/// Weights are negative logs of exchange rates, so a cycle whose weight sum
/// is below zero multiplies back to more than one: arbitrage. We relax at
/// most `max_path_len - 1` rounds from the start token, then scan every
/// edge re-entering it; a re-entry that closes a negative-sum walk is a
/// candidate cycle.
///
/// Reconstruction through the predecessor chain is heuristic. It can
/// revisit a node, reuse a pool, or never reach the start; those walks are
/// discarded, not errors. Over many snapshots a genuine cycle gets
/// reconstructed from some start token.
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::arb::edge::Edge;
use crate::arb::snapshot::Snapshot;
use crate::arb::token::TokenIndex;

/// Find the most negative valid cycle through `start`, if any.
pub fn find_cycle(
    snapshot: &Snapshot,
    start: TokenIndex,
    max_path_len: usize,
    cancel: &AtomicBool,
) -> Option<Vec<Edge>> {
    let n = snapshot.node_count();
    if start >= n || max_path_len < 2 {
        return None;
    }

    let mut dist = vec![f64::INFINITY; n];
    let mut pred: Vec<Option<TokenIndex>> = vec![None; n];
    let mut pred_edge: Vec<Option<Edge>> = vec![None; n];
    dist[start] = 0.0;

    let rounds = n.saturating_sub(1).min(max_path_len - 1);
    for _ in 0..rounds {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }

        // Relax against the round-start distances so one round advances
        // paths by exactly one edge; that is what bounds cycle length.
        let round_start = dist.clone();
        let mut relaxed = false;
        for u in 0..n {
            if round_start[u].is_infinite() {
                continue;
            }
            for edge in snapshot.edges_from(u) {
                let candidate = round_start[u] + edge.weight;
                if candidate < dist[edge.to] {
                    dist[edge.to] = candidate;
                    pred[edge.to] = Some(u);
                    pred_edge[edge.to] = Some(edge.clone());
                    relaxed = true;
                }
            }
        }
        if !relaxed {
            break;
        }
    }

    // Every edge re-entering the start can close a cycle; keep the best.
    let mut best: Option<(f64, Vec<Edge>)> = None;
    for u in 0..n {
        if dist[u].is_infinite() || u == start {
            continue;
        }
        for edge in snapshot.edges_from(u) {
            if edge.to != start {
                continue;
            }
            if dist[u] + edge.weight >= 0.0 {
                continue;
            }
            if let Some(cycle) = reconstruct(start, u, edge, &pred, &pred_edge, n) {
                let total: f64 = cycle.iter().map(|e| e.weight).sum();
                if total < 0.0 && best.as_ref().is_none_or(|(w, _)| total < *w) {
                    best = Some((total, cycle));
                }
            }
        }
    }

    best.map(|(_, cycle)| cycle)
}

/// Walk predecessors from `last` back to `start` and stitch the closing
/// edge on. Bails on node revisits, pool reuse, dead ends, or walks longer
/// than the graph.
fn reconstruct(
    start: TokenIndex,
    last: TokenIndex,
    closing: &Edge,
    pred: &[Option<TokenIndex>],
    pred_edge: &[Option<Edge>],
    n: usize,
) -> Option<Vec<Edge>> {
    let mut walk = vec![closing.clone()];
    let mut used_pools = HashSet::from([closing.pool]);
    let mut visited = HashSet::new();

    let mut current = last;
    while current != start {
        if !visited.insert(current) {
            return None;
        }
        if walk.len() > n {
            return None;
        }

        let edge = pred_edge[current].as_ref()?;
        if !used_pools.insert(edge.pool) {
            return None;
        }
        walk.push(edge.clone());
        current = pred[current]?;
    }

    walk.reverse();
    Some(walk)
}
