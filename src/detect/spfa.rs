/// Queue-based variant of the negative-cycle search (SPFA discipline).
///
/// Nodes re-enter the work queue every time their distance improves; in a
/// graph with a negative cycle that never settles, so a node enqueued more
/// than `n` times sits on a cycle. Extraction walks the predecessor chain
/// `n` steps to get inside the loop, then follows it around once.
///
/// Kept as an equivalent alternative to the rooted Bellman-Ford pass, with
/// the same validation rules: a reconstruction that reuses a pool or
/// revisits a node is discarded.
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::arb::edge::Edge;
use crate::arb::snapshot::Snapshot;
use crate::arb::token::TokenIndex;

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
    let mut enqueued = vec![0_usize; n];
    let mut in_queue = vec![false; n];

    dist[start] = 0.0;
    enqueued[start] = 1;
    in_queue[start] = true;
    let mut queue = VecDeque::from([start]);

    // Hard stop: without a negative cycle the queue drains long before
    // this; with one we expect an enqueue count to trip first.
    let max_iterations = n.saturating_mul(max_path_len);
    let mut iterations = 0;

    while let Some(u) = queue.pop_front() {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        iterations += 1;
        if iterations > max_iterations {
            break;
        }
        in_queue[u] = false;

        for edge in snapshot.edges_from(u) {
            let candidate = dist[u] + edge.weight;
            if candidate < dist[edge.to] {
                dist[edge.to] = candidate;
                pred[edge.to] = Some(u);
                pred_edge[edge.to] = Some(edge.clone());

                if !in_queue[edge.to] {
                    enqueued[edge.to] += 1;
                    if enqueued[edge.to] > n {
                        return extract(edge.to, &pred, &pred_edge, n);
                    }
                    queue.push_back(edge.to);
                    in_queue[edge.to] = true;
                }
            }
        }
    }

    None
}

/// `node` keeps getting relaxed, so the predecessor chain behind it loops.
/// Walking `n` predecessors is guaranteed to land inside the loop; then one
/// trip around collects the edges.
fn extract(
    node: TokenIndex,
    pred: &[Option<TokenIndex>],
    pred_edge: &[Option<Edge>],
    n: usize,
) -> Option<Vec<Edge>> {
    let mut current = node;
    for _ in 0..n {
        current = pred[current]?;
    }

    let anchor = current;
    let mut edges = Vec::new();
    let mut used_pools = HashSet::new();
    let mut visited = HashSet::new();

    loop {
        let edge = pred_edge[current].as_ref()?;
        if !used_pools.insert(edge.pool) {
            return None;
        }
        edges.push(edge.clone());

        current = pred[current]?;
        if current == anchor {
            break;
        }
        if !visited.insert(current) || edges.len() > n {
            return None;
        }
    }

    edges.reverse();
    let total: f64 = edges.iter().map(|e| e.weight).sum();
    (total < 0.0).then_some(edges)
}
