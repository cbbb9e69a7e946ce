//! # Rolling Batch Scheduling
//!
//! Maintains the window of nodes being refreshed concurrently. The backlog
//! is recomputed from the live selector result every pass, so nodes that
//! join the cluster mid-campaign are picked up and nodes that vanish are
//! never re-added. Backlog order is discovery order: first seen, first
//! admitted.

use crds::FailedNode;

/// Target nodes that still need a refresh: the live target set minus nodes
/// already processed or failed this cycle.
pub fn remaining_backlog(
    targets: &[String],
    processed: &[String],
    failed: &[FailedNode],
) -> Vec<String> {
    targets
        .iter()
        .filter(|name| {
            !processed.contains(name) && !failed.iter().any(|f| &f.node_name == *name)
        })
        .cloned()
        .collect()
}

/// Moves backlog entries into the current batch until it reaches
/// `max_concurrent` or the backlog runs dry, preserving backlog order.
pub fn admit_from_backlog(
    current: &mut Vec<String>,
    backlog: &mut Vec<String>,
    max_concurrent: usize,
) {
    while current.len() < max_concurrent && !backlog.is_empty() {
        current.push(backlog.remove(0));
    }
}
