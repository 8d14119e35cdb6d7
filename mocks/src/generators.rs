//! Proptest strategies for graphs and task state machines.

use proptest::prelude::*;
use team_core::dag::{GraphNode, TaskGraph};
use team_core::models::TaskStatus;

/// All task statuses, for exhaustive transition exploration
pub const ALL_STATUSES: [TaskStatus; 8] = [
    TaskStatus::Pending,
    TaskStatus::Ready,
    TaskStatus::Running,
    TaskStatus::Success,
    TaskStatus::Failed,
    TaskStatus::Blocked,
    TaskStatus::AwaitingReview,
    TaskStatus::Cancelled,
];

pub fn arb_status() -> impl Strategy<Value = TaskStatus> {
    proptest::sample::select(ALL_STATUSES.to_vec())
}

/// A random acyclic graph.
///
/// Nodes are `n0..n{count-1}`; candidate edges only ever point from a
/// lower index to a higher one, so any chosen subset is acyclic by
/// construction and `add_edge` must accept every one of them.
pub fn arb_graph() -> impl Strategy<Value = TaskGraph> {
    (2usize..10)
        .prop_flat_map(|count| {
            let pairs = count * (count - 1) / 2;
            (
                Just(count),
                proptest::collection::vec(any::<bool>(), pairs),
                proptest::collection::vec(0i64..100, count),
            )
        })
        .prop_map(|(count, edge_mask, priorities)| {
            let mut graph = TaskGraph::new("wf-prop", "generated", "");
            for (i, priority) in priorities.iter().enumerate().take(count) {
                let mut node = GraphNode::new(&format!("n{i}"), &format!("node {i}"), "");
                node.priority = *priority;
                graph
                    .add_node(node)
                    .expect("generated node ids are unique");
            }

            let mut mask = edge_mask.into_iter();
            for from in 0..count {
                for to in (from + 1)..count {
                    if mask.next().unwrap_or(false) {
                        graph
                            .add_edge(&format!("n{from}"), &format!("n{to}"))
                            .expect("forward edges cannot form a cycle");
                    }
                }
            }
            graph
        })
}

/// A random embedding vector
pub fn arb_embedding(dimension: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0, dimension)
}
